//! Transport seam
//!
//! The controller and the device service only ever see a [`Transport`]:
//! three write paths and a notification subscription. Connection setup and
//! teardown live with whoever implements it.
//!
//! Subscriptions are explicit handles. Dropping or cancelling a
//! [`Subscription`] removes exactly the handler it was returned for, so a
//! finished upload can never leave a stale handler behind.

use crate::error::TransportError;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::trace;

/// Callback invoked with every inbound GeneralPlus frame
pub type NotificationHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Link to a connected device
pub trait Transport: Send + Sync {
    /// Write to the GeneralPlus command characteristic
    fn write_command(&self, data: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Write to the Nordic link-control characteristic.
    ///
    /// Transports without a separate link channel can keep the default, which
    /// routes through the command channel.
    fn write_link_control(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.write_command(data)
    }

    /// Write one payload chunk to the file characteristic
    fn write_data(&self, data: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Register a handler for inbound notifications
    fn subscribe_notifications(&self, handler: NotificationHandler) -> Subscription;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    handlers: Mutex<BTreeMap<u64, NotificationHandler>>,
}

impl HubInner {
    fn remove(&self, id: SubscriptionId) -> bool {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id.0)
            .is_some()
    }
}

/// Fan-out registry that transport implementations embed
#[derive(Clone, Default)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: NotificationHandler) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.0, handler);
        trace!("Notification handler {:?} subscribed", id);

        Subscription {
            id,
            hub: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    /// Deliver a frame to every live handler, in subscription order.
    ///
    /// Handlers run outside the registry lock so they may subscribe or cancel.
    pub fn dispatch(&self, frame: &[u8]) {
        let handlers: Vec<NotificationHandler> = self
            .inner
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        for handler in handlers {
            handler(frame);
        }
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("subscriptions", &self.len())
            .finish()
    }
}

/// Handle to a registered notification handler. Released on drop.
#[must_use = "dropping a Subscription unsubscribes its handler immediately"]
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    hub: Weak<HubInner>,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(hub) = self.hub.upgrade() {
            if hub.remove(self.id) {
                trace!("Notification handler {:?} unsubscribed", self.id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
