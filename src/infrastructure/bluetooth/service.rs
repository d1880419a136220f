//! Furby Service Module
//!
//! High-level device commands over a [`Transport`]. Every method encodes
//! through the codec, writes, and logs what it did.

use crate::domain::models::{unix_timestamp, SensorData};
use crate::domain::names;
use crate::error::TransportError;
use crate::infrastructure::bluetooth::{
    notification::{classify_device_message, DeviceEvent, Notification},
    protocol::{self, Command, MoodAction, MoodMeterType},
    transport::{Subscription, Transport},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Main service for talking to a connected Furby
pub struct FurbyService<T> {
    transport: Arc<T>,
}

impl<T> Clone for FurbyService<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: Transport> FurbyService<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    async fn write(&self, command: Command) -> Result<(), TransportError> {
        let bytes = command.encode();
        if command.is_link_control() {
            self.transport.write_link_control(&bytes).await?;
            debug!("Nordic write: {}", protocol::hex(&bytes));
        } else {
            self.transport.write_command(&bytes).await?;
            debug!("GP write: {}", protocol::hex(&bytes));
        }
        Ok(())
    }

    /// Set antenna LED color
    pub async fn set_antenna_color(&self, red: u8, green: u8, blue: u8) -> Result<(), TransportError> {
        self.write(Command::AntennaColor { red, green, blue }).await?;
        info!("Set antenna color to RGB({}, {}, {})", red, green, blue);
        Ok(())
    }

    pub async fn trigger_action(
        &self,
        input: u8,
        index: u8,
        subindex: u8,
        specific: u8,
    ) -> Result<(), TransportError> {
        self.write(Command::Action {
            input,
            index,
            subindex,
            specific,
        })
        .await?;
        info!("Triggered action: {}/{}/{}/{}", input, index, subindex, specific);
        Ok(())
    }

    pub async fn set_lcd_backlight(&self, enabled: bool) -> Result<(), TransportError> {
        self.write(Command::LcdBacklight(enabled)).await?;
        info!("LCD backlight: {}", if enabled { "on" } else { "off" });
        Ok(())
    }

    pub async fn cycle_debug_menu(&self) -> Result<(), TransportError> {
        self.write(Command::DebugMenu).await?;
        info!("Cycled debug menu");
        Ok(())
    }

    /// Set the name and have the Furby say it
    pub async fn set_name(&self, name_id: u8) -> Result<(), TransportError> {
        self.write(Command::SetName(name_id)).await?;
        self.trigger_action(
            protocol::GeneralPlusCommand::SetName.code(),
            0,
            0,
            name_id,
        )
        .await?;
        match names::name_for_id(name_id) {
            Some(name) => info!("Set name to {} (ID {})", name, name_id),
            None => warn!("Set name to ID {}, which is outside the name table", name_id),
        }
        Ok(())
    }

    pub async fn set_mood(
        &self,
        mood: MoodMeterType,
        action: MoodAction,
        value: u8,
    ) -> Result<(), TransportError> {
        self.write(Command::MoodMeter {
            action: action as u8,
            mood_type: mood.code(),
            value,
        })
        .await?;
        info!("Set mood {} to {} ({:?})", mood.name(), value, action);
        Ok(())
    }

    /// Toggle Nordic packet acknowledgments for data-channel writes
    pub async fn enable_link_ack(&self, enabled: bool) -> Result<(), TransportError> {
        self.write(Command::LinkAck(enabled)).await?;
        info!("Nordic packet ACK {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub async fn send_keepalive(&self) -> Result<(), TransportError> {
        self.write(Command::KeepAlive).await
    }

    pub async fn load_dlc(&self, slot: u8) -> Result<(), TransportError> {
        self.write(Command::LoadDlc(slot)).await?;
        info!("Loaded DLC from slot {}", slot);
        Ok(())
    }

    pub async fn activate_dlc(&self) -> Result<(), TransportError> {
        self.write(Command::ActivateDlc).await?;
        info!("Activated DLC");
        Ok(())
    }

    /// Deactivate a slot without deleting it
    pub async fn deactivate_dlc(&self, slot: u8) -> Result<(), TransportError> {
        self.write(Command::DeactivateDlc(slot)).await?;
        info!("Deactivated DLC in slot {}", slot);
        Ok(())
    }

    pub async fn delete_dlc(&self, slot: u8) -> Result<(), TransportError> {
        self.write(Command::DeleteDlc(slot)).await?;
        info!("Deleted DLC from slot {}", slot);
        Ok(())
    }

    /// Forward recognized device events until the returned handle is dropped
    pub fn subscribe_device_events(&self, sender: mpsc::UnboundedSender<DeviceEvent>) -> Subscription {
        self.transport.subscribe_notifications(Arc::new(move |frame: &[u8]| {
            if let Some(event) = classify_device_message(frame) {
                debug!("Device event: {:?}", event);
                let _ = sender.send(event);
            }
        }))
    }

    /// Forward every sensor-status frame, stamped with its arrival time
    pub fn subscribe_sensor_data(&self, sender: mpsc::UnboundedSender<SensorData>) -> Subscription {
        self.transport.subscribe_notifications(Arc::new(move |frame: &[u8]| {
            if let Some(Notification::Sensor(_)) = Notification::classify(frame) {
                let _ = sender.send(SensorData::new(unix_timestamp(), frame));
            }
        }))
    }
}

impl<T: Transport + 'static> FurbyService<T> {
    /// Keep the Furby attentive by writing the idle frame every `interval`.
    ///
    /// Write failures are logged and the loop keeps going; connection state
    /// is owned by the transport. Dropping the handle stops the loop.
    pub fn spawn_keepalive(&self, interval: Duration) -> KeepAliveHandle {
        let service = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                if let Err(e) = service.send_keepalive().await {
                    debug!("Keep-alive write failed: {}", e);
                }
            }
        });
        debug!("Started idle keepalive");
        KeepAliveHandle { task }
    }
}

/// Running keep-alive loop, aborted on drop
#[derive(Debug)]
pub struct KeepAliveHandle {
    task: JoinHandle<()>,
}

impl KeepAliveHandle {
    pub fn stop(self) {}
}

impl Drop for KeepAliveHandle {
    fn drop(&mut self) {
        self.task.abort();
        debug!("Stopped idle keepalive");
    }
}
