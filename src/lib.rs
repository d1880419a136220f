//! Control library for the Furby Connect.
//!
//! [`FurbyService`] sends one-shot commands (antenna color, actions, names,
//! moods) and [`ContentTransferController`] uploads and activates DLC
//! content. Both run on top of any [`Transport`] implementation.

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use domain::device_cache::{DeviceCache, DeviceUpdate};
pub use domain::models::{KnownDevice, SensorData, TransferProgress};
pub use domain::settings::{Settings, SettingsService};
pub use error::{DeviceFailure, ProtocolError, TransferError, TransportError};
pub use infrastructure::bluetooth::notification::{DeviceEvent, Notification, StatusNotification};
pub use infrastructure::bluetooth::protocol::{Command, MoodAction, MoodMeterType};
pub use infrastructure::bluetooth::transfer::{
    SettleDelays, TransferOptions, TransferSession, TransferState,
};
pub use infrastructure::bluetooth::{
    ContentTransferController, FurbyService, NotificationHub, Subscription, Transport,
};
pub use infrastructure::logging::{init_logger, LoggingGuard};
