use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, as stored in `last_seen` and `timestamp`
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Progress report emitted by the transfer controller.
///
/// During the flash workflow's non-upload steps `bytes_sent` and `total`
/// are both zero and only `message` carries information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_sent: usize,
    pub total: usize,
    pub message: String,
}

impl TransferProgress {
    pub fn new(bytes_sent: usize, total: usize, message: impl Into<String>) -> Self {
        Self {
            bytes_sent,
            total,
            message: message.into(),
        }
    }

    /// Percentage complete, or `None` for step-only reports
    pub fn percent(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.bytes_sent as f64 / self.total as f64 * 100.0)
        }
    }
}

/// One sensor-status frame (`0x21`) as received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorData {
    /// Unix timestamp (seconds) of arrival
    pub timestamp: f64,
    /// Whole frame, opcode included, as lowercase hex
    pub raw_data: String,
}

impl SensorData {
    pub fn new(timestamp: f64, frame: &[u8]) -> Self {
        Self {
            timestamp,
            raw_data: frame.iter().map(|b| format!("{:02x}", b)).collect(),
        }
    }
}

/// Cached record of a device seen before
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownDevice {
    /// MAC address
    pub address: String,
    /// Last known Furby name
    #[serde(default)]
    pub name: Option<String>,
    /// Last known name id (0-128)
    #[serde(default)]
    pub name_id: Option<u8>,
    /// Advertised BLE device name
    #[serde(default)]
    pub device_name: Option<String>,
    /// Unix timestamp (seconds) of the last sighting
    pub last_seen: f64,
    #[serde(default)]
    pub firmware_revision: Option<String>,
}

impl KnownDevice {
    pub fn new(address: impl Into<String>, last_seen: f64) -> Self {
        Self {
            address: address.into(),
            name: None,
            name_id: None,
            device_name: None,
            last_seen,
            firmware_revision: None,
        }
    }
}

/// On-disk layout of the known-device cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnownDevices {
    #[serde(default, rename = "furbies")]
    pub devices: BTreeMap<String, KnownDevice>,
}
