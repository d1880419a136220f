//! Error types shared by the codec, the transport seam and the transfer controller.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while decoding inbound frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame had no bytes at all, so there is no opcode to read.
    #[error("empty response frame")]
    EmptyFrame,
}

/// Which write path a transport operation targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// GeneralPlus command characteristic.
    Command,
    /// Nordic link-control characteristic.
    Link,
    /// File payload characteristic.
    Data,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Command => write!(f, "command"),
            Channel::Link => write!(f, "link-control"),
            Channel::Data => write!(f, "data"),
        }
    }
}

/// Failures surfaced by a [`Transport`](crate::infrastructure::bluetooth::transport::Transport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("not connected to a device")]
    NotConnected,

    #[error("write to {channel} channel failed: {reason}")]
    WriteFailed { channel: Channel, reason: String },
}

/// Failure the device itself signalled through a file-transfer status frame.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFailure {
    #[error("device reported an error while receiving the file")]
    ExplicitError,

    #[error("device timed out waiting for file data")]
    TransferTimeout,
}

/// Wait phase of an upload that can expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    /// Waiting for the device to accept the announce.
    Ready,
    /// Waiting for the device to confirm the received file.
    Confirm,
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferPhase::Ready => write!(f, "ready"),
            TransferPhase::Confirm => write!(f, "confirm"),
        }
    }
}

/// Errors returned by the content transfer controller.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Content source does not exist. Raised before any protocol traffic.
    #[error("DLC file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("failed to read DLC file {}: {source}", .path.display())]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Content length does not fit the 24-bit size field of the announce frame.
    #[error("content of {size} bytes exceeds the 24-bit announce size field")]
    ContentTooLarge { size: usize },

    #[error("device did not respond during the {phase} phase")]
    ProtocolTimeout { phase: TransferPhase },

    /// The notification side let go of its signal without firing it.
    #[error("transfer signal dropped during the {phase} phase")]
    SignalLost { phase: TransferPhase },

    #[error("{cause}")]
    DeviceReportedError { cause: DeviceFailure },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Another upload is already running on this controller.
    #[error("an upload is already in progress on this controller")]
    Busy,
}

impl TransferError {
    /// True for failures where the device went quiet rather than refusing.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransferError::ProtocolTimeout { .. })
    }
}
