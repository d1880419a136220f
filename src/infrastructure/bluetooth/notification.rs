//! Inbound notification classification
//!
//! The GeneralPlus listen characteristic multiplexes several kinds of frames.
//! File-transfer status frames (`0x24`) drive the upload state machine, furby
//! messages (`0x20`) report device events, and everything else belongs to
//! other consumers.

use super::protocol::GeneralPlusResponse;

/// File-transfer status decoded from a `0x24` frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusNotification {
    FileAlreadyExists,
    ReadyToReceive,
    FileTransferTimeout,
    ReadyToAppend,
    FileReceivedOk,
    FileReceivedError,
    Unknown(u8),
}

impl StatusNotification {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => StatusNotification::FileAlreadyExists,
            0x02 => StatusNotification::ReadyToReceive,
            0x03 => StatusNotification::FileTransferTimeout,
            0x04 => StatusNotification::ReadyToAppend,
            0x05 => StatusNotification::FileReceivedOk,
            0x06 => StatusNotification::FileReceivedError,
            other => StatusNotification::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            StatusNotification::FileAlreadyExists => 0x01,
            StatusNotification::ReadyToReceive => 0x02,
            StatusNotification::FileTransferTimeout => 0x03,
            StatusNotification::ReadyToAppend => 0x04,
            StatusNotification::FileReceivedOk => 0x05,
            StatusNotification::FileReceivedError => 0x06,
            StatusNotification::Unknown(code) => code,
        }
    }

    /// Returns `None` for frames that are not file-transfer status frames.
    pub fn classify(frame: &[u8]) -> Option<Self> {
        match frame {
            [opcode, code, ..] if *opcode == GeneralPlusResponse::FileTransferMode.code() => {
                Some(Self::from_code(*code))
            }
            _ => None,
        }
    }

    /// Frame the device would send for this status
    pub fn to_frame(self) -> [u8; 2] {
        [GeneralPlusResponse::FileTransferMode.code(), self.code()]
    }
}

/// Events reported through furby messages (`0x20`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    EnteredNamingMode,
    ExitedNamingMode,
    FurbyNamed,
    EnteredAppMode,
    ExitedAppMode,
    ResponsePlayed,
    SpeechPlaying,
    SlaveAck,
    MaskAdded,
    MaskRemoved,
    SequencePlaying,
    SequenceCancelled,
    SequenceEnded,
    InputOutOfRange,
    IndexOutOfRange,
    SubindexOutOfRange,
    SpecificOutOfRange,
    SleepMaskAdded,
    SleepMaskRemoved,
    BodyCamOn,
    BodyCamOff,
    LcdOn,
    LcdOff,
    GroupNotActive,
    TimedGroupSet,
    CustomNotificationSet,
}

impl DeviceEvent {
    pub fn from_code(code: u8) -> Option<Self> {
        use DeviceEvent::*;
        Some(match code {
            0x01 => EnteredNamingMode,
            0x02 => ExitedNamingMode,
            0x03 => FurbyNamed,
            0x04 => EnteredAppMode,
            0x05 => ExitedAppMode,
            0x06 => ResponsePlayed,
            0x07 => SpeechPlaying,
            0x08 => SlaveAck,
            0x0A => MaskAdded,
            0x0B => MaskRemoved,
            0x0C => SequencePlaying,
            0x0D => SequenceCancelled,
            0x0E => SequenceEnded,
            0x0F => InputOutOfRange,
            0x10 => IndexOutOfRange,
            0x11 => SubindexOutOfRange,
            0x12 => SpecificOutOfRange,
            0x13 => SleepMaskAdded,
            0x14 => SleepMaskRemoved,
            0x15 => BodyCamOn,
            0x16 => BodyCamOff,
            0x17 => LcdOn,
            0x18 => LcdOff,
            0x19 => GroupNotActive,
            0x1A => TimedGroupSet,
            0x1B => CustomNotificationSet,
            _ => return None,
        })
    }
}

/// True when the frame starts with the furby-message opcode
pub fn is_device_message(frame: &[u8]) -> bool {
    frame.first() == Some(&GeneralPlusResponse::FurbyMessage.code())
}

/// Map a furby message to its event. `None` for other opcodes, a missing
/// event byte, or an unmapped event code.
pub fn classify_device_message(frame: &[u8]) -> Option<DeviceEvent> {
    match frame {
        [_, code, ..] if is_device_message(frame) => DeviceEvent::from_code(*code),
        _ => None,
    }
}

/// Any inbound GeneralPlus frame, sorted by consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification<'a> {
    Status(StatusNotification),
    Device(DeviceEvent),
    Sensor(&'a [u8]),
    Other { opcode: u8, payload: &'a [u8] },
}

impl<'a> Notification<'a> {
    /// `None` only for an empty frame.
    pub fn classify(frame: &'a [u8]) -> Option<Self> {
        let (&opcode, payload) = frame.split_first()?;

        if let Some(status) = StatusNotification::classify(frame) {
            return Some(Notification::Status(status));
        }
        if let Some(event) = classify_device_message(frame) {
            return Some(Notification::Device(event));
        }
        if opcode == GeneralPlusResponse::SensorStatus.code() {
            return Some(Notification::Sensor(payload));
        }
        Some(Notification::Other { opcode, payload })
    }
}
