//! Furby Connect Protocol
//!
//! GATT identifiers, opcode tables and the command codec for talking to a
//! Furby Connect. Every encoder here is pure: it never blocks, never touches
//! the transport and always yields the same bytes for the same inputs.
//! Field values are not range-checked; callers validate if they need to.

use crate::error::ProtocolError;

/// Fluff service UUID (main control service)
pub const FLUFF_SERVICE_UUID: &str = "dab91435-b5a1-e29c-b041-bcd562613bde";

/// Nordic DFU service UUID
pub const NORDIC_DFU_SERVICE_UUID: &str = "00001530-1212-efde-1523-785feabcd123";

/// Device Information service UUID
pub const DEVICE_INFORMATION_SERVICE_UUID: &str = "0000180a-0000-1000-8000-00805f9b34fb";

/// GeneralPlus write characteristic - where commands are sent
pub const GENERALPLUS_WRITE_UUID: &str = "dab91383-b5a1-e29c-b041-bcd562613bde";

/// GeneralPlus listen characteristic - status and event notifications
pub const GENERALPLUS_LISTEN_UUID: &str = "dab91382-b5a1-e29c-b041-bcd562613bde";

/// Nordic write characteristic - link-layer control
pub const NORDIC_WRITE_UUID: &str = "dab90757-b5a1-e29c-b041-bcd562613bde";

/// Nordic listen characteristic
pub const NORDIC_LISTEN_UUID: &str = "dab90756-b5a1-e29c-b041-bcd562613bde";

/// RSSI listen characteristic
pub const RSSI_LISTEN_UUID: &str = "dab90755-b5a1-e29c-b041-bcd562613bde";

/// File write characteristic - DLC payload chunks
pub const FILE_WRITE_UUID: &str = "dab90758-b5a1-e29c-b041-bcd562613bde";

/// Device information characteristics
pub mod device_info {
    pub const MANUFACTURER_NAME_UUID: &str = "00002a29-0000-1000-8000-00805f9b34fb";
    pub const MODEL_NUMBER_UUID: &str = "00002a24-0000-1000-8000-00805f9b34fb";
    pub const SERIAL_NUMBER_UUID: &str = "00002a25-0000-1000-8000-00805f9b34fb";
    pub const HARDWARE_REVISION_UUID: &str = "00002a27-0000-1000-8000-00805f9b34fb";
    pub const FIRMWARE_REVISION_UUID: &str = "00002a26-0000-1000-8000-00805f9b34fb";
    pub const SOFTWARE_REVISION_UUID: &str = "00002a28-0000-1000-8000-00805f9b34fb";
}

/// Advertised name prefix of Furby Connect devices
pub const DEVICE_NAME: &str = "Furby";

/// Largest payload of a single BLE write
pub const MAX_PACKET_SIZE: usize = 20;

/// Bytes per DLC payload chunk on the data channel
pub const FILE_CHUNK_SIZE: usize = 20;

/// Fixed width of the filename field in the announce frame
pub const DLC_FILENAME_LEN: usize = 12;

/// Announce frame length: header (6) + filename (12) + trailer (2)
pub const ANNOUNCE_FRAME_LEN: usize = 6 + DLC_FILENAME_LEN + 2;

/// Largest content size the 24-bit announce field can carry
pub const MAX_DLC_SIZE: usize = 0x00FF_FFFF;

/// Interval between keep-alive frames in milliseconds
pub const IDLE_INTERVAL_MS: u64 = 3000;

/// Frame that keeps the Furby from idling into its own chatter
pub const KEEPALIVE_FRAME: [u8; 1] = [0x00];

/// Commands understood by the GeneralPlus microcontroller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GeneralPlusCommand {
    TriggerActionByInput = 0x10,
    TriggerActionByIndex = 0x11,
    TriggerActionBySubindex = 0x12,
    TriggerSpecificAction = 0x13,
    SetAntennaColor = 0x14,
    FurbyMessage = 0x20,
    SetName = 0x21,
    SetMoodMeter = 0x23,
    SetNotifications = 0x31,
    AnnounceDlcUpload = 0x50,
    DeleteFile = 0x53,
    GetFileSize = 0x54,
    GetChecksum = 0x55,
    LoadDlc = 0x60,
    ActivateDlc = 0x61,
    DeactivateDlc = 0x62,
    GetSlotAllocation = 0x72,
    GetSlotInfo = 0x73,
    DeleteDlcSlot = 0x74,
    BodyCam = 0xBC,
    LcdBacklight = 0xCD,
    LcdDebugMenu = 0xDB,
    GetFirmwareVersion = 0xFE,
}

impl GeneralPlusCommand {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Response identifiers sent back by the GeneralPlus microcontroller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GeneralPlusResponse {
    FurbyMessage = 0x20,
    SensorStatus = 0x21,
    ImHereSignal = 0x22,
    CurrentMode = 0x23,
    FileTransferMode = 0x24,
    Language = 0x25,
    FurbiesMet = 0x26,
    GotFileSize = 0x54,
    GotFileChecksum = 0x55,
    SlotsInfo = 0x72,
    GotSlotInfoByIndex = 0x73,
    GotDeleteSlotByIndex = 0x74,
    ReportDlc = 0xDC,
    FirmwareVersion = 0xFE,
}

impl GeneralPlusResponse {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        use GeneralPlusResponse::*;
        Some(match code {
            0x20 => FurbyMessage,
            0x21 => SensorStatus,
            0x22 => ImHereSignal,
            0x23 => CurrentMode,
            0x24 => FileTransferMode,
            0x25 => Language,
            0x26 => FurbiesMet,
            0x54 => GotFileSize,
            0x55 => GotFileChecksum,
            0x72 => SlotsInfo,
            0x73 => GotSlotInfoByIndex,
            0x74 => GotDeleteSlotByIndex,
            0xDC => ReportDlc,
            0xFE => FirmwareVersion,
            _ => return None,
        })
    }
}

/// Commands for the Nordic BLE microcontroller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NordicCommand {
    PacketAck = 0x09,
}

/// Mood meter dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MoodMeterType {
    Excitedness = 0x00,
    Displeasedness = 0x01,
    Tiredness = 0x02,
    Fullness = 0x03,
    Wellness = 0x04,
}

impl MoodMeterType {
    pub const ALL: [MoodMeterType; 5] = [
        MoodMeterType::Excitedness,
        MoodMeterType::Displeasedness,
        MoodMeterType::Tiredness,
        MoodMeterType::Fullness,
        MoodMeterType::Wellness,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            MoodMeterType::Excitedness => "excitedness",
            MoodMeterType::Displeasedness => "displeasedness",
            MoodMeterType::Tiredness => "tiredness",
            MoodMeterType::Fullness => "fullness",
            MoodMeterType::Wellness => "wellness",
        }
    }
}

impl std::str::FromStr for MoodMeterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|mood| mood.name() == wanted)
            .ok_or_else(|| format!("unknown mood type: {s}"))
    }
}

/// Whether a mood meter write replaces the value or adds to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MoodAction {
    Increase = 0x00,
    Set = 0x01,
}

/// A command frame ready to be serialized.
///
/// Each variant has a fixed wire length; nothing is length-prefixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AntennaColor { red: u8, green: u8, blue: u8 },
    Action { input: u8, index: u8, subindex: u8, specific: u8 },
    LcdBacklight(bool),
    DebugMenu,
    SetName(u8),
    MoodMeter { action: u8, mood_type: u8, value: u8 },
    /// `size` is sent as 24-bit big-endian; higher bits are dropped.
    AnnounceDlc { size: u32, slot: u8, filename: [u8; DLC_FILENAME_LEN] },
    LoadDlc(u8),
    ActivateDlc,
    DeactivateDlc(u8),
    DeleteDlc(u8),
    /// Nordic link-layer acknowledgment toggle.
    LinkAck(bool),
    KeepAlive,
}

impl Command {
    /// Build an announce command, framing `filename` to the 12-byte field.
    pub fn announce(size: u32, slot: u8, filename: &str) -> Self {
        Command::AnnounceDlc {
            size,
            slot,
            filename: encode_filename(filename),
        }
    }

    pub fn opcode(&self) -> u8 {
        use GeneralPlusCommand as Gp;
        match self {
            Command::AntennaColor { .. } => Gp::SetAntennaColor.code(),
            Command::Action { .. } => Gp::TriggerSpecificAction.code(),
            Command::LcdBacklight(_) => Gp::LcdBacklight.code(),
            Command::DebugMenu => Gp::LcdDebugMenu.code(),
            Command::SetName(_) => Gp::SetName.code(),
            Command::MoodMeter { .. } => Gp::SetMoodMeter.code(),
            Command::AnnounceDlc { .. } => Gp::AnnounceDlcUpload.code(),
            Command::LoadDlc(_) => Gp::LoadDlc.code(),
            Command::ActivateDlc => Gp::ActivateDlc.code(),
            Command::DeactivateDlc(_) => Gp::DeactivateDlc.code(),
            Command::DeleteDlc(_) => Gp::DeleteDlcSlot.code(),
            Command::LinkAck(_) => NordicCommand::PacketAck as u8,
            Command::KeepAlive => KEEPALIVE_FRAME[0],
        }
    }

    /// Serialized length in bytes
    pub fn encoded_len(&self) -> usize {
        match self {
            Command::DebugMenu | Command::ActivateDlc | Command::KeepAlive => 1,
            Command::LcdBacklight(_)
            | Command::SetName(_)
            | Command::LoadDlc(_)
            | Command::DeactivateDlc(_)
            | Command::DeleteDlc(_) => 2,
            Command::LinkAck(_) => 3,
            Command::AntennaColor { .. } | Command::MoodMeter { .. } => 4,
            Command::Action { .. } => 6,
            Command::AnnounceDlc { .. } => ANNOUNCE_FRAME_LEN,
        }
    }

    /// Whether this command goes out on the Nordic link-control characteristic
    pub fn is_link_control(&self) -> bool {
        matches!(self, Command::LinkAck(_))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(self.opcode());

        match *self {
            Command::AntennaColor { red, green, blue } => buf.extend_from_slice(&[red, green, blue]),
            Command::Action {
                input,
                index,
                subindex,
                specific,
            } => buf.extend_from_slice(&[0x00, input, index, subindex, specific]),
            Command::LcdBacklight(on) | Command::LinkAck(on) => {
                buf.push(u8::from(on));
                if self.is_link_control() {
                    buf.push(0x00);
                }
            }
            Command::SetName(id) => buf.push(id),
            Command::MoodMeter {
                action,
                mood_type,
                value,
            } => buf.extend_from_slice(&[action, mood_type, value]),
            Command::AnnounceDlc {
                size,
                slot,
                ref filename,
            } => {
                buf.push(0x00);
                buf.extend_from_slice(&[(size >> 16) as u8, (size >> 8) as u8, size as u8]);
                buf.push(slot);
                buf.extend_from_slice(filename);
                buf.extend_from_slice(&[0x00, 0x00]);
            }
            Command::LoadDlc(slot) | Command::DeactivateDlc(slot) | Command::DeleteDlc(slot) => {
                buf.push(slot)
            }
            Command::DebugMenu | Command::ActivateDlc | Command::KeepAlive => {}
        }

        debug_assert_eq!(buf.len(), self.encoded_len());
        buf
    }
}

/// Frame a logical filename into the fixed 12-byte field.
///
/// Longer names are cut to their first 12 bytes, shorter ones are padded with
/// zeros. Characters outside ASCII are replaced with `_`.
pub fn encode_filename(name: &str) -> [u8; DLC_FILENAME_LEN] {
    let mut field = [0u8; DLC_FILENAME_LEN];
    let ascii = name
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'_' });
    for (slot, byte) in field.iter_mut().zip(ascii) {
        *slot = byte;
    }
    field
}

/// Set antenna LED color
pub fn encode_antenna_color(red: u8, green: u8, blue: u8) -> Vec<u8> {
    Command::AntennaColor { red, green, blue }.encode()
}

/// Trigger a specific action sequence
pub fn encode_action(input: u8, index: u8, subindex: u8, specific: u8) -> Vec<u8> {
    Command::Action {
        input,
        index,
        subindex,
        specific,
    }
    .encode()
}

pub fn encode_lcd_backlight(enabled: bool) -> Vec<u8> {
    Command::LcdBacklight(enabled).encode()
}

pub fn encode_debug_menu() -> Vec<u8> {
    Command::DebugMenu.encode()
}

/// Set the Furby name by table id (0-128)
pub fn encode_set_name(name_id: u8) -> Vec<u8> {
    Command::SetName(name_id).encode()
}

/// `action` is 1 to set, 0 to increase; `mood_type` is a [`MoodMeterType`] code
pub fn encode_mood_meter(action: u8, mood_type: u8, value: u8) -> Vec<u8> {
    Command::MoodMeter {
        action,
        mood_type,
        value,
    }
    .encode()
}

pub fn encode_announce_dlc(size: u32, slot: u8, filename: &str) -> Vec<u8> {
    Command::announce(size, slot, filename).encode()
}

pub fn encode_load_dlc(slot: u8) -> Vec<u8> {
    Command::LoadDlc(slot).encode()
}

pub fn encode_activate_dlc() -> Vec<u8> {
    Command::ActivateDlc.encode()
}

pub fn encode_deactivate_dlc(slot: u8) -> Vec<u8> {
    Command::DeactivateDlc(slot).encode()
}

pub fn encode_delete_dlc(slot: u8) -> Vec<u8> {
    Command::DeleteDlc(slot).encode()
}

/// Enable or disable Nordic packet acknowledgment
pub fn encode_link_ack(enabled: bool) -> Vec<u8> {
    Command::LinkAck(enabled).encode()
}

/// Split a frame into its opcode and payload
pub fn parse_response(frame: &[u8]) -> Result<(u8, &[u8]), ProtocolError> {
    match frame.split_first() {
        Some((&opcode, payload)) => Ok((opcode, payload)),
        None => Err(ProtocolError::EmptyFrame),
    }
}

/// Render bytes as lowercase hex for log lines
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
