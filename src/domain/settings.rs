use crate::infrastructure::bluetooth::transfer::{SettleDelays, TransferOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default)]
    pub rotation: LogRotation,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: LogRotation::default(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "fluff_connect".to_string()
}

/// Upload timing, persisted in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSettings {
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
    #[serde(default = "default_true")]
    pub enable_link_ack: bool,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            ready_timeout_ms: default_ready_timeout_ms(),
            confirm_timeout_ms: default_confirm_timeout_ms(),
            chunk_delay_ms: default_chunk_delay_ms(),
            enable_link_ack: default_true(),
            progress_interval: default_progress_interval(),
        }
    }
}

impl TransferSettings {
    /// Options without a progress sink; attach one with `with_progress`
    pub fn to_options(&self) -> TransferOptions {
        TransferOptions {
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
            confirm_timeout: Duration::from_millis(self.confirm_timeout_ms),
            chunk_delay: Duration::from_millis(self.chunk_delay_ms),
            enable_link_ack: self.enable_link_ack,
            progress_interval: self.progress_interval,
            progress: None,
        }
    }
}

fn default_ready_timeout_ms() -> u64 {
    10_000
}
fn default_confirm_timeout_ms() -> u64 {
    300_000
}
fn default_chunk_delay_ms() -> u64 {
    20
}
fn default_progress_interval() -> usize {
    50
}

/// Blind waits of the flash workflow, persisted in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleSettings {
    #[serde(default = "default_long_settle_ms")]
    pub after_delete_ms: u64,
    #[serde(default = "default_long_settle_ms")]
    pub after_upload_ms: u64,
    #[serde(default = "default_short_settle_ms")]
    pub after_load_ms: u64,
    #[serde(default = "default_short_settle_ms")]
    pub after_activate_ms: u64,
}

impl Default for SettleSettings {
    fn default() -> Self {
        Self {
            after_delete_ms: default_long_settle_ms(),
            after_upload_ms: default_long_settle_ms(),
            after_load_ms: default_short_settle_ms(),
            after_activate_ms: default_short_settle_ms(),
        }
    }
}

impl SettleSettings {
    pub fn to_delays(&self) -> SettleDelays {
        SettleDelays {
            after_delete: Duration::from_millis(self.after_delete_ms),
            after_upload: Duration::from_millis(self.after_upload_ms),
            after_load: Duration::from_millis(self.after_load_ms),
            after_activate: Duration::from_millis(self.after_activate_ms),
        }
    }
}

fn default_long_settle_ms() -> u64 {
    2000
}
fn default_short_settle_ms() -> u64 {
    500
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,

    #[serde(default)]
    pub transfer: TransferSettings,

    #[serde(default)]
    pub settle: SettleSettings,

    #[serde(default = "default_slot")]
    pub default_slot: u8,

    /// File name of the known-device cache, next to settings.json
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            transfer: TransferSettings::default(),
            settle: SettleSettings::default(),
            default_slot: default_slot(),
            cache_file: default_cache_file(),
        }
    }
}

fn default_slot() -> u8 {
    2
}
fn default_cache_file() -> String {
    "known_furbies.json".to_string()
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    /// Load from the per-user config directory
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::open(settings_path))
    }

    /// Load from an explicit path, falling back to defaults
    pub fn open(settings_path: impl Into<PathBuf>) -> Self {
        let settings_path = settings_path.into();
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("FluffConnect");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Where the known-device cache lives
    pub fn cache_path(&self) -> PathBuf {
        match self.settings_path.parent() {
            Some(dir) => dir.join(&self.settings.cache_file),
            None => PathBuf::from(&self.settings.cache_file),
        }
    }

    pub fn update_transfer(&mut self, transfer: TransferSettings) -> anyhow::Result<()> {
        self.settings.transfer = transfer;
        self.save()
    }
}
