//! Persistent record of Furbies seen before, so a reconnect can skip the scan.
//!
//! Every mutation is written straight back to the JSON file. A missing or
//! unreadable file means an empty cache; write failures are logged and the
//! in-memory state stays authoritative.

use crate::domain::models::{unix_timestamp, KnownDevice, KnownDevices};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Fields to merge into a cached entry. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceUpdate {
    pub device_name: Option<String>,
    pub name: Option<String>,
    pub name_id: Option<u8>,
    pub firmware_revision: Option<String>,
}

pub struct DeviceCache {
    path: PathBuf,
    known: KnownDevices,
}

impl DeviceCache {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let known = Self::load(&path);
        Self { path, known }
    }

    fn load(path: &Path) -> KnownDevices {
        if !path.exists() {
            info!("Device cache not found, starting empty: {}", path.display());
            return KnownDevices::default();
        }

        match Self::read(path) {
            Ok(known) => {
                info!("Loaded {} known Furbies from cache", known.devices.len());
                known
            }
            Err(e) => {
                error!("Failed to load device cache {}: {}", path.display(), e);
                warn!("Starting with empty device cache");
                KnownDevices::default()
            }
        }
    }

    fn read(path: &Path) -> anyhow::Result<KnownDevices> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self) {
        if let Err(e) = self.try_save() {
            error!("Failed to save device cache {}: {}", self.path.display(), e);
        }
    }

    fn try_save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.known)?;
        fs::write(&self.path, json)?;
        debug!("Saved device cache with {} entries", self.known.devices.len());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.known.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.devices.is_empty()
    }

    /// Record a sighting, creating the entry if needed. Always bumps `last_seen`.
    pub fn add_or_update(&mut self, address: &str, update: DeviceUpdate) -> KnownDevice {
        let seen = unix_timestamp();
        let entry = self
            .known
            .devices
            .entry(address.to_string())
            .or_insert_with(|| {
                info!("Adding new Furby to cache: {}", address);
                KnownDevice::new(address, seen)
            });

        if let Some(device_name) = update.device_name {
            entry.device_name = Some(device_name);
        }
        if let Some(name) = update.name {
            entry.name = Some(name);
        }
        if let Some(name_id) = update.name_id {
            entry.name_id = Some(name_id);
        }
        if let Some(firmware_revision) = update.firmware_revision {
            entry.firmware_revision = Some(firmware_revision);
        }
        entry.last_seen = seen;

        let device = entry.clone();
        self.save();
        device
    }

    /// Store a complete record as-is, replacing any entry with the same address
    pub fn insert(&mut self, device: KnownDevice) {
        self.known.devices.insert(device.address.clone(), device);
        self.save();
    }

    pub fn get(&self, address: &str) -> Option<&KnownDevice> {
        self.known.devices.get(address)
    }

    /// All entries, most recently seen first
    pub fn get_all(&self) -> Vec<&KnownDevice> {
        let mut devices: Vec<&KnownDevice> = self.known.devices.values().collect();
        devices.sort_by(|a, b| b.last_seen.total_cmp(&a.last_seen));
        devices
    }

    pub fn remove(&mut self, address: &str) -> bool {
        if self.known.devices.remove(address).is_some() {
            self.save();
            info!("Removed Furby from cache: {}", address);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        let count = self.known.devices.len();
        self.known.devices.clear();
        self.save();
        info!("Cleared device cache ({} entries removed)", count);
    }

    pub fn addresses(&self) -> Vec<String> {
        self.known.devices.keys().cloned().collect()
    }

    /// Returns false if the address is not cached
    pub fn update_name(&mut self, address: &str, name: &str, name_id: u8) -> bool {
        let Some(entry) = self.known.devices.get_mut(address) else {
            warn!("Cannot update name for unknown Furby: {}", address);
            return false;
        };
        entry.name = Some(name.to_string());
        entry.name_id = Some(name_id);
        entry.last_seen = unix_timestamp();
        self.save();
        info!("Updated name for {}: {} (ID {})", address, name, name_id);
        true
    }

    pub fn most_recent(&self) -> Option<&KnownDevice> {
        self.get_all().into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "AA:BB:CC:DD:EE:FF";
    const B: &str = "11:22:33:44:55:66";

    fn named(device_name: &str) -> DeviceUpdate {
        DeviceUpdate {
            device_name: Some(device_name.to_string()),
            ..DeviceUpdate::default()
        }
    }

    #[test]
    fn test_new_cache_is_empty_and_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = DeviceCache::open(&path);
        assert!(cache.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_update_merges_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = DeviceCache::open(dir.path().join("cache.json"));

        let first = cache.add_or_update(A, named("Furby"));
        let second = cache.add_or_update(
            A,
            DeviceUpdate {
                name: Some("Ah-Bay".into()),
                name_id: Some(0),
                ..DeviceUpdate::default()
            },
        );

        assert_eq!(cache.len(), 1);
        assert_eq!(second.device_name.as_deref(), Some("Furby"));
        assert_eq!(second.name.as_deref(), Some("Ah-Bay"));
        assert_eq!(second.name_id, Some(0));
        assert!(second.last_seen >= first.last_seen);
    }

    #[test]
    fn test_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        {
            let mut cache = DeviceCache::open(&path);
            cache.add_or_update(
                B,
                DeviceUpdate {
                    device_name: Some("Furby".into()),
                    firmware_revision: Some("1.2.3".into()),
                    ..DeviceUpdate::default()
                },
            );
        }

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["furbies"][B]["firmware_revision"], "1.2.3");

        let cache = DeviceCache::open(&path);
        assert_eq!(cache.get(B).and_then(|d| d.device_name.as_deref()), Some("Furby"));
        assert!(cache.get(A).is_none());
    }

    #[test]
    fn test_get_all_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = DeviceCache::open(dir.path().join("cache.json"));
        cache.insert(KnownDevice::new(A, 100.0));
        cache.insert(KnownDevice::new(B, 300.0));
        cache.insert(KnownDevice::new("FF:EE:DD:CC:BB:AA", 200.0));

        let order: Vec<&str> = cache.get_all().iter().map(|d| d.address.as_str()).collect();
        assert_eq!(order, vec![B, "FF:EE:DD:CC:BB:AA", A]);
        assert_eq!(cache.most_recent().map(|d| d.address.as_str()), Some(B));
        assert_eq!(cache.addresses().len(), 3);
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = DeviceCache::open(dir.path().join("cache.json"));
        cache.add_or_update(A, named("Furby1"));
        cache.add_or_update(B, named("Furby2"));

        assert!(cache.remove(A));
        assert!(!cache.remove(A));
        assert_eq!(cache.addresses(), vec![B.to_string()]);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.most_recent().is_none());
    }

    #[test]
    fn test_update_name_requires_known_device() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = DeviceCache::open(dir.path().join("cache.json"));
        assert!(!cache.update_name(A, "Doo-Dah", 53));

        cache.insert(KnownDevice::new(A, 1.0));
        assert!(cache.update_name(A, "Doo-Dah", 53));
        let device = cache.get(A).unwrap();
        assert_eq!(device.name_id, Some(53));
        assert!(device.last_seen > 1.0);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ this is not valid json }").unwrap();
        assert!(DeviceCache::open(&path).is_empty());
    }
}
