//! Known-device store
//!
//! Devices and their pairing credentials persist across runs in
//! `~/.config/atvtui/devices.json`. Only the event loop mutates the store,
//! always in response to a completed operation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use chrono::Local;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{DeviceRecord, Service};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access device store: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device store is corrupt: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Device store at {} could not be read; refusing to overwrite it", .0.display())]
    ReadOnly(PathBuf),
}

/// Persisted configuration store for known devices
pub trait DeviceStore: Send {
    fn get_known_devices(&self) -> Vec<DeviceRecord>;

    fn get_device(&self, identifier: &str) -> Option<DeviceRecord> {
        self.get_known_devices()
            .into_iter()
            .find(|d| d.identifier == identifier)
    }

    fn save_device(&mut self, record: &DeviceRecord) -> Result<(), StoreError>;

    fn get_credentials(&self, identifier: &str, service: Service) -> Option<String> {
        self.get_device(identifier)
            .and_then(|d| d.credentials.get(&service).cloned())
    }

    /// Remove a device; returns whether it was known
    fn remove_device(&mut self, identifier: &str) -> Result<bool, StoreError>;
}

// =============================================================================
// File Store
// =============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    devices: BTreeMap<String, DeviceRecord>,
}

/// JSON-file backed device store
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    data: StoreFile,
    /// Set when an unreadable file is still in place
    read_only: bool,
}

impl FileStore {
    /// Default store path (~/.config/atvtui/devices.json)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("atvtui").join("devices.json"))
    }

    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No device store at {}, starting empty", path.display());
                StoreFile::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            data,
            read_only: false,
        })
    }

    /// Open the default store (see [`FileStore::open_or_recover`])
    pub fn open_default() -> Self {
        let path = Self::default_path().unwrap_or_else(|| PathBuf::from("devices.json"));
        Self::open_or_recover(path)
    }

    /// Open `path`, starting empty if it cannot be read.
    ///
    /// An unreadable file is moved aside to a timestamped `.bak` sibling
    /// first. If it cannot be moved the store stays read-only, so stored
    /// credentials are never overwritten with an empty list.
    pub fn open_or_recover(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::open(&path) {
            Ok(store) => store,
            Err(e) => {
                let backup = backup_path(&path);
                let read_only = match std::fs::rename(&path, &backup) {
                    Ok(()) => {
                        warn!(
                            "{}; moved it to {} and starting with an empty device list",
                            e,
                            backup.display()
                        );
                        false
                    }
                    Err(move_err) => {
                        warn!(
                            "{}; could not move it aside ({}), device changes will not be saved",
                            e, move_err
                        );
                        true
                    }
                };
                Self {
                    path,
                    data: StoreFile::default(),
                    read_only,
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Write to a sibling temp file, then rename it over the store
    fn flush(&self) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly(self.path.clone()));
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.data)?;
        let tmp = sibling(&self.path, "tmp");
        std::fs::write(&tmp, json)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            if let Err(cleanup) = std::fs::remove_file(&tmp) {
                debug!("Could not remove {}: {}", tmp.display(), cleanup);
            }
            return Err(e.into());
        }
        Ok(())
    }
}

/// `devices.json` -> `devices.json.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn backup_path(path: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    sibling(path, &format!("{}.bak", stamp))
}

impl DeviceStore for FileStore {
    fn get_known_devices(&self) -> Vec<DeviceRecord> {
        self.data.devices.values().cloned().collect()
    }

    fn get_device(&self, identifier: &str) -> Option<DeviceRecord> {
        self.data.devices.get(identifier).cloned()
    }

    fn save_device(&mut self, record: &DeviceRecord) -> Result<(), StoreError> {
        self.data
            .devices
            .insert(record.identifier.clone(), record.clone());
        self.flush()
    }

    fn remove_device(&mut self, identifier: &str) -> Result<bool, StoreError> {
        let removed = self.data.devices.remove(identifier).is_some();
        if removed {
            self.flush()?;
        }
        Ok(removed)
    }
}

// =============================================================================
// Memory Store
// =============================================================================

/// Non-persistent store (tests, `--no-store` runs)
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    devices: BTreeMap<String, DeviceRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceStore for MemoryStore {
    fn get_known_devices(&self) -> Vec<DeviceRecord> {
        self.devices.values().cloned().collect()
    }

    fn save_device(&mut self, record: &DeviceRecord) -> Result<(), StoreError> {
        self.devices
            .insert(record.identifier.clone(), record.clone());
        Ok(())
    }

    fn remove_device(&mut self, identifier: &str) -> Result<bool, StoreError> {
        Ok(self.devices.remove(identifier).is_some())
    }
}
