//! Per-camera settings persistence.
//!
//! Everything lives in a single JSON file. Records are found by the device's
//! stable key first and by its label second, so settings survive a backend
//! changing how it identifies a camera.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::camera::CameraInfo;
use crate::crop::CropBox;
use crate::geometry::VideoSize;
use crate::render::Flip;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to create settings directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Preferences remembered for one camera.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraSettings {
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub video_size: VideoSize,
    pub crop_box: Option<CropBox>,
    pub show_crop: bool,
}

impl CameraSettings {
    pub fn flip(&self) -> Flip {
        Flip::new(self.flip_horizontal, self.flip_vertical)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceRecord {
    key: String,
    label: String,
    #[serde(default)]
    settings: CameraSettings,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SettingsFile {
    preferred_device: Option<String>,
    devices: Vec<DeviceRecord>,
}

pub struct SettingsStore {
    path: Option<PathBuf>,
    file: SettingsFile,
    dirty: bool,
}

impl SettingsStore {
    /// Store that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            file: SettingsFile::default(),
            dirty: false,
        }
    }

    /// Reads `path`. A missing or unreadable file starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable settings {}: {}", path.display(), e);
                SettingsFile::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SettingsFile::default(),
            Err(e) => {
                log::warn!("Failed to read settings {}: {}", path.display(), e);
                SettingsFile::default()
            }
        };
        log::info!(
            "Loaded settings for {} camera(s) from {}",
            file.devices.len(),
            path.display()
        );
        Self {
            path: Some(path),
            file,
            dirty: false,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn find(&self, device: &CameraInfo) -> Option<usize> {
        let records = &self.file.devices;
        records
            .iter()
            .position(|r| r.key == device.key)
            .or_else(|| records.iter().position(|r| r.label == device.label))
    }

    /// Settings for `device`, defaults if it has never been seen.
    pub fn settings(&self, device: &CameraInfo) -> CameraSettings {
        self.find(device)
            .map(|idx| self.file.devices[idx].settings.clone())
            .unwrap_or_default()
    }

    /// Edits the settings of `device`. Returns whether anything changed.
    pub fn update(&mut self, device: &CameraInfo, edit: impl FnOnce(&mut CameraSettings)) -> bool {
        let idx = match self.find(device) {
            Some(idx) => idx,
            None => {
                self.file.devices.push(DeviceRecord {
                    key: device.key.clone(),
                    label: device.label.clone(),
                    settings: CameraSettings::default(),
                });
                self.file.devices.len() - 1
            }
        };

        let record = &mut self.file.devices[idx];
        if record.key != device.key || record.label != device.label {
            log::info!("Re-keying settings of '{}' to '{}'", record.label, device.key);
            record.key = device.key.clone();
            record.label = device.label.clone();
            self.dirty = true;
        }

        let before = record.settings.clone();
        edit(&mut record.settings);
        let changed = record.settings != before;
        self.dirty |= changed;
        changed
    }

    /// Label of the camera picked last time.
    pub fn preferred_device(&self) -> Option<&str> {
        self.file.preferred_device.as_deref()
    }

    pub fn set_preferred_device(&mut self, label: &str) {
        if self.file.preferred_device.as_deref() != Some(label) {
            self.file.preferred_device = Some(label.to_string());
            self.dirty = true;
        }
    }

    /// Writes pending changes to disk.
    pub fn flush(&mut self) -> Result<(), SettingsError> {
        if !self.dirty {
            return Ok(());
        }
        let Some(path) = &self.path else {
            self.dirty = false;
            return Ok(());
        };

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| SettingsError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(&self.file)?;
        std::fs::write(path, json).map_err(|source| SettingsError::Write {
            path: path.clone(),
            source,
        })?;

        self.dirty = false;
        log::debug!("Saved settings to {}", path.display());
        Ok(())
    }
}
