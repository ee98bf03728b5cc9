//! Application configuration.
//!
//! Read once at startup from `<config dir>/webcam-cropper/config.json`, or
//! from the file named by `WEBCAM_CROPPER_CONFIG`. Every field is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::export::ExportFormat;

/// Directory name under the platform config dir.
pub const APP_DIR: &str = "webcam-cropper";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "WEBCAM_CROPPER_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Width requested from the camera; height follows at 16:9.
    pub ideal_width: u32,
    /// Encoding used for saved frames.
    pub export_format: ExportFormat,
    /// Where the save dialog opens. Defaults to the Pictures folder.
    pub export_dir: Option<PathBuf>,
    /// File name prefix for saved frames.
    pub file_prefix: String,
    /// Settings file. Defaults to `settings.json` next to the config.
    pub settings_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ideal_width: 1920,
            export_format: ExportFormat::Jpeg,
            export_dir: None,
            file_prefix: "webcam".to_string(),
            settings_path: None,
        }
    }
}

impl AppConfig {
    pub fn app_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::app_dir().join("config.json"))
    }

    /// Parses `path`. `Ok(None)` when the file does not exist.
    pub fn from_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Loads the config, falling back to defaults on any problem.
    pub fn load() -> Self {
        let path = Self::default_path();
        match Self::from_file(&path) {
            Ok(Some(config)) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Ok(None) => Self::default(),
            Err(e) => {
                log::warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(|| Self::app_dir().join("settings.json"))
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export_dir
            .clone()
            .or_else(dirs::picture_dir)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
