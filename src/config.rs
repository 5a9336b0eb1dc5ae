// src/config.rs - Application settings loaded from TOML
use crate::cpr::CprConfig;
use crate::tracking::TrackerConfig;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const DEFAULT_CONFIG_FILE: &str = "squat_tracker.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub camera_index: u32,
    /// Command line of the pose helper process. Empty means simulated poses.
    pub pose_helper: Vec<String>,
    pub output_directory: PathBuf,
    /// Video file frames wider than this are scaled down.
    pub max_frame_width: u32,
    pub tracker: TrackerConfig,
    pub cpr: CprConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            pose_helper: Vec::new(),
            output_directory: default_output_directory(),
            max_frame_width: 1280,
            tracker: TrackerConfig::default(),
            cpr: CprConfig::default(),
        }
    }
}

fn default_output_directory() -> PathBuf {
    UserDirs::new()
        .and_then(|dirs| dirs.document_dir().map(|d| d.join("SquatTracker")))
        .unwrap_or_else(|| PathBuf::from("output"))
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// An explicit path must exist. Without one, `squat_tracker.toml` in the
    /// working directory is used when present, defaults otherwise.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            info!("Loading config from {}", path.display());
            return Self::load(path);
        }

        let fallback = Path::new(DEFAULT_CONFIG_FILE);
        if fallback.exists() {
            info!("Loading config from {}", fallback.display());
            Self::load(fallback)
        } else {
            Ok(Self::default())
        }
    }
}
