use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use waved_services::{DEFAULT_BLOCK_SIZE, SessionConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct AppConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub document: DocumentConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AudioConfig {
    /// Index into the host list, default host when unset
    pub host: Option<usize>,
    /// Index into the host's output devices, default device when unset
    pub device: Option<usize>,
    pub block_size: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            host: None,
            device: None,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Format of new documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct DocumentConfig {
    pub channels: u16,
    pub sample_rate: u32,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 44100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct HistoryConfig {
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct PathsConfig {
    pub last_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            channels: self.document.channels,
            sample_rate: self.document.sample_rate,
            block_size: self.audio.block_size,
            history_depth: self.history.max_depth,
        }
    }
}

pub(crate) fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("waved")
        .join("config.toml")
}

pub(crate) fn load_config() -> AppConfig {
    load_from(&config_path())
}

/// Missing file means defaults; a file that doesn't parse is reported and
/// ignored
pub(crate) fn load_from(path: &Path) -> AppConfig {
    let Ok(text) = std::fs::read_to_string(path) else {
        return AppConfig::default();
    };
    toml::from_str(&text).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Ignoring invalid config file");
        AppConfig::default()
    })
}

pub(crate) fn save_config(config: &AppConfig) -> anyhow::Result<()> {
    save_to(&config_path(), config)
}

pub(crate) fn save_to(path: &Path, config: &AppConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(())
}
