//! Configuration module for the vector segment codec.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `KNN_` and use double underscores
//! to separate nested levels:
//! - `KNN_CODEC__FORMAT_VERSION=1` sets `codec.format_version`
//! - `KNN_MODELS__MODEL_DIR=/var/lib/knn/models` sets `models.model_dir`
//! - `KNN_LOGGING__LEVEL=debug` sets `logging.level`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::codec::FormatVersion;
use crate::error::{CodecError, CodecResult};

/// Directory searched for in the working directory and its ancestors.
const CONFIG_DIR: &str = ".knn";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Segment format settings
    #[serde(default)]
    pub codec: CodecSettings,

    /// Model template store settings
    #[serde(default)]
    pub models: ModelSettings,

    /// Logging settings for the CLI
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CodecSettings {
    /// On-disk format written by new segments
    #[serde(default = "default_format_version")]
    pub format_version: u32,

    /// File extension for segment vector files
    #[serde(default = "default_segment_extension")]
    pub segment_extension: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ModelSettings {
    /// Directory holding persisted model templates
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Keep loaded templates in memory
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingSettings {
    /// One of: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_format_version() -> u32 {
    FormatVersion::CURRENT.get()
}
fn default_segment_extension() -> String {
    "knnv".to_string()
}
fn default_model_dir() -> PathBuf {
    PathBuf::from(".knn/models")
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            codec: CodecSettings::default(),
            models: ModelSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            format_version: default_format_version(),
            segment_extension: default_segment_extension(),
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            cache_enabled: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl CodecSettings {
    /// The configured format, rejecting versions this build cannot write.
    pub fn format_version(&self) -> CodecResult<FormatVersion> {
        FormatVersion::from_u32(self.format_version).ok_or_else(|| CodecError::InvalidConfig {
            reason: format!("unsupported codec.format_version {}", self.format_version),
        })
    }

    /// File name for a segment's vector file.
    pub fn segment_file_name(&self, segment_name: &str) -> String {
        format!("{segment_name}.{}", self.segment_extension)
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels; single underscores stay in field names
            .merge(Env::prefixed("KNN_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for a .knn directory
    /// from the current directory up to the root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join("settings.toml"))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }
}
