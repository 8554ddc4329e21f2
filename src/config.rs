//! Configuration for scanlayer.
//!
//! Settings come from a TOML file, then environment overrides. Every field
//! has a default, so a missing file or a partial one is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::document::Thresholds;
use crate::ocr::{OcrConfig, DEFAULT_BINARIZE_CUTOFF, DEFAULT_CONFIDENCE_MIN_CHARS};
use crate::pipeline::default_workers;
use crate::services::ValidationConfig;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "scanlayer.toml";

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Page extraction and worker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Primary output at or below this many trimmed chars escalates.
    pub confidence_min_chars: usize,
    pub binarize_cutoff: u8,
    pub render_dpi: u32,
    /// Per-call engine timeout in seconds.
    pub engine_timeout_secs: u64,
    /// Worker pool size; unset means one per core.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    pub thresholds: Thresholds,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            confidence_min_chars: DEFAULT_CONFIDENCE_MIN_CHARS,
            binarize_cutoff: DEFAULT_BINARIZE_CUTOFF,
            render_dpi: 200,
            engine_timeout_secs: 60,
            workers: None,
            thresholds: Thresholds::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(default_workers).max(1)
    }
}

/// Engine selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub primary: String,
    pub secondary: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        let backend = OcrConfig::default();
        Self {
            primary: "tesseract".to_string(),
            secondary: default_secondary_backend().to_string(),
            language: backend.language,
            model_path: backend.model_path,
        }
    }
}

impl OcrSettings {
    /// Configuration handed to each backend constructor.
    pub fn backend_config(&self) -> OcrConfig {
        OcrConfig {
            language: self.language.clone(),
            model_path: self.model_path.clone(),
        }
    }
}

/// The pure-Rust engine when compiled in, Tesseract's sparse mode otherwise.
fn default_secondary_backend() -> &'static str {
    if cfg!(feature = "ocr-ocrs") {
        "ocrs"
    } else {
        "tesseract-sparse"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: dirs::data_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("scanlayer")
                .join("telemetry.jsonl"),
        }
    }
}

/// Application settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub extraction: ExtractionConfig,
    pub ocr: OcrSettings,
    pub validation: ValidationConfig,
    pub telemetry: TelemetryConfig,
    /// File the settings were read from, if any.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from `explicit` or the first discovered config file,
    /// then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match explicit {
            Some(path) => Self::load_from_path(path)?,
            None => match discover_config() {
                Some(path) => Self::load_from_path(&path)?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        settings.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Read a single TOML file with no overrides.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: Settings =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Loaded config from {}", path.display());
        settings.source_path = Some(path.to_path_buf());
        Ok(settings)
    }

    /// Apply `SCANLAYER_*` overrides read through `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(value) = get("SCANLAYER_WORKERS") {
            self.extraction.workers = Some(parse_number("SCANLAYER_WORKERS", &value)?);
        }
        if let Some(value) = get("SCANLAYER_ENGINE_TIMEOUT_SECS") {
            self.extraction.engine_timeout_secs =
                parse_number("SCANLAYER_ENGINE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get("SCANLAYER_PRIMARY_BACKEND") {
            self.ocr.primary = value;
        }
        if let Some(value) = get("SCANLAYER_SECONDARY_BACKEND") {
            self.ocr.secondary = value;
        }
        if let Some(value) = get("SCANLAYER_TELEMETRY_PATH") {
            self.telemetry.path = PathBuf::from(value);
        }
        Ok(())
    }

    /// Render the effective settings as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Candidate config files, in lookup order.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("scanlayer").join("config.toml"));
    }
    paths
}

fn discover_config() -> Option<PathBuf> {
    config_search_paths().into_iter().find(|p| p.is_file())
}
