use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Floor for the input buffer size and engine max process size, in frames.
pub const INITIAL_MAX_PROCESS_SIZE: usize = 4096;

/// Settings for one stretch stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSettings {
    /// Log per-chunk diagnostics at info level instead of debug.
    pub verbose: bool,
    /// Output duration / input duration (2.0 = half speed).
    pub time_ratio: f64,
    /// Pitch multiplier (2.0 = up one octave).
    pub pitch_scale: f64,
    /// Minimum input buffer capacity in frames.
    pub initial_max_process_size: usize,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            verbose: false,
            time_ratio: 1.0,
            pitch_scale: 1.0,
            initial_max_process_size: INITIAL_MAX_PROCESS_SIZE,
        }
    }
}

/// Available configuration options with validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSchema {
    pub verbose: ConfigOption<bool>,
    pub time_ratio: ConfigOption<f64>,
    pub pitch_scale: ConfigOption<f64>,
    pub initial_max_process_size: ConfigOption<usize>,
}

/// Configuration option with validation and available choices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigOption<T> {
    pub default: T,
    pub valid_range: Option<(T, T)>,
    pub description: String,
    pub live: bool,
}

/// Persisted configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    pub settings: StageSettings,
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to write config file: {0}")]
    WriteError(String),

    #[error("Failed to parse config file: {0}")]
    ParseError(String),

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),

    #[error("Config validation errors: {}", .0.join(", "))]
    ValidationError(Vec<String>),
}

impl StageSettings {
    /// Load settings from a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config_file: ConfigFile =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if config_file.version != env!("CARGO_PKG_VERSION") {
            log::warn!(
                "Config file version {} doesn't match library version {}",
                config_file.version,
                env!("CARGO_PKG_VERSION")
            );
        }

        config_file.settings.validate()?;
        Ok(config_file.settings)
    }

    /// Save settings as pretty JSON, creating parent directories as needed.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if parent != Path::new("") && parent != Path::new(".") {
                fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
            }
        }

        let config_file = ConfigFile {
            version: env!("CARGO_PKG_VERSION").to_string(),
            settings: self.clone(),
        };

        let content = serde_json::to_string_pretty(&config_file)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content).map_err(|e| ConfigError::WriteError(e.to_string()))
    }

    /// Check every field against [`StageSettings::schema`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let schema = Self::schema();

        for (name, value, option) in [
            ("time_ratio", self.time_ratio, &schema.time_ratio),
            ("pitch_scale", self.pitch_scale, &schema.pitch_scale),
        ] {
            if !value.is_finite() {
                errors.push(format!("{} must be finite", name));
            } else if let Some((min, max)) = option.valid_range {
                if value < min || value > max {
                    errors.push(format!("{} must be between {} and {}", name, min, max));
                }
            }
        }

        if let Some((min, max)) = schema.initial_max_process_size.valid_range {
            if self.initial_max_process_size < min || self.initial_max_process_size > max {
                errors.push(format!(
                    "initial_max_process_size must be between {} and {}",
                    min, max
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError(errors))
        }
    }

    /// Get configuration schema with available options
    pub fn schema() -> ConfigSchema {
        ConfigSchema {
            verbose: ConfigOption {
                default: false,
                valid_range: None,
                description: "Log per-chunk diagnostics at info level".to_string(),
                live: true,
            },
            time_ratio: ConfigOption {
                default: 1.0,
                valid_range: Some((0.05, 20.0)),
                description: "Output duration divided by input duration".to_string(),
                live: true,
            },
            pitch_scale: ConfigOption {
                default: 1.0,
                valid_range: Some((0.05, 20.0)),
                description: "Pitch multiplier applied to the stretched output".to_string(),
                live: true,
            },
            initial_max_process_size: ConfigOption {
                default: INITIAL_MAX_PROCESS_SIZE,
                valid_range: Some((1, 1 << 20)),
                description: "Minimum input buffer capacity in frames".to_string(),
                live: false,
            },
        }
    }
}
