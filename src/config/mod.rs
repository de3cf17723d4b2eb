//! Configuration management for beamcast-core.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Capture configuration
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Audio configuration
    #[serde(default)]
    pub audio: AudioConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Target capture rate in frames per second
    pub fps: u32,

    /// Composite the cursor into produced frames
    pub include_cursor: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            include_cursor: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Enable audio capture
    pub enabled: bool,

    /// Sample rate (Hz)
    pub sample_rate: u32,

    /// Channel count
    pub channels: u8,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.fps == 0 {
            return Err(ConfigError::Invalid("capture fps must be non-zero".into()));
        }
        if self.audio.sample_rate == 0 {
            return Err(ConfigError::Invalid(
                "audio sample rate must be non-zero".into(),
            ));
        }
        if self.audio.channels == 0 || self.audio.channels > 2 {
            return Err(ConfigError::Invalid(
                "audio channels must be 1 or 2".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(Path::new("/nonexistent/beamcast-core.toml")).unwrap();
        assert_eq!(config.capture.fps, 60);
        assert!(config.capture.include_cursor);
        assert!(!config.audio.enabled);
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [capture]
            fps = 30
            include_cursor = false

            [audio]
            enabled = true
            sample_rate = 44100
            channels = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.capture.fps, 30);
        assert!(!config.capture.include_cursor);
        assert!(config.audio.enabled);
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn validate_rejects_zero_fps() {
        let mut config = Config::default();
        config.capture.fps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_channel_count() {
        let mut config = Config::default();
        config.audio.channels = 6;
        assert!(config.validate().is_err());
    }
}
