//! Configuration for the surface-bind binary
//!
//! Handles loading and parsing of the YAML configuration file. Only the
//! `preferences` section is reloaded while running.

pub mod watcher;

use crate::gesture::GestureTiming;
use crate::prefs::PreferenceValues;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

pub use watcher::{PreferenceUpdate, PreferenceWatcher};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub midi: MidiConfig,
    #[serde(default)]
    pub surface: SurfaceConfig,
    #[serde(default)]
    pub timing: GestureTiming,
    /// Values for settings declared by the layout, keyed by setting name
    #[serde(default)]
    pub preferences: PreferenceValues,
}

/// MIDI port configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Case-insensitive substring of the input port name
    pub input_port: String,
    pub output_port: String,
}

/// Hardware layout parameters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SurfaceConfig {
    /// MIDI channel (0-15) the surface sends and listens on
    #[serde(default = "default_channel")]
    pub channel: u8,
    /// Interval between feedback flushes
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_channel() -> u8 {
    5
}

fn default_flush_interval_ms() -> u64 {
    20
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path))?;

        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.midi.input_port.is_empty() {
            anyhow::bail!("MIDI input_port cannot be empty");
        }
        if self.midi.output_port.is_empty() {
            anyhow::bail!("MIDI output_port cannot be empty");
        }

        if self.surface.channel > 15 {
            anyhow::bail!("surface.channel must be 0-15, got {}", self.surface.channel);
        }
        if self.surface.flush_interval_ms == 0 {
            anyhow::bail!("surface.flush_interval_ms must be positive");
        }

        if self.timing.long_press_ms == 0 || self.timing.double_click_ms == 0 {
            anyhow::bail!("gesture thresholds must be positive");
        }
        if self.timing.double_click_ms >= self.timing.long_press_ms {
            anyhow::bail!(
                "timing.double_click_ms ({}) must be shorter than timing.long_press_ms ({})",
                self.timing.double_click_ms,
                self.timing.long_press_ms
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::PreferenceValue;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_yaml(
            r#"
midi:
  input_port: "DC-1"
  output_port: "DC-1"
"#,
        )
        .unwrap();

        assert_eq!(config.surface.channel, 5);
        assert_eq!(config.surface.flush_interval_ms, 20);
        assert_eq!(config.timing, GestureTiming::default());
        assert!(config.preferences.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = AppConfig::from_yaml(
            r#"
midi:
  input_port: "in"
  output_port: "out"
surface:
  channel: 2
timing:
  long_press_ms: 800
preferences:
  send_bank_msb: true
  program_change_channel: 4
"#,
        )
        .unwrap();

        assert_eq!(config.surface.channel, 2);
        assert_eq!(config.timing.long_press_ms, 800);
        assert_eq!(config.timing.double_click_ms, 350);
        assert_eq!(
            config.preferences["send_bank_msb"],
            PreferenceValue::Bool(true)
        );
    }

    #[test]
    fn test_validation_errors() {
        let err = AppConfig::from_yaml(
            r#"
midi:
  input_port: ""
  output_port: "out"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("input_port"));

        let err = AppConfig::from_yaml(
            r#"
midi:
  input_port: "in"
  output_port: "out"
timing:
  long_press_ms: 300
  double_click_ms: 400
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("double_click_ms"));
    }
}
