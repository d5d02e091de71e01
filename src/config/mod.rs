//! Configuration for the acquisition pipeline
//!
//! Loaded from TOML; every section has sensible defaults so a minimal file
//! (or none at all, via `Config::default`) yields a runnable emulated
//! session.
//!
//! # Example
//! ```ignore
//! let config = Config::load("config.toml")?;
//! let session = &config.acquisition;
//! ```

use crate::acquisition::DrainPolicy;
use crate::decoder::RecordMode;
use crate::device::{EmulatorConfig, READ_FIFO_MAX};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub acquisition: AcquisitionConfig,
    pub streams: Vec<StreamFileConfig>,
    pub emulator: EmulatorTuning,
}

/// Session-wide acquisition settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Record encoding, fixed for the whole session
    pub mode: RecordMode,
    /// Requested acquisition duration in milliseconds
    pub duration_ms: u64,
    /// Records requested per FIFO read
    pub read_max: usize,
    /// Extra empty-poll rounds before conceding end of stream
    pub drain_rounds: u32,
    /// Whether the drain retry counter resets on a non-empty batch
    pub drain_policy: DrainPolicy,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            mode: RecordMode::T2,
            duration_ms: 1000,
            read_max: READ_FIFO_MAX,
            drain_rounds: crate::acquisition::DRAIN_ROUNDS,
            drain_policy: DrainPolicy::Fixed,
        }
    }
}

/// Per-stream settings and output destinations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamFileConfig {
    pub id: u32,
    /// Base resolution in picoseconds
    pub resolution_ps: f64,
    /// Sync period in seconds (T3 only)
    pub sync_period_s: f64,
    /// Number of regular input channels
    pub channels: u8,
    /// Text event log path (empty disables the sink)
    pub text_output: String,
    /// Raw record passthrough path (empty disables the sink)
    pub raw_output: String,
    /// Histogram table path (empty disables the sink; T3 only)
    pub histogram_output: String,
}

impl Default for StreamFileConfig {
    fn default() -> Self {
        Self {
            id: 0,
            resolution_ps: 80.0,
            sync_period_s: 1.25e-8,
            channels: 4,
            text_output: "stream0.out".to_string(),
            raw_output: String::new(),
            histogram_output: String::new(),
        }
    }
}

/// Emulator tuning shared by all emulated streams
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmulatorTuning {
    pub mean_interval: f64,
    pub marker_probability: f64,
    pub dtime_mean: f64,
    pub records_per_batch: usize,
    pub residual_records: usize,
    pub seed: Option<u64>,
}

impl Default for EmulatorTuning {
    fn default() -> Self {
        let d = EmulatorConfig::default();
        Self {
            mean_interval: d.mean_interval,
            marker_probability: d.marker_probability,
            dtime_mean: d.dtime_mean,
            records_per_batch: d.records_per_batch,
            residual_records: d.residual_records,
            seed: d.seed,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.acquisition.read_max == 0 || self.acquisition.read_max > READ_FIFO_MAX {
            return Err(ConfigError::Invalid(format!(
                "read_max must be 1..={}",
                READ_FIFO_MAX
            )));
        }
        for stream in &self.streams {
            if stream.resolution_ps <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "stream {}: resolution_ps must be positive",
                    stream.id
                )));
            }
            if self.acquisition.mode == RecordMode::T3 && stream.sync_period_s <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "stream {}: sync_period_s must be positive in T3 mode",
                    stream.id
                )));
            }
            if !stream.histogram_output.is_empty() && self.acquisition.mode != RecordMode::T3 {
                return Err(ConfigError::Invalid(format!(
                    "stream {}: histogramming requires T3 mode",
                    stream.id
                )));
            }
        }
        Ok(())
    }

    /// Emulator device configuration for one stream
    pub fn emulator_config(&self, stream: &StreamFileConfig) -> EmulatorConfig {
        let unit_ps = match self.acquisition.mode {
            RecordMode::T2 => stream.resolution_ps,
            RecordMode::T3 => stream.sync_period_s * 1e12,
        };
        EmulatorConfig {
            mode: self.acquisition.mode,
            channels: stream.channels,
            unit_ps,
            mean_interval: self.emulator.mean_interval,
            marker_probability: self.emulator.marker_probability,
            dtime_mean: self.emulator.dtime_mean,
            records_per_batch: self.emulator.records_per_batch,
            residual_records: self.emulator.residual_records,
            overrun_after: None,
            // Distinct seed per stream so streams do not emit identical data
            seed: self.emulator.seed.map(|s| s.wrapping_add(stream.id as u64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.acquisition.mode, RecordMode::T2);
        assert_eq!(config.acquisition.duration_ms, 1000);
        assert_eq!(config.acquisition.drain_rounds, 6);
        assert_eq!(config.acquisition.drain_policy, DrainPolicy::Fixed);
        assert!(config.streams.is_empty());
    }

    #[test]
    fn test_full_config() {
        let toml = r#"
            [acquisition]
            mode = "T3"
            duration_ms = 500
            drain_policy = "reset-on-data"

            [[streams]]
            id = 0
            resolution_ps = 250.0
            sync_period_s = 2.5e-8
            channels = 8
            text_output = "s0.out"
            histogram_output = "s0.hist"

            [[streams]]
            id = 1
            text_output = "s1.out"

            [emulator]
            mean_interval = 123.0
            seed = 99
        "#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.acquisition.mode, RecordMode::T3);
        assert_eq!(config.acquisition.drain_policy, DrainPolicy::ResetOnData);
        assert_eq!(config.streams.len(), 2);
        assert_eq!(config.streams[0].channels, 8);
        assert_eq!(config.emulator.seed, Some(99));

        let em = config.emulator_config(&config.streams[0]);
        assert_eq!(em.mode, RecordMode::T3);
        assert_eq!(em.mean_interval, 123.0);
        // T3 unit is the sync period, expressed in picoseconds
        assert!((em.unit_ps - 25_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_distinct_stream_seeds() {
        let toml = r#"
            [[streams]]
            id = 0
            [[streams]]
            id = 1
            [emulator]
            seed = 10
        "#;
        let config = Config::from_toml(toml).unwrap();
        let a = config.emulator_config(&config.streams[0]);
        let b = config.emulator_config(&config.streams[1]);
        assert_ne!(a.seed, b.seed);
    }

    #[test]
    fn test_histogram_rejected_in_t2() {
        let toml = r#"
            [acquisition]
            mode = "T2"
            [[streams]]
            id = 0
            histogram_output = "h.txt"
        "#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_read_max_bounds() {
        let toml = r#"
            [acquisition]
            read_max = 9999999
        "#;
        assert!(Config::from_toml(toml).is_err());
    }
}
