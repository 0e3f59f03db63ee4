// src/config.rs

//! Defines the configuration structures for the frame pump.
//!
//! The whole tree can be deserialized from a JSON file. Every struct carries
//! `#[serde(default)]`, so a file only needs the keys it wants to change.
//! Values given on the command line are applied on top of the loaded file
//! (see `main.rs`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Port used for OPC targets that don't name one.
pub const DEFAULT_OPC_PORT: u16 = 7890;

// --- Top-Level Configuration Structure ---

/// Complete configuration for one run of the pump.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Layout file and destination.
    pub output: OutputConfig,
    /// Frame rate and run budget.
    pub timing: TimingConfig,
    /// OPC client connection policy.
    pub network: NetworkConfig,
    /// SPI strand settings.
    pub hardware: HardwareConfig,
}

impl Config {
    /// Loads a configuration file, or returns the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        log::info!("Configuration loaded from {}", path.display());
        Ok(config)
    }
}

// --- Output Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Path of the layout file listing pixel coordinates.
    pub layout_path: PathBuf,
    /// `host[:port]` of an OPC server, or `SPI` for the hardware strand.
    pub target: String,
    /// Name of the pattern to run.
    pub pattern: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            layout_path: PathBuf::from("layouts/strip-32.json"),
            target: format!("127.0.0.1:{}", DEFAULT_OPC_PORT),
            pattern: "rainbow".to_string(),
        }
    }
}

// --- Timing Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    /// Target frames per second. 0 disables pacing.
    pub fps: f64,
    /// Seconds to run. 0 runs forever, negative runs the generator alone
    /// (benchmark mode) for that many seconds.
    pub run_seconds: f64,
    /// Interval between throughput log lines, in milliseconds.
    pub report_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            fps: 40.0,
            run_seconds: 0.0,
            report_interval_ms: 1000,
        }
    }
}

// --- Network Configuration ---

/// Reconnection policy for the OPC client.
///
/// The defaults reproduce the classic behavior: one dial per disconnected
/// frame, then a one second quiet period during which frames are dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Port appended to targets without one.
    pub default_port: u16,
    /// Dial attempts made for a single frame before giving up.
    pub connect_attempts: u32,
    /// Pause between attempts within one frame, in milliseconds.
    pub attempt_backoff_ms: u64,
    /// Quiet period after a failed dial before dialing again, in milliseconds.
    pub retry_interval_ms: u64,
    /// Upper bound on a single TCP connect, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Upper bound on a single socket write, in milliseconds.
    pub write_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            default_port: DEFAULT_OPC_PORT,
            connect_attempts: 1,
            attempt_backoff_ms: 1,
            retry_interval_ms: 1000,
            connect_timeout_ms: 500,
            write_timeout_ms: 500,
        }
    }
}

impl NetworkConfig {
    pub fn attempt_backoff(&self) -> Duration {
        Duration::from_millis(self.attempt_backoff_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

// --- Hardware Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HardwareConfig {
    /// SPI device the LED strand hangs off.
    pub device_path: PathBuf,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        HardwareConfig {
            device_path: PathBuf::from("/dev/spidev1.0"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_fill_missing_keys_with_defaults() {
        let text = r#"{ "timing": { "fps": 60 }, "network": { "connect_attempts": 3 } }"#;
        let config: Config = serde_json::from_str(text).unwrap();

        assert_eq!(config.timing.fps, 60.0);
        assert_eq!(config.timing.run_seconds, 0.0);
        assert_eq!(config.network.connect_attempts, 3);
        assert_eq!(config.network.retry_interval(), Duration::from_secs(1));
        assert_eq!(config.output, OutputConfig::default());
        assert_eq!(config.hardware.device_path, PathBuf::from("/dev/spidev1.0"));
    }

    #[test]
    fn it_should_return_defaults_without_a_config_file() {
        let config = Config::load(None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.output.target, "127.0.0.1:7890");
    }

    #[test]
    fn it_should_report_a_missing_config_file() {
        let err = Config::load(Some(Path::new("/nonexistent/pixel-pump.json"))).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config file"));
    }
}
