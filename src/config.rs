//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::adc::calibration::{Divider, DEFAULT_REFERENCE_VOLTAGE};
use crate::error::Result;
use crate::scheduler::period_from_rate;
use crate::telemetry::net::Credentials;
use crate::telemetry::TelemetrySettings;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub adc: AdcConfig,
    pub sampling: SamplingConfig,
    pub calibration: CalibrationConfig,
    pub display: DisplayConfig,
    pub storage: StorageConfig,
    pub telemetry: TelemetryConfig,
}

/// ADC bridge configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AdcConfig {
    #[serde(default = "default_adc_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_adc_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_channels")]
    pub channels: usize,
}

/// Sampling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SamplingConfig {
    #[serde(default = "default_rate_hz")]
    pub rate_hz: u32,

    #[serde(default = "default_history_seconds")]
    pub history_seconds: u32,

    #[serde(default = "default_status_interval_samples")]
    pub status_interval_samples: u64,
}

/// Front-end circuit constants
#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConfig {
    #[serde(default = "default_reference_voltage")]
    pub reference_voltage: f64,

    #[serde(default = "default_r_top_ohms")]
    pub r_top_ohms: f64,

    #[serde(default = "default_r_bottom_ohms")]
    pub r_bottom_ohms: f64,
}

/// Display configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    #[serde(default = "default_min_volts")]
    pub min_volts: f64,

    #[serde(default = "default_max_volts")]
    pub max_volts: f64,
}

/// Recording configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

/// Telemetry publishing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_broker")]
    pub broker: String,

    #[serde(default)]
    pub ssid: String,

    #[serde(default)]
    pub passphrase: String,

    #[serde(default = "default_device")]
    pub device: String,

    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default = "default_link_timeout_ms")]
    pub link_timeout_ms: u64,

    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    #[serde(default = "default_keepalive_ms")]
    pub keepalive_ms: u64,
}

// Default value functions
fn default_adc_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_adc_timeout_ms() -> u64 { 2 }
fn default_channels() -> usize { 2 }

fn default_rate_hz() -> u32 { 100 }
fn default_history_seconds() -> u32 { 20 }
fn default_status_interval_samples() -> u64 { 1000 }

fn default_reference_voltage() -> f64 { DEFAULT_REFERENCE_VOLTAGE }
fn default_r_top_ohms() -> f64 { 510_000.0 }
fn default_r_bottom_ohms() -> f64 { 100_000.0 }

fn default_min_volts() -> f64 { 0.0 }
fn default_max_volts() -> f64 { 12.0 }

fn default_storage_enabled() -> bool { true }
fn default_log_dir() -> String { "./recordings".to_string() }
fn default_file_prefix() -> String { "voltage".to_string() }

fn default_broker() -> String { "127.0.0.1:1883".to_string() }
fn default_device() -> String { "volt-monitor".to_string() }
fn default_topic() -> String { "sensors/voltage".to_string() }
fn default_link_timeout_ms() -> u64 { 3000 }
fn default_retry_interval_ms() -> u64 { 5000 }
fn default_keepalive_ms() -> u64 { 15000 }

fn invalid(message: impl std::fmt::Display) -> crate::error::MonitorError {
    crate::error::MonitorError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use volt_monitor::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Sample period derived from the sampling rate
    pub fn sample_period(&self) -> Duration {
        period_from_rate(self.sampling.rate_hz)
    }

    /// Samples kept per channel
    pub fn history_capacity(&self) -> usize {
        self.sampling.history_seconds as usize * self.sampling.rate_hz as usize
    }

    /// Front-end divider
    pub fn divider(&self) -> Divider {
        Divider::new(self.calibration.r_top_ohms, self.calibration.r_bottom_ohms)
    }

    /// Telemetry sink settings
    pub fn telemetry_settings(&self) -> TelemetrySettings {
        TelemetrySettings {
            credentials: Credentials {
                ssid: self.telemetry.ssid.clone(),
                passphrase: self.telemetry.passphrase.clone(),
            },
            device: self.telemetry.device.clone(),
            topic: self.telemetry.topic.clone(),
            link_timeout: Duration::from_millis(self.telemetry.link_timeout_ms),
            retry_interval: Duration::from_millis(self.telemetry.retry_interval_ms),
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        // ADC bridge
        if self.adc.port.is_empty() {
            return Err(invalid("adc port cannot be empty"));
        }

        if ![9600, 57600, 115200, 230400, 460800, 921600].contains(&self.adc.baud_rate) {
            return Err(invalid(
                "baud_rate must be one of: 9600, 57600, 115200, 230400, 460800, 921600",
            ));
        }

        if self.adc.channels == 0 || self.adc.channels > 2 {
            return Err(invalid("channels must be 1 or 2"));
        }

        // Sampling
        if self.sampling.rate_hz == 0 || self.sampling.rate_hz > 1000 {
            return Err(invalid("rate_hz must be between 1 and 1000"));
        }

        if self.sampling.history_seconds == 0 || self.sampling.history_seconds > 3600 {
            return Err(invalid("history_seconds must be between 1 and 3600"));
        }

        if self.sampling.status_interval_samples == 0 {
            return Err(invalid("status_interval_samples must be greater than 0"));
        }

        // Every channel is read in the same slot; all reads must fit in one period
        let slot_budget = Duration::from_millis(self.adc.timeout_ms) * self.adc.channels as u32;
        if self.adc.timeout_ms == 0 || slot_budget >= self.sample_period() {
            return Err(invalid(format!(
                "adc timeout_ms x channels ({:?}) must be at least 1 ms and less than the sample period ({:?})",
                slot_budget,
                self.sample_period()
            )));
        }

        // Calibration
        if !(self.calibration.reference_voltage > 0.0) {
            return Err(invalid("reference_voltage must be greater than 0"));
        }

        if !(self.calibration.r_bottom_ohms > 0.0) || self.calibration.r_top_ohms < 0.0 {
            return Err(invalid("r_bottom_ohms must be greater than 0 and r_top_ohms not negative"));
        }

        // Display
        if !(self.display.min_volts < self.display.max_volts) {
            return Err(invalid("min_volts must be less than max_volts"));
        }

        // Storage
        if self.storage.enabled && self.storage.log_dir.is_empty() {
            return Err(invalid("storage log_dir cannot be empty when enabled"));
        }

        if self.storage.enabled && self.storage.file_prefix.is_empty() {
            return Err(invalid("storage file_prefix cannot be empty when enabled"));
        }

        // Telemetry
        if self.telemetry.enabled {
            for (name, value) in [
                ("broker", &self.telemetry.broker),
                ("device", &self.telemetry.device),
                ("topic", &self.telemetry.topic),
            ] {
                if value.is_empty() {
                    return Err(invalid(format!(
                        "telemetry {} cannot be empty when enabled",
                        name
                    )));
                }
            }
        }

        if self.telemetry.link_timeout_ms == 0 || self.telemetry.link_timeout_ms > 30000 {
            return Err(invalid("link_timeout_ms must be between 1 and 30000"));
        }

        if self.telemetry.retry_interval_ms < 100 || self.telemetry.retry_interval_ms > 600000 {
            return Err(invalid("retry_interval_ms must be between 100 and 600000"));
        }

        if self.telemetry.keepalive_ms == 0 {
            return Err(invalid("keepalive_ms must be greater than 0"));
        }

        Ok(())
    }
}
