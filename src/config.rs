//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; missing values take the defaults
//! below. An empty file is a valid configuration.
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyACM0"
//! baud_rate = 250000
//!
//! [link]
//! protocol = "checked"
//! resend_on_error = true
//!
//! [sampling]
//! sample_interval_ms = 10
//! avg_samples = 10
//!
//! [extruder]
//! filament_diameter_mm = 1.75
//! ```

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{AnalyserError, Result};
use crate::link::{AckPolicy, Protocol};
use crate::telemetry::{DeriverConfig, OutputFormat};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub extruder: ExtruderConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Read timeout; a timeout counts as "no data yet"
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Sleep between checks while waiting for the peer to come up
    #[serde(default = "default_link_up_poll_ms")]
    pub link_up_poll_ms: u64,
}

/// Link protocol configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default)]
    pub protocol: Protocol,

    /// NACK bad frames and wait for the resend instead of passing them through
    #[serde(default = "default_resend_on_error")]
    pub resend_on_error: bool,
}

/// Sampling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SamplingConfig {
    /// Requested sample period; the peer confirms the one actually used
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u8,

    /// Rolling average window length
    #[serde(default = "default_avg_samples")]
    pub avg_samples: usize,
}

/// Extruder geometry and direction
#[derive(Debug, Deserialize, Clone)]
pub struct ExtruderConfig {
    #[serde(default = "default_filament_diameter_mm")]
    pub filament_diameter_mm: f64,

    #[serde(default)]
    pub reverse_encoder: bool,

    #[serde(default)]
    pub reverse_stepper: bool,

    /// Reserved for unit conversion; not applied to raw counts
    #[serde(default = "default_scaling")]
    pub encoder_scaling: f64,

    /// Reserved for unit conversion; not applied to raw counts
    #[serde(default = "default_scaling")]
    pub stepper_scaling: f64,
}

/// Record output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    #[serde(default)]
    pub format: OutputFormat,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; console only when unset
    #[serde(default)]
    pub dir: Option<String>,

    /// Records between status log lines
    #[serde(default = "default_status_interval")]
    pub status_interval: u64,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyACM0".to_string() }
fn default_baud_rate() -> u32 { 250000 }
fn default_timeout_ms() -> u64 { 1000 }
fn default_link_up_poll_ms() -> u64 { 500 }

fn default_resend_on_error() -> bool { true }

fn default_sample_interval_ms() -> u8 { 10 }
fn default_avg_samples() -> usize { 10 }

fn default_filament_diameter_mm() -> f64 { 1.75 }
fn default_scaling() -> f64 { 1.0 }

fn default_output_dir() -> String { "./data".to_string() }
fn default_file_prefix() -> String { "extrusion".to_string() }

fn default_log_level() -> String { "info".to_string() }
fn default_status_interval() -> u64 { 1000 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            link_up_poll_ms: default_link_up_poll_ms(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            resend_on_error: default_resend_on_error(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            avg_samples: default_avg_samples(),
        }
    }
}

impl Default for ExtruderConfig {
    fn default() -> Self {
        Self {
            filament_diameter_mm: default_filament_diameter_mm(),
            reverse_encoder: false,
            reverse_stepper: false,
            encoder_scaling: default_scaling(),
            stepper_scaling: default_scaling(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            file_prefix: default_file_prefix(),
            format: OutputFormat::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            status_interval: default_status_interval(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
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
    /// use extrusion_analyser::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// ACK policy selected by `link.resend_on_error`
    pub fn ack_policy(&self) -> AckPolicy {
        AckPolicy::from_resend_flag(self.link.resend_on_error)
    }

    /// Deriver settings for the interval the peer confirmed
    pub fn deriver_config(&self, confirmed_interval_ms: u8) -> DeriverConfig {
        DeriverConfig {
            sample_interval_ms: f64::from(confirmed_interval_ms),
            avg_samples: self.sampling.avg_samples,
            reverse_encoder: self.extruder.reverse_encoder,
            reverse_stepper: self.extruder.reverse_stepper,
            filament_diameter_mm: self.extruder.filament_diameter_mm,
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(AnalyserError::invalid_config("serial port cannot be empty"));
        }

        if self.serial.baud_rate == 0 {
            return Err(AnalyserError::invalid_config("baud_rate must be greater than 0"));
        }

        if self.serial.timeout_ms < 100 || self.serial.timeout_ms > 1000 {
            return Err(AnalyserError::invalid_config("timeout_ms must be between 100 and 1000"));
        }

        if self.serial.link_up_poll_ms == 0 || self.serial.link_up_poll_ms > 10000 {
            return Err(AnalyserError::invalid_config("link_up_poll_ms must be between 1 and 10000"));
        }

        if self.sampling.sample_interval_ms == 0 || self.sampling.sample_interval_ms > 250 {
            return Err(AnalyserError::invalid_config("sample_interval_ms must be between 1 and 250"));
        }

        if self.sampling.avg_samples == 0 {
            return Err(AnalyserError::invalid_config("avg_samples must be greater than 0"));
        }

        if !(self.extruder.filament_diameter_mm > 0.0) {
            return Err(AnalyserError::invalid_config("filament_diameter_mm must be greater than 0"));
        }

        for (name, value) in [
            ("encoder_scaling", self.extruder.encoder_scaling),
            ("stepper_scaling", self.extruder.stepper_scaling),
        ] {
            if !(value > 0.0) {
                return Err(AnalyserError::invalid_config(format!("{} must be greater than 0", name)));
            }
        }

        if self.output.dir.is_empty() {
            return Err(AnalyserError::invalid_config("output dir cannot be empty"));
        }

        if self.output.file_prefix.is_empty() {
            return Err(AnalyserError::invalid_config("output file_prefix cannot be empty"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(AnalyserError::invalid_config(
                "log level must be one of: trace, debug, info, warn, error",
            ));
        }

        if self.logging.status_interval == 0 {
            return Err(AnalyserError::invalid_config("status_interval must be greater than 0"));
        }

        Ok(())
    }
}
