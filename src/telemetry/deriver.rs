//! # Telemetry Deriver
//!
//! Turns raw encoder/stepper deltas into smoothed position, velocity and flow
//! rate.
//!
//! ## Formulas
//!
//! With `dt = interval_ms / 1000` and `area = π · (diameter / 2)²`:
//!
//! - `velocity = window_mean / dt`
//! - `flowrate = area · velocity`
//! - `pcnt_diff = (flowrate_act - flowrate_cmd) / flowrate_cmd · 100`, or 0 when
//!   nothing was commanded
//!
//! The interval is the configured (handshake-confirmed) sample period, not a
//! measured one.
//!
//! ## Usage
//!
//! ```
//! use bytes::Bytes;
//! use extrusion_analyser::link::protocol::RawSample;
//! use extrusion_analyser::telemetry::deriver::{DeriverConfig, TelemetryDeriver};
//!
//! let config = DeriverConfig {
//!     sample_interval_ms: 10.0,
//!     avg_samples: 2,
//!     reverse_encoder: false,
//!     reverse_stepper: false,
//!     filament_diameter_mm: 1.75,
//! };
//! let mut deriver = TelemetryDeriver::new(config)?;
//!
//! let record = deriver.derive(&RawSample::valid(0, 10, 10, Bytes::new()));
//! assert!((record.velocity_act - 1000.0).abs() < 1e-9);
//! assert_eq!(record.pcnt_diff, 0.0);
//! # Ok::<(), extrusion_analyser::error::AnalyserError>(())
//! ```

use std::f64::consts::PI;

use tracing::debug;

use super::record::{ErrorAnnotation, TelemetryRecord};
use super::window::RollingWindow;
use crate::error::{AnalyserError, Result};
use crate::link::decoder::to_hex;
use crate::link::protocol::RawSample;

/// Inputs the deriver needs from configuration and handshake
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeriverConfig {
    /// Confirmed sample period in milliseconds
    pub sample_interval_ms: f64,
    /// Rolling window length
    pub avg_samples: usize,
    /// Negate encoder deltas
    pub reverse_encoder: bool,
    /// Negate stepper deltas
    pub reverse_stepper: bool,
    pub filament_diameter_mm: f64,
}

impl DeriverConfig {
    fn validate(&self) -> Result<()> {
        if !(self.sample_interval_ms > 0.0) {
            return Err(AnalyserError::invalid_config(format!(
                "sample interval must be positive, got {} ms",
                self.sample_interval_ms
            )));
        }
        if !(self.filament_diameter_mm > 0.0) {
            return Err(AnalyserError::invalid_config(format!(
                "filament diameter must be positive, got {} mm",
                self.filament_diameter_mm
            )));
        }
        if self.avg_samples == 0 {
            return Err(AnalyserError::invalid_config("avg_samples must be greater than 0"));
        }
        Ok(())
    }
}

/// Stateful per-session telemetry derivation
#[derive(Debug, Clone)]
pub struct TelemetryDeriver {
    config: DeriverConfig,
    /// Sample period in seconds
    dt: f64,
    /// Filament cross-section, mm^2
    area: f64,
    encoder_window: RollingWindow,
    stepper_window: RollingWindow,
    encoder_pos: i64,
    stepper_pos: i64,
    sample_num: u64,
}

impl TelemetryDeriver {
    /// Create a deriver
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the interval or diameter is not
    /// positive, or `avg_samples` is 0.
    pub fn new(config: DeriverConfig) -> Result<Self> {
        config.validate()?;

        let radius = config.filament_diameter_mm / 2.0;
        Ok(Self {
            config,
            dt: config.sample_interval_ms / 1000.0,
            area: PI * radius * radius,
            encoder_window: RollingWindow::new(config.avg_samples),
            stepper_window: RollingWindow::new(config.avg_samples),
            encoder_pos: 0,
            stepper_pos: 0,
            sample_num: 0,
        })
    }

    /// Filament cross-section area in mm^2
    #[must_use]
    pub fn area(&self) -> f64 {
        self.area
    }

    /// Records produced so far
    #[must_use]
    pub fn samples_derived(&self) -> u64 {
        self.sample_num
    }

    #[must_use]
    pub fn config(&self) -> &DeriverConfig {
        &self.config
    }

    /// Derive the record for one accepted sample
    pub fn derive(&mut self, raw: &RawSample) -> TelemetryRecord {
        let encoder = signed(raw.encoder_delta, self.config.reverse_encoder);
        let stepper = signed(raw.stepper_delta, self.config.reverse_stepper);

        self.encoder_pos += i64::from(encoder);
        self.stepper_pos += i64::from(stepper);

        self.encoder_window.push(encoder);
        self.stepper_window.push(stepper);
        let encoder_avg = self.encoder_window.mean();
        let stepper_avg = self.stepper_window.mean();

        let velocity_act = encoder_avg / self.dt;
        let velocity_cmd = stepper_avg / self.dt;
        let flowrate_act = self.area * velocity_act;
        let flowrate_cmd = self.area * velocity_cmd;
        let pcnt_diff = percent_difference(flowrate_act, flowrate_cmd);

        let error = (!raw.valid).then(|| ErrorAnnotation {
            raw_hex: to_hex(&raw.raw),
            expected_crc: raw.expected_crc,
        });

        let record = TelemetryRecord {
            sample_num: self.sample_num,
            time_at_sample: self.sample_num as f64 * self.dt,
            encoder_pos: self.encoder_pos,
            stepper_pos: self.stepper_pos,
            encoder_avg,
            stepper_avg,
            velocity_cmd,
            velocity_act,
            flowrate_cmd,
            flowrate_act,
            pcnt_diff,
            bad_messages: 0,
            error,
        };

        debug!(
            "Sample {}: flow cmd {:.3} act {:.3} ({:+.2}%)",
            record.sample_num, flowrate_cmd, flowrate_act, pcnt_diff
        );

        self.sample_num += 1;
        record
    }
}

fn signed(delta: i16, reverse: bool) -> i32 {
    let value = i32::from(delta);
    if reverse {
        -value
    } else {
        value
    }
}

/// Percent deviation of `actual` from `commanded`; 0 when nothing was commanded
#[must_use]
pub fn percent_difference(actual: f64, commanded: f64) -> f64 {
    if commanded == 0.0 {
        return 0.0;
    }
    (actual - commanded) / commanded * 100.0
}
