//! # Telemetry Module
//!
//! Derives motion metrics from raw link samples and persists them.
//!
//! This module handles:
//! - Rolling averages of encoder and stepper deltas
//! - Velocity, flow rate and commanded vs measured deviation
//! - Formatting records as CSV or JSONL
//! - Writing timestamped record files

pub mod window;
pub mod record;
pub mod deriver;
pub mod sink;

pub use deriver::{DeriverConfig, TelemetryDeriver};
pub use record::{ErrorAnnotation, TelemetryRecord};
pub use sink::{OutputFormat, RecordSink};
pub use window::RollingWindow;
