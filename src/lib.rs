//! # Extrusion Analyser Library
//!
//! Measure extruder flow rate from encoder and stepper telemetry.
//!
//! An extruder controller streams encoder and stepper deltas over a serial
//! link. This library frames and checks that stream, acknowledges or rejects
//! each frame, and turns accepted samples into smoothed velocity and
//! volumetric flow rate records.

pub mod config;
pub mod error;
pub mod link;
pub mod serial;
pub mod telemetry;
pub mod driver;
