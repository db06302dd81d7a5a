//! # Telemetry Records
//!
//! One record per accepted sample, in the shape written to the output file.

use serde::Serialize;

/// Column names for delimited output, in [`TelemetryRecord::to_csv_row`] order
pub const CSV_HEADER: &str = "sample_num,time_s,encoder_pos,stepper_pos,encoder_avg,stepper_avg,\
velocity_cmd,velocity_act,flowrate_cmd,flowrate_act,pcnt_diff,bad_messages,raw_hex,expected_crc";

/// Diagnostics attached when the originating frame was invalid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorAnnotation {
    /// Frame bytes as received, e.g. `05 00 0A 00 0A 3C`
    pub raw_hex: String,
    /// Checksum the host computed for the frame contents
    pub expected_crc: Option<u8>,
}

/// Derived motion metrics for one sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    /// Zero-based sample counter
    pub sample_num: u64,
    /// Seconds since the first sample (`sample_num * interval`)
    pub time_at_sample: f64,
    /// Running sum of encoder deltas
    pub encoder_pos: i64,
    /// Running sum of stepper deltas
    pub stepper_pos: i64,
    pub encoder_avg: f64,
    pub stepper_avg: f64,
    /// Commanded velocity, counts/s
    pub velocity_cmd: f64,
    /// Measured velocity, counts/s
    pub velocity_act: f64,
    /// Commanded flow rate, mm^3/s
    pub flowrate_cmd: f64,
    /// Measured flow rate, mm^3/s
    pub flowrate_act: f64,
    /// Measured vs commanded flow, percent
    pub pcnt_diff: f64,
    /// Cumulative bad messages on the link when this record was emitted
    pub bad_messages: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorAnnotation>,
}

impl TelemetryRecord {
    /// Attach the link's cumulative bad-message count
    #[must_use]
    pub fn with_bad_messages(mut self, bad_messages: u64) -> Self {
        self.bad_messages = bad_messages;
        self
    }

    /// One comma-separated line (no trailing newline) matching [`CSV_HEADER`]
    pub fn to_csv_row(&self) -> String {
        let fields = format!(
            "{},{:.4},{},{},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{}",
            self.sample_num,
            self.time_at_sample,
            self.encoder_pos,
            self.stepper_pos,
            self.encoder_avg,
            self.stepper_avg,
            self.velocity_cmd,
            self.velocity_act,
            self.flowrate_cmd,
            self.flowrate_act,
            self.pcnt_diff,
            self.bad_messages,
        );
        match &self.error {
            Some(annotation) => {
                let crc = annotation
                    .expected_crc
                    .map(|c| format!("{:02X}", c))
                    .unwrap_or_default();
                format!("{},{},{}", fields, annotation.raw_hex, crc)
            }
            None => format!("{},,", fields),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> TelemetryRecord {
        TelemetryRecord {
            sample_num: 2,
            time_at_sample: 0.02,
            encoder_pos: 30,
            stepper_pos: 30,
            encoder_avg: 10.0,
            stepper_avg: 10.0,
            velocity_cmd: 1000.0,
            velocity_act: 1000.0,
            flowrate_cmd: 2405.2818,
            flowrate_act: 2405.2818,
            pcnt_diff: 0.0,
            bad_messages: 0,
            error: None,
        }
    }

    #[test]
    fn test_csv_row_column_count_matches_header() {
        let header_cols = CSV_HEADER.split(',').count();
        assert_eq!(sample_record().to_csv_row().split(',').count(), header_cols);

        let mut annotated = sample_record();
        annotated.error = Some(ErrorAnnotation {
            raw_hex: "05 00 0A 00 0A 3C".to_string(),
            expected_crc: Some(0x3D),
        });
        assert_eq!(annotated.to_csv_row().split(',').count(), header_cols);
    }

    #[test]
    fn test_csv_row_values() {
        let row = sample_record().to_csv_row();
        assert!(row.starts_with("2,0.0200,30,30,10.0000,10.0000,1000.0000,1000.0000,"));
        assert!(row.ends_with(",0.0000,0,,"));
    }

    #[test]
    fn test_csv_row_annotation() {
        let mut record = sample_record();
        record.error = Some(ErrorAnnotation {
            raw_hex: "05 00 0A 00 0A 3C".to_string(),
            expected_crc: Some(0x3D),
        });
        assert!(record.to_csv_row().ends_with(",05 00 0A 00 0A 3C,3D"));
    }

    #[test]
    fn test_json_skips_missing_annotation() {
        let json = serde_json::to_string(&sample_record()).unwrap();
        assert!(!json.contains("error"));
        assert!(json.contains("\"velocity_act\":1000.0"));
    }

    #[test]
    fn test_with_bad_messages() {
        let record = sample_record().with_bad_messages(7);
        assert_eq!(record.bad_messages, 7);
    }
}
