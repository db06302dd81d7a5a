//! # Record Sinks
//!
//! Destinations for derived telemetry records.
//!
//! - [`CsvSink`]: header row, then one comma-separated line per record
//! - [`JsonlSink`]: one JSON object per line
//!
//! [`open_sink`] creates a timestamped file in the configured output directory.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use super::record::{TelemetryRecord, CSV_HEADER};
use crate::error::Result;

/// File format for persisted records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Jsonl,
}

impl OutputFormat {
    /// File extension without the dot
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Jsonl => "jsonl",
        }
    }
}

/// Receives records in arrival order
#[cfg_attr(test, mockall::automock)]
pub trait RecordSink: Send {
    fn write_record(&mut self, record: &TelemetryRecord) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

impl RecordSink for Box<dyn RecordSink> {
    fn write_record(&mut self, record: &TelemetryRecord) -> Result<()> {
        (**self).write_record(record)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Comma-separated output with a header row
#[derive(Debug)]
pub struct CsvSink<W: Write> {
    writer: W,
    header_written: bool,
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            header_written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_header(&mut self) -> Result<()> {
        if !self.header_written {
            writeln!(self.writer, "{}", CSV_HEADER)?;
            self.header_written = true;
        }
        Ok(())
    }
}

impl<W: Write + Send> RecordSink for CsvSink<W> {
    fn write_record(&mut self, record: &TelemetryRecord) -> Result<()> {
        self.write_header()?;
        writeln!(self.writer, "{}", record.to_csv_row())?;
        Ok(())
    }

    /// Also writes the header, so a session without records still leaves one
    fn flush(&mut self) -> Result<()> {
        self.write_header()?;
        self.writer.flush()?;
        Ok(())
    }
}

/// JSON Lines output
#[derive(Debug)]
pub struct JsonlSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> RecordSink for JsonlSink<W> {
    fn write_record(&mut self, record: &TelemetryRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps every record in memory
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub records: Vec<TelemetryRecord>,
    pub flushes: usize,
}

#[cfg(test)]
impl RecordSink for MemorySink {
    fn write_record(&mut self, record: &TelemetryRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

/// Output file name: `<prefix>_<YYYYmmdd_HHMMSS>.<ext>`
pub fn output_file_name(prefix: &str, format: OutputFormat, now: chrono::DateTime<chrono::Local>) -> String {
    format!("{}_{}.{}", prefix, now.format("%Y%m%d_%H%M%S"), format.extension())
}

/// Create the output directory and a fresh, timestamped record file
///
/// # Returns
///
/// * `Result<(Box<dyn RecordSink>, PathBuf)>` - Sink and the path it writes to
pub fn open_sink(dir: &Path, prefix: &str, format: OutputFormat) -> Result<(Box<dyn RecordSink>, PathBuf)> {
    fs::create_dir_all(dir)?;
    let path = dir.join(output_file_name(prefix, format, chrono::Local::now()));
    let writer = BufWriter::new(File::create(&path)?);

    info!("Writing {} records to {}", format.extension(), path.display());

    let sink: Box<dyn RecordSink> = match format {
        OutputFormat::Csv => Box::new(CsvSink::new(writer)),
        OutputFormat::Jsonl => Box::new(JsonlSink::new(writer)),
    };
    Ok((sink, path))
}
