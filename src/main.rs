//! # Extrusion Analyser
//!
//! Measure extruder flow rate from encoder and stepper telemetry over a
//! serial link.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Parse command line, load and validate configuration
//!    - Set up logging (console, plus daily rolling file when configured)
//!    - Open the serial port, wait for the extruder and run the handshake
//!
//! 2. **Main Loop**
//!    - Frame incoming bytes, ACK/NACK each frame
//!    - Derive a telemetry record per accepted sample and write it out
//!    - Log status every `logging.status_interval` records
//!
//! 3. **Shutdown**
//!    - On the extruder's break marker or Ctrl+C, flush records and exit
//!    - On transport failure, flush records and exit with the error
//!
//! # Examples
//!
//! ```bash
//! extrusion-analyser --config config/default.toml --port /dev/ttyUSB0
//! ```
//!
//! Expected output:
//! ```text
//! INFO extrusion_analyser: Extrusion Analyser v0.1.0 starting...
//! INFO extrusion_analyser::serial: Opened extruder link at /dev/ttyUSB0 (250000 baud)
//! INFO extrusion_analyser::serial: Sample interval confirmed: 10 ms
//! INFO extrusion_analyser::driver: 1000 records, 0 bad messages, flow cmd 2405.28 act 2398.12 mm^3/s (-0.3%)
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use extrusion_analyser::config::{Config, LoggingConfig};
use extrusion_analyser::driver::SessionDriver;
use extrusion_analyser::link::new_session;
use extrusion_analyser::serial;
use extrusion_analyser::telemetry::sink::open_sink;
use extrusion_analyser::telemetry::TelemetryDeriver;

/// Log file name inside `logging.dir`
const LOG_FILE_NAME: &str = "extrusion-analyser.log";

/// Extrusion Analyser - extruder flow rate from serial telemetry
#[derive(Parser, Debug)]
#[command(name = "extrusion-analyser")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML); built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device, overrides `serial.port`
    #[arg(short, long)]
    port: Option<String>,

    /// Record output directory, overrides `output.dir`
    #[arg(short, long)]
    output_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error), overrides `logging.level`
    #[arg(long)]
    log_level: Option<String>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(port) = &args.port {
        config.serial.port = port.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output.dir = dir.clone();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Install the tracing subscriber; the guard must outlive the session
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let (file_layer, guard) = match &logging.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    let _log_guard = init_logging(&config.logging);

    info!("Extrusion Analyser v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut transport = serial::open(
        &config.serial.port,
        config.serial.baud_rate,
        Duration::from_millis(config.serial.timeout_ms),
    )?;

    let interval_ms = tokio::select! {
        result = serial::establish(&mut transport, &config) => result.context("Link handshake failed")?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C before the extruder came up, exiting");
            return Ok(());
        }
    };

    let deriver = TelemetryDeriver::new(config.deriver_config(interval_ms))?;
    let (sink, path) = open_sink(
        Path::new(&config.output.dir),
        &config.output.file_prefix,
        config.output.format,
    )?;
    let link = new_session(config.link.protocol, config.ack_policy());

    info!(
        "Running {:?} protocol, {:?}, {} ms interval",
        config.link.protocol,
        config.ack_policy(),
        interval_ms
    );
    info!("Press Ctrl+C to exit");

    let mut driver = SessionDriver::new(transport, link, deriver, sink)
        .with_status_interval(config.logging.status_interval);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let summary = driver.run(shutdown).await?;

    info!(
        "Wrote {} records to {} ({} bad messages)",
        summary.records,
        path.display(),
        summary.link.bad_messages
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_overrides() {
        let args = Args::parse_from([
            "extrusion-analyser",
            "--port",
            "/dev/ttyUSB1",
            "--output-dir",
            "/tmp/runs",
            "--log-level",
            "debug",
        ]);
        let config = load_config(&args).unwrap();

        assert_eq!(config.serial.port, "/dev/ttyUSB1");
        assert_eq!(config.output.dir, "/tmp/runs");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = Args::parse_from(["extrusion-analyser", "--log-level", "loud"]);
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
        let args = Args::parse_from(["extrusion-analyser", "--config", path.to_str().unwrap()]);
        assert!(load_config(&args).is_ok());
    }
}
