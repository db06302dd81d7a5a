//! # Serial Communication Module
//!
//! Handles the serial link to the extruder firmware.
//!
//! This module handles:
//! - Opening the serial port (8N1, no flow control)
//! - The [`Transport`] abstraction the session driver reads and writes through
//! - Waiting for the peer to come up and draining stale bytes
//! - The sample interval / ACK policy handshake

pub mod port_trait;

pub use port_trait::{SerialTransport, Transport};

use std::time::Duration;

use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AnalyserError, Result};
use crate::link::{AckPolicy, Protocol};

/// Interval confirmation reads allowed to time out before the handshake fails
pub const HANDSHAKE_ATTEMPTS: usize = 3;

/// Link-up polls between progress log messages
const LINK_UP_LOG_EVERY: u64 = 10;

/// Open a serial port for the extruder link
///
/// # Arguments
///
/// * `path` - Device path (e.g., "/dev/ttyACM0")
/// * `baud_rate` - Line rate the firmware was built for
/// * `read_timeout` - Per-read timeout; a timeout is reported as "no data"
///
/// # Errors
///
/// Returns [`AnalyserError::SerialPortNotFound`] when the device cannot be opened
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use extrusion_analyser::serial::open;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let port = open("/dev/ttyACM0", 250_000, Duration::from_secs(1))?;
///     println!("Connected to: {}", port.device_path());
///     Ok(())
/// }
/// ```
pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> Result<SerialTransport> {
    debug!("Trying to open serial port: {}", path);

    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .timeout(read_timeout)
        .open_native_async()
        .map_err(|e| AnalyserError::SerialPortNotFound(format!("{}: {}", path, e)))?;

    info!("Opened extruder link at {} ({} baud)", path, baud_rate);
    Ok(SerialTransport::new(port, path, read_timeout))
}

/// Block until the peer has sent something
///
/// Sleeps `poll` between checks; this is the only place the session sleeps.
pub async fn wait_for_link<T: Transport + ?Sized>(transport: &mut T, poll: Duration) -> Result<()> {
    info!("Waiting for extruder...");
    let mut polls: u64 = 0;

    while transport.bytes_available().map_err(transport_error)? == 0 {
        polls += 1;
        if polls % LINK_UP_LOG_EVERY == 0 {
            info!("Still waiting for extruder ({} polls)", polls);
        }
        tokio::time::sleep(poll).await;
    }

    debug!("Extruder link up after {} polls", polls);
    Ok(())
}

/// Discard everything currently buffered
///
/// # Returns
///
/// * `Result<usize>` - Number of bytes discarded
pub async fn drain<T: Transport + ?Sized>(transport: &mut T) -> Result<usize> {
    let mut discarded = 0;

    loop {
        let available = transport.bytes_available().map_err(transport_error)?;
        if available == 0 {
            break;
        }
        match transport.read_exact(available).await.map_err(transport_error)? {
            Some(bytes) => discarded += bytes.len(),
            None => break,
        }
    }

    if discarded > 0 {
        debug!("Discarded {} stale bytes", discarded);
    }
    Ok(discarded)
}

/// Request a sample interval and ACK policy; return the interval the peer confirmed
///
/// # Errors
///
/// - Transport failure, or no confirmation within [`HANDSHAKE_ATTEMPTS`] read timeouts
/// - Configuration error if the peer confirms an interval of 0
pub async fn negotiate<T: Transport + ?Sized>(
    transport: &mut T,
    interval_ms: u8,
    policy: AckPolicy,
) -> Result<u8> {
    transport
        .write_all(&[interval_ms, policy.flag_byte()])
        .await
        .map_err(transport_error)?;
    transport.flush().await.map_err(transport_error)?;

    for attempt in 1..=HANDSHAKE_ATTEMPTS {
        match transport.read_exact(1).await.map_err(transport_error)? {
            Some(reply) => {
                let confirmed = reply[0];
                if confirmed == 0 {
                    return Err(AnalyserError::invalid_config(
                        "extruder confirmed a sample interval of 0 ms",
                    ));
                }
                if confirmed != interval_ms {
                    warn!("Requested {} ms sample interval, extruder confirmed {} ms", interval_ms, confirmed);
                }
                info!("Sample interval confirmed: {} ms", confirmed);
                return Ok(confirmed);
            }
            None => debug!("No interval confirmation yet (attempt {})", attempt),
        }
    }

    Err(AnalyserError::Transport(format!(
        "no sample interval confirmation after {} attempts",
        HANDSHAKE_ATTEMPTS
    )))
}

/// Bring the link up for the configured protocol
///
/// Waits for the peer, drains stale bytes and, for the checked protocol,
/// negotiates the sample interval. The legacy protocol has no handshake and
/// runs at the configured interval.
///
/// # Returns
///
/// * `Result<u8>` - Sample interval in ms the session should derive with
pub async fn establish<T: Transport + ?Sized>(transport: &mut T, config: &Config) -> Result<u8> {
    wait_for_link(transport, Duration::from_millis(config.serial.link_up_poll_ms)).await?;
    drain(transport).await?;

    match config.link.protocol {
        Protocol::Checked => negotiate(transport, config.sampling.sample_interval_ms, config.ack_policy()).await,
        Protocol::Legacy => Ok(config.sampling.sample_interval_ms),
    }
}

/// Map an I/O failure on the link to a fatal transport error
pub fn transport_error(e: std::io::Error) -> AnalyserError {
    AnalyserError::Transport(e.to_string())
}
