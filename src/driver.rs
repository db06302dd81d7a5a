//! # Session Driver
//!
//! The outer loop: pulls bytes from the [`Transport`], frames them through a
//! [`LinkSession`], derives a record for every accepted sample and hands it to
//! a [`RecordSink`].
//!
//! [`SessionDriver::poll_once`] is one cooperative step. It never sleeps: when
//! nothing is buffered it sends the session's idle poll byte (if any), yields
//! to the runtime and returns [`PollOutcome::Idle`]. [`SessionDriver::run`]
//! repeats it until the peer ends the session, the shutdown future resolves,
//! or the transport fails.

use std::future::Future;

use bytes::BytesMut;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::link::{LinkEvent, LinkSession, LinkStats};
use crate::serial::{transport_error, Transport};
use crate::telemetry::{RecordSink, TelemetryDeriver, TelemetryRecord};

/// Result of one driver step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing was buffered
    Idle,
    /// Bytes were consumed; `records` were written
    Progress { records: usize },
    /// The link session has ended
    Terminated,
}

/// Why a session stopped without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Peer sent its termination marker
    PeerTerminated,
    /// Shutdown requested locally (e.g. Ctrl+C)
    Shutdown,
}

/// Totals for a finished session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub records: u64,
    pub link: LinkStats,
    pub reason: StopReason,
}

/// Drives one link session from transport to sink
pub struct SessionDriver<T, S> {
    transport: T,
    link: Box<dyn LinkSession>,
    deriver: TelemetryDeriver,
    sink: S,
    /// Bytes read but not yet framed
    rx: BytesMut,
    records: u64,
    status_interval: u64,
}

impl<T: Transport, S: RecordSink> SessionDriver<T, S> {
    pub fn new(transport: T, link: Box<dyn LinkSession>, deriver: TelemetryDeriver, sink: S) -> Self {
        Self {
            transport,
            link,
            deriver,
            sink,
            rx: BytesMut::with_capacity(64),
            records: 0,
            status_interval: 1000,
        }
    }

    /// Log a status line every `records` records (0 disables)
    #[must_use]
    pub fn with_status_interval(mut self, records: u64) -> Self {
        self.status_interval = records;
        self
    }

    pub fn link(&self) -> &dyn LinkSession {
        self.link.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Records written so far
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn into_parts(self) -> (T, S) {
        (self.transport, self.sink)
    }

    /// Run until the peer terminates, `shutdown` resolves, or the transport fails
    ///
    /// The sink is flushed on every exit path.
    ///
    /// # Errors
    ///
    /// Returns the fatal error (transport failure, sink I/O) that ended the session
    pub async fn run<F: Future<Output = ()>>(&mut self, shutdown: F) -> Result<SessionSummary> {
        tokio::pin!(shutdown);
        info!("Session started");

        let reason = loop {
            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                outcome = self.poll_once() => Some(outcome),
            };

            match outcome {
                None => {
                    info!("Shutdown requested");
                    break StopReason::Shutdown;
                }
                Some(Ok(PollOutcome::Terminated)) => break StopReason::PeerTerminated,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Session failed: {}", e);
                    if let Err(flush_err) = self.sink.flush() {
                        warn!("Failed to flush records: {}", flush_err);
                    }
                    return Err(e);
                }
            }
        };

        self.sink.flush()?;
        let summary = SessionSummary {
            records: self.records,
            link: self.link.stats(),
            reason,
        };
        info!(
            "Session ended ({:?}): {} records, {} frames, {} bad messages",
            reason, summary.records, summary.link.frames, summary.link.bad_messages
        );
        Ok(summary)
    }

    /// One cooperative step
    ///
    /// # Errors
    ///
    /// Transport failures and sink I/O errors are returned; frame faults are not.
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        if self.link.is_terminated() {
            return Ok(PollOutcome::Terminated);
        }

        let available = self.transport.bytes_available().map_err(transport_error)?;
        if available == 0 {
            if let Some(byte) = self.link.idle_poll() {
                self.send(byte).await?;
            }
            tokio::task::yield_now().await;
            return Ok(PollOutcome::Idle);
        }

        let Some(chunk) = self.transport.read_exact(available).await.map_err(transport_error)? else {
            return Ok(PollOutcome::Idle);
        };
        self.rx.extend_from_slice(&chunk);

        if let Some(offset) = self.link.find_break(&self.rx) {
            if offset > 0 {
                debug!("Discarding {} bytes ahead of break", offset);
            }
            let marker = self.rx.split_off(offset);
            self.rx.clear();
            let len = self.link.bytes_needed().min(marker.len());
            self.link.step(&marker[..len])?;
            return Ok(PollOutcome::Terminated);
        }

        let mut records = 0;
        while !self.link.is_terminated() {
            let needed = self.link.bytes_needed();
            if self.rx.len() < needed {
                break;
            }
            let bytes = self.rx.split_to(needed);

            let step = self.link.step(&bytes)?;
            let rejected = matches!(step.event, LinkEvent::Dropped(_));

            if let Some(reply) = step.reply {
                self.send(reply).await?;
            }
            if self.handle_event(step.event)? {
                records += 1;
            }

            if rejected && self.link.discard_after_reject() {
                if !self.rx.is_empty() {
                    warn!("Discarding {} bytes behind rejected frame", self.rx.len());
                    self.rx.clear();
                }
                break;
            }
        }

        if self.link.is_terminated() {
            self.rx.clear();
            return Ok(PollOutcome::Terminated);
        }
        Ok(PollOutcome::Progress { records })
    }

    async fn send(&mut self, byte: u8) -> Result<()> {
        self.transport.write_all(&[byte]).await.map_err(transport_error)?;
        self.transport.flush().await.map_err(transport_error)
    }

    /// Returns whether a record was written
    fn handle_event(&mut self, event: LinkEvent) -> Result<bool> {
        match event {
            LinkEvent::Sample(raw) => {
                let record = self
                    .deriver
                    .derive(&raw)
                    .with_bad_messages(self.link.stats().bad_messages);
                self.sink.write_record(&record)?;
                self.records += 1;
                self.log_status(&record);
                Ok(true)
            }
            LinkEvent::Dropped(fault) => {
                debug!("Dropped frame awaiting resend: {}", fault);
                Ok(false)
            }
            LinkEvent::Resynced { index } => {
                debug!("Link resynchronized at index {}", index);
                Ok(false)
            }
            LinkEvent::ResyncAbandoned { index } => {
                debug!("Resync abandoned at index {}", index);
                Ok(false)
            }
            LinkEvent::Syncing | LinkEvent::Terminated => Ok(false),
        }
    }

    fn log_status(&self, record: &TelemetryRecord) {
        if self.status_interval == 0 || self.records % self.status_interval != 0 {
            return;
        }
        info!(
            "{} records, {} bad messages, flow cmd {:.2} act {:.2} mm^3/s ({:+.1}%)",
            self.records, record.bad_messages, record.flowrate_cmd, record.flowrate_act, record.pcnt_diff
        );
    }
}
