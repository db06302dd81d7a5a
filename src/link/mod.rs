//! # Extruder Link Module
//!
//! Framing, checksums and acknowledgment for the serial link to the extruder
//! firmware.
//!
//! This module handles:
//! - CRC-8 (polynomial 0x83) checksum calculation
//! - Checked 6-byte frames (index, encoder, stepper, CRC)
//! - Legacy 5-byte frames with masked headers and a resync mode
//! - Sequence index tracking and ACK/NACK replies
//!
//! Both framing variants implement [`LinkSession`], a cooperative step
//! function: the caller hands it exactly [`LinkSession::bytes_needed`] bytes
//! and gets back an event plus an optional reply byte for the peer.

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod crc;
pub mod checked;
pub mod legacy;

use serde::Deserialize;

use crate::error::Result;
use protocol::{FrameFault, RawSample};

pub use checked::CheckedSession;
pub use legacy::LegacySession;

/// Framing variant spoken by the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// 6-byte frames with CRC-8 and 7-bit indices
    #[default]
    Checked,
    /// 5-byte frames with masked headers, 4-bit indices and pad resync
    Legacy,
}

/// What the host does with a bad frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    /// ACK every good frame, NACK and drop bad ones so the peer resends
    ResendOnError,
    /// Never reply; pass bad frames through annotated
    TolerateErrors,
}

impl AckPolicy {
    /// Policy for the `resend_on_error` configuration flag
    pub fn from_resend_flag(resend_on_error: bool) -> Self {
        if resend_on_error {
            AckPolicy::ResendOnError
        } else {
            AckPolicy::TolerateErrors
        }
    }

    /// Handshake flag byte sent to the peer
    pub fn flag_byte(self) -> u8 {
        match self {
            AckPolicy::ResendOnError => 1,
            AckPolicy::TolerateErrors => 0,
        }
    }
}

/// Coarse session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Running,
    Resync,
    Terminated,
}

/// Outcome of one session step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// An accepted sample for the telemetry deriver
    Sample(RawSample),
    /// A bad frame was rejected; the peer should resend it
    Dropped(FrameFault),
    /// Peer announced an index, or a resync found its pad run
    Resynced { index: u8 },
    /// Resync gave up after its attempt budget and resumed framing anyway
    ResyncAbandoned { index: u8 },
    /// A byte was consumed while resyncing
    Syncing,
    /// Peer ended the session
    Terminated,
}

/// Event plus the byte, if any, to write back to the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStep {
    pub event: LinkEvent,
    pub reply: Option<u8>,
}

impl LinkStep {
    pub fn new(event: LinkEvent, reply: Option<u8>) -> Self {
        Self { event, reply }
    }

    /// A step with nothing to send back
    pub fn silent(event: LinkEvent) -> Self {
        Self { event, reply: None }
    }
}

/// Cumulative link counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Frames decoded (sentinels and resync bytes excluded)
    pub frames: u64,
    /// Frames counted as bad messages
    pub bad_messages: u64,
    /// Completed resyncs
    pub resyncs: u64,
    /// Resyncs that ran out of attempts
    pub failed_resyncs: u64,
}

/// A link protocol state machine
pub trait LinkSession: Send {
    /// Bytes the next [`step`](LinkSession::step) expects
    fn bytes_needed(&self) -> usize;

    /// Consume exactly `bytes_needed()` bytes
    ///
    /// # Errors
    ///
    /// Returns [`AnalyserError::MalformedFrame`](crate::error::AnalyserError::MalformedFrame)
    /// when handed the wrong number of bytes.
    fn step(&mut self, bytes: &[u8]) -> Result<LinkStep>;

    /// Byte to send the peer while the host receive buffer is empty
    fn idle_poll(&self) -> Option<u8> {
        None
    }

    /// Offset of a termination marker in not-yet-framed bytes
    fn find_break(&self, _pending: &[u8]) -> Option<usize> {
        None
    }

    /// Whether bytes buffered behind a rejected frame must be discarded
    ///
    /// True when the peer answers a NACK by resending the whole frame, so the
    /// retransmission has to be framed from its first byte.
    fn discard_after_reject(&self) -> bool {
        false
    }

    fn state(&self) -> LinkState;

    fn stats(&self) -> LinkStats;

    /// Index the session expects on the next data frame
    fn expected_index(&self) -> u8;

    /// Whether the session has ended
    fn is_terminated(&self) -> bool {
        self.state() == LinkState::Terminated
    }
}

/// Build the session for a framing variant
pub fn new_session(protocol: Protocol, policy: AckPolicy) -> Box<dyn LinkSession> {
    match protocol {
        Protocol::Checked => Box::new(CheckedSession::new(policy)),
        Protocol::Legacy => Box::new(LegacySession::new()),
    }
}
