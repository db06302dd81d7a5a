//! # Link Protocol Constants and Types
//!
//! Core definitions shared by both framing variants of the extruder link.

use bytes::Bytes;
use thiserror::Error;

/// Checked frame size: index(1) + encoder(2) + stepper(2) + crc(1)
pub const FRAME_LEN: usize = 6;

/// Number of leading frame bytes covered by the CRC
pub const FRAME_CRC_SPAN: usize = 5;

/// Sequence indices of the checked protocol wrap at 128 (7 bits)
pub const INDEX_MODULUS: u8 = 128;

/// Host -> peer: frame accepted
pub const GOOD_ACK: u8 = 0x00;

/// Host -> peer: frame rejected, resend
pub const BAD_ACK: u8 = 0x40;

/// Peer -> host: end of session
///
/// Never a valid data frame since indices stop at 0x7F.
pub const BREAK_SENTINEL: [u8; FRAME_LEN] = [0xFF; FRAME_LEN];

/// Legacy frame size: header(1) + encoder(2) + stepper(2), no CRC
pub const LEGACY_FRAME_LEN: usize = 5;

/// Legacy indices wrap at the peer's data buffer size
pub const LEGACY_INDEX_MODULUS: u8 = 16;

/// Legacy header: message kind in the top two bits
pub const HEADER_KIND_MASK: u8 = 0xC0;

/// Legacy header: index in the low six bits
pub const HEADER_INDEX_MASK: u8 = 0x3F;

/// Legacy host -> peer: receive buffer empty (OR'd with the current index)
pub const BUFFER_EMPTY: u8 = 0x80;

/// Legacy resync padding byte
pub const SYNC_PAD: u8 = 0xFF;

/// Consecutive pads that end a legacy resync
pub const SYNC_PAD_RUN: usize = 4;

/// Bytes a legacy resync may consume before giving up
pub const SYNC_MAX_ATTEMPTS: usize = 20;

/// Legacy header kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// Data frame
    Normal,
    /// Peer reports an error
    Error,
    /// Peer announces its current index
    Sync,
    /// Peer ends the session
    Message,
}

impl HeaderKind {
    /// Classify a legacy header byte by its top two bits
    pub fn from_header(header: u8) -> Self {
        match header & HEADER_KIND_MASK {
            0x00 => HeaderKind::Normal,
            0x40 => HeaderKind::Error,
            0x80 => HeaderKind::Sync,
            _ => HeaderKind::Message,
        }
    }
}

/// A decoded checked frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Sequence index (0-127)
    pub index: u8,
    /// Encoder counts since the previous frame
    pub encoder_delta: i16,
    /// Stepper steps since the previous frame
    pub stepper_delta: i16,
    /// Checksum byte as received
    pub checksum: u8,
}

impl Frame {
    /// Wire representation of this frame, checksum byte included as stored
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let [e_hi, e_lo] = self.encoder_delta.to_be_bytes();
        let [s_hi, s_lo] = self.stepper_delta.to_be_bytes();
        [self.index, e_hi, e_lo, s_hi, s_lo, self.checksum]
    }
}

/// A decoded legacy frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyFrame {
    pub header: u8,
    pub encoder_delta: i16,
    pub stepper_delta: i16,
}

impl LegacyFrame {
    /// Message kind from the header
    pub fn kind(&self) -> HeaderKind {
        HeaderKind::from_header(self.header)
    }

    /// Index carried in the header, reduced to the legacy index range
    pub fn index(&self) -> u8 {
        (self.header & HEADER_INDEX_MASK) % LEGACY_INDEX_MODULUS
    }
}

/// Recoverable per-frame faults
///
/// These are counted and acknowledged by the link session; they never end it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameFault {
    /// Computed CRC differs from the received checksum byte
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{received:02X}")]
    ChecksumMismatch { expected: u8, received: u8 },

    /// Frame index differs from the expected sequence index
    #[error("index mismatch: expected {expected}, got {received}")]
    IndexMismatch { expected: u8, received: u8 },

    /// Legacy header does not match any acceptable pattern
    #[error("unexpected header 0x{header:02X} (expected index {expected})")]
    UnexpectedHeader { header: u8, expected: u8 },
}

/// A sample handed from the link session to the telemetry deriver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSample {
    /// Sequence index of the originating frame
    pub index: u8,
    pub encoder_delta: i16,
    pub stepper_delta: i16,
    /// Checksum and index both matched
    pub valid: bool,
    /// 1 when this frame was counted as a bad message
    pub bad_count_increment: u8,
    /// Frame bytes as received
    pub raw: Bytes,
    /// Locally computed checksum, present when the frame was invalid
    pub expected_crc: Option<u8>,
}

impl RawSample {
    /// A sample from a frame that passed every check
    pub fn valid(index: u8, encoder_delta: i16, stepper_delta: i16, raw: Bytes) -> Self {
        Self {
            index,
            encoder_delta,
            stepper_delta,
            valid: true,
            bad_count_increment: 0,
            raw,
            expected_crc: None,
        }
    }
}
