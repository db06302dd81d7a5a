//! # Frame Decoder
//!
//! Decodes and validates checked and legacy frames.

use super::crc::checksum;
use super::protocol::*;
use crate::error::{AnalyserError, Result};

/// Decode a checked frame
///
/// Does not validate the checksum; see [`validate`].
///
/// # Errors
///
/// Returns [`AnalyserError::MalformedFrame`] unless `bytes` is exactly 6 bytes long.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    if bytes.len() != FRAME_LEN {
        return Err(AnalyserError::MalformedFrame {
            expected: FRAME_LEN,
            actual: bytes.len(),
        });
    }

    Ok(Frame {
        index: bytes[0],
        encoder_delta: i16::from_be_bytes([bytes[1], bytes[2]]),
        stepper_delta: i16::from_be_bytes([bytes[3], bytes[4]]),
        checksum: bytes[5],
    })
}

/// CRC8 the peer should have sent for `frame`
pub fn expected_checksum(frame: &Frame, table: &[u8; 256]) -> u8 {
    checksum(&frame.to_bytes()[..FRAME_CRC_SPAN], table)
}

/// Check a frame's checksum byte against its contents
pub fn validate(frame: &Frame, table: &[u8; 256]) -> bool {
    expected_checksum(frame, table) == frame.checksum
}

/// Check a frame's checksum, reporting the mismatch
///
/// # Errors
///
/// Returns [`FrameFault::ChecksumMismatch`] when the checksum byte is wrong.
pub fn verify(frame: &Frame, table: &[u8; 256]) -> std::result::Result<(), FrameFault> {
    let expected = expected_checksum(frame, table);
    if expected != frame.checksum {
        return Err(FrameFault::ChecksumMismatch {
            expected,
            received: frame.checksum,
        });
    }
    Ok(())
}

/// Whether `bytes` is exactly the break sentinel
pub fn is_break(bytes: &[u8]) -> bool {
    bytes == BREAK_SENTINEL
}

/// Offset of the first break sentinel in `buf`, if any
pub fn find_break(buf: &[u8]) -> Option<usize> {
    buf.windows(FRAME_LEN).position(is_break)
}

/// Decode a legacy frame
///
/// # Errors
///
/// Returns [`AnalyserError::MalformedFrame`] unless `bytes` is exactly 5 bytes long.
pub fn decode_legacy_frame(bytes: &[u8]) -> Result<LegacyFrame> {
    if bytes.len() != LEGACY_FRAME_LEN {
        return Err(AnalyserError::MalformedFrame {
            expected: LEGACY_FRAME_LEN,
            actual: bytes.len(),
        });
    }

    Ok(LegacyFrame {
        header: bytes[0],
        encoder_delta: i16::from_be_bytes([bytes[1], bytes[2]]),
        stepper_delta: i16::from_be_bytes([bytes[3], bytes[4]]),
    })
}

/// Render bytes as space separated upper-case hex, e.g. `05 00 0A 00 0A 3C`
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
