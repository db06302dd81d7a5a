//! # Frame Encoder
//!
//! Builds wire frames. The host never sends data frames; these are used to
//! drive simulated peers and by tests.

use super::crc::crc8;
use super::protocol::*;

/// Encode a checked frame
///
/// # Arguments
///
/// * `index` - Sequence index (reduced modulo 128)
/// * `encoder_delta` - Encoder counts since the previous frame
/// * `stepper_delta` - Stepper steps since the previous frame
///
/// # Returns
///
/// * `[u8; 6]` - index + encoder (BE) + stepper (BE) + CRC8 over the first 5 bytes
///
/// # Examples
///
/// ```
/// use extrusion_analyser::link::encoder::encode_frame;
/// use extrusion_analyser::link::crc::crc8;
///
/// let frame = encode_frame(3, 10, -10);
/// assert_eq!(frame[0], 3);
/// assert_eq!(frame[5], crc8(&frame[..5]));
/// ```
pub fn encode_frame(index: u8, encoder_delta: i16, stepper_delta: i16) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = index % INDEX_MODULUS;
    frame[1..3].copy_from_slice(&encoder_delta.to_be_bytes());
    frame[3..5].copy_from_slice(&stepper_delta.to_be_bytes());
    frame[5] = crc8(&frame[..FRAME_CRC_SPAN]);
    frame
}

/// Encode a legacy data frame with the normal header for `index`
pub fn encode_legacy_frame(index: u8, encoder_delta: i16, stepper_delta: i16) -> [u8; LEGACY_FRAME_LEN] {
    encode_legacy_with_header(index % LEGACY_INDEX_MODULUS, encoder_delta, stepper_delta)
}

/// Encode a legacy frame with an arbitrary header byte
pub fn encode_legacy_with_header(header: u8, encoder_delta: i16, stepper_delta: i16) -> [u8; LEGACY_FRAME_LEN] {
    let [e_hi, e_lo] = encoder_delta.to_be_bytes();
    let [s_hi, s_lo] = stepper_delta.to_be_bytes();
    [header, e_hi, e_lo, s_hi, s_lo]
}
