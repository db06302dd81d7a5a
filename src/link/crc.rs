//! # CRC-8 Implementation
//!
//! Table-driven CRC-8 used by the checked frame protocol.
//!
//! **Polynomial**: 0x83 (x^8 + x^7 + x + 1)
//! **Initial Value**: 0x00
//!
//! The extruder firmware computes the same table and folding order, so any
//! deviation here shows up as a checksum mismatch on every frame.

/// Link CRC-8 polynomial
pub const CRC8_POLY: u8 = 0x83;

/// Precomputed CRC8 lookup table for the link polynomial
pub const CRC8_TABLE: [u8; 256] = build_table(CRC8_POLY);

/// Build a CRC8 lookup table for `polynomial`
///
/// Evaluated at compile time for [`CRC8_TABLE`].
///
/// # Examples
///
/// ```
/// use extrusion_analyser::link::crc::{build_table, CRC8_POLY, CRC8_TABLE};
///
/// assert_eq!(build_table(CRC8_POLY), CRC8_TABLE);
/// ```
pub const fn build_table(polynomial: u8) -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ polynomial;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Calculate a CRC8 checksum with the given lookup table
///
/// # Arguments
///
/// * `data` - Byte slice to calculate CRC for
/// * `table` - Lookup table from [`build_table`]
///
/// # Returns
///
/// * `u8` - Calculated CRC8 checksum
pub fn checksum(data: &[u8], table: &[u8; 256]) -> u8 {
    let mut crc: u8 = 0;

    for &byte in data {
        crc = table[(byte ^ crc) as usize];
    }

    crc
}

/// Calculate the link CRC8 (polynomial 0x83)
///
/// # Examples
///
/// ```
/// use extrusion_analyser::link::crc::crc8;
///
/// assert_eq!(crc8(&[]), 0x00);
/// assert_eq!(crc8(&[0x01]), 0x83);
/// ```
pub fn crc8(data: &[u8]) -> u8 {
    checksum(data, &CRC8_TABLE)
}

/// Bitwise CRC8 (slow, for verifying the table)
#[cfg(test)]
fn crc8_slow(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;

    for &byte in data {
        crc ^= byte;

        for _ in 0..8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ CRC8_POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}
