//! # IEEE C37.118 Frame Integrity and Time Utilities
//!
//! This module provides the CRC-CCITT checksum shared by every frame kind, as specified in
//! IEEE C37.118.2-2011 Appendix B, together with helpers for stamping frames with the
//! SOC/FRACSEC time pair.
//!
//! The checksum can be computed over a complete frame, or over a frame body whose leading
//! SYNC and FRAMESIZE words arrived separately (the server reads those 4 bytes first and
//! the rest of the frame afterwards).

use super::common::ParseError;
use chrono::Utc;

/// Length of the SYNC + FRAMESIZE block that opens every frame.
pub const HEADER_BLOCK_SIZE: usize = 4;

/// Feeds one byte into the running CRC-CCITT value.
#[inline]
fn crc_update(crc: u16, byte: u8) -> u16 {
    let temp = (crc >> 8) ^ byte as u16;
    let mut crc = crc << 8;
    let mut quick = temp ^ (temp >> 4);
    crc ^= quick;
    quick <<= 5;
    crc ^= quick;
    quick <<= 7;
    crc ^ quick
}

/// Calculates the CRC-CCITT checksum for a given buffer.
///
/// Initial value 0xFFFF, no final XOR, processed one byte at a time.
///
/// # Parameters
///
/// * `buffer`: The input byte slice to calculate the CRC for.
///
/// # Returns
///
/// The calculated 16-bit CRC checksum.
pub fn calculate_crc(buffer: &[u8]) -> u16 {
    buffer.iter().fold(0xFFFF, |crc, &byte| crc_update(crc, byte))
}

/// Calculates the CRC-CCITT checksum of a frame body, optionally preceded by the 4-byte
/// header block that was read off the wire separately.
///
/// # Parameters
///
/// * `header`: SYNC + FRAMESIZE bytes folded in before `body`, if any.
/// * `body`: The remaining bytes covered by the checksum.
///
/// # Returns
///
/// The same value `calculate_crc` would return over `header ++ body`.
pub fn calculate_crc_with_header(header: Option<&[u8; HEADER_BLOCK_SIZE]>, body: &[u8]) -> u16 {
    let crc = header.map_or(0xFFFF, |h| {
        h.iter().fold(0xFFFF, |crc, &byte| crc_update(crc, byte))
    });
    body.iter().fold(crc, |crc, &byte| crc_update(crc, byte))
}

/// Reads a big-endian 16-bit word at `offset`.
///
/// # Returns
///
/// * `Ok(u16)`: The word, typically a transmitted CHK value.
/// * `Err(ParseError::InvalidLength)`: If fewer than 2 bytes remain at `offset`.
pub fn get_crc(buffer: &[u8], offset: usize) -> Result<u16, ParseError> {
    match buffer.get(offset..offset + 2) {
        Some(word) => Ok(u16::from_be_bytes([word[0], word[1]])),
        None => Err(ParseError::InvalidLength {
            message: format!(
                "Cannot read CRC at offset {} of a {} byte buffer",
                offset,
                buffer.len()
            ),
        }),
    }
}

/// Validates the checksum of a given buffer.
///
/// Checks if the buffer's last two bytes match the calculated CRC-CCITT checksum
/// for the preceding bytes.
///
/// # Returns
///
/// * `Ok(())` if the checksum is valid.
/// * `Err(ParseError::InvalidLength)` if the buffer is too short.
/// * `Err(ParseError::InvalidChecksum)` if the checksum does not match.
pub fn validate_checksum(buffer: &[u8]) -> Result<(), ParseError> {
    validate_checksum_with_header(None, buffer)
}

/// Validates a frame body whose header block was received separately.
///
/// `body` ends with the transmitted CHK word; the checksum is computed over
/// `header ++ body[..len - 2]`.
pub fn validate_checksum_with_header(
    header: Option<&[u8; HEADER_BLOCK_SIZE]>,
    body: &[u8],
) -> Result<(), ParseError> {
    if body.len() < 2 {
        return Err(ParseError::InvalidLength {
            message: format!("Buffer too short: {}", body.len()),
        });
    }

    let calculated_crc = calculate_crc_with_header(header, &body[..body.len() - 2]);
    let frame_crc = get_crc(body, body.len() - 2)?;

    if calculated_crc != frame_crc {
        return Err(ParseError::InvalidChecksum {
            message: format!(
                "CRC Checksum Mismatch: Expected {:04X}, got {:04X}",
                calculated_crc, frame_crc
            ),
        });
    }
    Ok(())
}

/// Produces the current `(soc, fracsec)` pair for a frame.
///
/// The fraction is the elapsed part of the current second expressed in `time_base`
/// counts and masked to 24 bits. The top byte of `previous_fracsec` (leap second and
/// time quality flags) is carried over untouched.
///
/// # Parameters
///
/// * `time_base`: Counts per second used by the configuration.
/// * `previous_fracsec`: The FRACSEC word being replaced.
pub fn now_timestamp(time_base: u32, previous_fracsec: u32) -> (u32, u32) {
    let now = Utc::now();
    let seconds = now.timestamp() as u32;
    // chrono reports leap seconds as nanos >= 1e9
    let nanos = now.timestamp_subsec_nanos().min(999_999_999);
    (seconds, scale_nanos(nanos, time_base, previous_fracsec))
}

/// Scales nanoseconds-within-second to a FRACSEC word, keeping the quality byte.
pub fn scale_nanos(nanos: u32, time_base: u32, previous_fracsec: u32) -> u32 {
    let counts = ((nanos as u64 * time_base as u64) / 1_000_000_000) as u32 & 0x00FF_FFFF;
    (previous_fracsec & 0xFF00_0000) | counts
}

/// Converts a SOC/FRACSEC pair to nanoseconds since the Unix epoch.
///
/// Only the low 24 bits of `fracsec` carry the fraction; a zero `time_base` yields the
/// whole second.
pub fn timestamp_nanos(soc: u32, fracsec: u32, time_base: u32) -> i64 {
    let fraction = (fracsec & 0x00FF_FFFF) as i64;
    let sub = if time_base == 0 {
        0
    } else {
        fraction * 1_000_000_000 / time_base as i64
    };
    soc as i64 * 1_000_000_000 + sub
}
