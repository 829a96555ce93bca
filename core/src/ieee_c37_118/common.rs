//! # IEEE C37.118 Common Types and Utilities
//!
//! This module defines the types shared by every IEEE C37.118.2-2011 frame this device
//! produces or consumes: the parse error, the frame type carried in the SYNC word, the
//! 14-byte prefix common to all frames, and fixed-offset readers for the header fields.
//!
//! ## Key Components
//!
//! - `ParseError`: Enumerates errors encountered while decoding or encoding frames.
//! - `FrameType`: Frame kinds identified by the second SYNC byte.
//! - `PrefixFrame`: SYNC, FRAMESIZE, IDCODE, SOC and FRACSEC.
//! - `classify_type`, `frame_size`, `id_code`, `time_seconds`, `frac_of_second`: Header
//!   field extraction over raw buffers.
//!
//! ## Usage
//!
//! The field readers accept buffers either starting at SYNC (`includes_header = true`) or
//! starting right after the SYNC + FRAMESIZE block, which is how the protocol server holds
//! a request once the first 4 bytes have been consumed.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Leading byte of every SYNC word.
pub const SYNC_BYTE: u8 = 0xAA;

/// Size of SYNC + FRAMESIZE + IDCODE + SOC + FRACSEC.
pub const PREFIX_SIZE: usize = 14;

/// Represents errors that can occur while handling IEEE C37.118 frames.
///
/// # Variants
///
/// * `InvalidLength`: Buffer too short, or a count/size outside the legal range.
/// * `InvalidFrameType`: SYNC word does not name the expected frame kind.
/// * `InvalidChecksum`: CRC checksum does not match the calculated value.
/// * `InvalidFormat`: Frame content does not conform to the standard.
/// * `InvalidHeader`: Header frame content is missing or malformed.
/// * `IndexOutOfRange`: A 1-based PMU or channel index exceeds its count.
/// * `InvalidMeasurementType`: A measurement type tag outside the allowed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid length: {message}")]
    InvalidLength { message: String },
    #[error("Invalid frame type: {message}")]
    InvalidFrameType { message: String },
    #[error("Invalid checksum: {message}")]
    InvalidChecksum { message: String },
    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },
    #[error("Invalid header: {message}")]
    InvalidHeader { message: String },
    #[error("Index out of range: {message}")]
    IndexOutOfRange { message: String },
    #[error("Invalid measurement type: {message}")]
    InvalidMeasurementType { message: String },
}

impl ParseError {
    pub(crate) fn index(what: &str, index: usize, count: usize) -> Self {
        ParseError::IndexOutOfRange {
            message: format!("{} index {} outside 1..={}", what, index, count),
        }
    }
}

/// Represents the type of an IEEE C37.118 frame.
///
/// The discriminant is the second SYNC byte as transmitted by this device.
///
/// # Variants
///
/// * `Data`: Data frame containing synchrophasor measurements (0x01).
/// * `Header`: Header frame with descriptive text (0x11).
/// * `Config1`: Configuration frame 1, device capabilities (0x21).
/// * `Config2`: Configuration frame 2, current configuration (0x31).
/// * `Command`: Command frame for control instructions (0x41).
/// * `Config3`: Configuration frame 3, extended configuration (0x52).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    Data,
    Header,
    Config1,
    Config2,
    Command,
    Config3,
}

impl FrameType {
    /// Maps the second SYNC byte to a frame type.
    pub fn from_type_byte(byte: u8) -> Option<FrameType> {
        match byte {
            0x01 => Some(FrameType::Data),
            0x11 => Some(FrameType::Header),
            0x21 => Some(FrameType::Config1),
            0x31 => Some(FrameType::Config2),
            0x41 => Some(FrameType::Command),
            0x52 => Some(FrameType::Config3),
            _ => None,
        }
    }

    /// Second SYNC byte for this frame type.
    pub fn type_byte(self) -> u8 {
        match self {
            FrameType::Data => 0x01,
            FrameType::Header => 0x11,
            FrameType::Config1 => 0x21,
            FrameType::Config2 => 0x31,
            FrameType::Command => 0x41,
            FrameType::Config3 => 0x52,
        }
    }

    /// Full 16-bit SYNC word for this frame type.
    pub fn sync(self) -> u16 {
        ((SYNC_BYTE as u16) << 8) | self.type_byte() as u16
    }

    /// Extracts the frame type from a SYNC word.
    ///
    /// # Returns
    ///
    /// * `Ok(FrameType)`: The corresponding frame type.
    /// * `Err(ParseError::InvalidFrameType)`: If the leading byte is not 0xAA or the type
    ///   byte is unknown.
    pub fn from_sync(sync: u16) -> Result<FrameType, ParseError> {
        let [lead, kind] = sync.to_be_bytes();
        if lead != SYNC_BYTE {
            return Err(ParseError::InvalidFrameType {
                message: format!("Invalid first byte: 0x{:02X}, expected 0xAA", lead),
            });
        }
        FrameType::from_type_byte(kind).ok_or_else(|| ParseError::InvalidFrameType {
            message: format!("Invalid frame type byte: 0x{:02X}", kind),
        })
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::Data => write!(f, "IEEE Std C37.118 Data Frame"),
            FrameType::Header => write!(f, "IEEE Std C37.118 Header Frame"),
            FrameType::Config1 => write!(f, "IEEE Std C37.118 Configuration Frame 1"),
            FrameType::Config2 => write!(f, "IEEE Std C37.118 Configuration Frame 2"),
            FrameType::Config3 => write!(f, "IEEE Std C37.118 Configuration Frame 3"),
            FrameType::Command => write!(f, "IEEE Std C37.118 Command Frame"),
        }
    }
}

/// Classifies a raw buffer by its SYNC word.
///
/// Returns `None` (the INVALID kind) when the buffer is shorter than 2 bytes, does not
/// start with 0xAA, or carries an unknown type byte.
pub fn classify_type(bytes: &[u8]) -> Option<FrameType> {
    match bytes {
        [SYNC_BYTE, kind, ..] => FrameType::from_type_byte(*kind),
        _ => None,
    }
}

fn read_be<const N: usize>(bytes: &[u8], offset: usize, field: &str) -> Result<[u8; N], ParseError> {
    bytes
        .get(offset..offset + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| ParseError::InvalidLength {
            message: format!(
                "{}: need {} bytes at offset {}, buffer has {}",
                field,
                N,
                offset,
                bytes.len()
            ),
        })
}

#[inline]
fn header_skip(includes_header: bool) -> usize {
    if includes_header {
        4
    } else {
        0
    }
}

/// Reads FRAMESIZE, the big-endian word at offset 2 of a frame.
pub fn frame_size(bytes: &[u8]) -> Result<u16, ParseError> {
    read_be::<2>(bytes, 2, "FRAMESIZE").map(u16::from_be_bytes)
}

/// Reads IDCODE.
///
/// # Parameters
///
/// * `bytes`: Frame bytes.
/// * `includes_header`: `true` if `bytes` starts at SYNC, `false` if the SYNC + FRAMESIZE
///   block has already been stripped.
pub fn id_code(bytes: &[u8], includes_header: bool) -> Result<u16, ParseError> {
    read_be::<2>(bytes, header_skip(includes_header), "IDCODE").map(u16::from_be_bytes)
}

/// Reads SOC, seconds since the Unix epoch.
pub fn time_seconds(bytes: &[u8], includes_header: bool) -> Result<u32, ParseError> {
    read_be::<4>(bytes, header_skip(includes_header) + 2, "SOC").map(u32::from_be_bytes)
}

/// Reads FRACSEC.
///
/// With a non-zero `time_base` the 24-bit fraction is rescaled to nanoseconds
/// (`raw * 1e9 / time_base`); with zero the raw 32-bit word, quality byte included, is
/// returned unchanged.
pub fn frac_of_second(bytes: &[u8], time_base: u32, includes_header: bool) -> Result<u64, ParseError> {
    let raw = read_be::<4>(bytes, header_skip(includes_header) + 6, "FRACSEC").map(u32::from_be_bytes)?;
    if time_base == 0 {
        return Ok(raw as u64);
    }
    Ok((raw & 0x00FF_FFFF) as u64 * 1_000_000_000 / time_base as u64)
}

/// Represents the common prefix structure for IEEE C37.118 frames.
///
/// # Fields
///
/// * `sync`: 16-bit SYNC word (0xAA + frame type byte).
/// * `framesize`: Total frame length in bytes, CHK included.
/// * `idcode`: Device or stream identification code.
/// * `soc`: Seconds since the Unix epoch.
/// * `fracsec`: Fraction of second; the top byte holds leap second and quality flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixFrame {
    pub sync: u16,
    pub framesize: u16,
    pub idcode: u16,
    pub soc: u32,
    pub fracsec: u32,
}

impl PrefixFrame {
    /// Creates a prefix for `frame_type` with zeroed time fields.
    pub fn new(frame_type: FrameType, idcode: u16) -> Self {
        PrefixFrame {
            sync: frame_type.sync(),
            framesize: PREFIX_SIZE as u16,
            idcode,
            soc: 0,
            fracsec: 0,
        }
    }

    /// Parses a `PrefixFrame` from the first 14 bytes of a frame.
    ///
    /// # Returns
    ///
    /// * `Ok(PrefixFrame)`: The parsed prefix.
    /// * `Err(ParseError)`: If the slice is too short or the SYNC word is invalid.
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < PREFIX_SIZE {
            return Err(ParseError::InvalidLength {
                message: format!(
                    "Too few bytes to parse PrefixFrame: Expected at least 14 bytes, but got {}",
                    bytes.len()
                ),
            });
        }
        let sync = u16::from_be_bytes([bytes[0], bytes[1]]);
        FrameType::from_sync(sync)?;

        Ok(PrefixFrame {
            sync,
            framesize: frame_size(bytes)?,
            idcode: id_code(bytes, true)?,
            soc: time_seconds(bytes, true)?,
            fracsec: u32::from_be_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]),
        })
    }

    /// Converts the `PrefixFrame` to its 14-byte wire form.
    pub fn to_hex(&self) -> [u8; PREFIX_SIZE] {
        let mut result = [0u8; PREFIX_SIZE];
        result[0..2].copy_from_slice(&self.sync.to_be_bytes());
        result[2..4].copy_from_slice(&self.framesize.to_be_bytes());
        result[4..6].copy_from_slice(&self.idcode.to_be_bytes());
        result[6..10].copy_from_slice(&self.soc.to_be_bytes());
        result[10..14].copy_from_slice(&self.fracsec.to_be_bytes());
        result
    }

    /// Frame type named by the SYNC word.
    pub fn frame_type(&self) -> Result<FrameType, ParseError> {
        FrameType::from_sync(self.sync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_type() {
        assert_eq!(classify_type(&[0xAA, 0x01]), Some(FrameType::Data));
        assert_eq!(classify_type(&[0xAA, 0x11, 0x00]), Some(FrameType::Header));
        assert_eq!(classify_type(&[0xAA, 0x21]), Some(FrameType::Config1));
        assert_eq!(classify_type(&[0xAA, 0x31]), Some(FrameType::Config2));
        assert_eq!(classify_type(&[0xAA, 0x41]), Some(FrameType::Command));
        assert_eq!(classify_type(&[0xAA, 0x52]), Some(FrameType::Config3));
        assert_eq!(classify_type(&[0xAB, 0x41]), None);
        assert_eq!(classify_type(&[0xAA, 0x42]), None);
        assert_eq!(classify_type(&[0xAA]), None);
    }

    #[test]
    fn test_sync_round_trip() {
        for frame_type in [
            FrameType::Data,
            FrameType::Header,
            FrameType::Config1,
            FrameType::Config2,
            FrameType::Command,
            FrameType::Config3,
        ] {
            assert_eq!(frame_type.sync() >> 8, 0xAA);
            assert_eq!(FrameType::from_sync(frame_type.sync()), Ok(frame_type));
        }
        assert!(FrameType::from_sync(0x5541).is_err());
    }

    #[test]
    fn test_header_field_offsets() {
        // SYNC, FRAMESIZE=18, IDCODE=7, SOC=0x01020304, FRACSEC=0x000001F4
        let frame = [
            0xAA, 0x41, 0x00, 0x12, 0x00, 0x07, 0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x01, 0xF4,
        ];
        assert_eq!(frame_size(&frame), Ok(18));
        assert_eq!(id_code(&frame, true), Ok(7));
        assert_eq!(id_code(&frame[4..], false), Ok(7));
        assert_eq!(time_seconds(&frame, true), Ok(0x0102_0304));
        assert_eq!(time_seconds(&frame[4..], false), Ok(0x0102_0304));
        assert_eq!(frac_of_second(&frame, 0, true), Ok(500));
        // 500 counts of a 1000 time base is half a second
        assert_eq!(frac_of_second(&frame, 1000, true), Ok(500_000_000));
        assert_eq!(frac_of_second(&frame[4..], 1000, false), Ok(500_000_000));
        assert!(frame_size(&frame[..3]).is_err());
        assert!(frac_of_second(&frame[..12], 0, true).is_err());
    }

    #[test]
    fn test_frac_of_second_ignores_quality_byte() {
        // FRACSEC quality flags 0x0F over a fraction of 500
        let frame = [
            0xAA, 0x01, 0x00, 0x12, 0x00, 0x07, 0x00, 0x00, 0x00, 0x00, 0x0F, 0x00, 0x01, 0xF4,
        ];
        assert_eq!(frac_of_second(&frame, 1000, true), Ok(500_000_000));
        assert_eq!(frac_of_second(&frame, 0, true), Ok(0x0F00_01F4));
    }

    #[test]
    fn test_prefix_round_trip() {
        let prefix = PrefixFrame {
            sync: FrameType::Config2.sync(),
            framesize: 100,
            idcode: 60,
            soc: 1_149_580_800,
            fracsec: 0x5600_4000,
        };
        let bytes = prefix.to_hex();
        assert_eq!(&bytes[0..2], &[0xAA, 0x31]);
        assert_eq!(PrefixFrame::from_hex(&bytes), Ok(prefix));
        assert!(PrefixFrame::from_hex(&bytes[..13]).is_err());
    }
}
