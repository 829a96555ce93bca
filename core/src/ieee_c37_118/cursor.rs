//! Bounds-checked big-endian reader and writer used by every frame codec.
//!
//! `FrameReader` never reads past the end of its slice and `FrameWriter` never grows past
//! an optional byte limit; both report `ParseError::InvalidLength` instead.

use super::common::ParseError;
use super::utils::calculate_crc;
use bytes::{Buf, BufMut};

/// Largest frame expressible in the 16-bit FRAMESIZE field.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

#[derive(Debug)]
pub struct FrameReader<'a> {
    buf: &'a [u8],
    len: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        FrameReader {
            buf,
            len: buf.len(),
        }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.len - self.buf.remaining()
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, n: usize, field: &str) -> Result<(), ParseError> {
        if self.buf.remaining() < n {
            return Err(ParseError::InvalidLength {
                message: format!(
                    "{}: need {} bytes at offset {}, only {} left",
                    field,
                    n,
                    self.position(),
                    self.buf.remaining()
                ),
            });
        }
        Ok(())
    }

    pub fn read_u16(&mut self, field: &str) -> Result<u16, ParseError> {
        self.ensure(2, field)?;
        Ok(self.buf.get_u16())
    }

    pub fn read_i16(&mut self, field: &str) -> Result<i16, ParseError> {
        self.ensure(2, field)?;
        Ok(self.buf.get_i16())
    }

    pub fn read_u32(&mut self, field: &str) -> Result<u32, ParseError> {
        self.ensure(4, field)?;
        Ok(self.buf.get_u32())
    }

    pub fn read_f32(&mut self, field: &str) -> Result<f32, ParseError> {
        self.ensure(4, field)?;
        Ok(self.buf.get_f32())
    }

    pub fn read_bytes(&mut self, n: usize, field: &str) -> Result<&'a [u8], ParseError> {
        self.ensure(n, field)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }
}

#[derive(Debug, Default)]
pub struct FrameWriter {
    buf: Vec<u8>,
    limit: Option<usize>,
}

impl FrameWriter {
    pub fn new() -> Self {
        FrameWriter::default()
    }

    /// Writer that refuses to grow beyond `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        FrameWriter {
            buf: Vec::with_capacity(limit),
            limit: Some(limit),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn reserve(&self, n: usize) -> Result<(), ParseError> {
        let limit = self.limit.unwrap_or(MAX_FRAME_SIZE);
        if self.buf.len() + n > limit {
            return Err(ParseError::InvalidLength {
                message: format!(
                    "Write of {} bytes at offset {} exceeds frame limit of {}",
                    n,
                    self.buf.len(),
                    limit
                ),
            });
        }
        Ok(())
    }

    pub fn put_u16(&mut self, value: u16) -> Result<(), ParseError> {
        self.reserve(2)?;
        self.buf.put_u16(value);
        Ok(())
    }

    pub fn put_i16(&mut self, value: i16) -> Result<(), ParseError> {
        self.reserve(2)?;
        self.buf.put_i16(value);
        Ok(())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<(), ParseError> {
        self.reserve(4)?;
        self.buf.put_u32(value);
        Ok(())
    }

    pub fn put_f32(&mut self, value: f32) -> Result<(), ParseError> {
        self.reserve(4)?;
        self.buf.put_f32(value);
        Ok(())
    }

    pub fn put_slice(&mut self, bytes: &[u8]) -> Result<(), ParseError> {
        self.reserve(bytes.len())?;
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Returns the bytes written so far without a trailer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Completes a frame: patches FRAMESIZE (offset 2) with the final length, CHK
    /// included, and appends the CRC over every preceding byte.
    pub fn seal(mut self) -> Result<Vec<u8>, ParseError> {
        if self.buf.len() < 4 {
            return Err(ParseError::InvalidLength {
                message: format!("Cannot seal a {} byte frame", self.buf.len()),
            });
        }
        self.reserve(2)?;
        let total = self.buf.len() + 2;
        let framesize = u16::try_from(total).map_err(|_| ParseError::InvalidLength {
            message: format!("Frame of {} bytes exceeds FRAMESIZE range", total),
        })?;
        self.buf[2..4].copy_from_slice(&framesize.to_be_bytes());
        let crc = calculate_crc(&self.buf);
        self.buf.put_u16(crc);
        Ok(self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ieee_c37_118::utils::validate_checksum;

    #[test]
    fn test_reader_fails_closed() {
        let bytes = [0x00, 0x01, 0x3F, 0x80, 0x00, 0x00, 0xFF];
        let mut reader = FrameReader::new(&bytes);
        assert_eq!(reader.read_u16("a"), Ok(1));
        assert_eq!(reader.read_f32("b"), Ok(1.0));
        assert_eq!(reader.position(), 6);
        assert!(reader.read_u16("c").is_err());
        // a failed read consumes nothing
        assert_eq!(reader.remaining(), 1);
        assert_eq!(reader.read_bytes(1, "d"), Ok(&[0xFF][..]));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_writer_limit_and_seal() {
        let mut writer = FrameWriter::with_limit(8);
        writer.put_u16(0xAA41).unwrap();
        writer.put_u16(0).unwrap();
        writer.put_u16(7).unwrap();
        assert!(writer.put_u32(1).is_err());
        assert_eq!(writer.len(), 6);
        let frame = writer.seal().unwrap();
        assert_eq!(frame.len(), 8);
        assert_eq!(u16::from_be_bytes([frame[2], frame[3]]), 8);
        assert!(validate_checksum(&frame).is_ok());
    }

    #[test]
    fn test_seal_rejects_overflowing_frame() {
        let mut writer = FrameWriter::new();
        writer.put_slice(&vec![0u8; MAX_FRAME_SIZE - 1]).unwrap();
        assert!(writer.seal().is_err());
    }
}
