//! HEADER frame builder.
//!
//! A header frame carries free-form ASCII text describing the device, framed by the
//! common prefix and a CHK trailer (IEEE C37.118.2-2011 Table 7).

use super::common::{FrameType, ParseError, PrefixFrame, PREFIX_SIZE};
use super::config::GlobalConfig;
use super::cursor::FrameWriter;
use super::utils::{now_timestamp, validate_checksum};

/// Prefix plus CHK.
pub const HEADER_COMMON_SIZE: usize = PREFIX_SIZE + 2;

/// Builds a HEADER frame stamped with the current time.
///
/// IDCODE comes from `config` and FRACSEC is scaled to its TIME_BASE. The text is sent as
/// given, without padding.
///
/// # Returns
///
/// * `Ok(Vec<u8>)`: The frame, FRAMESIZE equal to `16 + text.len()`.
/// * `Err(ParseError::InvalidHeader)`: No text was supplied.
/// * `Err(ParseError::InvalidLength)`: The text does not fit in one frame.
pub fn build(config: &GlobalConfig, text: Option<&str>) -> Result<Vec<u8>, ParseError> {
    let (soc, fracsec) = now_timestamp(config.time_base(), 0);
    build_at(config, text, soc, fracsec)
}

/// Builds a HEADER frame with an explicit SOC/FRACSEC pair.
pub fn build_at(
    config: &GlobalConfig,
    text: Option<&str>,
    soc: u32,
    fracsec: u32,
) -> Result<Vec<u8>, ParseError> {
    let text = text.ok_or_else(|| ParseError::InvalidHeader {
        message: "Header frame text is missing".to_string(),
    })?;

    let mut writer = FrameWriter::new();
    writer.put_u16(FrameType::Header.sync())?;
    writer.put_u16(0)?;
    writer.put_u16(config.id_code())?;
    writer.put_u32(soc)?;
    writer.put_u32(fracsec)?;
    writer.put_slice(text.as_bytes())?;
    writer.seal()
}

/// Extracts the text of a HEADER frame after checking its SYNC, FRAMESIZE and CHK.
pub fn parse_text(frame: &[u8]) -> Result<String, ParseError> {
    if frame.len() < HEADER_COMMON_SIZE {
        return Err(ParseError::InvalidLength {
            message: format!(
                "HeaderFrame: expected at least {} bytes, got {}",
                HEADER_COMMON_SIZE,
                frame.len()
            ),
        });
    }
    validate_checksum(frame)?;
    let prefix = PrefixFrame::from_hex(frame)?;
    if prefix.frame_type()? != FrameType::Header {
        return Err(ParseError::InvalidFrameType {
            message: format!("Expected a header frame, got SYNC 0x{:04X}", prefix.sync),
        });
    }
    if prefix.framesize as usize != frame.len() {
        return Err(ParseError::InvalidLength {
            message: format!(
                "HeaderFrame: expected framesize of {} bytes, got {}",
                prefix.framesize,
                frame.len()
            ),
        });
    }
    Ok(String::from_utf8_lossy(&frame[PREFIX_SIZE..frame.len() - 2]).into_owned())
}
