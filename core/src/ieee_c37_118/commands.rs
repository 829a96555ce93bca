//! # IEEE C37.118 Command Frame Utilities
//!
//! This module classifies and builds IEEE C37.118.2-2011 command frames, the requests a
//! PDC sends to start or stop the data stream and to ask for header or configuration
//! frames.
//!
//! ## Key Components
//!
//! - `CommandType`: Classification of a 16-bit CMD word, including the user-defined and
//!   invalid ranges.
//! - `CommandFrame`: A complete command frame: prefix, CMD word, optional extended data
//!   and CHK.
//! - `classify_command`: Reads the CMD word straight out of a received buffer.
//!
//! ## Usage
//!
//! The protocol server uses `classify_command` on every request that passed its CRC
//! check. `CommandFrame` builds valid requests for clients and tests.

use super::common::{FrameType, ParseError, PrefixFrame, PREFIX_SIZE};
use super::cursor::FrameWriter;
use super::utils::validate_checksum;
use std::fmt;

/// Prefix, CMD word and CHK.
pub const COMMAND_MINIMUM_FRAME_SIZE: usize = 18;

/// Offset of the CMD word in a frame that starts at SYNC.
pub const COMMAND_OFFSET: usize = COMMAND_MINIMUM_FRAME_SIZE - 4;

/// Enumerates command types for IEEE C37.118 command frames.
///
/// # Variants
///
/// * `TurnOffTransmission`: Stops real-time data transmission (0x0001).
/// * `TurnOnTransmission`: Starts real-time data transmission (0x0002).
/// * `SendHeaderFrame`: Requests a header frame (0x0003).
/// * `SendConfigFrame1`: Requests configuration frame 1 (0x0004).
/// * `SendConfigFrame2`: Requests configuration frame 2 (0x0005).
/// * `SendConfigFrame3`: Requests configuration frame 3 (0x0006).
/// * `SendExtendedFrame`: Extended frame (0x0008).
/// * `User`: User-defined code, bits 8-11 all set.
/// * `Invalid`: Reserved or undefined code.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CommandType {
    TurnOffTransmission,
    TurnOnTransmission,
    SendHeaderFrame,
    SendConfigFrame1,
    SendConfigFrame2,
    SendConfigFrame3,
    SendExtendedFrame,
    User(u16),
    Invalid(u16),
}

impl CommandType {
    /// Classifies a CMD word.
    pub fn classify(word: u16) -> CommandType {
        match word {
            0x0001 => CommandType::TurnOffTransmission,
            0x0002 => CommandType::TurnOnTransmission,
            0x0003 => CommandType::SendHeaderFrame,
            0x0004 => CommandType::SendConfigFrame1,
            0x0005 => CommandType::SendConfigFrame2,
            0x0006 => CommandType::SendConfigFrame3,
            0x0008 => CommandType::SendExtendedFrame,
            w if w & 0x0F00 == 0x0F00 => CommandType::User(w),
            w => CommandType::Invalid(w),
        }
    }

    /// The CMD word for this command.
    pub fn code(self) -> u16 {
        match self {
            CommandType::TurnOffTransmission => 0x0001,
            CommandType::TurnOnTransmission => 0x0002,
            CommandType::SendHeaderFrame => 0x0003,
            CommandType::SendConfigFrame1 => 0x0004,
            CommandType::SendConfigFrame2 => 0x0005,
            CommandType::SendConfigFrame3 => 0x0006,
            CommandType::SendExtendedFrame => 0x0008,
            CommandType::User(w) | CommandType::Invalid(w) => w,
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandType::TurnOffTransmission => write!(f, "Turn OFF real-time data transmission"),
            CommandType::TurnOnTransmission => write!(f, "Turn ON real-time data transmission"),
            CommandType::SendHeaderFrame => write!(f, "Send Header frame"),
            CommandType::SendConfigFrame1 => write!(f, "Send Configuration frame 1"),
            CommandType::SendConfigFrame2 => write!(f, "Send Configuration frame 2"),
            CommandType::SendConfigFrame3 => write!(f, "Send Configuration frame 3"),
            CommandType::SendExtendedFrame => write!(f, "Send Extended frame"),
            CommandType::User(w) => write!(f, "User defined command (0x{:04X})", w),
            CommandType::Invalid(w) => write!(f, "Invalid command (0x{:04X})", w),
        }
    }
}

/// Reads and classifies the CMD word of a received command frame.
///
/// # Parameters
///
/// * `bytes`: The frame, starting at SYNC when `includes_header` is `true`, or right after
///   the SYNC + FRAMESIZE block otherwise.
pub fn classify_command(bytes: &[u8], includes_header: bool) -> Result<CommandType, ParseError> {
    let offset = if includes_header {
        COMMAND_OFFSET
    } else {
        COMMAND_OFFSET - 4
    };
    match bytes.get(offset..offset + 2) {
        Some(word) => Ok(CommandType::classify(u16::from_be_bytes([word[0], word[1]]))),
        None => Err(ParseError::InvalidLength {
            message: format!(
                "CommandFrame: CMD word at offset {} lies outside {} bytes",
                offset,
                bytes.len()
            ),
        }),
    }
}

/// Represents an IEEE C37.118 command frame.
///
/// # Fields
///
/// * `prefix`: Common frame prefix (SYNC, frame size, ID code, timestamp).
/// * `command`: 16-bit CMD word.
/// * `extended_data`: Optional payload of an extended frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub prefix: PrefixFrame,
    pub command: u16,
    pub extended_data: Option<Vec<u8>>,
}

impl CommandFrame {
    /// Creates a command frame.
    ///
    /// # Parameters
    ///
    /// * `idcode`: Identification code of the addressed stream.
    /// * `command_type`: The command to send.
    /// * `time`: Optional `(soc, fracsec)` timestamp, zero when absent.
    pub fn new(idcode: u16, command_type: CommandType, time: Option<(u32, u32)>) -> Self {
        let (soc, fracsec) = time.unwrap_or((0, 0));
        let mut prefix = PrefixFrame::new(FrameType::Command, idcode);
        prefix.framesize = COMMAND_MINIMUM_FRAME_SIZE as u16;
        prefix.soc = soc;
        prefix.fracsec = fracsec;
        CommandFrame {
            prefix,
            command: command_type.code(),
            extended_data: None,
        }
    }

    pub fn new_turn_off_transmission(idcode: u16, time: Option<(u32, u32)>) -> Self {
        Self::new(idcode, CommandType::TurnOffTransmission, time)
    }

    pub fn new_turn_on_transmission(idcode: u16, time: Option<(u32, u32)>) -> Self {
        Self::new(idcode, CommandType::TurnOnTransmission, time)
    }

    pub fn new_send_header_frame(idcode: u16, time: Option<(u32, u32)>) -> Self {
        Self::new(idcode, CommandType::SendHeaderFrame, time)
    }

    pub fn new_send_config_frame1(idcode: u16, time: Option<(u32, u32)>) -> Self {
        Self::new(idcode, CommandType::SendConfigFrame1, time)
    }

    pub fn new_send_config_frame2(idcode: u16, time: Option<(u32, u32)>) -> Self {
        Self::new(idcode, CommandType::SendConfigFrame2, time)
    }

    /// Creates an extended frame command carrying `extended_data`.
    pub fn new_extended_command(
        idcode: u16,
        time: Option<(u32, u32)>,
        extended_data: Vec<u8>,
    ) -> Self {
        let mut frame = Self::new(idcode, CommandType::SendExtendedFrame, time);
        frame.prefix.framesize = (COMMAND_MINIMUM_FRAME_SIZE + extended_data.len()) as u16;
        frame.extended_data = Some(extended_data);
        frame
    }

    pub fn command_type(&self) -> CommandType {
        CommandType::classify(self.command)
    }

    /// Parses a command frame from a byte slice.
    ///
    /// # Returns
    ///
    /// * `Ok(CommandFrame)`: The parsed command frame.
    /// * `Err(ParseError)`: If the frame is too short, has an invalid checksum, is not a
    ///   command frame, or its FRAMESIZE disagrees with the buffer length.
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < COMMAND_MINIMUM_FRAME_SIZE {
            return Err(ParseError::InvalidLength {
                message: format!(
                    "CommandFrame: Expected at least 18 bytes, but got {}",
                    bytes.len()
                ),
            });
        }

        validate_checksum(bytes)?;

        let prefix = PrefixFrame::from_hex(&bytes[..PREFIX_SIZE])?;
        if prefix.frame_type()? != FrameType::Command {
            return Err(ParseError::InvalidFrameType {
                message: format!("Expected a command frame, got SYNC 0x{:04X}", prefix.sync),
            });
        }
        if prefix.framesize as usize != bytes.len() {
            return Err(ParseError::InvalidLength {
                message: format!(
                    "CommandFrame: Buffer size does not match the expected size in the frame: Expected {}, but got {}",
                    prefix.framesize,
                    bytes.len()
                ),
            });
        }

        let command = u16::from_be_bytes([bytes[COMMAND_OFFSET], bytes[COMMAND_OFFSET + 1]]);
        let extended_data = if bytes.len() > COMMAND_MINIMUM_FRAME_SIZE {
            Some(bytes[COMMAND_OFFSET + 2..bytes.len() - 2].to_vec())
        } else {
            None
        };

        Ok(CommandFrame {
            prefix,
            command,
            extended_data,
        })
    }

    /// Converts the command frame to bytes, recomputing FRAMESIZE and CHK.
    pub fn to_hex(&self) -> Result<Vec<u8>, ParseError> {
        let mut writer = FrameWriter::new();
        writer.put_slice(&self.prefix.to_hex())?;
        writer.put_u16(self.command)?;
        if let Some(data) = &self.extended_data {
            writer.put_slice(data)?;
        }
        writer.seal()
    }
}
