//! # IEEE C37.118-2011 Frame Codecs
//!
//! Encoding and decoding of the synchrophasor frames a PMU exchanges with a PDC:
//! configuration (CFG-1, CFG-2), data, header and command frames.
//!
//! ## Submodules
//!
//! - `commands`: Command frame classification and construction.
//! - `common`: Shared types (`ParseError`, `FrameType`, `PrefixFrame`) and field readers
//!   for the common frame prefix.
//! - `config`: The `GlobalConfig` / `PmuConfig` model and its CFG-1/CFG-2 serialization.
//! - `cursor`: Bounds-checked big-endian reader and writer used by every codec.
//! - `data_frame`: `DataCodec`, the DATA frame encoder/decoder bound to a configuration.
//! - `header`: HEADER frame construction.
//! - `random`: Synthetic configurations and samples.
//! - `units`: FORMAT bits, conversion factors, status masks and nominal frequency.
//! - `utils`: CRC-CCITT checksums and timestamp helpers.

pub mod commands;
pub mod common;
pub mod config;
pub mod cursor;
pub mod data_frame;
pub mod header;
pub mod random;
pub mod units;
pub mod utils;
