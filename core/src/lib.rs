//! # PMU Core
//!
//! Building blocks of an IEEE C37.118-2011 Phasor Measurement Unit: frame codecs, the
//! acquisition seam that carries measurements from a front-end to the network, the device
//! details and the shared context tying them together.
//!
//! ## Submodules
//!
//! - `ieee_c37_118`: Frame codecs.
//!   - `commands`: Command frame classification and construction.
//!   - `common`: Shared types (`ParseError`, `FrameType`, `PrefixFrame`).
//!   - `config`: Configuration model and CFG-1/CFG-2 serialization.
//!   - `cursor`: Bounds-checked big-endian reader and writer.
//!   - `data_frame`: DATA frame codec bound to a configuration.
//!   - `header`: HEADER frame construction.
//!   - `random`: Synthetic configurations and samples.
//!   - `units`: FORMAT bits, conversion factors, masks and nominal frequency.
//!   - `utils`: CRC-CCITT checksum and timestamp helpers.
//! - `acquisition`: Sample queue, producer trait and the synthetic source.
//! - `details`: Persisted device settings and the stock configuration.
//! - `context`: `PmuContext`, the state shared between the server and acquisition.

pub mod acquisition;
pub mod context;
pub mod details;
pub mod ieee_c37_118;
