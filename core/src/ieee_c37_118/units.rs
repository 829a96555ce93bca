//! # IEEE C37.118 Measurement Units and Format Words
//!
//! This module models the packed words a configuration frame carries for each PMU, as
//! defined in IEEE C37.118.2-2011 Tables 9 and 10.
//!
//! ## Key Components
//!
//! - `DataFormat`: The FORMAT word, four independent bits selecting polar/rectangular
//!   phasors and integer/float widths for phasors, analogs and FREQ/DFREQ.
//! - `ValueType`: Integer (16-bit) or floating point (32-bit) channel encoding.
//! - `PhasorMeasurement`, `AnalogMeasurement`: Measurement type tags stored in the high
//!   byte of a conversion factor word.
//! - `ConversionFactor`: PHUNIT/ANUNIT word, 24-bit factor plus type tag.
//! - `StatusMask`: DIGUNIT word, normal-state mask and validity mask.
//! - `NominalFrequency`: FNOM, a single bit where 0 is 60 Hz and 1 is 50 Hz.
//! - `DataRate`: DATA_RATE, frames per second or seconds per frame when negative.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Tag read back from a conversion factor whose high byte holds no known type.
pub const INVALID_MEASUREMENT: u8 = 0xFF;

/// Integer (16-bit) or floating point (32-bit) encoding of a channel class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Int,
    Float,
}

impl ValueType {
    /// Bytes per scalar of this encoding.
    pub fn width(self) -> usize {
        match self {
            ValueType::Int => 2,
            ValueType::Float => 4,
        }
    }
}

/// Complex representation of phasors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhasorForm {
    Rectangular,
    Polar,
}

/// The per-PMU FORMAT word.
///
/// Bit 3 selects FREQ/DFREQ width, bit 2 analog width, bit 1 phasor width (1 = float in
/// each case) and bit 0 the phasor form (1 = polar). The remaining bits are reserved and
/// always transmitted as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataFormat(u16);

impl DataFormat {
    const POLAR: u16 = 0x0001;
    const PHASOR_FLOAT: u16 = 0x0002;
    const ANALOG_FLOAT: u16 = 0x0004;
    const FREQ_FLOAT: u16 = 0x0008;

    pub fn from_bits(bits: u16) -> Self {
        DataFormat(bits & 0x000F)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    fn flag(self, mask: u16) -> bool {
        self.0 & mask != 0
    }

    fn with_flag(self, mask: u16, on: bool) -> Self {
        if on {
            DataFormat(self.0 | mask)
        } else {
            DataFormat(self.0 & !mask)
        }
    }

    fn value_type(self, mask: u16) -> ValueType {
        if self.flag(mask) {
            ValueType::Float
        } else {
            ValueType::Int
        }
    }

    pub fn phasor_form(self) -> PhasorForm {
        if self.flag(Self::POLAR) {
            PhasorForm::Polar
        } else {
            PhasorForm::Rectangular
        }
    }

    pub fn phasor_type(self) -> ValueType {
        self.value_type(Self::PHASOR_FLOAT)
    }

    pub fn analog_type(self) -> ValueType {
        self.value_type(Self::ANALOG_FLOAT)
    }

    pub fn freq_type(self) -> ValueType {
        self.value_type(Self::FREQ_FLOAT)
    }

    pub fn with_phasor_form(self, form: PhasorForm) -> Self {
        self.with_flag(Self::POLAR, form == PhasorForm::Polar)
    }

    pub fn with_phasor_type(self, value_type: ValueType) -> Self {
        self.with_flag(Self::PHASOR_FLOAT, value_type == ValueType::Float)
    }

    pub fn with_analog_type(self, value_type: ValueType) -> Self {
        self.with_flag(Self::ANALOG_FLOAT, value_type == ValueType::Float)
    }

    pub fn with_freq_type(self, value_type: ValueType) -> Self {
        self.with_flag(Self::FREQ_FLOAT, value_type == ValueType::Float)
    }
}

/// Measurement type of a phasor channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhasorMeasurement {
    Voltage = 0,
    Current = 1,
}

impl PhasorMeasurement {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PhasorMeasurement::Voltage),
            1 => Some(PhasorMeasurement::Current),
            _ => None,
        }
    }
}

/// Measurement type of an analog channel.
///
/// # Variants
///
/// * `SinglePointOnWave`: Instantaneous analog value.
/// * `Rms`: Root mean square of the analog input.
/// * `Peak`: Peak value of the analog input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalogMeasurement {
    SinglePointOnWave = 0,
    Rms = 1,
    Peak = 2,
}

impl AnalogMeasurement {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(AnalogMeasurement::SinglePointOnWave),
            1 => Some(AnalogMeasurement::Rms),
            2 => Some(AnalogMeasurement::Peak),
            _ => None,
        }
    }
}

impl fmt::Display for AnalogMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnalogMeasurement::SinglePointOnWave => write!(f, "Single Point-On-Wave"),
            AnalogMeasurement::Rms => write!(f, "RMS of Analog Input"),
            AnalogMeasurement::Peak => write!(f, "Peak of Analog Input"),
        }
    }
}

/// A PHUNIT or ANUNIT word: the low 24 bits scale integer samples, the high byte tags the
/// measurement type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConversionFactor(pub u32);

impl ConversionFactor {
    pub fn factor(self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    pub fn measurement_byte(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Replaces the 24-bit factor; bits above 24 of `factor` are discarded.
    pub fn with_factor(self, factor: u32) -> Self {
        ConversionFactor((self.0 & 0xFF00_0000) | (factor & 0x00FF_FFFF))
    }

    pub fn with_measurement_byte(self, byte: u8) -> Self {
        ConversionFactor((self.0 & 0x00FF_FFFF) | ((byte as u32) << 24))
    }
}

/// A DIGUNIT word: normal-state mask in the high 16 bits, validity mask in the low 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusMask(pub u32);

impl StatusMask {
    pub fn normal_state(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn validity(self) -> u16 {
        self.0 as u16
    }

    pub fn with_normal_state(self, mask: u16) -> Self {
        StatusMask((self.0 & 0x0000_FFFF) | ((mask as u32) << 16))
    }

    pub fn with_validity(self, mask: u16) -> Self {
        StatusMask((self.0 & 0xFFFF_0000) | mask as u32)
    }
}

/// Nominal line frequency (FNOM).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NominalFrequency {
    Hz60 = 0,
    #[default]
    Hz50 = 1,
}

impl NominalFrequency {
    /// 60 selects 60 Hz; every other value selects 50 Hz.
    pub fn from_hz(hz: u16) -> Self {
        if hz == 60 {
            NominalFrequency::Hz60
        } else {
            NominalFrequency::Hz50
        }
    }

    pub fn hz(self) -> u16 {
        match self {
            NominalFrequency::Hz60 => 60,
            NominalFrequency::Hz50 => 50,
        }
    }

    /// Wire value of the FNOM field.
    pub fn bit(self) -> u16 {
        self as u16
    }

    pub fn from_bit(word: u16) -> Self {
        if word & 0x0001 == 0 {
            NominalFrequency::Hz60
        } else {
            NominalFrequency::Hz50
        }
    }
}

impl fmt::Display for NominalFrequency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} Hz", self.hz())
    }
}

/// The DATA_RATE field.
///
/// Positive values are frames per second, negative values are seconds per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRate(pub i16);

impl DataRate {
    /// Frames per second; zero when the rate is unset.
    pub fn frequency(self) -> f64 {
        match self.0 {
            0 => 0.0,
            rate if rate > 0 => rate as f64,
            rate => 1.0 / (rate as f64).abs(),
        }
    }

    /// Time between frames, or `None` when the rate is unset.
    pub fn period(self) -> Option<Duration> {
        let frequency = self.frequency();
        if frequency > 0.0 {
            Some(Duration::from_secs_f64(1.0 / frequency))
        } else {
            None
        }
    }
}
