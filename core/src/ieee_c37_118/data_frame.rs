//! # IEEE C37.118 Data Frame Codec
//!
//! This module encodes and decodes DATA frames for a configuration it has been bound to.
//!
//! ## Key Components
//!
//! - `DataCodec`: Holds one `PmuSample` per PMU of the bound configuration together with
//!   the frame's IDCODE and timestamp, and converts between samples and bytes.
//! - `PmuSample`: STAT word and measurement buffers of one PMU. The integer or floating
//!   point encoding of each channel class is chosen once, at bind time, and carried by the
//!   buffer variant.
//! - `PhasorValue`, `Scalar`: Single values handed in and out of the accessors.
//!
//! ## Layout
//!
//! A complete frame is SYNC, FRAMESIZE, IDCODE, SOC, FRACSEC, the PMU sections and CHK.
//! Each PMU section holds, in order: STAT, phasors, analog values, frequency deviation,
//! ROCOF and digital status words. The data-only layout produced by the acquisition
//! front-end is the same PMU sections without STAT and without the common header or CHK.
//!
//! ## Usage
//!
//! Bind with `DataCodec::bind`, then `decode` received bytes or fill the buffers through
//! the setters and `encode`. Later changes to the configuration do not affect a bound
//! codec; bind again to pick them up.

use super::common::{FrameType, ParseError};
use super::config::{GlobalConfig, PmuConfig};
use super::cursor::{FrameReader, FrameWriter};
use super::units::{PhasorForm, ValueType};
use super::utils::{now_timestamp, validate_checksum};

/// SYNC, FRAMESIZE, IDCODE, SOC, FRACSEC and CHK.
pub const DATA_COMMON_SIZE: usize = 16;

/// STAT word present in every PMU section of a complete frame.
pub const DATA_COMMON_SIZE_PER_PMU: usize = 2;

/// A scalar channel value in its bound encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i16),
    Float(f32),
}

impl Scalar {
    fn zero(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Int => Scalar::Int(0),
            ValueType::Float => Scalar::Float(0.0),
        }
    }

    pub fn value_type(self) -> ValueType {
        match self {
            Scalar::Int(_) => ValueType::Int,
            Scalar::Float(_) => ValueType::Float,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Int(v) => v as f64,
            Scalar::Float(v) => v as f64,
        }
    }

    fn read(value_type: ValueType, reader: &mut FrameReader, field: &str) -> Result<Self, ParseError> {
        Ok(match value_type {
            ValueType::Int => Scalar::Int(reader.read_i16(field)?),
            ValueType::Float => Scalar::Float(reader.read_f32(field)?),
        })
    }

    fn write(self, writer: &mut FrameWriter) -> Result<(), ParseError> {
        match self {
            Scalar::Int(v) => writer.put_i16(v),
            Scalar::Float(v) => writer.put_f32(v),
        }
    }
}

/// One phasor as two components: magnitude and angle when polar, real and imaginary
/// when rectangular.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhasorValue {
    Int([i16; 2]),
    Float([f32; 2]),
}

/// Phasor buffer of one PMU.
#[derive(Debug, Clone, PartialEq)]
pub enum PhasorValues {
    Int(Vec<[i16; 2]>),
    Float(Vec<[f32; 2]>),
}

impl PhasorValues {
    fn zeroed(value_type: ValueType, count: usize) -> Self {
        match value_type {
            ValueType::Int => PhasorValues::Int(vec![[0; 2]; count]),
            ValueType::Float => PhasorValues::Float(vec![[0.0; 2]; count]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PhasorValues::Int(v) => v.len(),
            PhasorValues::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            PhasorValues::Int(_) => ValueType::Int,
            PhasorValues::Float(_) => ValueType::Float,
        }
    }
}

/// Analog buffer of one PMU.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalogValues {
    Int(Vec<i16>),
    Float(Vec<f32>),
}

impl AnalogValues {
    fn zeroed(value_type: ValueType, count: usize) -> Self {
        match value_type {
            ValueType::Int => AnalogValues::Int(vec![0; count]),
            ValueType::Float => AnalogValues::Float(vec![0.0; count]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AnalogValues::Int(v) => v.len(),
            AnalogValues::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            AnalogValues::Int(_) => ValueType::Int,
            AnalogValues::Float(_) => ValueType::Float,
        }
    }
}

/// Measurements of a single PMU.
///
/// # Fields
///
/// * `stat`: STAT word.
/// * `phasor_form`: Polar or rectangular, copied from FORMAT at bind time.
/// * `phasors`: PHASORS buffer.
/// * `analogs`: ANALOG buffer.
/// * `freq_deviation`: FREQ, deviation from nominal.
/// * `rocof`: DFREQ, rate of change of frequency.
/// * `digital`: DIGITAL status words.
#[derive(Debug, Clone, PartialEq)]
pub struct PmuSample {
    pub stat: u16,
    phasor_form: PhasorForm,
    phasors: PhasorValues,
    analogs: AnalogValues,
    freq_deviation: Scalar,
    rocof: Scalar,
    digital: Vec<u16>,
}

impl PmuSample {
    fn bind(pmu: &PmuConfig) -> Self {
        PmuSample {
            stat: 0,
            phasor_form: pmu.phasor_form(),
            phasors: PhasorValues::zeroed(pmu.phasor_type(), pmu.num_phasors() as usize),
            analogs: AnalogValues::zeroed(pmu.analog_type(), pmu.num_analogs() as usize),
            freq_deviation: Scalar::zero(pmu.freq_type()),
            rocof: Scalar::zero(pmu.freq_type()),
            digital: vec![0; pmu.num_status_words() as usize],
        }
    }

    pub fn phasor_form(&self) -> PhasorForm {
        self.phasor_form
    }

    pub fn phasors(&self) -> &PhasorValues {
        &self.phasors
    }

    pub fn analogs(&self) -> &AnalogValues {
        &self.analogs
    }

    pub fn digital(&self) -> &[u16] {
        &self.digital
    }

    pub fn freq_type(&self) -> ValueType {
        self.freq_deviation.value_type()
    }

    /// Section size on the wire, STAT included.
    pub fn size(&self) -> usize {
        let phasor_width = self.phasors.value_type().width();
        let analog_width = self.analogs.value_type().width();
        DATA_COMMON_SIZE_PER_PMU
            + self.analogs.len() * analog_width
            + self.phasors.len() * 2 * phasor_width
            + self.digital.len() * 2
            + 2 * self.freq_type().width()
    }

    fn read_values(&mut self, reader: &mut FrameReader) -> Result<(), ParseError> {
        match &mut self.phasors {
            PhasorValues::Int(values) => {
                for value in values.iter_mut() {
                    *value = [reader.read_i16("PHASORS")?, reader.read_i16("PHASORS")?];
                }
            }
            PhasorValues::Float(values) => {
                for value in values.iter_mut() {
                    *value = [reader.read_f32("PHASORS")?, reader.read_f32("PHASORS")?];
                }
            }
        }
        match &mut self.analogs {
            AnalogValues::Int(values) => {
                for value in values.iter_mut() {
                    *value = reader.read_i16("ANALOG")?;
                }
            }
            AnalogValues::Float(values) => {
                for value in values.iter_mut() {
                    *value = reader.read_f32("ANALOG")?;
                }
            }
        }
        let freq_type = self.freq_type();
        self.freq_deviation = Scalar::read(freq_type, reader, "FREQ")?;
        self.rocof = Scalar::read(freq_type, reader, "DFREQ")?;
        for word in self.digital.iter_mut() {
            *word = reader.read_u16("DIGITAL")?;
        }
        Ok(())
    }

    fn write_values(&self, writer: &mut FrameWriter) -> Result<(), ParseError> {
        match &self.phasors {
            PhasorValues::Int(values) => {
                for [a, b] in values {
                    writer.put_i16(*a)?;
                    writer.put_i16(*b)?;
                }
            }
            PhasorValues::Float(values) => {
                for [a, b] in values {
                    writer.put_f32(*a)?;
                    writer.put_f32(*b)?;
                }
            }
        }
        match &self.analogs {
            AnalogValues::Int(values) => {
                for value in values {
                    writer.put_i16(*value)?;
                }
            }
            AnalogValues::Float(values) => {
                for value in values {
                    writer.put_f32(*value)?;
                }
            }
        }
        self.freq_deviation.write(writer)?;
        self.rocof.write(writer)?;
        for word in &self.digital {
            writer.put_u16(*word)?;
        }
        Ok(())
    }
}

fn mismatch(what: &str, expected: ValueType) -> ParseError {
    ParseError::InvalidFormat {
        message: format!("{} is bound as {:?}", what, expected),
    }
}

/// DATA frame codec bound to one configuration snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DataCodec {
    pub id_code: u16,
    pub time_base: u32,
    pub epoch_seconds: u32,
    pub frac_of_second: u32,
    /// CHK of the last decoded frame.
    pub check: u16,
    samples: Vec<PmuSample>,
}

impl DataCodec {
    /// Snapshots counts and encodings of every PMU in `config` and allocates zeroed
    /// buffers sized for them.
    ///
    /// # Returns
    ///
    /// * `Ok(DataCodec)`: The bound codec.
    /// * `Err(ParseError::InvalidFormat)`: The configuration has no PMU.
    /// * `Err(ParseError::InvalidLength)`: A frame for this configuration would not fit in
    ///   the 16-bit FRAMESIZE.
    pub fn bind(config: &GlobalConfig) -> Result<Self, ParseError> {
        if config.num_pmu() == 0 {
            return Err(ParseError::InvalidFormat {
                message: "Cannot bind a data codec to a configuration without PMUs".to_string(),
            });
        }
        let codec = DataCodec {
            id_code: config.id_code(),
            time_base: config.time_base(),
            epoch_seconds: 0,
            frac_of_second: 0,
            check: 0,
            samples: config.pmus().iter().map(PmuSample::bind).collect(),
        };
        if codec.frame_size() > u16::MAX as usize {
            return Err(ParseError::InvalidLength {
                message: format!("Data frame of {} bytes exceeds FRAMESIZE", codec.frame_size()),
            });
        }
        Ok(codec)
    }

    pub fn num_pmu(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[PmuSample] {
        &self.samples
    }

    /// Sample of PMU `pmu` (1-based).
    pub fn sample(&self, pmu: usize) -> Result<&PmuSample, ParseError> {
        let count = self.samples.len();
        pmu.checked_sub(1)
            .and_then(|i| self.samples.get(i))
            .ok_or_else(|| ParseError::index("PMU", pmu, count))
    }

    fn sample_mut(&mut self, pmu: usize) -> Result<&mut PmuSample, ParseError> {
        let count = self.samples.len();
        pmu.checked_sub(1)
            .and_then(|i| self.samples.get_mut(i))
            .ok_or_else(|| ParseError::index("PMU", pmu, count))
    }

    /// Size of a complete DATA frame.
    pub fn frame_size(&self) -> usize {
        DATA_COMMON_SIZE + self.samples.iter().map(PmuSample::size).sum::<usize>()
    }

    /// Size of the data-only layout: PMU sections without STAT.
    pub fn data_only_size(&self) -> usize {
        self.samples
            .iter()
            .map(|s| s.size() - DATA_COMMON_SIZE_PER_PMU)
            .sum()
    }

    pub fn set_timestamp(&mut self, soc: u32, fracsec: u32) {
        self.epoch_seconds = soc;
        self.frac_of_second = fracsec;
    }

    /// Stamps the frame with the current time, preserving the FRACSEC quality byte.
    pub fn update_time(&mut self) {
        let (soc, fracsec) = now_timestamp(self.time_base, self.frac_of_second);
        self.set_timestamp(soc, fracsec);
    }

    /// Decodes a frame or a data-only buffer into the bound samples.
    ///
    /// # Parameters
    ///
    /// * `bytes`: A complete DATA frame starting at SYNC when `include_common_header` is
    ///   `true`, otherwise a data-only buffer. Trailing bytes beyond the expected length are
    ///   left unread.
    /// * `include_common_header`: Selects the layout.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)`: Bytes consumed, i.e. how far the caller's cursor advances.
    /// * `Err(ParseError)`: Short input, wrong SYNC, FRAMESIZE mismatch or bad CHK. The
    ///   codec is left unchanged.
    pub fn decode(&mut self, bytes: &[u8], include_common_header: bool) -> Result<usize, ParseError> {
        let expected = if include_common_header {
            self.frame_size()
        } else {
            self.data_only_size()
        };
        let frame = bytes.get(..expected).ok_or_else(|| ParseError::InvalidLength {
            message: format!("DataFrame: expected {} bytes, got {}", expected, bytes.len()),
        })?;

        let mut samples = self.samples.clone();
        let mut reader = FrameReader::new(frame);
        let mut header = None;

        if include_common_header {
            let sync = reader.read_u16("SYNC")?;
            if FrameType::from_sync(sync)? != FrameType::Data {
                return Err(ParseError::InvalidFrameType {
                    message: format!("Expected a data frame, got SYNC 0x{:04X}", sync),
                });
            }
            let framesize = reader.read_u16("FRAMESIZE")? as usize;
            if framesize != expected {
                return Err(ParseError::InvalidLength {
                    message: format!(
                        "DataFrame: expected framesize of {} bytes, got {}",
                        expected, framesize
                    ),
                });
            }
            validate_checksum(frame)?;
            header = Some((
                reader.read_u16("IDCODE")?,
                reader.read_u32("SOC")?,
                reader.read_u32("FRACSEC")?,
            ));
        }

        for sample in samples.iter_mut() {
            if include_common_header {
                sample.stat = reader.read_u16("STAT")?;
            }
            sample.read_values(&mut reader)?;
        }

        if let Some((id_code, soc, fracsec)) = header {
            self.check = reader.read_u16("CHK")?;
            self.id_code = id_code;
            self.set_timestamp(soc, fracsec);
        }
        self.samples = samples;
        Ok(reader.position())
    }

    /// Encodes the bound samples.
    ///
    /// With `include_common_header` the result is a complete DATA frame with FRAMESIZE and
    /// CHK filled in; otherwise it is the data-only layout.
    pub fn encode(&self, include_common_header: bool) -> Result<Vec<u8>, ParseError> {
        if !include_common_header {
            let mut writer = FrameWriter::with_limit(self.data_only_size());
            for sample in &self.samples {
                sample.write_values(&mut writer)?;
            }
            return Ok(writer.into_inner());
        }

        let mut writer = FrameWriter::with_limit(self.frame_size());
        writer.put_u16(FrameType::Data.sync())?;
        writer.put_u16(0)?;
        writer.put_u16(self.id_code)?;
        writer.put_u32(self.epoch_seconds)?;
        writer.put_u32(self.frac_of_second)?;
        for sample in &self.samples {
            writer.put_u16(sample.stat)?;
            sample.write_values(&mut writer)?;
        }
        writer.seal()
    }

    pub fn stat(&self, pmu: usize) -> Result<u16, ParseError> {
        Ok(self.sample(pmu)?.stat)
    }

    pub fn set_stat(&mut self, pmu: usize, stat: u16) -> Result<(), ParseError> {
        self.sample_mut(pmu)?.stat = stat;
        Ok(())
    }

    /// Phasor `index` (1-based) of PMU `pmu`.
    pub fn phasor(&self, pmu: usize, index: usize) -> Result<PhasorValue, ParseError> {
        let sample = self.sample(pmu)?;
        let count = sample.phasors.len();
        let i = index
            .checked_sub(1)
            .filter(|&i| i < count)
            .ok_or_else(|| ParseError::index("phasor", index, count))?;
        Ok(match &sample.phasors {
            PhasorValues::Int(v) => PhasorValue::Int(v[i]),
            PhasorValues::Float(v) => PhasorValue::Float(v[i]),
        })
    }

    /// Stores phasor `index`; the value must use the bound encoding.
    pub fn set_phasor(&mut self, pmu: usize, index: usize, value: PhasorValue) -> Result<(), ParseError> {
        let sample = self.sample_mut(pmu)?;
        let count = sample.phasors.len();
        let i = index
            .checked_sub(1)
            .filter(|&i| i < count)
            .ok_or_else(|| ParseError::index("phasor", index, count))?;
        match (&mut sample.phasors, value) {
            (PhasorValues::Int(v), PhasorValue::Int(p)) => v[i] = p,
            (PhasorValues::Float(v), PhasorValue::Float(p)) => v[i] = p,
            (values, _) => return Err(mismatch("phasor", values.value_type())),
        }
        Ok(())
    }

    pub fn analog(&self, pmu: usize, index: usize) -> Result<Scalar, ParseError> {
        let sample = self.sample(pmu)?;
        let count = sample.analogs.len();
        let i = index
            .checked_sub(1)
            .filter(|&i| i < count)
            .ok_or_else(|| ParseError::index("analog", index, count))?;
        Ok(match &sample.analogs {
            AnalogValues::Int(v) => Scalar::Int(v[i]),
            AnalogValues::Float(v) => Scalar::Float(v[i]),
        })
    }

    pub fn set_analog(&mut self, pmu: usize, index: usize, value: Scalar) -> Result<(), ParseError> {
        let sample = self.sample_mut(pmu)?;
        let count = sample.analogs.len();
        let i = index
            .checked_sub(1)
            .filter(|&i| i < count)
            .ok_or_else(|| ParseError::index("analog", index, count))?;
        match (&mut sample.analogs, value) {
            (AnalogValues::Int(v), Scalar::Int(a)) => v[i] = a,
            (AnalogValues::Float(v), Scalar::Float(a)) => v[i] = a,
            (values, _) => return Err(mismatch("analog", values.value_type())),
        }
        Ok(())
    }

    pub fn freq_deviation(&self, pmu: usize) -> Result<Scalar, ParseError> {
        Ok(self.sample(pmu)?.freq_deviation)
    }

    pub fn set_freq_deviation(&mut self, pmu: usize, value: Scalar) -> Result<(), ParseError> {
        let sample = self.sample_mut(pmu)?;
        if value.value_type() != sample.freq_type() {
            return Err(mismatch("frequency", sample.freq_type()));
        }
        sample.freq_deviation = value;
        Ok(())
    }

    pub fn rocof(&self, pmu: usize) -> Result<Scalar, ParseError> {
        Ok(self.sample(pmu)?.rocof)
    }

    pub fn set_rocof(&mut self, pmu: usize, value: Scalar) -> Result<(), ParseError> {
        let sample = self.sample_mut(pmu)?;
        if value.value_type() != sample.freq_type() {
            return Err(mismatch("ROCOF", sample.freq_type()));
        }
        sample.rocof = value;
        Ok(())
    }

    pub fn digital(&self, pmu: usize, index: usize) -> Result<u16, ParseError> {
        let sample = self.sample(pmu)?;
        let count = sample.digital.len();
        index
            .checked_sub(1)
            .and_then(|i| sample.digital.get(i))
            .copied()
            .ok_or_else(|| ParseError::index("status word", index, count))
    }

    pub fn set_digital(&mut self, pmu: usize, index: usize, word: u16) -> Result<(), ParseError> {
        let sample = self.sample_mut(pmu)?;
        let count = sample.digital.len();
        let slot = index
            .checked_sub(1)
            .and_then(|i| sample.digital.get_mut(i))
            .ok_or_else(|| ParseError::index("status word", index, count))?;
        *slot = word;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_config() -> GlobalConfig {
        let mut config = GlobalConfig::new();
        config.set_id_code(7);
        config.set_time_base(1000);
        config.set_pmu_count(1).unwrap();
        let pmu = config.pmu_mut(1).unwrap();
        pmu.set_phasor_form(PhasorForm::Polar);
        pmu.set_num_phasors(3).unwrap();
        pmu.set_num_analogs(3).unwrap();
        pmu.set_num_status_words(1).unwrap();
        config
    }

    fn mixed_config() -> GlobalConfig {
        let mut config = int_config();
        config.set_pmu_count(2).unwrap();
        let pmu = config.pmu_mut(2).unwrap();
        pmu.set_phasor_type(ValueType::Float);
        pmu.set_freq_type(ValueType::Float);
        pmu.set_num_phasors(2).unwrap();
        pmu.set_num_analogs(1).unwrap();
        pmu.set_num_status_words(2).unwrap();
        config
    }

    #[test]
    fn test_size_formula_int_only() {
        let codec = DataCodec::bind(&int_config()).unwrap();
        // STAT 2 + 3 analogs * 2 + 3 phasors * 2 * 2 + 1 status * 2 + freq/rocof 2 + 2
        let per_pmu = 2 + 6 + 12 + 2 + 4;
        assert_eq!(codec.frame_size(), 16 + per_pmu);
        assert_eq!(codec.data_only_size(), per_pmu - 2);
        assert_eq!(codec.encode(true).unwrap().len(), codec.frame_size());
        assert_eq!(codec.encode(false).unwrap().len(), codec.data_only_size());
    }

    #[test]
    fn test_size_formula_mixed() {
        let codec = DataCodec::bind(&mixed_config()).unwrap();
        let first = 2 + 6 + 12 + 2 + 4;
        // STAT 2 + 1 int analog * 2 + 2 float phasors * 2 * 4 + 2 status * 2 + 4 + 4
        let second = 2 + 2 + 16 + 4 + 8;
        assert_eq!(codec.frame_size(), 16 + first + second);
        let frame = codec.encode(true).unwrap();
        assert_eq!(frame.len(), codec.frame_size());
        assert_eq!(u16::from_be_bytes([frame[2], frame[3]]) as usize, frame.len());
    }

    #[test]
    fn test_encode_decode_complete_frame() {
        let config = mixed_config();
        let mut codec = DataCodec::bind(&config).unwrap();
        codec.set_timestamp(1_149_580_800, 0x0000_01F4);
        codec.set_stat(1, 0x8000).unwrap();
        codec.set_phasor(1, 2, PhasorValue::Int([14635, -3000])).unwrap();
        codec.set_analog(1, 3, Scalar::Int(-1)).unwrap();
        codec.set_freq_deviation(1, Scalar::Int(2500)).unwrap();
        codec.set_rocof(1, Scalar::Int(-20)).unwrap();
        codec.set_digital(1, 1, 0x3C12).unwrap();
        codec.set_phasor(2, 1, PhasorValue::Float([230.5, 1.047])).unwrap();
        codec.set_rocof(2, Scalar::Float(0.01)).unwrap();
        codec.set_digital(2, 2, 0xFFFF).unwrap();

        let frame = codec.encode(true).unwrap();
        assert_eq!(&frame[0..2], &[0xAA, 0x01]);
        assert!(validate_checksum(&frame).is_ok());

        let mut decoded = DataCodec::bind(&config).unwrap();
        let consumed = decoded.decode(&frame, true).unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(decoded.epoch_seconds, 1_149_580_800);
        assert_eq!(decoded.frac_of_second, 0x01F4);
        assert_eq!(decoded.stat(1), Ok(0x8000));
        assert_eq!(decoded.phasor(1, 2), Ok(PhasorValue::Int([14635, -3000])));
        assert_eq!(decoded.analog(1, 3), Ok(Scalar::Int(-1)));
        assert_eq!(decoded.freq_deviation(1), Ok(Scalar::Int(2500)));
        assert_eq!(decoded.rocof(1), Ok(Scalar::Int(-20)));
        assert_eq!(decoded.digital(1, 1), Ok(0x3C12));
        assert_eq!(decoded.phasor(2, 1), Ok(PhasorValue::Float([230.5, 1.047])));
        assert_eq!(decoded.rocof(2), Ok(Scalar::Float(0.01)));
        assert_eq!(decoded.digital(2, 2), Ok(0xFFFF));
    }

    #[test]
    fn test_field_order_within_section() {
        let mut codec = DataCodec::bind(&int_config()).unwrap();
        codec.set_phasor(1, 1, PhasorValue::Int([0x0102, 0x0304])).unwrap();
        codec.set_analog(1, 1, Scalar::Int(0x0506)).unwrap();
        codec.set_freq_deviation(1, Scalar::Int(0x0708)).unwrap();
        codec.set_rocof(1, Scalar::Int(0x090A)).unwrap();
        codec.set_digital(1, 1, 0x0B0C).unwrap();

        let raw = codec.encode(false).unwrap();
        assert_eq!(&raw[0..4], &[0x01, 0x02, 0x03, 0x04]);
        // three phasors, then analogs
        assert_eq!(&raw[12..14], &[0x05, 0x06]);
        // three analogs, then FREQ, DFREQ and DIGITAL
        assert_eq!(&raw[18..24], &[0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C]);
    }

    #[test]
    fn test_data_only_round_trip_keeps_stat() {
        let config = int_config();
        let mut source = DataCodec::bind(&config).unwrap();
        source.set_analog(1, 2, Scalar::Int(1234)).unwrap();
        let raw = source.encode(false).unwrap();

        let mut codec = DataCodec::bind(&config).unwrap();
        codec.set_stat(1, 0x0400).unwrap();
        assert_eq!(codec.decode(&raw, false), Ok(raw.len()));
        assert_eq!(codec.analog(1, 2), Ok(Scalar::Int(1234)));
        assert_eq!(codec.stat(1), Ok(0x0400));
    }

    #[test]
    fn test_decode_fails_closed_without_mutation() {
        let config = int_config();
        let mut codec = DataCodec::bind(&config).unwrap();
        codec.set_analog(1, 1, Scalar::Int(99)).unwrap();
        let mut frame = codec.encode(true).unwrap();
        let before = codec.clone();

        assert!(codec.decode(&frame[..frame.len() - 1], true).is_err());
        assert!(codec.decode(&frame[..5], false).is_err());

        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(matches!(
            codec.decode(&frame, true),
            Err(ParseError::InvalidChecksum { .. })
        ));
        frame[1] = 0x31;
        assert!(codec.decode(&frame, true).is_err());
        assert_eq!(codec, before);
    }

    #[test]
    fn test_accessor_bounds_and_types() {
        let mut codec = DataCodec::bind(&mixed_config()).unwrap();
        assert!(codec.phasor(1, 4).is_err());
        assert!(codec.phasor(1, 0).is_err());
        assert!(codec.phasor(3, 1).is_err());
        assert!(codec.analog(2, 2).is_err());
        assert!(codec.digital(1, 2).is_err());
        assert!(codec.set_digital(2, 3, 1).is_err());
        assert!(matches!(
            codec.set_phasor(2, 1, PhasorValue::Int([1, 2])),
            Err(ParseError::InvalidFormat { .. })
        ));
        assert!(codec.set_freq_deviation(2, Scalar::Int(1)).is_err());
        assert_eq!(codec.freq_deviation(2), Ok(Scalar::Float(0.0)));
    }

    #[test]
    fn test_bind_snapshots_configuration() {
        let mut config = int_config();
        let codec = DataCodec::bind(&config).unwrap();
        config.pmu_mut(1).unwrap().set_num_phasors(8).unwrap();
        assert_eq!(codec.sample(1).unwrap().phasors().len(), 3);
        assert_eq!(codec.sample(1).unwrap().phasor_form(), PhasorForm::Polar);

        assert!(DataCodec::bind(&GlobalConfig::new()).is_err());
    }
}
