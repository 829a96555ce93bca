//! # IEEE C37.118 Configuration Model
//!
//! This module holds the settable description of the device, the data a PDC receives in
//! response to a CFG-1 or CFG-2 request, as defined in IEEE C37.118.2-2011 Table 8.
//!
//! ## Key Components
//!
//! - `PmuConfig`: One PMU block: station name, IDCODE, FORMAT word, channel counts,
//!   channel names, conversion factors, digital masks, FNOM and CFGCNT.
//! - `GlobalConfig`: The whole frame: IDCODE, TIME_BASE, timestamp, DATA_RATE and the
//!   ordered PMU blocks.
//!
//! ## Usage
//!
//! All PMU and channel indices taken by this module are 1-based. An index outside the
//! current count fails with `ParseError::IndexOutOfRange` and changes nothing.
//!
//! Channel counts are the lengths of the owned per-channel vectors, so the counts and
//! array lengths can never disagree. Changing a count to a different value reallocates
//! the matching vector and clears it; setting the same count keeps the contents.
//!
//! `GlobalConfig::get_raw_data` serializes without mutating. FRAMESIZE is taken from the
//! bytes actually emitted.

use super::common::{FrameType, ParseError};
use super::cursor::{FrameReader, FrameWriter};
use super::units::{
    AnalogMeasurement, ConversionFactor, DataFormat, DataRate, NominalFrequency, PhasorForm,
    PhasorMeasurement, StatusMask, ValueType, INVALID_MEASUREMENT,
};
use super::utils::{now_timestamp, validate_checksum};

/// Bytes in a station or channel name.
pub const NAME_LEN: usize = 16;

/// A space padded, never NUL terminated, 16-byte name.
pub type ChannelName = [u8; NAME_LEN];

/// SYNC, FRAMESIZE, IDCODE, SOC, FRACSEC, TIME_BASE, NUM_PMU, DATA_RATE and CHK.
pub const CONFIG_COMMON_SIZE: usize = 24;

/// STN, IDCODE, FORMAT, PHNMR, ANNMR, DGNMR, FNOM and CFGCNT.
pub const CONFIG_COMMON_SIZE_PER_PMU: usize = 30;

/// Digital channels named per status word.
pub const NAMES_PER_STATUS_WORD: usize = 16;

/// Copies at most 16 bytes of `name` and pads the rest with spaces.
pub fn pad_name(name: &[u8]) -> ChannelName {
    let mut padded = [b' '; NAME_LEN];
    let len = name.len().min(NAME_LEN);
    padded[..len].copy_from_slice(&name[..len]);
    padded
}

fn zeroed<T: Clone + Default>(count: usize, what: &str) -> Result<Vec<T>, ParseError> {
    let mut entries = Vec::new();
    entries
        .try_reserve_exact(count)
        .map_err(|e| ParseError::InvalidLength {
            message: format!("Cannot allocate {} {}: {}", count, what, e),
        })?;
    entries.resize(count, T::default());
    Ok(entries)
}

fn slot<'a, T>(entries: &'a mut [T], index: usize, what: &str) -> Result<&'a mut T, ParseError> {
    let count = entries.len();
    index
        .checked_sub(1)
        .and_then(move |i| entries.get_mut(i))
        .ok_or_else(|| ParseError::index(what, index, count))
}

fn entry<T: Copy>(entries: &[T], index: usize) -> Option<T> {
    index.checked_sub(1).and_then(|i| entries.get(i)).copied()
}

fn count_u16(len: usize) -> u16 {
    // every vector is created from a u16 count
    len as u16
}

/// Configuration of a single PMU.
///
/// # Fields
///
/// * `station_name`: STN, 16 bytes, space padded.
/// * `id_code`: IDCODE of the data source.
/// * `data_format`: FORMAT word.
/// * `phasor_factors`: PHUNIT, one word per phasor.
/// * `analog_factors`: ANUNIT, one word per analog value.
/// * `status_masks`: DIGUNIT, one word per digital status word.
/// * `channel_names`: CHNAM, present once bound with `set_channel_names`.
/// * `nominal_freq`: FNOM.
/// * `conf_change_count`: CFGCNT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmuConfig {
    station_name: ChannelName,
    id_code: u16,
    data_format: DataFormat,
    phasor_factors: Vec<ConversionFactor>,
    analog_factors: Vec<ConversionFactor>,
    status_masks: Vec<StatusMask>,
    channel_names: Option<Vec<ChannelName>>,
    nominal_freq: NominalFrequency,
    conf_change_count: u16,
}

impl Default for PmuConfig {
    fn default() -> Self {
        PmuConfig {
            station_name: [b' '; NAME_LEN],
            id_code: 0,
            data_format: DataFormat::default(),
            phasor_factors: Vec::new(),
            analog_factors: Vec::new(),
            status_masks: Vec::new(),
            channel_names: None,
            nominal_freq: NominalFrequency::default(),
            conf_change_count: 0,
        }
    }
}

impl PmuConfig {
    pub fn new() -> Self {
        PmuConfig::default()
    }

    pub fn station_name(&self) -> &ChannelName {
        &self.station_name
    }

    /// Station name with the space padding removed.
    pub fn station_name_str(&self) -> String {
        String::from_utf8_lossy(&self.station_name)
            .trim_end_matches(' ')
            .to_string()
    }

    /// Stores the first 16 bytes of `name`, padding shorter names with spaces.
    pub fn set_station_name(&mut self, name: impl AsRef<[u8]>) {
        self.station_name = pad_name(name.as_ref());
    }

    pub fn id_code(&self) -> u16 {
        self.id_code
    }

    pub fn set_id_code(&mut self, id_code: u16) {
        self.id_code = id_code;
    }

    pub fn data_format(&self) -> DataFormat {
        self.data_format
    }

    pub fn set_data_format(&mut self, format: DataFormat) {
        self.data_format = format;
    }

    pub fn phasor_form(&self) -> PhasorForm {
        self.data_format.phasor_form()
    }

    pub fn set_phasor_form(&mut self, form: PhasorForm) {
        self.data_format = self.data_format.with_phasor_form(form);
    }

    pub fn phasor_type(&self) -> ValueType {
        self.data_format.phasor_type()
    }

    pub fn set_phasor_type(&mut self, value_type: ValueType) {
        self.data_format = self.data_format.with_phasor_type(value_type);
    }

    pub fn analog_type(&self) -> ValueType {
        self.data_format.analog_type()
    }

    pub fn set_analog_type(&mut self, value_type: ValueType) {
        self.data_format = self.data_format.with_analog_type(value_type);
    }

    pub fn freq_type(&self) -> ValueType {
        self.data_format.freq_type()
    }

    pub fn set_freq_type(&mut self, value_type: ValueType) {
        self.data_format = self.data_format.with_freq_type(value_type);
    }

    pub fn num_phasors(&self) -> u16 {
        count_u16(self.phasor_factors.len())
    }

    pub fn num_analogs(&self) -> u16 {
        count_u16(self.analog_factors.len())
    }

    pub fn num_status_words(&self) -> u16 {
        count_u16(self.status_masks.len())
    }

    /// Resizes PHUNIT to `count` zeroed words.
    ///
    /// On allocation failure the previous words are kept.
    pub fn set_num_phasors(&mut self, count: u16) -> Result<(), ParseError> {
        if count as usize != self.phasor_factors.len() {
            self.phasor_factors = zeroed(count as usize, "phasor conversion factors")?;
        }
        Ok(())
    }

    pub fn set_num_analogs(&mut self, count: u16) -> Result<(), ParseError> {
        if count as usize != self.analog_factors.len() {
            self.analog_factors = zeroed(count as usize, "analog conversion factors")?;
        }
        Ok(())
    }

    pub fn set_num_status_words(&mut self, count: u16) -> Result<(), ParseError> {
        if count as usize != self.status_masks.len() {
            self.status_masks = zeroed(count as usize, "status word masks")?;
        }
        Ok(())
    }

    /// 24-bit conversion factor of phasor `index`.
    pub fn phasor_factor(&self, index: usize) -> Option<u32> {
        entry(&self.phasor_factors, index).map(ConversionFactor::factor)
    }

    pub fn set_phasor_factor(&mut self, index: usize, factor: u32) -> Result<(), ParseError> {
        let word = slot(&mut self.phasor_factors, index, "phasor")?;
        *word = word.with_factor(factor);
        Ok(())
    }

    /// Measurement type of phasor `index`.
    ///
    /// # Returns
    ///
    /// * `Ok(PhasorMeasurement)`: Voltage or current.
    /// * `Err(ParseError::InvalidMeasurementType)`: The stored tag is neither.
    /// * `Err(ParseError::IndexOutOfRange)`: No such phasor.
    pub fn phasor_measurement(&self, index: usize) -> Result<PhasorMeasurement, ParseError> {
        let word = entry(&self.phasor_factors, index)
            .ok_or_else(|| ParseError::index("phasor", index, self.phasor_factors.len()))?;
        PhasorMeasurement::from_byte(word.measurement_byte()).ok_or_else(|| {
            ParseError::InvalidMeasurementType {
                message: format!("phasor {} carries tag 0x{:02X}", index, word.measurement_byte()),
            }
        })
    }

    pub fn set_phasor_measurement(
        &mut self,
        index: usize,
        measurement: PhasorMeasurement,
    ) -> Result<(), ParseError> {
        let word = slot(&mut self.phasor_factors, index, "phasor")?;
        *word = word.with_measurement_byte(measurement as u8);
        Ok(())
    }

    pub fn set_all_phasor_factors(&mut self, factor: u32) -> Result<(), ParseError> {
        (1..=self.phasor_factors.len()).try_for_each(|i| self.set_phasor_factor(i, factor))
    }

    pub fn set_all_phasor_measurements(
        &mut self,
        measurement: PhasorMeasurement,
    ) -> Result<(), ParseError> {
        (1..=self.phasor_factors.len()).try_for_each(|i| self.set_phasor_measurement(i, measurement))
    }

    pub fn analog_factor(&self, index: usize) -> Option<u32> {
        entry(&self.analog_factors, index).map(ConversionFactor::factor)
    }

    pub fn set_analog_factor(&mut self, index: usize, factor: u32) -> Result<(), ParseError> {
        let word = slot(&mut self.analog_factors, index, "analog")?;
        *word = word.with_factor(factor);
        Ok(())
    }

    pub fn analog_measurement(&self, index: usize) -> Result<AnalogMeasurement, ParseError> {
        let word = entry(&self.analog_factors, index)
            .ok_or_else(|| ParseError::index("analog", index, self.analog_factors.len()))?;
        AnalogMeasurement::from_byte(word.measurement_byte()).ok_or_else(|| {
            ParseError::InvalidMeasurementType {
                message: format!("analog {} carries tag 0x{:02X}", index, word.measurement_byte()),
            }
        })
    }

    pub fn set_analog_measurement(
        &mut self,
        index: usize,
        measurement: AnalogMeasurement,
    ) -> Result<(), ParseError> {
        let word = slot(&mut self.analog_factors, index, "analog")?;
        *word = word.with_measurement_byte(measurement as u8);
        Ok(())
    }

    pub fn set_all_analog_factors(&mut self, factor: u32) -> Result<(), ParseError> {
        (1..=self.analog_factors.len()).try_for_each(|i| self.set_analog_factor(i, factor))
    }

    pub fn set_all_analog_measurements(
        &mut self,
        measurement: AnalogMeasurement,
    ) -> Result<(), ParseError> {
        (1..=self.analog_factors.len()).try_for_each(|i| self.set_analog_measurement(i, measurement))
    }

    /// Raw measurement tag byte of a phasor, `INVALID_MEASUREMENT` if out of range.
    pub fn phasor_measurement_byte(&self, index: usize) -> u8 {
        entry(&self.phasor_factors, index).map_or(INVALID_MEASUREMENT, |w| w.measurement_byte())
    }

    pub fn status_mask(&self, index: usize) -> Option<StatusMask> {
        entry(&self.status_masks, index)
    }

    pub fn set_normal_state(&mut self, index: usize, mask: u16) -> Result<(), ParseError> {
        let word = slot(&mut self.status_masks, index, "status word")?;
        *word = word.with_normal_state(mask);
        Ok(())
    }

    pub fn set_validity(&mut self, index: usize, mask: u16) -> Result<(), ParseError> {
        let word = slot(&mut self.status_masks, index, "status word")?;
        *word = word.with_validity(mask);
        Ok(())
    }

    pub fn set_all_normal_state(&mut self, mask: u16) -> Result<(), ParseError> {
        (1..=self.status_masks.len()).try_for_each(|i| self.set_normal_state(i, mask))
    }

    pub fn set_all_validity(&mut self, mask: u16) -> Result<(), ParseError> {
        (1..=self.status_masks.len()).try_for_each(|i| self.set_validity(i, mask))
    }

    /// Number of CHNAM entries: one per phasor and analog, sixteen per status word.
    pub fn channel_count(&self) -> usize {
        self.phasor_factors.len()
            + self.analog_factors.len()
            + NAMES_PER_STATUS_WORD * self.status_masks.len()
    }

    pub fn channel_names(&self) -> Option<&[ChannelName]> {
        self.channel_names.as_deref()
    }

    /// Binds channel names, each normalised to 16 space-padded bytes.
    ///
    /// Requires at least one phasor. When serialized, the list is cut or padded with
    /// blank names to `channel_count()`.
    pub fn set_channel_names<S: AsRef<[u8]>>(&mut self, names: &[S]) -> Result<(), ParseError> {
        if self.phasor_factors.is_empty() {
            return Err(ParseError::InvalidFormat {
                message: "Channel names need at least one phasor".to_string(),
            });
        }
        self.channel_names = Some(names.iter().map(|n| pad_name(n.as_ref())).collect());
        Ok(())
    }

    pub fn clear_channel_names(&mut self) {
        self.channel_names = None;
    }

    pub fn nominal_freq(&self) -> NominalFrequency {
        self.nominal_freq
    }

    /// Accepts 50 or 60; anything but 60 is stored as 50 Hz.
    pub fn set_nominal_freq(&mut self, hz: u16) {
        self.nominal_freq = NominalFrequency::from_hz(hz);
    }

    pub fn conf_change_count(&self) -> u16 {
        self.conf_change_count
    }

    pub fn set_conf_change_count(&mut self, count: u16) {
        self.conf_change_count = count;
    }

    pub fn increment_conf_change_count(&mut self) {
        self.conf_change_count = self.conf_change_count.wrapping_add(1);
    }

    /// Serialized size of this PMU block.
    pub fn raw_size(&self) -> usize {
        let names = if self.channel_names.is_some() {
            NAME_LEN * self.channel_count()
        } else {
            0
        };
        CONFIG_COMMON_SIZE_PER_PMU
            + names
            + 4 * (self.phasor_factors.len() + self.analog_factors.len() + self.status_masks.len())
    }

    fn write(&self, writer: &mut FrameWriter) -> Result<(), ParseError> {
        writer.put_slice(&self.station_name)?;
        writer.put_u16(self.id_code)?;
        writer.put_u16(self.data_format.bits())?;
        writer.put_u16(self.num_phasors())?;
        writer.put_u16(self.num_analogs())?;
        writer.put_u16(self.num_status_words())?;

        if let Some(names) = &self.channel_names {
            let blank = [b' '; NAME_LEN];
            for i in 0..self.channel_count() {
                writer.put_slice(names.get(i).unwrap_or(&blank))?;
            }
        }

        for word in self.phasor_factors.iter().chain(&self.analog_factors) {
            writer.put_u32(word.0)?;
        }
        for mask in &self.status_masks {
            writer.put_u32(mask.0)?;
        }

        writer.put_u16(self.nominal_freq.bit())?;
        writer.put_u16(self.conf_change_count)
    }

    fn read(reader: &mut FrameReader, with_names: bool) -> Result<Self, ParseError> {
        let mut pmu = PmuConfig::new();
        pmu.station_name = pad_name(reader.read_bytes(NAME_LEN, "STN")?);
        pmu.id_code = reader.read_u16("IDCODE")?;
        pmu.data_format = DataFormat::from_bits(reader.read_u16("FORMAT")?);
        pmu.set_num_phasors(reader.read_u16("PHNMR")?)?;
        pmu.set_num_analogs(reader.read_u16("ANNMR")?)?;
        pmu.set_num_status_words(reader.read_u16("DGNMR")?)?;

        if with_names {
            let mut names = Vec::with_capacity(pmu.channel_count().min(reader.remaining() / NAME_LEN));
            for _ in 0..pmu.channel_count() {
                names.push(pad_name(reader.read_bytes(NAME_LEN, "CHNAM")?));
            }
            pmu.channel_names = Some(names);
        }

        for word in pmu.phasor_factors.iter_mut() {
            *word = ConversionFactor(reader.read_u32("PHUNIT")?);
        }
        for word in pmu.analog_factors.iter_mut() {
            *word = ConversionFactor(reader.read_u32("ANUNIT")?);
        }
        for mask in pmu.status_masks.iter_mut() {
            *mask = StatusMask(reader.read_u32("DIGUNIT")?);
        }

        pmu.nominal_freq = NominalFrequency::from_bit(reader.read_u16("FNOM")?);
        pmu.conf_change_count = reader.read_u16("CFGCNT")?;
        Ok(pmu)
    }
}

/// Configuration of the whole device as sent in CFG-1 and CFG-2 frames.
///
/// # Fields
///
/// * `id_code`: Stream IDCODE, 0 while unset.
/// * `time_base`: Resolution of FRACSEC, counts per second.
/// * `epoch_seconds`, `frac_of_second`: Timestamp of the configuration.
/// * `data_rate`: DATA_RATE, positive frames per second or negative seconds per frame.
/// * `pmus`: PMU blocks in transmission order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GlobalConfig {
    id_code: u16,
    time_base: u32,
    epoch_seconds: u32,
    frac_of_second: u32,
    data_rate: i16,
    pmus: Vec<PmuConfig>,
}

impl GlobalConfig {
    pub fn new() -> Self {
        GlobalConfig::default()
    }

    pub fn id_code(&self) -> u16 {
        self.id_code
    }

    pub fn set_id_code(&mut self, id_code: u16) {
        self.id_code = id_code;
    }

    pub fn time_base(&self) -> u32 {
        self.time_base
    }

    pub fn set_time_base(&mut self, time_base: u32) {
        self.time_base = time_base;
    }

    pub fn epoch_seconds(&self) -> u32 {
        self.epoch_seconds
    }

    pub fn set_epoch_seconds(&mut self, seconds: u32) {
        self.epoch_seconds = seconds;
    }

    pub fn frac_of_second(&self) -> u32 {
        self.frac_of_second
    }

    pub fn set_frac_of_second(&mut self, fracsec: u32) {
        self.frac_of_second = fracsec;
    }

    /// Stamps the configuration with the current time, keeping the FRACSEC quality byte.
    pub fn update_time(&mut self) {
        let (seconds, fracsec) = now_timestamp(self.time_base, self.frac_of_second);
        self.epoch_seconds = seconds;
        self.frac_of_second = fracsec;
    }

    pub fn data_rate(&self) -> DataRate {
        DataRate(self.data_rate)
    }

    pub fn set_data_rate(&mut self, rate: i16) {
        self.data_rate = rate;
    }

    pub fn num_pmu(&self) -> u16 {
        count_u16(self.pmus.len())
    }

    /// Grows or shrinks the PMU list to `count` blocks.
    ///
    /// Existing blocks below `count` are kept; new blocks start empty with FNOM at 50 Hz.
    /// On allocation failure the list keeps its previous length.
    pub fn set_pmu_count(&mut self, count: u16) -> Result<(), ParseError> {
        let count = count as usize;
        if count > self.pmus.len() {
            self.pmus
                .try_reserve_exact(count - self.pmus.len())
                .map_err(|e| ParseError::InvalidLength {
                    message: format!("Cannot allocate {} PMU blocks: {}", count, e),
                })?;
            self.pmus.resize_with(count, PmuConfig::default);
        } else {
            self.pmus.truncate(count);
        }
        Ok(())
    }

    pub fn pmus(&self) -> &[PmuConfig] {
        &self.pmus
    }

    /// PMU block `index` (1-based).
    pub fn pmu(&self, index: usize) -> Option<&PmuConfig> {
        index.checked_sub(1).and_then(|i| self.pmus.get(i))
    }

    pub fn pmu_mut(&mut self, index: usize) -> Result<&mut PmuConfig, ParseError> {
        slot(&mut self.pmus, index, "PMU")
    }

    /// Applies `op` to every PMU block, stopping at the first failure.
    pub fn for_each_pmu<F>(&mut self, mut op: F) -> Result<(), ParseError>
    where
        F: FnMut(&mut PmuConfig) -> Result<(), ParseError>,
    {
        self.pmus.iter_mut().try_for_each(|pmu| op(pmu))
    }

    pub fn set_all_phasor_factors_of_all(&mut self, factor: u32) -> Result<(), ParseError> {
        self.for_each_pmu(|pmu| pmu.set_all_phasor_factors(factor))
    }

    pub fn set_all_analog_factors_of_all(&mut self, factor: u32) -> Result<(), ParseError> {
        self.for_each_pmu(|pmu| pmu.set_all_analog_factors(factor))
    }

    /// Number of bytes `get_raw_data` emits.
    pub fn frame_size(&self) -> usize {
        CONFIG_COMMON_SIZE + self.pmus.iter().map(PmuConfig::raw_size).sum::<usize>()
    }

    /// Serializes the configuration as a CFG-1 or CFG-2 frame.
    ///
    /// # Parameters
    ///
    /// * `kind`: `FrameType::Config1` or `FrameType::Config2`.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<u8>)`: A complete frame, FRAMESIZE equal to its length and CHK appended.
    /// * `Err(ParseError::InvalidFrameType)`: `kind` is not a CFG-1/2 frame type.
    /// * `Err(ParseError::InvalidLength)`: The frame would exceed 65535 bytes.
    pub fn get_raw_data(&self, kind: FrameType) -> Result<Vec<u8>, ParseError> {
        if !matches!(kind, FrameType::Config1 | FrameType::Config2) {
            return Err(ParseError::InvalidFrameType {
                message: format!("{} is not a CFG-1/CFG-2 frame", kind),
            });
        }

        let mut writer = FrameWriter::new();
        writer.put_u16(kind.sync())?;
        writer.put_u16(0)?; // patched by seal
        writer.put_u16(self.id_code)?;
        writer.put_u32(self.epoch_seconds)?;
        writer.put_u32(self.frac_of_second)?;
        writer.put_u32(self.time_base)?;
        writer.put_u16(self.num_pmu())?;
        for pmu in &self.pmus {
            pmu.write(&mut writer)?;
        }
        writer.put_u16(self.data_rate as u16)?;
        writer.seal()
    }

    /// Parses a CFG-1 or CFG-2 frame.
    ///
    /// Frames with and without the CHNAM blocks are both accepted; the layout whose size
    /// accounts for every byte of the frame wins.
    pub fn from_raw_data(bytes: &[u8]) -> Result<Self, ParseError> {
        validate_checksum(bytes)?;
        let mut reader = FrameReader::new(&bytes[..bytes.len() - 2]);
        let kind = FrameType::from_sync(reader.read_u16("SYNC")?)?;
        if !matches!(kind, FrameType::Config1 | FrameType::Config2) {
            return Err(ParseError::InvalidFrameType {
                message: format!("Expected a configuration frame, got {}", kind),
            });
        }
        let framesize = reader.read_u16("FRAMESIZE")? as usize;
        if framesize != bytes.len() {
            return Err(ParseError::InvalidLength {
                message: format!(
                    "ConfigurationFrame: expected framesize of {} bytes, got {}",
                    framesize,
                    bytes.len()
                ),
            });
        }

        let mut config = GlobalConfig::new();
        config.id_code = reader.read_u16("IDCODE")?;
        config.epoch_seconds = reader.read_u32("SOC")?;
        config.frac_of_second = reader.read_u32("FRACSEC")?;
        config.time_base = reader.read_u32("TIME_BASE")?;
        let num_pmu = reader.read_u16("NUM_PMU")?;

        let body = reader.read_bytes(reader.remaining(), "PMU blocks")?;
        let pmus = Self::read_pmus(body, num_pmu, true)
            .or_else(|_| Self::read_pmus(body, num_pmu, false))?;
        config.pmus = pmus.0;
        config.data_rate = pmus.1;
        Ok(config)
    }

    fn read_pmus(
        body: &[u8],
        num_pmu: u16,
        with_names: bool,
    ) -> Result<(Vec<PmuConfig>, i16), ParseError> {
        let mut reader = FrameReader::new(body);
        let mut pmus = Vec::with_capacity(num_pmu as usize);
        for _ in 0..num_pmu {
            pmus.push(PmuConfig::read(&mut reader, with_names)?);
        }
        let data_rate = reader.read_u16("DATA_RATE")? as i16;
        if reader.remaining() != 0 {
            return Err(ParseError::InvalidLength {
                message: format!("{} unexpected bytes after DATA_RATE", reader.remaining()),
            });
        }
        Ok((pmus, data_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ieee_c37_118::utils::calculate_crc;

    fn reference_config() -> GlobalConfig {
        let mut config = GlobalConfig::new();
        config.set_id_code(7734);
        config.set_time_base(1000);
        config.set_data_rate(30);
        config.set_pmu_count(1).unwrap();

        let pmu = config.pmu_mut(1).unwrap();
        pmu.set_station_name("Station A");
        pmu.set_id_code(7734);
        pmu.set_phasor_type(ValueType::Int);
        pmu.set_phasor_form(PhasorForm::Polar);
        pmu.set_analog_type(ValueType::Int);
        pmu.set_freq_type(ValueType::Int);
        pmu.set_num_phasors(3).unwrap();
        pmu.set_num_analogs(3).unwrap();
        pmu.set_num_status_words(1).unwrap();
        pmu.set_all_phasor_factors(10_000).unwrap();
        pmu.set_all_phasor_measurements(PhasorMeasurement::Voltage).unwrap();
        pmu.set_all_analog_factors(10_000).unwrap();
        pmu.set_all_analog_measurements(AnalogMeasurement::Rms).unwrap();
        pmu.set_nominal_freq(50);
        config
    }

    #[test]
    fn test_raw_data_size_and_crc() {
        let config = reference_config();
        let raw = config.get_raw_data(FrameType::Config1).unwrap();

        assert_eq!(&raw[0..2], &[0xAA, 0x21]);
        assert_eq!(u16::from_be_bytes([raw[2], raw[3]]) as usize, raw.len());
        assert_eq!(raw.len(), config.frame_size());
        // 24 common + 30 per PMU + 4 * (3 + 3 + 1) unit words
        assert_eq!(raw.len(), 24 + 30 + 28);
        let crc = calculate_crc(&raw[..raw.len() - 2]);
        assert_eq!(u16::from_be_bytes([raw[raw.len() - 2], raw[raw.len() - 1]]), crc);
    }

    #[test]
    fn test_raw_data_layout() {
        let mut config = reference_config();
        config.set_epoch_seconds(0x448527F0);
        config.set_frac_of_second(0x5607_1098);
        let raw = config.get_raw_data(FrameType::Config2).unwrap();

        assert_eq!(&raw[0..2], &[0xAA, 0x31]);
        assert_eq!(&raw[4..6], &7734u16.to_be_bytes());
        assert_eq!(&raw[6..10], &[0x44, 0x85, 0x27, 0xF0]);
        assert_eq!(&raw[10..14], &[0x56, 0x07, 0x10, 0x98]);
        assert_eq!(&raw[14..18], &1000u32.to_be_bytes());
        assert_eq!(&raw[18..20], &[0x00, 0x01]);
        assert_eq!(&raw[20..36], b"Station A       ");
        // FORMAT: polar integer phasors
        assert_eq!(&raw[38..40], &[0x00, 0x01]);
        // PHNMR, ANNMR, DGNMR
        assert_eq!(&raw[40..46], &[0x00, 0x03, 0x00, 0x03, 0x00, 0x01]);
        // first PHUNIT: voltage, 10000
        assert_eq!(&raw[46..50], &[0x00, 0x00, 0x27, 0x10]);
        // first ANUNIT: RMS, 10000
        assert_eq!(&raw[58..62], &[0x01, 0x00, 0x27, 0x10]);
        // FNOM 50 Hz, CFGCNT 0, DATA_RATE 30
        let end = raw.len();
        assert_eq!(&raw[end - 8..end - 2], &[0x00, 0x01, 0x00, 0x00, 0x00, 0x1E]);
    }

    #[test]
    fn test_get_raw_data_does_not_mutate() {
        let config = reference_config();
        let before = config.clone();
        let first = config.get_raw_data(FrameType::Config2).unwrap();
        let second = config.get_raw_data(FrameType::Config2).unwrap();
        assert_eq!(config, before);
        assert_eq!(first, second);
        assert!(config.get_raw_data(FrameType::Data).is_err());
    }

    #[test]
    fn test_channel_names_block() {
        let mut config = reference_config();
        let without = config.frame_size();
        config
            .pmu_mut(1)
            .unwrap()
            .set_channel_names(&["VA", "VB", "VC", "ANALOG1"])
            .unwrap();
        let raw = config.get_raw_data(FrameType::Config2).unwrap();

        // 3 + 3 + 16 names of 16 bytes each
        assert_eq!(raw.len(), without + 22 * 16);
        assert_eq!(u16::from_be_bytes([raw[2], raw[3]]) as usize, raw.len());
        assert_eq!(&raw[46..62], b"VA              ");
        assert_eq!(&raw[94..110], b"ANALOG1         ");
        // names not supplied are sent blank
        assert_eq!(&raw[110..126], &[b' '; 16]);

        let mut empty = PmuConfig::new();
        assert!(empty.set_channel_names(&["VA"]).is_err());
    }

    #[test]
    fn test_station_name_padding() {
        let input = b"ABCDEFGHIJKLMNOPQRST";
        for n in 0..=20 {
            let mut pmu = PmuConfig::new();
            pmu.set_station_name(&input[..n]);
            let stored = pmu.station_name();
            let kept = n.min(16);
            assert_eq!(&stored[..kept], &input[..kept]);
            assert!(stored[kept..].iter().all(|&b| b == 0x20));
            assert!(!stored.contains(&0));
        }
    }

    #[test]
    fn test_out_of_range_indices_have_no_effect() {
        let mut config = reference_config();
        let before = config.clone();

        assert!(config.pmu_mut(0).is_err());
        assert!(config.pmu_mut(2).is_err());
        assert!(config.pmu(2).is_none());

        let pmu = config.pmu_mut(1).unwrap();
        assert!(matches!(
            pmu.set_phasor_factor(4, 1),
            Err(ParseError::IndexOutOfRange { .. })
        ));
        assert!(pmu.set_analog_factor(0, 1).is_err());
        assert!(pmu.set_validity(2, 1).is_err());
        assert_eq!(pmu.phasor_factor(4), None);
        assert_eq!(pmu.phasor_measurement_byte(9), INVALID_MEASUREMENT);
        assert!(pmu.analog_measurement(4).is_err());
        assert_eq!(config, before);
    }

    #[test]
    fn test_resize_clears_and_same_size_keeps() {
        let mut pmu = PmuConfig::new();
        pmu.set_num_phasors(2).unwrap();
        pmu.set_phasor_factor(1, 500).unwrap();
        pmu.set_num_phasors(2).unwrap();
        assert_eq!(pmu.phasor_factor(1), Some(500));

        pmu.set_num_phasors(3).unwrap();
        assert_eq!(pmu.num_phasors(), 3);
        assert_eq!(pmu.phasor_factor(1), Some(0));

        pmu.set_num_phasors(0).unwrap();
        assert_eq!(pmu.num_phasors(), 0);
        assert_eq!(pmu.phasor_factor(1), None);
    }

    #[test]
    fn test_measurement_tags_and_masks() {
        let mut pmu = PmuConfig::new();
        pmu.set_num_phasors(1).unwrap();
        pmu.set_num_analogs(1).unwrap();
        pmu.set_num_status_words(1).unwrap();

        pmu.set_phasor_factor(1, 915_527).unwrap();
        pmu.set_phasor_measurement(1, PhasorMeasurement::Current).unwrap();
        assert_eq!(pmu.phasor_factor(1), Some(915_527));
        assert_eq!(pmu.phasor_measurement(1), Ok(PhasorMeasurement::Current));

        pmu.set_analog_measurement(1, AnalogMeasurement::Peak).unwrap();
        assert_eq!(pmu.analog_measurement(1), Ok(AnalogMeasurement::Peak));

        pmu.set_normal_state(1, 0xFFFF).unwrap();
        pmu.set_validity(1, 0x00F0).unwrap();
        assert_eq!(pmu.status_mask(1), Some(StatusMask(0xFFFF_00F0)));
    }

    #[test]
    fn test_invalid_measurement_tag_from_wire() {
        let mut config = reference_config();
        let mut raw = config.get_raw_data(FrameType::Config2).unwrap();
        // corrupt the tag of the first PHUNIT and re-seal
        raw[46] = 0x07;
        let end = raw.len() - 2;
        let crc = calculate_crc(&raw[..end]);
        raw[end..].copy_from_slice(&crc.to_be_bytes());

        config = GlobalConfig::from_raw_data(&raw).unwrap();
        let pmu = config.pmu(1).unwrap();
        assert!(matches!(
            pmu.phasor_measurement(1),
            Err(ParseError::InvalidMeasurementType { .. })
        ));
        assert_eq!(pmu.phasor_measurement_byte(1), 0x07);
    }

    #[test]
    fn test_pmu_count_and_conf_change_count() {
        let mut config = reference_config();
        config.set_pmu_count(3).unwrap();
        assert_eq!(config.num_pmu(), 3);
        assert_eq!(config.pmu(1).unwrap().num_phasors(), 3);
        assert_eq!(config.pmu(3).unwrap().nominal_freq(), NominalFrequency::Hz50);
        assert_eq!(config.pmu(3).unwrap().num_phasors(), 0);

        config.set_pmu_count(1).unwrap();
        assert_eq!(config.num_pmu(), 1);

        let pmu = config.pmu_mut(1).unwrap();
        pmu.set_conf_change_count(u16::MAX);
        pmu.increment_conf_change_count();
        assert_eq!(pmu.conf_change_count(), 0);
    }

    #[test]
    fn test_round_trip_with_multiple_pmus() {
        let mut config = reference_config();
        config.set_pmu_count(2).unwrap();
        let second = config.pmu_mut(2).unwrap();
        second.set_station_name("Station B");
        second.set_num_phasors(1).unwrap();
        second.set_phasor_type(ValueType::Float);
        second.set_channel_names(&["IA"]).unwrap();
        second.set_nominal_freq(60);

        let raw = config.get_raw_data(FrameType::Config2).unwrap();
        // channel names are bound on one PMU only, which the parser cannot express
        assert!(GlobalConfig::from_raw_data(&raw).is_err());

        config.pmu_mut(2).unwrap().clear_channel_names();
        let raw = config.get_raw_data(FrameType::Config2).unwrap();
        assert_eq!(GlobalConfig::from_raw_data(&raw).unwrap(), config);
    }
}
