//! # Synthetic Configuration and Sample Generator
//!
//! Random but well-formed configurations and measurement samples, used by the simulated
//! acquisition source, the benches and the tests.
//!
//! ## Key Components
//!
//! - `random_configuration`: Builds a `GlobalConfig` with a given number of PMUs.
//! - `fill_random_sample`: Writes plausible measurements into every PMU of a bound
//!   `DataCodec`.
//! - `random_station_name`, `random_channel_name`: Helpers for generating names.

use super::common::ParseError;
use super::config::GlobalConfig;
use super::data_frame::{DataCodec, PhasorValue, Scalar};
use super::units::{AnalogMeasurement, PhasorForm, PhasorMeasurement, ValueType};
use rand::Rng;
use std::f32::consts::PI;

const DEFAULT_PHASORS: u16 = 4;
const DEFAULT_ANALOGS: u16 = 3;
const DEFAULT_STATUS_WORDS: u16 = 1;

/// Station name `STATION<index>` padded to 16 bytes by the configuration.
pub fn random_station_name(station_index: usize) -> String {
    format!("STATION{:03}", station_index)
}

/// Channel name `<prefix><index>`, e.g. `PH2`.
pub fn random_channel_name(prefix: &str, index: usize) -> String {
    format!("{}{}", prefix, index)
}

/// Generates a configuration with `num_pmus` PMUs of four phasors (three voltages and one
/// current), three analogs and one status word each.
///
/// # Parameters
///
/// * `num_pmus`: Number of PMU blocks.
/// * `polar`: Phasor form.
/// * `use_float`: Encode every channel class as floating point.
pub fn random_configuration(
    num_pmus: u16,
    polar: bool,
    use_float: bool,
) -> Result<GlobalConfig, ParseError> {
    let mut rng = rand::rng();
    let value_type = if use_float {
        ValueType::Float
    } else {
        ValueType::Int
    };

    let mut config = GlobalConfig::new();
    config.set_id_code(rng.random_range(1..=u16::MAX));
    config.set_time_base(1_000_000);
    config.set_data_rate(30);
    config.set_pmu_count(num_pmus)?;

    for index in 1..=num_pmus as usize {
        let pmu = config.pmu_mut(index)?;
        pmu.set_station_name(random_station_name(index));
        pmu.set_id_code(1000 + index as u16);
        pmu.set_phasor_form(if polar {
            PhasorForm::Polar
        } else {
            PhasorForm::Rectangular
        });
        pmu.set_phasor_type(value_type);
        pmu.set_analog_type(value_type);
        pmu.set_freq_type(value_type);
        pmu.set_num_phasors(DEFAULT_PHASORS)?;
        pmu.set_num_analogs(DEFAULT_ANALOGS)?;
        pmu.set_num_status_words(DEFAULT_STATUS_WORDS)?;

        pmu.set_all_phasor_factors(915_527)?;
        pmu.set_all_phasor_measurements(PhasorMeasurement::Voltage)?;
        pmu.set_phasor_factor(DEFAULT_PHASORS as usize, 45_776)?;
        pmu.set_phasor_measurement(DEFAULT_PHASORS as usize, PhasorMeasurement::Current)?;
        pmu.set_all_analog_factors(1)?;
        pmu.set_analog_measurement(1, AnalogMeasurement::SinglePointOnWave)?;
        pmu.set_analog_measurement(2, AnalogMeasurement::Rms)?;
        pmu.set_analog_measurement(3, AnalogMeasurement::Peak)?;
        pmu.set_all_validity(0xFFFF)?;
        pmu.set_nominal_freq(if rng.random_bool(0.5) { 50 } else { 60 });

        let mut names = Vec::new();
        for i in 0..DEFAULT_PHASORS as usize {
            names.push(random_channel_name("PH", i));
        }
        for i in 0..DEFAULT_ANALOGS as usize {
            names.push(random_channel_name("AN", i));
        }
        for i in 0..16 * DEFAULT_STATUS_WORDS as usize {
            names.push(random_channel_name("DG", i));
        }
        pmu.set_channel_names(&names)?;
    }

    config.update_time();
    Ok(config)
}

/// Fills every bound sample with a balanced three-phase set plus noise.
///
/// Integer channels carry raw counts, floating point channels engineering units. STAT is
/// left untouched.
pub fn fill_random_sample<R: Rng + ?Sized>(codec: &mut DataCodec, rng: &mut R) -> Result<(), ParseError> {
    for pmu in 1..=codec.num_pmu() {
        let sample = codec.sample(pmu)?;
        let form = sample.phasor_form();
        let phasor_type = sample.phasors().value_type();
        let num_phasors = sample.phasors().len();
        let analog_type = sample.analogs().value_type();
        let num_analogs = sample.analogs().len();
        let freq_type = sample.freq_type();
        let num_digital = sample.digital().len();

        for index in 1..=num_phasors {
            let magnitude = 230.0 + rng.random_range(-2.0..2.0f32);
            let angle = -2.0 * PI / 3.0 * ((index - 1) % 3) as f32 + rng.random_range(-0.01..0.01f32);
            let components = match form {
                PhasorForm::Polar => [magnitude, angle],
                PhasorForm::Rectangular => [magnitude * angle.cos(), magnitude * angle.sin()],
            };
            let value = match phasor_type {
                ValueType::Float => PhasorValue::Float(components),
                ValueType::Int => PhasorValue::Int([
                    (components[0] * 100.0) as i16,
                    (components[1] * 100.0) as i16,
                ]),
            };
            codec.set_phasor(pmu, index, value)?;
        }

        for index in 1..=num_analogs {
            let reading = 100.0 * index as f32 + rng.random_range(-1.0..1.0f32);
            let value = match analog_type {
                ValueType::Float => Scalar::Float(reading),
                ValueType::Int => Scalar::Int(reading as i16),
            };
            codec.set_analog(pmu, index, value)?;
        }

        // FREQ in mHz and DFREQ in hundredths of Hz/s when integer
        let deviation = rng.random_range(-0.05..0.05f32);
        let rocof = rng.random_range(-0.01..0.01f32);
        let (deviation, rocof) = match freq_type {
            ValueType::Float => (Scalar::Float(deviation), Scalar::Float(rocof)),
            ValueType::Int => (
                Scalar::Int((deviation * 1000.0) as i16),
                Scalar::Int((rocof * 100.0) as i16),
            ),
        };
        codec.set_freq_deviation(pmu, deviation)?;
        codec.set_rocof(pmu, rocof)?;

        for index in 1..=num_digital {
            codec.set_digital(pmu, index, rng.random::<u16>())?;
        }
    }
    Ok(())
}
