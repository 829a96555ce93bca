//! # PMU Device Details
//!
//! Settings that identify this device to a PDC: PMU id, station name, the administrator's
//! address and the listening port. They are persisted as JSON and can be overridden from
//! the environment. `configure_pmu` turns them into the stock device configuration.

use std::fs;
use std::net::IpAddr;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ieee_c37_118::common::ParseError;
use crate::ieee_c37_118::config::GlobalConfig;
use crate::ieee_c37_118::units::{AnalogMeasurement, PhasorForm, PhasorMeasurement, ValueType};

pub const DEFAULT_PMU_ID: u16 = 1;
pub const DEFAULT_STATION_NAME: &str = "PMU Station";
pub const DEFAULT_ADMIN_IP: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 4713;
/// Ports below this are reserved for system services.
pub const MIN_PORT: u16 = 1025;

const DEFAULT_TIME_BASE: u32 = 1000;
const DEFAULT_DATA_RATE: i16 = 1000;
const DEFAULT_CONVERSION_FACTOR: u32 = 10_000;
const DIGITAL_LABELS: &str = "123456789ABCDEFG";

/// Errors raised while loading, saving or validating `PmuDetails`.
#[derive(Debug, Error)]
pub enum DetailsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed details file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
    #[error("Cannot build configuration: {0}")]
    Config(#[from] ParseError),
}

fn invalid(field: &'static str, message: impl Into<String>) -> DetailsError {
    DetailsError::InvalidValue {
        field,
        message: message.into(),
    }
}

/// Identity and network settings of the device.
///
/// # Fields
///
/// * `pmu_id`: IDCODE reported in every frame, 1..=65535.
/// * `station_name`: Station name, truncated to 16 bytes on the wire.
/// * `admin_ip`: Address of the administrator allowed to manage the device.
/// * `port`: TCP port the protocol server listens on, 1025..=65535.
/// * `first_run`: Set until the details have been saved once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PmuDetails {
    pub pmu_id: u16,
    pub station_name: String,
    pub admin_ip: String,
    pub port: u16,
    pub first_run: bool,
}

impl Default for PmuDetails {
    fn default() -> Self {
        PmuDetails {
            pmu_id: DEFAULT_PMU_ID,
            station_name: DEFAULT_STATION_NAME.to_string(),
            admin_ip: DEFAULT_ADMIN_IP.to_string(),
            port: DEFAULT_PORT,
            first_run: true,
        }
    }
}

impl PmuDetails {
    /// Reads details from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DetailsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let details: PmuDetails = serde_json::from_str(&content)?;
        details.validate()?;
        debug!("Loaded PMU details from {}", path.display());
        Ok(details)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, DetailsError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!("No PMU details at {}, using defaults", path.display());
            Ok(PmuDetails::default())
        }
    }

    /// Writes the details as pretty JSON and clears `first_run`.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), DetailsError> {
        self.validate()?;
        self.first_run = false;
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Applies `PMU_ID`, `PMU_STATION_NAME`, `PMU_ADMIN_IP` and `PMU_PORT` from the process
    /// environment.
    pub fn apply_env(&mut self) -> Result<(), DetailsError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), DetailsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PMU_ID") {
            self.pmu_id = value
                .trim()
                .parse()
                .map_err(|_| invalid("pmu_id", format!("'{}' is not a 16-bit id", value)))?;
        }
        if let Some(value) = lookup("PMU_STATION_NAME") {
            self.station_name = value;
        }
        if let Some(value) = lookup("PMU_ADMIN_IP") {
            self.admin_ip = value.trim().to_string();
        }
        if let Some(value) = lookup("PMU_PORT") {
            self.port = value
                .trim()
                .parse()
                .map_err(|_| invalid("port", format!("'{}' is not a port number", value)))?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), DetailsError> {
        if self.pmu_id == 0 {
            return Err(invalid("pmu_id", "must be between 1 and 65535"));
        }
        if self.port < MIN_PORT {
            return Err(invalid(
                "port",
                format!("{} is below {}", self.port, MIN_PORT),
            ));
        }
        self.admin_ip
            .parse::<IpAddr>()
            .map_err(|_| invalid("admin_ip", format!("'{}' is not an IP address", self.admin_ip)))?;
        Ok(())
    }

    /// Default HEADER frame text.
    pub fn description(&self) -> String {
        format!("{} PMU {}", self.station_name, self.pmu_id)
    }

    /// Resets `config` to the stock single-PMU device: three voltage phasors, three RMS
    /// analogs and one breaker status word, all integer encoded, 50 Hz nominal.
    pub fn configure_pmu(&self, config: &mut GlobalConfig) -> Result<(), ParseError> {
        config.set_id_code(self.pmu_id);
        config.set_time_base(DEFAULT_TIME_BASE);
        config.set_data_rate(DEFAULT_DATA_RATE);
        config.set_pmu_count(0)?;
        config.set_pmu_count(1)?;

        let pmu = config.pmu_mut(1)?;
        pmu.set_station_name(&self.station_name);
        pmu.set_id_code(self.pmu_id);
        pmu.set_phasor_form(PhasorForm::Polar);
        pmu.set_phasor_type(ValueType::Int);
        pmu.set_analog_type(ValueType::Int);
        pmu.set_freq_type(ValueType::Int);

        pmu.set_num_phasors(3)?;
        pmu.set_all_phasor_factors(DEFAULT_CONVERSION_FACTOR)?;
        pmu.set_all_phasor_measurements(PhasorMeasurement::Voltage)?;

        pmu.set_num_analogs(3)?;
        pmu.set_all_analog_factors(DEFAULT_CONVERSION_FACTOR)?;
        pmu.set_all_analog_measurements(AnalogMeasurement::Rms)?;

        pmu.set_num_status_words(1)?;
        pmu.set_all_normal_state(0x0000)?;
        pmu.set_all_validity(0xFFFF)?;

        pmu.set_nominal_freq(50);
        pmu.set_conf_change_count(0);

        let mut names: Vec<String> = ["VA", "VB", "VC", "ANALOG1", "ANALOG2", "ANALOG3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        names.extend(DIGITAL_LABELS.chars().map(|c| format!("BREAKER {} STATUS", c)));
        pmu.set_channel_names(&names)?;

        config.update_time();
        Ok(())
    }
}

impl GlobalConfig {
    /// Stock device configuration for `details`.
    pub fn default_for(details: &PmuDetails) -> Result<GlobalConfig, ParseError> {
        let mut config = GlobalConfig::new();
        details.configure_pmu(&mut config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ieee_c37_118::common::FrameType;
    use crate::ieee_c37_118::utils::calculate_crc;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let details = PmuDetails::default();
        assert_eq!(details.pmu_id, 1);
        assert_eq!(details.station_name, "PMU Station");
        assert_eq!(details.admin_ip, "127.0.0.1");
        assert_eq!(details.port, 4713);
        assert!(details.first_run);
        assert!(details.validate().is_ok());
        assert_eq!(details.description(), "PMU Station PMU 1");
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("pmu_details_{}.json", std::process::id()));
        let mut details = PmuDetails {
            pmu_id: 42,
            station_name: "Substation 7".to_string(),
            ..PmuDetails::default()
        };
        details.save(&path).unwrap();
        assert!(!details.first_run);

        let loaded = PmuDetails::load(&path).unwrap();
        assert_eq!(loaded, details);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let details: PmuDetails = serde_json::from_str(r#"{"pmu_id": 9}"#).unwrap();
        assert_eq!(details.pmu_id, 9);
        assert_eq!(details.port, DEFAULT_PORT);
        assert!(details.first_run);
    }

    #[test]
    fn test_overrides() {
        let mut details = PmuDetails::default();
        details
            .apply_overrides(lookup(&[("PMU_ID", "77"), ("PMU_PORT", "5000")]))
            .unwrap();
        assert_eq!(details.pmu_id, 77);
        assert_eq!(details.port, 5000);
        assert_eq!(details.station_name, DEFAULT_STATION_NAME);

        assert!(details.apply_overrides(lookup(&[("PMU_PORT", "80")])).is_err());
        assert!(details.apply_overrides(lookup(&[("PMU_ID", "abc")])).is_err());
        assert!(details
            .apply_overrides(lookup(&[("PMU_PORT", "5000"), ("PMU_ADMIN_IP", "not-an-ip")]))
            .is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let zero_id = PmuDetails {
            pmu_id: 0,
            ..PmuDetails::default()
        };
        assert!(matches!(
            zero_id.validate(),
            Err(DetailsError::InvalidValue { field: "pmu_id", .. })
        ));
        let low_port = PmuDetails {
            port: 1024,
            ..PmuDetails::default()
        };
        assert!(low_port.validate().is_err());
    }

    #[test]
    fn test_default_configuration() {
        let details = PmuDetails {
            pmu_id: 123,
            ..PmuDetails::default()
        };
        let config = GlobalConfig::default_for(&details).unwrap();
        assert_eq!(config.id_code(), 123);
        assert_eq!(config.time_base(), 1000);
        assert_eq!(config.num_pmu(), 1);

        let pmu = config.pmu(1).unwrap();
        assert_eq!(pmu.station_name_str(), "PMU Station");
        assert_eq!(pmu.num_phasors(), 3);
        assert_eq!(pmu.num_analogs(), 3);
        assert_eq!(pmu.num_status_words(), 1);
        assert_eq!(pmu.phasor_form(), PhasorForm::Polar);
        assert_eq!(pmu.phasor_factor(1), Some(10_000));
        assert_eq!(pmu.analog_measurement(3), Ok(AnalogMeasurement::Rms));
        assert_eq!(pmu.nominal_freq().hz(), 50);

        let names = pmu.channel_names().unwrap();
        assert_eq!(names.len(), 3 + 3 + 16);
        assert_eq!(&names[0][..2], b"VA");
        assert_eq!(&names[21][..], b"BREAKER G STATUS");

        let raw = config.get_raw_data(FrameType::Config1).unwrap();
        assert_eq!(u16::from_be_bytes([raw[2], raw[3]]) as usize, raw.len());
        let n = raw.len();
        assert_eq!(
            u16::from_be_bytes([raw[n - 2], raw[n - 1]]),
            calculate_crc(&raw[..n - 2])
        );
    }
}
