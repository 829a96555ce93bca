//! # PMU Context
//!
//! `PmuContext` gathers the state shared by the protocol server and the acquisition
//! thread: the device configuration behind a reader/writer lock, the sample queue and the
//! device details. It is built once at startup and handed out as a cheap clone.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::acquisition::SampleQueue;
use crate::details::PmuDetails;
use crate::ieee_c37_118::common::{FrameType, ParseError};
use crate::ieee_c37_118::config::GlobalConfig;
use crate::ieee_c37_118::data_frame::DataCodec;
use crate::ieee_c37_118::header;

#[derive(Debug, Clone)]
pub struct PmuContext {
    pub config: Arc<RwLock<GlobalConfig>>,
    pub samples: Arc<SampleQueue>,
    pub details: PmuDetails,
    header_text: Option<String>,
}

impl PmuContext {
    /// Context holding the stock configuration for `details`.
    pub fn new(details: PmuDetails) -> Result<Self, ParseError> {
        let config = GlobalConfig::default_for(&details)?;
        Ok(Self::with_config(details, config))
    }

    pub fn with_config(details: PmuDetails, config: GlobalConfig) -> Self {
        PmuContext {
            config: Arc::new(RwLock::new(config)),
            samples: Arc::new(SampleQueue::new()),
            details,
            header_text: None,
        }
    }

    /// Text sent in HEADER frames. Defaults to the device description.
    pub fn header_text(&self) -> String {
        self.header_text
            .clone()
            .unwrap_or_else(|| self.details.description())
    }

    pub fn set_header_text(&mut self, text: Option<String>) {
        self.header_text = text;
    }

    /// Serializes the configuration as `kind`, stamped with the current time.
    pub fn config_frame(&self, kind: FrameType) -> Result<Vec<u8>, ParseError> {
        let mut snapshot = self.config.read().clone();
        snapshot.update_time();
        snapshot.get_raw_data(kind)
    }

    pub fn header_frame(&self) -> Result<Vec<u8>, ParseError> {
        let text = self.header_text();
        header::build(&self.config.read(), Some(&text))
    }

    /// Binds a data codec to the current configuration.
    pub fn bind_codec(&self) -> Result<DataCodec, ParseError> {
        DataCodec::bind(&self.config.read())
    }
}
