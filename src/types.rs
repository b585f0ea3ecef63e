use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a configured device
pub type EntryId = Uuid;

/// Source or zone index as used in parameter names
pub type Index = usize;

/// Gain value in decibels
pub type GainDb = f64;

/// Number of sources and zones on an AZM8
pub const STANDARD_CHANNELS: usize = 8;

/// Device parameter names for one input source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceParams {
    pub index: Index,
    pub name: String,
    pub gain: String,
    pub mute: String,
    pub meter: String,
}

impl SourceParams {
    pub fn new(index: Index) -> Self {
        Self {
            index,
            name: format!("SourceName_{}", index),
            gain: format!("SourceGain_{}", index),
            mute: format!("SourceMute_{}", index),
            meter: format!("SourceMeter_{}", index),
        }
    }
}

/// Device parameter names for one output zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneParams {
    pub index: Index,
    pub name: String,
    pub gain: String,
    pub mute: String,
    pub source: String,
    pub active: String,
}

impl ZoneParams {
    pub fn new(index: Index) -> Self {
        Self {
            index,
            name: format!("ZoneName_{}", index),
            gain: format!("ZoneGain_{}", index),
            mute: format!("ZoneMute_{}", index),
            source: format!("ZoneSource_{}", index),
            active: format!("ZoneActive_{}", index),
        }
    }
}

/// Fixed parameter layout of a device, built once at setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterTable {
    sources: Vec<SourceParams>,
    zones: Vec<ZoneParams>,
}

impl ParameterTable {
    /// The 8-source / 8-zone AZM8 layout
    pub fn standard() -> Self {
        Self::with_counts(STANDARD_CHANNELS, STANDARD_CHANNELS)
    }

    pub fn with_counts(sources: usize, zones: usize) -> Self {
        Self {
            sources: (0..sources).map(SourceParams::new).collect(),
            zones: (0..zones).map(ZoneParams::new).collect(),
        }
    }

    pub fn sources(&self) -> &[SourceParams] {
        &self.sources
    }

    pub fn zones(&self) -> &[ZoneParams] {
        &self.zones
    }
}

impl Default for ParameterTable {
    fn default() -> Self {
        Self::standard()
    }
}
