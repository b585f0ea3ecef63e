//! Unit conversions between device values and UI-facing fractions.

use crate::config::GainScale;
use crate::protocol::Format;

/// Bottom of the displayed gain range
pub const MIN_DB: f64 = -60.0;
/// Top of the settable gain range
pub const MAX_DB: f64 = 12.0;
/// Gain setting granularity in dB
pub const DB_STEP: f64 = 0.5;

/// 0..100 percent to 0..1
pub fn pct_to_fraction(pct: f64) -> f64 {
    (pct / 100.0).clamp(0.0, 1.0)
}

pub fn fraction_to_pct(fraction: f64) -> f64 {
    fraction.clamp(0.0, 1.0) * 100.0
}

/// -60..0 dB to 0..1
pub fn db_to_fraction(db: f64) -> f64 {
    ((db - MIN_DB) / -MIN_DB).clamp(0.0, 1.0)
}

pub fn fraction_to_db(fraction: f64) -> f64 {
    fraction.clamp(0.0, 1.0) * -MIN_DB + MIN_DB
}

/// Clamp to the settable range and snap to the 0.5 dB grid
pub fn clamp_db(db: f64) -> f64 {
    ((db / DB_STEP).round() * DB_STEP).clamp(MIN_DB, MAX_DB)
}

/// Mute flags arrive as numbers; anything non-zero is muted
pub fn is_truthy(value: Option<f64>) -> bool {
    value.is_some_and(|v| v != 0.0)
}

impl GainScale {
    /// Format used to subscribe to and write gain parameters
    pub fn format(self) -> Format {
        match self {
            GainScale::Db => Format::Val,
            GainScale::Pct => Format::Pct,
        }
    }

    /// Value assumed until the device reports one
    pub fn initial_value(self) -> f64 {
        match self {
            GainScale::Db => MIN_DB,
            GainScale::Pct => 50.0,
        }
    }

    /// Relative change for one volume up/down press
    pub fn step(self) -> f64 {
        match self {
            GainScale::Db => 1.0,
            GainScale::Pct => 5.0,
        }
    }

    pub fn to_fraction(self, value: f64) -> f64 {
        match self {
            GainScale::Db => db_to_fraction(value),
            GainScale::Pct => pct_to_fraction(value),
        }
    }

    pub fn from_fraction(self, fraction: f64) -> f64 {
        match self {
            GainScale::Db => clamp_db(fraction_to_db(fraction)),
            GainScale::Pct => fraction_to_pct(fraction).round(),
        }
    }

    pub fn clamp(self, value: f64) -> f64 {
        match self {
            GainScale::Db => clamp_db(value),
            GainScale::Pct => value.round().clamp(0.0, 100.0),
        }
    }

    /// Wire value for a gain write
    pub(crate) fn wire_value(self, value: f64) -> serde_json::Value {
        match self {
            GainScale::Db => serde_json::Value::from(value),
            GainScale::Pct => serde_json::Value::from(value as i64),
        }
    }
}
