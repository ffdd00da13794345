//! Messages in and out of the helm.
//!
//! The helm does not own a transport. Whatever carries messages delivers
//! `BusMessage`s to `Helm::deliver` and forwards the returned
//! `Publication`s.

use crate::core::info::InfoValue;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub key: String,
    pub value: InfoValue,
    /// Name of the sending process.
    pub source: String,
    /// Time the message was posted, used for skew checks.
    pub time: f64,
}

impl BusMessage {
    pub fn new(key: &str, value: impl Into<InfoValue>, source: &str, time: f64) -> Self {
        BusMessage {
            key: key.to_string(),
            value: value.into(),
            source: source.to_string(),
            time,
        }
    }

    pub fn num(key: &str, value: f64, time: f64) -> Self {
        Self::new(key, value, "bus", time)
    }

    pub fn text(key: &str, value: &str, time: f64) -> Self {
        Self::new(key, value, "bus", time)
    }

    /// Parse a `KEY=value` line; numeric values become numbers.
    pub fn parse_line(line: &str, source: &str, time: f64) -> Option<Self> {
        let (key, value) = line.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some(Self::new(key, InfoValue::parse(value.trim()), source, time))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Publication {
    pub key: String,
    pub value: InfoValue,
}

impl Publication {
    pub fn new(key: &str, value: impl Into<InfoValue>) -> Self {
        Publication {
            key: key.to_string(),
            value: value.into(),
        }
    }
}
