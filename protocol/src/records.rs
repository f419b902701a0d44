//! Inbound telemetry records
//!
//! A record is one JSON object per message: arbitrary variable-name keys plus
//! a `ds` timestamp. Only numeric fields become readings; the schema is not
//! fixed upstream and is checked against rule variables at evaluation time.

use crate::constants::TIMESTAMP_FIELD;
use crate::error::ProtocolError;
use chrono::{DateTime, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A single numeric reading, keeping the integer/float distinction of the source field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(v) => v as f64,
            Numeric::Float(v) => v,
        }
    }

    fn from_number(n: &serde_json::Number) -> Option<Self> {
        n.as_i64()
            .map(Numeric::Int)
            .or_else(|| n.as_f64().map(Numeric::Float))
    }
}

impl From<f64> for Numeric {
    fn from(v: f64) -> Self {
        Numeric::Float(v)
    }
}

impl From<i64> for Numeric {
    fn from(v: i64) -> Self {
        Numeric::Int(v)
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Int(v) => write!(f, "{}", v),
            Numeric::Float(v) => write!(f, "{}", v),
        }
    }
}

/// One source's latest set of named readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Timestamp as sent by the producer
    pub ds: String,

    /// Numeric readings in record order
    pub values: IndexMap<String, Numeric>,
}

impl Snapshot {
    pub fn new(ds: impl Into<String>) -> Self {
        Self {
            ds: ds.into(),
            values: IndexMap::new(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Numeric>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Decode a raw message body
    pub fn from_json(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(fields) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let ds = match fields.get(TIMESTAMP_FIELD) {
            None => return Err(ProtocolError::MissingTimestamp),
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => return Err(ProtocolError::InvalidTimestamp(other.to_string())),
        };

        let values = fields
            .iter()
            .filter(|(name, _)| name.as_str() != TIMESTAMP_FIELD)
            .filter_map(|(name, value)| match value {
                Value::Number(n) => Numeric::from_number(n).map(|v| (name.clone(), v)),
                _ => None,
            })
            .collect();

        Ok(Self { ds, values })
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).map(|v| v.as_f64())
    }

    /// Parsed `ds`, if it is in a recognised timestamp format
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.ds)
    }
}

/// Parse a record timestamp: RFC 3339, or `YYYY-MM-DD[T| ]HH:MM:SS[.fff]` taken as UTC
pub fn parse_timestamp(ds: &str) -> Option<NaiveDateTime> {
    let ds = ds.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(ds) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(ds, fmt).ok())
}
