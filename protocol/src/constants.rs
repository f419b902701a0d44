//! Channel and stream source definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical publish/subscribe channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    /// Every accepted inverter record, republished as-is
    InverterRaw,

    /// Every accepted weather record, republished as-is
    WeatherRaw,

    /// One message per fired violation report
    Alerts,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::InverterRaw, Channel::WeatherRaw, Channel::Alerts];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::InverterRaw => "inverter-raw",
            Channel::WeatherRaw => "weather-raw",
            Channel::Alerts => "alerts",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "inverter-raw" => Some(Channel::InverterRaw),
            "weather-raw" => Some(Channel::WeatherRaw),
            "alerts" => Some(Channel::Alerts),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound telemetry streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Inverter,
    Weather,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Inverter, Source::Weather];

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Inverter => "inverter",
            Source::Weather => "weather",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "inverter" => Some(Source::Inverter),
            "weather" => Some(Source::Weather),
            _ => None,
        }
    }

    /// Raw channel that republishes this source's records
    pub fn channel(self) -> Channel {
        match self {
            Source::Inverter => Channel::InverterRaw,
            Source::Weather => Channel::WeatherRaw,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the timestamp field carried by every inbound record
pub const TIMESTAMP_FIELD: &str = "ds";

/// Default number of entries retained by the alert log
pub const DEFAULT_ALERT_CAP: usize = 50;

/// Largest payload that fits in a single UDP datagram
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Default UDP ports
pub const DEFAULT_ADMIN_PORT: u16 = 9100;
pub const DEFAULT_INVERTER_PORT: u16 = 9101;
pub const DEFAULT_WEATHER_PORT: u16 = 9102;
