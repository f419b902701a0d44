//! Server configuration

use anyhow::{Context, Result};
use protocol::{DEFAULT_ADMIN_PORT, DEFAULT_ALERT_CAP, DEFAULT_INVERTER_PORT, DEFAULT_WEATHER_PORT};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    pub rules: RulesConfig,
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub streams: StreamsConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    pub bind_address: String,
    #[serde(default = "default_inverter_port")]
    pub inverter_port: u16,
    #[serde(default = "default_weather_port")]
    pub weather_port: u16,
    #[serde(default = "default_admin_bind_address")]
    pub admin_bind_address: String,
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertBackend {
    Csv,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_backend")]
    pub backend: AlertBackend,
    pub log_path: PathBuf,
    #[serde(default = "default_cap")]
    pub cap: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamsConfig {
    #[serde(default = "default_true")]
    pub reject_stale: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_subscriber_timeout")]
    pub subscriber_timeout_sec: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self { reject_stale: true }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            subscriber_timeout_sec: default_subscriber_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

fn default_inverter_port() -> u16 {
    DEFAULT_INVERTER_PORT
}

fn default_weather_port() -> u16 {
    DEFAULT_WEATHER_PORT
}

fn default_admin_port() -> u16 {
    DEFAULT_ADMIN_PORT
}

fn default_admin_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_backend() -> AlertBackend {
    AlertBackend::Csv
}

fn default_cap() -> usize {
    DEFAULT_ALERT_CAP
}

fn default_true() -> bool {
    true
}

fn default_capacity() -> usize {
    256
}

fn default_subscriber_timeout() -> u64 {
    60
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config = Self::parse(&content)?;

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let ports = [
            ("inverter_port", self.general.inverter_port),
            ("weather_port", self.general.weather_port),
            ("admin_port", self.general.admin_port),
        ];
        for (name, port) in ports {
            if port == 0 {
                anyhow::bail!("general.{} must be non-zero", name);
            }
        }
        if self.general.inverter_port == self.general.weather_port
            || self.general.inverter_port == self.general.admin_port
            || self.general.weather_port == self.general.admin_port
        {
            anyhow::bail!("inverter, weather and admin ports must be distinct");
        }
        if self.alerts.cap == 0 {
            anyhow::bail!("alerts.cap must be at least 1");
        }
        if self.broadcast.capacity == 0 {
            anyhow::bail!("broadcast.capacity must be at least 1");
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be \"text\" or \"json\"");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [general]
        bind_address = "0.0.0.0"

        [rules]
        path = "rules.json"

        [alerts]
        log_path = "alerts.csv"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.general.inverter_port, DEFAULT_INVERTER_PORT);
        assert_eq!(config.general.admin_bind_address, "127.0.0.1");
        assert_eq!(config.alerts.backend, AlertBackend::Csv);
        assert_eq!(config.alerts.cap, 50);
        assert!(config.streams.reject_stale);
        assert_eq!(config.broadcast.capacity, 256);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
            [general]
            bind_address = "127.0.0.1"
            inverter_port = 7001
            weather_port = 7002
            admin_port = 7000

            [rules]
            path = "/etc/solarwatch/rules.json"

            [alerts]
            backend = "sqlite"
            log_path = "/var/lib/solarwatch/alerts.db"
            cap = 200

            [streams]
            reject_stale = false

            [broadcast]
            capacity = 16
            subscriber_timeout_sec = 30

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.alerts.backend, AlertBackend::Sqlite);
        assert_eq!(config.alerts.cap, 200);
        assert!(!config.streams.reject_stale);
        assert_eq!(config.broadcast.subscriber_timeout_sec, 30);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let zero_cap = MINIMAL.replace("log_path = \"alerts.csv\"", "log_path = \"a\"\ncap = 0");
        assert!(Config::parse(&zero_cap).is_err());

        let clash = MINIMAL.replace(
            "bind_address = \"0.0.0.0\"",
            "bind_address = \"0.0.0.0\"\ninverter_port = 9100",
        );
        assert!(Config::parse(&clash).is_err());

        let bad_backend = MINIMAL.replace("log_path = \"alerts.csv\"", "log_path = \"a\"\nbackend = \"kafka\"");
        assert!(Config::parse(&bad_backend).is_err());
    }
}
