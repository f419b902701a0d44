//! Configuration management

use anyhow::{Context, Result};
use protocol::{DEFAULT_ADMIN_PORT, DEFAULT_INVERTER_PORT, DEFAULT_WEATHER_PORT, Source};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,
    #[serde(default = "default_inverter_port")]
    pub inverter_port: u16,
    #[serde(default = "default_weather_port")]
    pub weather_port: u16,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            admin_port: default_admin_port(),
            inverter_port: default_inverter_port(),
            weather_port: default_weather_port(),
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

impl ServerConfig {
    pub fn admin_addr(&self) -> String {
        format!("{}:{}", self.host, self.admin_port)
    }

    pub fn stream_addr(&self, source: Source) -> String {
        let port = match source {
            Source::Inverter => self.inverter_port,
            Source::Weather => self.weather_port,
        };
        format!("{}:{}", self.host, port)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_admin_port() -> u16 {
    DEFAULT_ADMIN_PORT
}

fn default_inverter_port() -> u16 {
    DEFAULT_INVERTER_PORT
}

fn default_weather_port() -> u16 {
    DEFAULT_WEATHER_PORT
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_retry_attempts() -> u32 {
    3
}

impl Config {
    /// Load `path`, or fall back to defaults when it does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&contents).with_context(|| "Failed to parse config file")?;

        if config.server.retry_attempts == 0 {
            anyhow::bail!("server.retry_attempts must be at least 1");
        }

        Ok(config)
    }
}
