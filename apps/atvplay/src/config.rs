//! Player configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use atvlink_core::protocol_constants::{
    DEFAULT_CONTROL_PORT, KEEPALIVE_INTERVAL_SECS, MAX_LINE_LEN, MIN_LINE_LEN,
};
use atvlink_core::LinkConfig;
use serde::Deserialize;

/// Player configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Receiver control address (`host:port`).
    /// Override: `ATVPLAY_TARGET`
    pub target: String,

    /// Extension the media file is published under (`/atv.<ext>`).
    /// Receivers pick a demuxer from it, so it should match the container.
    /// Override: `ATVPLAY_EXT`
    pub extension: String,

    /// Seconds between keep-alive no-ops; 0 disables them.
    /// Override: `ATVPLAY_KEEPALIVE_SECS`
    pub keepalive_interval_secs: u64,

    /// Longest response line accepted from the receiver (bytes).
    /// Must be at least `MIN_LINE_LEN`.
    pub max_line_len: usize,

    /// IP the media server binds to and advertises.
    /// If not specified, the local address of the control connection is used.
    /// Override: `ATVPLAY_ADVERTISE_IP`
    pub advertise_ip: Option<IpAddr>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            target: format!("apple-tv.local:{}", DEFAULT_CONTROL_PORT),
            extension: "mp4".to_string(),
            keepalive_interval_secs: KEEPALIVE_INTERVAL_SECS,
            max_line_len: MAX_LINE_LEN,
            advertise_ip: None,
        }
    }
}

impl PlayerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the link could never work with.
    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.max_line_len >= MIN_LINE_LEN,
            "max_line_len must be at least {} bytes, got {}",
            MIN_LINE_LEN,
            self.max_line_len
        );
        Ok(())
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ATVPLAY_TARGET") {
            if !val.is_empty() {
                self.target = val;
            }
        }

        if let Ok(val) = std::env::var("ATVPLAY_EXT") {
            if !val.is_empty() {
                self.extension = val;
            }
        }

        if let Ok(val) = std::env::var("ATVPLAY_KEEPALIVE_SECS") {
            if let Ok(secs) = val.parse() {
                self.keepalive_interval_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("ATVPLAY_ADVERTISE_IP") {
            if let Ok(ip) = val.parse() {
                self.advertise_ip = Some(ip);
            }
        }
    }

    /// Converts to atvlink-core's `LinkConfig`.
    pub fn to_link_config(&self) -> LinkConfig {
        LinkConfig {
            keepalive_interval: (self.keepalive_interval_secs > 0)
                .then(|| Duration::from_secs(self.keepalive_interval_secs)),
            max_line_len: self.max_line_len,
            ..Default::default()
        }
    }
}
