//! Configuration management for the RTP streaming stack

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::RtpSinkConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub network: NetworkConfig,
}

/// RTP session parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// RTP payload type (dynamic range)
    #[serde(default = "default_payload_type")]
    pub payload_type: u8,

    /// RTP payload cap per packet in bytes
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,

    /// SSRC identifier (0 = pick one at random)
    #[serde(default)]
    pub ssrc: u32,

    /// Media clock rate in Hz
    #[serde(default = "default_clock_rate")]
    pub clock_rate: u32,
}

impl SessionConfig {
    /// The configured SSRC, or a random one when left at 0.
    pub fn effective_ssrc(&self) -> u32 {
        if self.ssrc != 0 {
            self.ssrc
        } else {
            rand::random()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            payload_type: default_payload_type(),
            max_payload: default_max_payload(),
            ssrc: 0,
            clock_rate: default_clock_rate(),
        }
    }
}

/// Network destination parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// RTP destination host
    #[serde(default = "default_remote_host")]
    pub remote_host: String,

    /// RTP destination port; RTCP uses the next port up
    #[serde(default = "default_rtp_port")]
    pub rtp_port: u16,

    /// Local port (0 = auto-assign)
    #[serde(default)]
    pub local_port: u16,

    /// Seconds between RTCP sender reports
    #[serde(default = "default_rtcp_interval")]
    pub rtcp_interval_seconds: u64,

    /// Statistics reporting interval (seconds)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_seconds: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            remote_host: default_remote_host(),
            rtp_port: default_rtp_port(),
            local_port: 0,
            rtcp_interval_seconds: default_rtcp_interval(),
            stats_interval_seconds: default_stats_interval(),
        }
    }
}

// Default value functions
fn default_payload_type() -> u8 {
    98
}
fn default_max_payload() -> usize {
    1400
}
fn default_clock_rate() -> u32 {
    90_000
}
fn default_remote_host() -> String {
    "127.0.0.1".to_string()
}
fn default_rtp_port() -> u16 {
    5004
}
fn default_rtcp_interval() -> u64 {
    5
}
fn default_stats_interval() -> u64 {
    10
}

impl Config {
    /// Loads configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Loads configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Derives the network-sink configuration.
    pub fn sink_config(&self) -> RtpSinkConfig {
        RtpSinkConfig {
            remote_host: self.network.remote_host.clone(),
            rtp_port: self.network.rtp_port,
            local_port: self.network.local_port,
            ssrc: self.session.effective_ssrc(),
            rtcp_interval: Duration::from_secs(self.network.rtcp_interval_seconds),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;

        if session.max_payload < 500 || session.max_payload > 9000 {
            return Err(ConfigError::Invalid(format!(
                "max_payload must be between 500 and 9000, got {}",
                session.max_payload
            )));
        }

        if session.payload_type > 127 {
            return Err(ConfigError::Invalid(format!(
                "payload_type must fit in 7 bits, got {}",
                session.payload_type
            )));
        }

        if session.clock_rate == 0 {
            return Err(ConfigError::Invalid("clock_rate must be > 0".to_string()));
        }

        if self.network.rtp_port == 0 {
            return Err(ConfigError::Invalid("rtp_port must be > 0".to_string()));
        }

        if self.network.rtcp_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "rtcp_interval_seconds must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Saves configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
