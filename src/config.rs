//! Scenario configuration for the echo demo.
//!
//! Every field has a default matching the canonical two-node echo run,
//! so an empty document is a valid scenario. Unit-carrying values are
//! written the way they are printed: `"5Mbps"`, `"2ms"`, `"100p"`.
//!
//! ```yaml
//! link:
//!   device: { data_rate: 5Mbps, queue: 100p, mtu: 1500 }
//!   channel: { delay: 2ms }
//! client: { max_packets: 4, interval: 1s, packet_size: 1024, start: 2s }
//! stop_time: 10s
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::{ChannelConfig, DeviceConfig, RateErrorModel};
use crate::rate::DataRate;
use crate::time::Time;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scenario YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid scenario: {0}")]
    Invalid(String),
}

/// The point-to-point link joining client and server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub device: DeviceConfig,
    pub channel: ChannelConfig,
    /// Receive-side loss on both devices.
    pub error_model: Option<RateErrorModel>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            device: DeviceConfig::new(DataRate::mbps(5)),
            channel: ChannelConfig::point_to_point(Time::millis(2)),
            error_model: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub start: Time,
    pub stop: Option<Time>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            start: Time::seconds(1),
            stop: Some(Time::seconds(10)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Zero sends until the client stops.
    pub max_packets: u32,
    pub interval: Time,
    pub packet_size: u32,
    pub start: Time,
    pub stop: Option<Time>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            max_packets: 1,
            interval: Time::seconds(1),
            packet_size: 1024,
            start: Time::seconds(2),
            stop: Some(Time::seconds(10)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub link: LinkConfig,
    pub server: ServerConfig,
    pub client: ClientConfig,
    /// Simulation horizon; `None` runs until the queue drains.
    pub stop_time: Option<Time>,
    /// Record a packet trace during the run.
    pub trace: bool,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            link: LinkConfig::default(),
            server: ServerConfig::default(),
            client: ClientConfig::default(),
            stop_time: Some(Time::seconds(10)),
            trace: false,
        }
    }
}

impl ScenarioConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: ScenarioConfig = serde_yaml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject values the simulator would refuse at setup time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.link.device.data_rate.is_zero() {
            return invalid("link.device.data_rate must be greater than zero".into());
        }
        if self.link.channel.delay.is_negative() {
            return invalid(format!("link.channel.delay is negative: {}", self.link.channel.delay));
        }
        if let Some(model) = &self.link.error_model {
            if !(0.0..=1.0).contains(&model.rate) {
                return invalid(format!("link.error_model.rate {} is outside [0, 1]", model.rate));
            }
        }
        if self.client.packet_size == 0 {
            return invalid("client.packet_size must be at least one byte".into());
        }
        if self.client.interval.is_negative() {
            return invalid(format!("client.interval is negative: {}", self.client.interval));
        }
        for (name, start, stop) in [
            ("server", self.server.start, self.server.stop),
            ("client", self.client.start, self.client.stop),
        ] {
            if start.is_negative() {
                return invalid(format!("{name}.start is negative: {start}"));
            }
            if let Some(stop) = stop {
                if stop < start {
                    return invalid(format!("{name}.stop {stop} is before {name}.start {start}"));
                }
            }
        }
        if let Some(t) = self.stop_time {
            if t.is_negative() {
                return invalid(format!("stop_time is negative: {t}"));
            }
        }
        Ok(())
    }
}
