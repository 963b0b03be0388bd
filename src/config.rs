//! Configuration loading from TOML
//!
//! # Configuration File Format
//!
//! ```toml
//! drone_ip = "192.168.28.1"
//! ctl_port = 7080
//! video_port = 7070
//! control_interval_ms = 140
//! heartbeat_interval_ms = 1000
//! rx_timeout_s = 3
//! hover_throttle_cap = 30
//! indoor_default = true
//! low_battery_warn = 20
//! low_battery_land = 10
//! ```
//!
//! Every field has a default matching the stock X80 firmware; an empty file
//! is a valid configuration. Validation failures are fatal to `connect()`
//! only, never to the process.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use crate::protocol::constants::{
    DEFAULT_CONTROL_INTERVAL_MS, DEFAULT_CTL_PORT, DEFAULT_DRONE_IP, DEFAULT_HEARTBEAT_INTERVAL_MS,
    DEFAULT_RX_TIMEOUT_S, DEFAULT_VIDEO_PORT,
};

fn default_drone_ip() -> String {
    DEFAULT_DRONE_IP.to_string()
}
fn default_ctl_port() -> u16 {
    DEFAULT_CTL_PORT
}
fn default_video_port() -> u16 {
    DEFAULT_VIDEO_PORT
}
fn default_control_interval_ms() -> u32 {
    DEFAULT_CONTROL_INTERVAL_MS
}
fn default_heartbeat_interval_ms() -> u32 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}
fn default_rx_timeout_s() -> u32 {
    DEFAULT_RX_TIMEOUT_S
}
fn default_hover_throttle_cap() -> u8 {
    30
}
fn default_indoor_default() -> bool {
    true
}
fn default_low_battery_warn() -> u8 {
    20
}
fn default_low_battery_land() -> u8 {
    10
}

/// Station configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    /// Drone address on its own access point
    #[serde(default = "default_drone_ip")]
    pub drone_ip: String,

    /// Control/telemetry port (local bind and remote peer)
    #[serde(default = "default_ctl_port")]
    pub ctl_port: u16,

    /// Video port (local bind and remote peer)
    #[serde(default = "default_video_port")]
    pub video_port: u16,

    /// Control frame cadence
    ///
    /// **Units**: Milliseconds
    /// **Default**: 140 (the cadence the firmware expects)
    ///
    /// The firmware treats a long gap in control frames as signal loss,
    /// so large values will hover-lock or land the aircraft.
    #[serde(default = "default_control_interval_ms")]
    pub control_interval_ms: u32,

    /// Keep-alive cadence on the control port
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u32,

    /// Telemetry silence tolerated before the link is considered degraded
    #[serde(default = "default_rx_timeout_s")]
    pub rx_timeout_s: u32,

    /// Indoor-mode throttle ceiling, percent of full stick
    #[serde(default = "default_hover_throttle_cap")]
    pub hover_throttle_cap: u8,

    /// Start with indoor mode engaged
    #[serde(default = "default_indoor_default")]
    pub indoor_default: bool,

    /// Battery percentage that raises a warning on the status stream
    #[serde(default = "default_low_battery_warn")]
    pub low_battery_warn: u8,

    /// Battery percentage that auto-arms landing
    #[serde(default = "default_low_battery_land")]
    pub low_battery_land: u8,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            drone_ip: default_drone_ip(),
            ctl_port: default_ctl_port(),
            video_port: default_video_port(),
            control_interval_ms: default_control_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            rx_timeout_s: default_rx_timeout_s(),
            hover_throttle_cap: default_hover_throttle_cap(),
            indoor_default: default_indoor_default(),
            low_battery_warn: default_low_battery_warn(),
            low_battery_land: default_low_battery_land(),
        }
    }
}

impl StationConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("failed to read config: {}", e)))?;

        let config: StationConfig = basic_toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate field ranges and cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.drone_addr()?;

        if self.ctl_port == 0 || self.video_port == 0 {
            return Err(Error::Config("ports must be non-zero".to_string()));
        }
        if self.ctl_port == self.video_port {
            return Err(Error::Config(
                "ctl_port and video_port must differ".to_string(),
            ));
        }
        if !(20..=1000).contains(&self.control_interval_ms) {
            return Err(Error::Config(format!(
                "control_interval_ms must be between 20 and 1000 (got {}). \
                The firmware treats long control gaps as signal loss.",
                self.control_interval_ms
            )));
        }
        if !(100..=10_000).contains(&self.heartbeat_interval_ms) {
            return Err(Error::Config(format!(
                "heartbeat_interval_ms must be between 100 and 10000 (got {})",
                self.heartbeat_interval_ms
            )));
        }
        if self.rx_timeout_s == 0 {
            return Err(Error::Config("rx_timeout_s must be at least 1".to_string()));
        }
        if self.hover_throttle_cap > 100 {
            return Err(Error::Config(format!(
                "hover_throttle_cap must be 0-100 (got {})",
                self.hover_throttle_cap
            )));
        }
        if self.low_battery_warn > 100 || self.low_battery_land >= self.low_battery_warn {
            return Err(Error::Config(format!(
                "battery thresholds must satisfy land < warn <= 100 (got land={}, warn={})",
                self.low_battery_land, self.low_battery_warn
            )));
        }
        Ok(())
    }

    pub fn drone_addr(&self) -> Result<IpAddr> {
        self.drone_ip
            .parse()
            .map_err(|_| Error::Config(format!("invalid drone_ip: {}", self.drone_ip)))
    }

    pub fn control_interval(&self) -> Duration {
        Duration::from_millis(self.control_interval_ms as u64)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms as u64)
    }

    pub fn rx_timeout(&self) -> Duration {
        Duration::from_secs(self.rx_timeout_s as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_all_defaults() {
        let config: StationConfig = basic_toml::from_str("").unwrap();
        assert_eq!(config.drone_ip, "192.168.28.1");
        assert_eq!(config.ctl_port, 7080);
        assert_eq!(config.video_port, 7070);
        assert_eq!(config.control_interval_ms, 140);
        assert_eq!(config.heartbeat_interval_ms, 1000);
        assert_eq!(config.rx_timeout_s, 3);
        assert_eq!(config.hover_throttle_cap, 30);
        assert!(config.indoor_default);
        assert_eq!(config.low_battery_warn, 20);
        assert_eq!(config.low_battery_land, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_override() {
        let config: StationConfig =
            basic_toml::from_str("drone_ip = \"10.0.0.1\"\ncontrol_interval_ms = 100\n").unwrap();
        assert_eq!(config.drone_ip, "10.0.0.1");
        assert_eq!(config.control_interval_ms, 100);
        assert_eq!(config.ctl_port, 7080);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = StationConfig::default();
        config.drone_ip = "not-an-ip".to_string();
        assert!(config.validate().is_err());

        let mut config = StationConfig::default();
        config.control_interval_ms = 5;
        assert!(config.validate().is_err());

        let mut config = StationConfig::default();
        config.low_battery_land = 30; // above warn
        assert!(config.validate().is_err());

        let mut config = StationConfig::default();
        config.video_port = config.ctl_port;
        assert!(config.validate().is_err());
    }
}
