use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default TCP control port
pub const DEFAULT_TCP_PORT: u16 = 5321;
/// Default UDP meter port
pub const DEFAULT_UDP_PORT: u16 = 3131;
/// Default entry title
pub const DEFAULT_NAME: &str = "Atlas AZM";
/// Keepalive period, under the device's 5 minute idle timeout
pub const DEFAULT_KEEPALIVE_MS: u64 = 240_000;
/// Pause after both channels open before the link is used
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;
/// Period of the connection health check
pub const DEFAULT_HEALTH_CHECK_MS: u64 = 30_000;

/// Unit used for gain parameters on this device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GainScale {
    /// Decibels in `val`, displayed over -60..0 dB
    #[default]
    Db,
    /// Device-side percentage in `pct`
    Pct,
}

/// Connection settings for one device.
///
/// Deserializes straight from config entry data such as
/// `{"host": "10.0.0.20", "tcp_port": 5321, "udp_port": 3131}`; every field
/// except `host` falls back to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub host: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_ms: u64,
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_health_check")]
    pub health_check_interval_ms: u64,
    #[serde(default)]
    pub gain_scale: GainScale,
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}

fn default_udp_port() -> u16 {
    DEFAULT_UDP_PORT
}

fn default_keepalive() -> u64 {
    DEFAULT_KEEPALIVE_MS
}

fn default_settle_delay() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}

fn default_health_check() -> u64 {
    DEFAULT_HEALTH_CHECK_MS
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            name: default_name(),
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            keepalive_interval_ms: DEFAULT_KEEPALIVE_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            health_check_interval_ms: DEFAULT_HEALTH_CHECK_MS,
            gain_scale: GainScale::Db,
        }
    }
}

impl DeviceConfig {
    /// Config for `host` with all defaults
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn builder(host: impl Into<String>) -> DeviceConfigBuilder {
        DeviceConfigBuilder {
            config: Self::new(host),
        }
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }
}

/// Builder for DeviceConfig.
#[derive(Debug, Clone)]
pub struct DeviceConfigBuilder {
    config: DeviceConfig,
}

impl DeviceConfigBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn tcp_port(mut self, port: u16) -> Self {
        self.config.tcp_port = port;
        self
    }

    pub fn udp_port(mut self, port: u16) -> Self {
        self.config.udp_port = port;
        self
    }

    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.config.health_check_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn gain_scale(mut self, scale: GainScale) -> Self {
        self.config.gain_scale = scale;
        self
    }

    pub fn build(self) -> DeviceConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_data_defaults() {
        let config: DeviceConfig = serde_json::from_str(r#"{"host": "10.0.0.20"}"#).unwrap();
        assert_eq!(config.host, "10.0.0.20");
        assert_eq!(config.name, "Atlas AZM");
        assert_eq!(config.tcp_port, 5321);
        assert_eq!(config.udp_port, 3131);
        assert_eq!(config.keepalive_interval(), Duration::from_secs(240));
        assert_eq!(config.settle_delay(), Duration::from_millis(500));
        assert_eq!(config.health_check_interval(), Duration::from_secs(30));
        assert_eq!(config.gain_scale, GainScale::Db);
    }

    #[test]
    fn test_entry_data_overrides() {
        let config: DeviceConfig = serde_json::from_str(
            r#"{"host": "azm.local", "name": "Bar", "tcp_port": 6000, "udp_port": 6001, "gain_scale": "pct"}"#,
        )
        .unwrap();
        assert_eq!(config.name, "Bar");
        assert_eq!(config.tcp_port, 6000);
        assert_eq!(config.udp_port, 6001);
        assert_eq!(config.gain_scale, GainScale::Pct);
    }

    #[test]
    fn test_host_is_required() {
        assert!(serde_json::from_str::<DeviceConfig>(r#"{"tcp_port": 1}"#).is_err());
    }

    #[test]
    fn test_builder() {
        let config = DeviceConfig::builder("10.1.1.1")
            .name("Patio")
            .udp_port(4000)
            .keepalive_interval(Duration::from_secs(60))
            .settle_delay(Duration::ZERO)
            .build();
        assert_eq!(config.host, "10.1.1.1");
        assert_eq!(config.name, "Patio");
        assert_eq!(config.tcp_port, DEFAULT_TCP_PORT);
        assert_eq!(config.udp_port, 4000);
        assert_eq!(config.keepalive_interval_ms, 60_000);
        assert_eq!(config.settle_delay_ms, 0);
    }
}
