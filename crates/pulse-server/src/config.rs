//! Server configuration.

use std::time::Duration;

use pulse_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Runtime configuration for [`PulseServer`](crate::server::PulseServer).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Capacity of each client's outbound queue.
    pub outbound_queue_capacity: usize,
    /// Interval between Ping frames, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a client is disconnected, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Lifetime drops before a slow client is evicted (`0` = never).
    pub slow_client_drop_limit: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Grace period for background tasks during shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl ServerConfig {
    /// Ping interval as a [`Duration`], at least 1 ms.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    /// Heartbeat timeout as a [`Duration`], never shorter than the interval.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms).max(self.heartbeat_interval())
    }

    /// Shutdown grace period as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            outbound_queue_capacity: 256,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            slow_client_drop_limit: 100,
            max_message_size: 64 * 1024,
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            outbound_queue_capacity: settings.outbound_queue_capacity,
            heartbeat_interval_ms: settings.heartbeat_interval_ms,
            heartbeat_timeout_ms: settings.heartbeat_timeout_ms,
            slow_client_drop_limit: settings.slow_client_drop_limit,
            max_message_size: settings.max_message_size,
            shutdown_timeout_ms: settings.shutdown_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_loopback_with_auto_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn durations_from_millis() {
        let cfg = ServerConfig {
            heartbeat_interval_ms: 1_500,
            heartbeat_timeout_ms: 4_500,
            shutdown_timeout_ms: 250,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.heartbeat_interval(), Duration::from_millis(1_500));
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_millis(4_500));
        assert_eq!(cfg.shutdown_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn zero_heartbeat_values_are_clamped() {
        let cfg = ServerConfig {
            heartbeat_interval_ms: 0,
            heartbeat_timeout_ms: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.heartbeat_interval(), Duration::from_millis(1));
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_millis(1));
    }

    #[test]
    fn from_settings_copies_every_field() {
        let settings = ServerSettings {
            host: "10.0.0.5".into(),
            port: 7000,
            outbound_queue_capacity: 3,
            heartbeat_interval_ms: 1_000,
            heartbeat_timeout_ms: 2_000,
            slow_client_drop_limit: 7,
            max_message_size: 512,
            shutdown_timeout_ms: 100,
        };
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.host, "10.0.0.5");
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.outbound_queue_capacity, 3);
        assert_eq!(cfg.heartbeat_interval_ms, 1_000);
        assert_eq!(cfg.heartbeat_timeout_ms, 2_000);
        assert_eq!(cfg.slow_client_drop_limit, 7);
        assert_eq!(cfg.max_message_size, 512);
        assert_eq!(cfg.shutdown_timeout_ms, 100);
    }

    #[test]
    fn deserialize_from_json_string() {
        let json = r#"{"host":"0.0.0.0","port":3000,"outbound_queue_capacity":5,"heartbeat_interval_ms":10,"heartbeat_timeout_ms":30,"slow_client_drop_limit":0,"max_message_size":512,"shutdown_timeout_ms":1}"#;
        let cfg: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.outbound_queue_capacity, 5);
        assert_eq!(cfg.slow_client_drop_limit, 0);
    }
}
