//! Public configuration and state types for the channel.

use std::fmt;
use std::time::Duration;

use chunkwire_protocol::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECTION_ATTEMPTS, DEFAULT_RECONNECTION_DELAY,
    WS_MAX_MESSAGE_SIZE, WS_PING_PERIOD, WS_PONG_WAIT,
};

/// Opaque key scoping one live channel (typically a user id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelIdentity(String);

impl ChannelIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ChannelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelIdentity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ChannelIdentity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Connection state of a [`WsChannel`](crate::WsChannel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live connection.
    Disconnected,
    /// Initial connection (with retries) in progress.
    Connecting,
    /// Connected.
    Connected,
    /// Connection lost, automatic reconnection in progress.
    Reconnecting { attempt: u32 },
}

/// Automatic reconnection policy: fixed delay, bounded attempts.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Reconnect automatically after an unexpected disconnect.
    pub enabled: bool,
    /// Attempts before giving up.
    pub attempts: u32,
    /// Delay before each attempt.
    pub delay: Duration,
    /// Upper bound for a single connection attempt.
    pub connect_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts: DEFAULT_RECONNECTION_ATTEMPTS,
            delay: DEFAULT_RECONNECTION_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Configuration for a [`WsChannel`](crate::WsChannel).
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Base WebSocket URL, e.g. `ws://localhost:3000/ws`. The identity is
    /// appended as a query parameter.
    pub url: String,
    pub reconnect: ReconnectConfig,
    /// Interval between keepalive pings.
    pub ping_period: Duration,
    /// Silence window after which the connection is considered dead.
    pub pong_wait: Duration,
    /// Largest frame accepted in either direction.
    pub max_message_size: usize,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000/ws".into(),
            reconnect: ReconnectConfig::default(),
            ping_period: WS_PING_PERIOD,
            pong_wait: WS_PONG_WAIT,
            max_message_size: WS_MAX_MESSAGE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_config_defaults() {
        let config = ReconnectConfig::default();
        assert!(config.enabled);
        assert_eq!(config.attempts, 5);
        assert_eq!(config.delay, Duration::from_millis(1000));
        assert_eq!(config.connect_timeout, Duration::from_secs(20));
    }

    #[test]
    fn channel_config_new_keeps_defaults() {
        let config = ChannelConfig::new("ws://example.test/socket");
        assert_eq!(config.url, "ws://example.test/socket");
        assert_eq!(config.reconnect.attempts, 5);
        assert_eq!(config.ping_period, WS_PING_PERIOD);
    }

    #[test]
    fn identity_emptiness() {
        assert!(ChannelIdentity::new("").is_empty());
        assert!(ChannelIdentity::new("   ").is_empty());
        assert!(!ChannelIdentity::from("user-1").is_empty());
        assert_eq!(ChannelIdentity::from("user-1").to_string(), "user-1");
    }

    #[test]
    fn connection_state_equality() {
        assert_eq!(ConnectionState::Connected, ConnectionState::Connected);
        assert_ne!(ConnectionState::Connected, ConnectionState::Connecting);
        assert_ne!(
            ConnectionState::Reconnecting { attempt: 1 },
            ConnectionState::Reconnecting { attempt: 2 },
        );
    }
}
