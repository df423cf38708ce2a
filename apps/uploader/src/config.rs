//! Uploader configuration.
//!
//! Stored as TOML at `~/.config/chunkwire/config.toml`. Every field is
//! optional; command-line flags override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use chunkwire_channel::{ChannelConfig, ReconnectConfig};
use chunkwire_protocol::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECTION_ATTEMPTS,
    DEFAULT_RECONNECTION_DELAY,
};
use chunkwire_upload::{DEFAULT_ACK_TIMEOUT, UploadConfig};

use crate::Args;

/// Uploader configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Base WebSocket URL of the upload server.
    #[serde(default = "default_url")]
    pub url: String,

    /// Identity the channel is opened for (usually a user id).
    #[serde(default)]
    pub identity: String,

    /// Bytes per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Wait for each server reply, in milliseconds (0 = wait forever).
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    #[serde(default = "default_reconnection_attempts")]
    pub reconnection_attempts: u32,

    #[serde(default = "default_reconnection_delay_ms")]
    pub reconnection_delay_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_url() -> String {
    ChannelConfig::default().url
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_ack_timeout_ms() -> u64 {
    DEFAULT_ACK_TIMEOUT.as_millis() as u64
}

fn default_reconnection_attempts() -> u32 {
    DEFAULT_RECONNECTION_ATTEMPTS
}

fn default_reconnection_delay_ms() -> u64 {
    DEFAULT_RECONNECTION_DELAY.as_millis() as u64
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_millis() as u64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            identity: String::new(),
            chunk_size: default_chunk_size(),
            ack_timeout_ms: default_ack_timeout_ms(),
            reconnection_attempts: default_reconnection_attempts(),
            reconnection_delay_ms: default_reconnection_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Config {
    /// Loads `path`, or the default location when `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (config_path(), false),
        };

        if !path.exists() {
            anyhow::ensure!(!explicit, "config file {} not found", path.display());
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Overrides fields with any flags given on the command line.
    pub fn apply(&mut self, args: &Args) {
        if let Some(url) = &args.url {
            self.url = url.clone();
        }
        if let Some(identity) = &args.identity {
            self.identity = identity.clone();
        }
        if let Some(size) = args.chunk_size {
            self.chunk_size = size;
        }
        if let Some(ms) = args.ack_timeout_ms {
            self.ack_timeout_ms = ms;
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            url: self.url.clone(),
            reconnect: ReconnectConfig {
                enabled: self.reconnection_attempts > 0,
                attempts: self.reconnection_attempts,
                delay: Duration::from_millis(self.reconnection_delay_ms),
                connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            },
            ..ChannelConfig::default()
        }
    }

    pub fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            chunk_size: self.chunk_size,
            ack_timeout: (self.ack_timeout_ms > 0).then(|| Duration::from_millis(self.ack_timeout_ms)),
        }
    }
}

/// `$HOME/.config/chunkwire/config.toml`.
fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("chunkwire")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.url, "ws://localhost:3000/ws");
        assert!(config.identity.is_empty());
        assert_eq!(config.chunk_size, 524_288);
        assert_eq!(config.ack_timeout_ms, 60_000);
        assert_eq!(config.reconnection_attempts, 5);
        assert_eq!(config.reconnection_delay_ms, 1000);
        assert_eq!(config.connect_timeout_ms, 20_000);
    }

    #[test]
    fn config_partial_toml() {
        let config: Config = toml::from_str(r#"identity = "user-9""#).unwrap();
        assert_eq!(config.identity, "user-9");
        assert_eq!(config.chunk_size, 524_288);
        assert_eq!(config.url, "ws://localhost:3000/ws");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = Config {
            url: "ws://files.example/ws".into(),
            identity: "u1".into(),
            chunk_size: 1024,
            ack_timeout_ms: 0,
            reconnection_attempts: 2,
            reconnection_delay_ms: 250,
            connect_timeout_ms: 5000,
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(toml::from_str::<Config>(&text).unwrap(), config);
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "chunk_size = 2048\nreconnection_attempts = 0\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.chunk_size, 2048);
        assert!(!config.channel_config().reconnect.enabled);
    }

    #[test]
    fn load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn flags_override_file() {
        let mut config: Config = toml::from_str("identity = \"from-file\"\nchunk_size = 10").unwrap();
        let args = Args::parse_from([
            "chunkwire",
            "--identity",
            "from-flag",
            "--ack-timeout-ms",
            "0",
            "a.bin",
        ]);
        config.apply(&args);

        assert_eq!(config.identity, "from-flag");
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.upload_config().ack_timeout, None);
    }

    #[test]
    fn channel_config_maps_reconnect_policy() {
        let channel = Config::default().channel_config();
        assert!(channel.reconnect.enabled);
        assert_eq!(channel.reconnect.attempts, 5);
        assert_eq!(channel.reconnect.delay, Duration::from_secs(1));
        assert_eq!(channel.reconnect.connect_timeout, Duration::from_secs(20));
    }
}
