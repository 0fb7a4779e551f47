//! Configuration system for Tether.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $TETHER_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/tether/config.toml
//!   3. ~/.config/tether/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::chunk::Limits;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    pub network: NetworkConfig,
    pub limits: Limits,
    pub peer_channel: PeerChannelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the socket and signaling listeners bind to.
    pub host: String,
    /// WebSocket listener port.
    pub socket_port: u16,
    /// Path the WebSocket upgrade is served on.
    pub socket_path: String,
    /// HTTP signaling listener. Conventionally socket_port + 1.
    pub signaling_port: u16,
    /// Local control API, always bound to 127.0.0.1. 0 = disabled.
    pub api_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerChannelConfig {
    /// Accept WebRTC offers at all. When false only the socket transport runs.
    pub enabled: bool,
    /// STUN/TURN URLs. Empty = host candidates only.
    pub ice_servers: Vec<String>,
    /// Upper bound on ICE candidate gathering before the answer is sent.
    pub ice_gather_timeout_ms: u64,
    /// How long a negotiated data channel may take to open.
    pub open_timeout_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

pub const DEFAULT_SOCKET_PORT: u16 = 3055;

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            socket_port: DEFAULT_SOCKET_PORT,
            socket_path: "/".into(),
            signaling_port: DEFAULT_SOCKET_PORT + 1,
            api_port: DEFAULT_SOCKET_PORT + 2,
        }
    }
}

impl Default for PeerChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ice_servers: Vec::new(),
            ice_gather_timeout_ms: 5_000,
            open_timeout_ms: 15_000,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("tether")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl TetherConfig {
    /// Load config: env vars → file → defaults. The result is validated.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            TetherConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("TETHER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&TetherConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate().map_err(ConfigError::Invalid)?;
        if self.network.socket_port != 0 && self.network.socket_port == self.network.signaling_port
        {
            return Err(ConfigError::Invalid(
                "socket_port and signaling_port must differ".into(),
            ));
        }
        if !self.network.socket_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "socket_path must start with '/', got {:?}",
                self.network.socket_path
            )));
        }
        Ok(())
    }

    /// Apply TETHER_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("TETHER_NETWORK__HOST") {
            self.network.host = v;
        }
        if let Some(p) = var("TETHER_NETWORK__SOCKET_PORT").and_then(|v| v.parse().ok()) {
            self.network.socket_port = p;
        }
        if let Some(p) = var("TETHER_NETWORK__SIGNALING_PORT").and_then(|v| v.parse().ok()) {
            self.network.signaling_port = p;
        }
        if let Some(p) = var("TETHER_NETWORK__API_PORT").and_then(|v| v.parse().ok()) {
            self.network.api_port = p;
        }
        if let Some(ms) = var("TETHER_LIMITS__QUERY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.limits.query_timeout_ms = ms;
        }
        if let Some(v) = var("TETHER_PEER_CHANNEL__ENABLED") {
            self.peer_channel.enabled = v == "true" || v == "1";
        }
        if let Some(v) = var("TETHER_PEER_CHANNEL__ICE_SERVERS") {
            self.peer_channel.ice_servers = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    }
}
