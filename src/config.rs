//! chat-relay configuration management.
//!
//! Handles the optional configuration file at:
//! - Linux: ~/.config/chat-relay/config.toml
//! - macOS: ~/Library/Application Support/chat-relay/config.toml
//! - Windows: %APPDATA%\chat-relay\config.toml
//!
//! Every field has a default, so a missing file (or a missing section) is
//! equivalent to an empty one. Command-line flags are applied on top by the
//! `commands` layer.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};
use crate::socket_server::ChatProtocol;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 12345;

/// chat-relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatConfig {
    /// Server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Console client settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind (0 picks an ephemeral port)
    pub port: u16,
    /// Line framing used on the wire
    pub protocol: ChatProtocol,
    /// Longest accepted inbound line, excluding the newline
    pub max_line_bytes: usize,
    /// Lines queued per client before it is dropped as a slow consumer
    pub outbox_capacity: usize,
    /// Upper bound for a single socket write
    pub write_timeout_ms: u64,
    /// Disconnect clients that stay silent this long (unset = never)
    pub idle_timeout_secs: Option<u64>,
    /// Maximum simultaneous clients (0 = unlimited)
    pub max_clients: usize,
    /// Broadcast join/leave notices
    pub announce: bool,
    /// How long shutdown waits for client workers to finish
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            protocol: ChatProtocol::default(),
            max_line_bytes: 4096,
            outbox_capacity: 256,
            write_timeout_ms: 5_000,
            idle_timeout_secs: None,
            max_clients: 0,
            announce: true,
            shutdown_grace_ms: 2_000,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding
    pub fn bind_addr(&self) -> String {
        join_host_port(&self.host, self.port)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(config_error("server.host must not be empty"));
        }
        if self.max_line_bytes == 0 {
            return Err(config_error("server.max_line_bytes must be greater than 0"));
        }
        if self.outbox_capacity == 0 {
            return Err(config_error("server.outbox_capacity must be greater than 0"));
        }
        if self.write_timeout_ms == 0 {
            return Err(config_error("server.write_timeout_ms must be greater than 0"));
        }
        if self.idle_timeout_secs == Some(0) {
            return Err(config_error("server.idle_timeout_secs must be greater than 0"));
        }
        Ok(())
    }
}

/// Console client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host to connect to
    pub host: String,
    /// Server port to connect to
    pub port: u16,
    /// Display name sent with `NAME:` in tagged mode
    pub name: Option<String>,
    /// Line framing used on the wire
    pub protocol: ChatProtocol,
    /// Timeout for a single connection attempt
    pub connect_timeout_secs: u64,
    /// Reconnect after the server goes away
    pub reconnect: bool,
    /// First reconnect delay
    pub reconnect_base_delay_secs: u64,
    /// Reconnect delay ceiling
    pub reconnect_max_delay_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            name: None,
            protocol: ChatProtocol::default(),
            connect_timeout_secs: 5,
            reconnect: true,
            reconnect_base_delay_secs: 1,
            reconnect_max_delay_secs: 16,
        }
    }
}

impl ClientConfig {
    pub fn server_addr(&self) -> String {
        join_host_port(&self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(config_error("client.host must not be empty"));
        }
        if self.port == 0 {
            return Err(config_error("client.port must not be 0"));
        }
        if self.reconnect_base_delay_secs == 0
            || self.reconnect_max_delay_secs < self.reconnect_base_delay_secs
        {
            return Err(config_error(
                "client reconnect delays must satisfy 0 < base <= max",
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ChatConfig {
    /// Default configuration file location, if the platform has one
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chat-relay").join("config.toml"))
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    ///
    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content).map_err(|e| ChatError::Config {
            message: format!("{}: {}", path.display(), e),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize configuration to TOML text
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ChatError::Config {
            message: format!("Failed to serialize config: {}", e),
        })
    }
}

fn config_error(message: &str) -> ChatError {
    ChatError::Config {
        message: message.to_string(),
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    // Bare IPv6 literals need brackets in socket address syntax
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
