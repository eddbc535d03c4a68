//! CLI argument definitions using clap with subcommand architecture
//!
//! `chat-relay serve` runs the relay server, `chat-relay connect` opens an
//! interactive console client. Flags override values from the config file.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{ChatConfig, ClientConfig, ServerConfig};
use crate::socket_server::ChatProtocol;

/// Line-based TCP group chat
#[derive(Parser, Debug)]
#[command(name = "chat-relay")]
#[command(about = "Relay server and console client for a single TCP chat room")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: <config dir>/chat-relay/config.toml)
    #[arg(short, long, global = true, env = "CHAT_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); overrides the config file
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Effective log level: --verbose, then --log-level, then the config file
    pub fn log_level(&self, config: &ChatConfig) -> String {
        if self.verbose {
            return "debug".to_string();
        }
        self.log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone())
    }
}

// ============================================
// Main Commands Enum
// ============================================

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the chat relay server
    #[command(visible_alias = "s")]
    Serve(ServeArgs),

    /// Join a chat server from the terminal
    #[command(visible_alias = "c")]
    Connect(ConnectArgs),
}

// ============================================
// Serve Command
// ============================================

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Line framing spoken with clients
    #[arg(long, value_enum)]
    pub protocol: Option<ChatProtocol>,

    /// Maximum simultaneous clients (0 = unlimited)
    #[arg(long)]
    pub max_clients: Option<usize>,

    /// Disconnect clients silent for this many seconds
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Longest accepted line in bytes
    #[arg(long)]
    pub max_line_bytes: Option<usize>,

    /// Do not broadcast join/leave notices
    #[arg(long)]
    pub no_announce: bool,
}

impl ServeArgs {
    /// Layer these flags over the file configuration
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(protocol) = self.protocol {
            config.protocol = protocol;
        }
        if let Some(max_clients) = self.max_clients {
            config.max_clients = max_clients;
        }
        if let Some(secs) = self.idle_timeout {
            config.idle_timeout_secs = Some(secs);
        }
        if let Some(limit) = self.max_line_bytes {
            config.max_line_bytes = limit;
        }
        if self.no_announce {
            config.announce = false;
        }
    }
}

// ============================================
// Connect Command
// ============================================

#[derive(Args, Debug, Default)]
pub struct ConnectArgs {
    /// Server host
    #[arg(long)]
    pub host: Option<String>,

    /// Server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Display name (tagged protocol); defaults to User-<n>
    #[arg(short, long)]
    pub name: Option<String>,

    /// Line framing spoken by the server
    #[arg(long, value_enum)]
    pub protocol: Option<ChatProtocol>,

    /// Exit instead of reconnecting when the connection drops
    #[arg(long)]
    pub no_reconnect: bool,

    /// Omit [HH:MM:SS] prefixes
    #[arg(long)]
    pub no_timestamps: bool,
}

impl ConnectArgs {
    pub fn apply(&self, config: &mut ClientConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(name) = &self.name {
            config.name = Some(name.clone());
        }
        if let Some(protocol) = self.protocol {
            config.protocol = protocol;
        }
        if self.no_reconnect {
            config.reconnect = false;
        }
    }
}
