//! Command modules for the chat-relay CLI
//!
//! - `serve` - run the relay server until Ctrl-C
//! - `connect` - interactive console client with reconnect
//!
//! Both handlers take their `Args` struct from `cli.rs` plus the parsed
//! [`Cli`] for global flags, and own their tokio runtime.

pub mod connect;
pub mod serve;

pub use connect::run_connect;
pub use serve::run_serve;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::ChatConfig;

/// Load the config file named by `--config`, or the default one
pub fn load_config(cli: &Cli) -> anyhow::Result<ChatConfig> {
    let config = match &cli.config {
        Some(path) => ChatConfig::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ChatConfig::load().context("loading default config")?,
    };
    Ok(config)
}

/// Initialize tracing to stderr
///
/// `RUST_LOG` wins over `level`. Initializing twice is harmless.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("chat_relay={}", level)))
        .unwrap_or_else(|_| EnvFilter::new("chat_relay=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Multi-threaded runtime for a command
pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("chat-relay")
        .build()
        .context("failed to create tokio runtime")
}
