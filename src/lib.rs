//! chat-relay: line-based TCP group chat
//!
//! A relay server that forwards every line a client sends to all other
//! connected clients, plus a console client to talk to it.
//!
//! # Example
//!
//! ```ignore
//! use chat_relay::{ChatServer, ServerConfig};
//!
//! let config = ServerConfig { port: 0, ..ServerConfig::default() };
//! let server = ChatServer::bind(config).await?;
//! println!("listening on {}", server.local_addr());
//!
//! let shutdown = server.shutdown_handle();
//! tokio::spawn(server.run());
//! // ...
//! shutdown.shutdown();
//! ```

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod socket_server;

// Re-export commonly used types
pub use cli::{Cli, Commands};
pub use client::{Backoff, ChatSession, Renderer};
pub use config::{ChatConfig, ClientConfig, LoggingConfig, ServerConfig};
pub use error::{ChatError, Result};
pub use socket_server::{
    Broadcaster, ChatProtocol, ChatServer, ClientId, ClientRegistry, ConnectionHandle,
    ShutdownHandle,
};
