//! Common test utilities for chat-relay integration tests
//!
//! This module provides:
//! - `TestServer` which runs a `ChatServer` on an ephemeral port
//! - `TestClient`, a raw line-oriented TCP client with timeouts

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod test_server;

pub use test_client::TestClient;
pub use test_server::{quiet_config, TestServer};
