//! In-process chat server for tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chat_relay::{ChatServer, ClientRegistry, ServerConfig, ShutdownHandle};
use tokio::task::JoinHandle;

/// How long helpers wait before failing a test
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Ephemeral port, no join/leave notices
pub fn quiet_config() -> ServerConfig {
    ServerConfig {
        port: 0,
        announce: false,
        shutdown_grace_ms: 1000,
        ..ServerConfig::default()
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Arc<ClientRegistry>,
    shutdown: ShutdownHandle,
    task: Option<JoinHandle<chat_relay::Result<()>>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_config(quiet_config()).await
    }

    pub async fn with_config(config: ServerConfig) -> Self {
        let server = ChatServer::bind(config).await.expect("bind test server");
        let addr = server.local_addr();
        let registry = server.registry();
        let shutdown = server.shutdown_handle();
        let task = tokio::spawn(server.run());

        Self {
            addr,
            registry,
            shutdown,
            task: Some(task),
        }
    }

    /// Block until exactly `count` clients are registered
    pub async fn wait_for_clients(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
        while self.registry.len() != count {
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "expected {} registered clients, have {}",
                    count,
                    self.registry.len()
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Request shutdown and wait for `run` to return
    pub async fn stop(&mut self) -> chat_relay::Result<()> {
        self.shutdown.shutdown();
        let task = self.task.take().expect("server already stopped");
        tokio::time::timeout(TEST_TIMEOUT, task)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.shutdown();
    }
}
