//! Connection lifecycle: registration, limits, protocol errors, shutdown

use std::time::Duration;

use chat_relay::ServerConfig;
use tokio::net::TcpStream;

use crate::common::{quiet_config, TestClient, TestServer};

#[tokio::test(flavor = "multi_thread")]
async fn test_registry_follows_connections() {
    let server = TestServer::start().await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(TestClient::connect(server.addr).await);
    }
    server.wait_for_clients(3).await;

    clients.pop();
    server.wait_for_clients(2).await;

    clients.clear();
    server.wait_for_clients(0).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_closes_every_client() {
    let mut server = TestServer::start().await;
    let mut a = TestClient::connect(server.addr).await;
    let mut b = TestClient::connect(server.addr).await;
    server.wait_for_clients(2).await;

    server.stop().await.unwrap();

    a.expect_closed().await;
    b.expect_closed().await;
    assert!(server.registry.is_empty());
    assert!(TcpStream::connect(server.addr).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_max_clients_rejects_extra_connections() {
    let config = ServerConfig {
        max_clients: 2,
        ..quiet_config()
    };
    let server = TestServer::with_config(config).await;
    let mut a = TestClient::connect(server.addr).await;
    let mut b = TestClient::connect(server.addr).await;
    server.wait_for_clients(2).await;

    let mut c = TestClient::connect(server.addr).await;
    assert_eq!(c.recv().await, "* server full");
    c.expect_closed().await;
    assert_eq!(server.registry.len(), 2);

    // The room still works for the admitted clients
    a.send("still open").await;
    assert_eq!(b.recv().await, "still open");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_oversized_line_disconnects_sender_only() {
    let config = ServerConfig {
        max_line_bytes: 16,
        ..quiet_config()
    };
    let server = TestServer::with_config(config).await;
    let mut a = TestClient::connect(server.addr).await;
    let mut b = TestClient::connect(server.addr).await;
    server.wait_for_clients(2).await;

    a.send(&"x".repeat(64)).await;
    a.expect_closed().await;
    server.wait_for_clients(1).await;

    b.expect_silence(Duration::from_millis(200)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_utf8_disconnects_sender() {
    let server = TestServer::start().await;
    let mut a = TestClient::connect(server.addr).await;
    let mut b = TestClient::connect(server.addr).await;
    server.wait_for_clients(2).await;

    a.send_raw(&[0xff, 0xfe, b'\n']).await;
    a.expect_closed().await;
    server.wait_for_clients(1).await;

    b.expect_silence(Duration::from_millis(200)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_idle_client_is_disconnected() {
    let config = ServerConfig {
        idle_timeout_secs: Some(1),
        ..quiet_config()
    };
    let server = TestServer::with_config(config).await;
    let mut a = TestClient::connect(server.addr).await;
    server.wait_for_clients(1).await;

    a.expect_closed().await;
    server.wait_for_clients(0).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_join_and_leave_notices() {
    let config = ServerConfig {
        announce: true,
        ..quiet_config()
    };
    let server = TestServer::with_config(config).await;
    let mut a = TestClient::connect(server.addr).await;
    server.wait_for_clients(1).await;

    let b = TestClient::connect(server.addr).await;
    assert_eq!(a.recv().await, "* client-2 joined");

    drop(b);
    assert_eq!(a.recv().await, "* client-2 left");
    server.wait_for_clients(1).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_partial_line_at_disconnect_is_dropped() {
    let server = TestServer::start().await;
    let mut a = TestClient::connect(server.addr).await;
    let mut b = TestClient::connect(server.addr).await;
    server.wait_for_clients(2).await;

    a.send("complete").await;
    a.send_raw(b"no newline").await;
    drop(a);

    let seen = tokio::time::timeout(Duration::from_secs(1), async {
        let first = b.recv().await;
        b.expect_silence(Duration::from_millis(200)).await;
        first
    })
    .await
    .unwrap();
    assert_eq!(seen, "complete");
    server.wait_for_clients(1).await;
}
