//! Tagged framing end to end

use chat_relay::client::ChatSession;
use chat_relay::socket_server::ServerLine;
use chat_relay::{ChatProtocol, ClientConfig, ServerConfig};

use crate::common::{quiet_config, TestClient, TestServer};

fn tagged_config() -> ServerConfig {
    ServerConfig {
        protocol: ChatProtocol::Tagged,
        announce: true,
        ..quiet_config()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_named_clients_chat() {
    let server = TestServer::with_config(tagged_config()).await;

    let mut ada = TestClient::connect(server.addr).await;
    ada.send("NAME:ada").await;
    server.wait_for_clients(1).await;

    let mut bob = TestClient::connect(server.addr).await;
    bob.send("NAME:bob").await;
    assert_eq!(ada.recv().await, "SYS:bob joined");

    ada.send("MSG:hello bob").await;
    assert_eq!(bob.recv().await, "FROM:ada:hello bob");

    bob.send("MSG: hi ada ").await;
    assert_eq!(ada.recv().await, "FROM:bob:hi ada");

    drop(bob);
    assert_eq!(ada.recv().await, "SYS:bob left");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_messages_before_name_are_ignored() {
    let server = TestServer::with_config(tagged_config()).await;

    let mut bob = TestClient::connect(server.addr).await;
    bob.send("NAME:bob").await;
    server.wait_for_clients(1).await;

    let mut anon = TestClient::connect(server.addr).await;
    server.wait_for_clients(2).await;

    anon.send("MSG:too early").await;
    anon.send("not even tagged").await;
    anon.send("NAME:ada").await;
    anon.send("NAME:renamed").await;
    anon.send("MSG:now it counts").await;

    assert_eq!(bob.recv().await, "SYS:ada joined");
    assert_eq!(bob.recv().await, "FROM:ada:now it counts");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_names_are_sanitized() {
    let server = TestServer::with_config(tagged_config()).await;

    let mut watcher = TestClient::connect(server.addr).await;
    watcher.send("NAME:watcher").await;
    server.wait_for_clients(1).await;

    let mut odd = TestClient::connect(server.addr).await;
    odd.send("NAME:a:b").await;
    assert_eq!(watcher.recv().await, "SYS:a_b joined");

    odd.send("MSG:hi").await;
    assert_eq!(watcher.recv().await, "FROM:a_b:hi");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_console_session_against_server() {
    let server = TestServer::with_config(tagged_config()).await;

    let mut bob = TestClient::connect(server.addr).await;
    bob.send("NAME:bob").await;
    server.wait_for_clients(1).await;

    let config = ClientConfig {
        port: server.addr.port(),
        protocol: ChatProtocol::Tagged,
        ..ClientConfig::default()
    };
    let mut session = ChatSession::open(&config, "ada").await.unwrap();
    assert_eq!(bob.recv().await, "SYS:ada joined");

    session.send("hello from the console").await.unwrap();
    assert_eq!(bob.recv().await, "FROM:ada:hello from the console");

    bob.send("MSG:welcome").await;
    assert_eq!(
        session.next_line().await.unwrap(),
        Some(ServerLine::From {
            sender: "bob".to_string(),
            content: "welcome".to_string(),
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_name_falls_back_to_parsable_peer_name() {
    let server = TestServer::with_config(tagged_config()).await;

    let mut watcher = TestClient::connect(server.addr).await;
    watcher.send("NAME:watcher").await;
    server.wait_for_clients(1).await;

    let mut anon = TestClient::connect(server.addr).await;
    anon.send("NAME:").await;
    let joined = watcher.recv().await;
    assert!(joined.starts_with("SYS:127.0.0.1_"), "{}", joined);

    anon.send("MSG:hi").await;
    let relayed = watcher.recv().await;
    match ServerLine::parse(ChatProtocol::Tagged, &relayed) {
        ServerLine::From { sender, content } => {
            assert!(!sender.contains(':'));
            assert!(sender.starts_with("127.0.0.1_"));
            assert_eq!(content, "hi");
        }
        other => panic!("expected FROM line, got {:?}", other),
    }
}
