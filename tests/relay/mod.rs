//! Relay behavior across several clients

use std::collections::HashMap;
use std::time::Duration;

use crate::common::{TestClient, TestServer};

#[tokio::test(flavor = "multi_thread")]
async fn test_two_clients_exchange_lines() {
    let server = TestServer::start().await;
    let mut a = TestClient::connect(server.addr).await;
    let mut b = TestClient::connect(server.addr).await;
    server.wait_for_clients(2).await;

    a.send("hello").await;
    assert_eq!(b.recv().await, "hello");

    b.send("hi").await;
    // "hello" would have been queued to A before "hi" if it were echoed
    assert_eq!(a.recv().await, "hi");

    assert_eq!(server.registry.ids().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sender_never_receives_own_line() {
    let server = TestServer::start().await;
    let mut a = TestClient::connect(server.addr).await;
    let mut b = TestClient::connect(server.addr).await;
    server.wait_for_clients(2).await;

    a.send("only for b").await;
    assert_eq!(b.recv().await, "only for b");
    a.expect_silence(Duration::from_millis(200)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_late_joiner_only_sees_later_lines() {
    let server = TestServer::start().await;
    let mut a = TestClient::connect(server.addr).await;
    let mut b = TestClient::connect(server.addr).await;
    server.wait_for_clients(2).await;

    a.send("msg1").await;
    assert_eq!(b.recv().await, "msg1");

    let mut c = TestClient::connect(server.addr).await;
    server.wait_for_clients(3).await;

    a.send("msg2").await;
    assert_eq!(c.recv().await, "msg2");
    assert_eq!(b.recv().await, "msg2");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_departed_client_does_not_disrupt_others() {
    let server = TestServer::start().await;
    let mut a = TestClient::connect(server.addr).await;
    let b = TestClient::connect(server.addr).await;
    let mut c = TestClient::connect(server.addr).await;
    server.wait_for_clients(3).await;

    drop(b);
    for i in 0..20 {
        c.send(&format!("line {}", i)).await;
    }

    for i in 0..20 {
        assert_eq!(a.recv().await, format!("line {}", i));
    }
    server.wait_for_clients(2).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_per_sender_order_with_many_clients() {
    const CLIENTS: usize = 4;
    const MESSAGES: usize = 50;

    let server = TestServer::start().await;
    let mut clients = Vec::new();
    for _ in 0..CLIENTS {
        clients.push(TestClient::connect(server.addr).await);
    }
    server.wait_for_clients(CLIENTS).await;

    let mut tasks = Vec::new();
    for (me, mut client) in clients.into_iter().enumerate() {
        tasks.push(tokio::spawn(async move {
            for seq in 0..MESSAGES {
                client.send(&format!("{}:{}", me, seq)).await;
            }

            let mut received = Vec::new();
            for _ in 0..(CLIENTS - 1) * MESSAGES {
                received.push(client.recv().await);
            }
            (me, received)
        }));
    }

    for task in tasks {
        let (me, received) = task.await.unwrap();
        let mut last_seen: HashMap<usize, usize> = HashMap::new();

        for line in received {
            let (sender, seq) = line.split_once(':').unwrap();
            let sender: usize = sender.parse().unwrap();
            let seq: usize = seq.parse().unwrap();

            assert_ne!(sender, me, "client {} received its own line", me);
            let expected = last_seen.get(&sender).map_or(0, |prev| prev + 1);
            assert_eq!(seq, expected, "out of order from {} at client {}", sender, me);
            last_seen.insert(sender, seq);
        }

        assert_eq!(last_seen.len(), CLIENTS - 1);
        assert!(last_seen.values().all(|&last| last == MESSAGES - 1));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_line_content_is_relayed_verbatim() {
    let server = TestServer::start().await;
    let mut a = TestClient::connect(server.addr).await;
    let mut b = TestClient::connect(server.addr).await;
    server.wait_for_clients(2).await;

    a.send_raw(b"crlf line\r\n").await;
    a.send("").await;
    a.send("  spaced: MSG:not tagged  ").await;
    a.send("héllo wörld").await;

    assert_eq!(b.recv().await, "crlf line");
    assert_eq!(b.recv().await, "  spaced: MSG:not tagged  ");
    assert_eq!(b.recv().await, "héllo wörld");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_single_client_sends_into_empty_room() {
    let server = TestServer::start().await;
    let mut a = TestClient::connect(server.addr).await;
    server.wait_for_clients(1).await;

    a.send("anyone?").await;
    a.expect_silence(Duration::from_millis(200)).await;
    assert_eq!(server.registry.len(), 1);
}
