// End-to-end tests for the chat server and client over loopback TCP


use simplechat::chat::transport::MAX_LINE_BYTES;
use simplechat::chat::{ChatClient, ClientConfig, Flow, TransportError};
use std::sync::Arc;
use test_utils::{start_server, wait_for, RawPeer, RecordingDisplay};

async fn logged_in_peer(port: u16, login_id: &str, server: &RecordingDisplay) -> RawPeer {
    let mut peer = RawPeer::connect(port).await;
    peer.send(&format!("#login {}", login_id)).await;
    let expected = format!("{} has logged in.", login_id);
    assert!(wait_for(|| server.contains(&expected), 5).await);
    peer
}

#[tokio::test]
async fn test_chat_line_reaches_every_client() {
    let (mut server, server_display, port) = start_server().await;
    let mut alice = logged_in_peer(port, "alice", &server_display).await;

    let bob_display = Arc::new(RecordingDisplay::default());
    let mut bob = ChatClient::connect(ClientConfig::new("bob", "127.0.0.1", port), bob_display.clone())
        .await
        .unwrap();
    assert!(wait_for(|| server_display.contains("bob has logged in."), 5).await);

    assert_eq!(bob.handle_console_line("hello").await, Flow::Continue);

    assert_eq!(alice.recv().await.as_deref(), Some("bob: hello"));
    assert!(wait_for(|| bob_display.contains("bob: hello"), 5).await);
    assert!(server_display.contains("bob: hello"));

    alice.send("hi bob").await;
    assert!(wait_for(|| bob_display.contains("alice: hi bob"), 5).await);

    bob.quit().await;
    server.close().await;
}

#[tokio::test]
async fn test_line_before_login_closes_connection() {
    let (mut server, server_display, port) = start_server().await;
    let mut alice = logged_in_peer(port, "alice", &server_display).await;

    let mut raw = RawPeer::connect(port).await;
    assert!(wait_for(|| server.registry().len() == 2, 5).await);

    raw.send("hello").await;
    assert_eq!(raw.recv().await.as_deref(), Some("Error: Must login first."));

    // Later broadcasts skip the rejected connection
    alice.send("anyone?").await;
    assert_eq!(alice.recv().await.as_deref(), Some("alice: anyone?"));
    assert_eq!(raw.recv().await, None);

    assert!(wait_for(|| server.registry().len() == 1, 5).await);
    assert!(server_display.contains("An unnamed client has disconnected."));
    assert!(!server_display.contains("hello"));

    server.close().await;
}

#[tokio::test]
async fn test_second_login_is_rejected() {
    let (mut server, server_display, port) = start_server().await;
    let mut peer = logged_in_peer(port, "x", &server_display).await;

    peer.send("#login x").await;
    assert_eq!(peer.recv().await.as_deref(), Some("Error: Already logged in."));
    assert_eq!(peer.recv().await, None);

    assert!(wait_for(|| server_display.contains("x has disconnected."), 5).await);
    assert_eq!(server_display.count("x has logged in."), 1);
    assert!(server.registry().is_empty());

    server.close().await;
}

#[tokio::test]
async fn test_login_without_id_is_rejected() {
    let (mut server, server_display, port) = start_server().await;

    let mut peer = RawPeer::connect(port).await;
    peer.send("#login").await;
    assert_eq!(peer.recv().await.as_deref(), Some("Error: Invalid login format."));
    assert_eq!(peer.recv().await, None);
    assert!(wait_for(|| server_display.contains("An unnamed client has disconnected."), 5).await);

    server.close().await;
}

#[tokio::test]
async fn test_server_console_line_is_broadcast() {
    let (mut server, server_display, port) = start_server().await;
    let mut alice = logged_in_peer(port, "alice", &server_display).await;

    assert_eq!(server.handle_console_line("closing soon").await, Flow::Continue);
    assert_eq!(alice.recv().await.as_deref(), Some("SERVER MSG> closing soon"));

    server.close().await;
}

#[tokio::test]
async fn test_stop_keeps_existing_connections() {
    let (mut server, server_display, port) = start_server().await;
    let mut alice = logged_in_peer(port, "alice", &server_display).await;

    server.handle_console_line("#stop").await;
    assert!(server_display.contains("Server has stopped listening for new clients."));

    alice.send("still here").await;
    assert_eq!(alice.recv().await.as_deref(), Some("alice: still here"));

    let late = ChatClient::connect(
        ClientConfig::new("late", "127.0.0.1", port),
        Arc::new(RecordingDisplay::default()),
    )
    .await;
    assert!(matches!(late, Err(TransportError::Connect { .. })));

    // Still one client connected, so the port cannot change
    server.handle_console_line("#setport 6000").await;
    assert!(server_display.contains("Error: Server must be closed to change port."));

    server.close().await;
}

#[tokio::test]
async fn test_close_disconnects_clients() {
    let (mut server, server_display, port) = start_server().await;

    let bob_display = Arc::new(RecordingDisplay::default());
    let bob = ChatClient::connect(ClientConfig::new("bob", "127.0.0.1", port), bob_display.clone())
        .await
        .unwrap();
    assert!(wait_for(|| server_display.contains("bob has logged in."), 5).await);

    server.handle_console_line("#close").await;
    assert!(server_display.contains("Server closed all client connections."));
    assert!(!server.is_listening());
    assert_eq!(server.client_count(), 0);

    let terminated = bob.terminated();
    assert!(wait_for(|| terminated.is_cancelled(), 5).await);
    assert!(bob_display.contains("The server has shut down."));
    assert!(!bob.is_connected());
    assert!(wait_for(|| server_display.contains("bob has disconnected."), 5).await);

    // Closed and idle, so the port may change now
    server.handle_console_line("#setport 6000").await;
    assert!(server_display.contains("Port set to: 6000"));
    assert_eq!(server.port(), 6000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_during_connect_burst_leaves_no_client() {
    let (mut server, _server_display, port) = start_server().await;

    let mut peers = Vec::new();
    for _ in 0..50 {
        peers.push(RawPeer::connect(port).await);
    }

    server.handle_console_line("#close").await;
    assert_eq!(server.client_count(), 0);

    // Every peer is either closed by the server or was never accepted
    for peer in peers.iter_mut() {
        assert_eq!(peer.recv().await, None);
    }
    assert!(wait_for(|| server.registry().is_empty(), 5).await);

    server.handle_console_line("#setport 6000").await;
    assert_eq!(server.port(), 6000);
}

#[tokio::test]
async fn test_undecodable_bytes_do_not_drop_client() {
    let (mut server, server_display, port) = start_server().await;
    let mut alice = logged_in_peer(port, "alice", &server_display).await;

    alice.send_bytes(b"caf\xe9\n").await;
    assert_eq!(alice.recv().await.as_deref(), Some("alice: caf\u{FFFD}"));

    alice.send("still here").await;
    assert_eq!(alice.recv().await.as_deref(), Some("alice: still here"));
    assert!(!server_display.contains("alice has disconnected."));

    server.close().await;
}

#[tokio::test]
async fn test_oversized_line_is_not_relayed() {
    let (mut server, server_display, port) = start_server().await;
    let mut alice = logged_in_peer(port, "alice", &server_display).await;

    let mut flood = vec![b'z'; MAX_LINE_BYTES * 2];
    flood.push(b'\n');
    alice.send_bytes(&flood).await;
    alice.send("short").await;

    assert_eq!(alice.recv().await.as_deref(), Some("alice: short"));
    assert_eq!(server.client_count(), 1);

    server.close().await;
}

#[tokio::test]
async fn test_quit_terminates_clients() {
    let (mut server, server_display, port) = start_server().await;

    let bob_display = Arc::new(RecordingDisplay::default());
    let bob = ChatClient::connect(ClientConfig::new("bob", "127.0.0.1", port), bob_display.clone())
        .await
        .unwrap();
    assert!(wait_for(|| server_display.contains("bob has logged in."), 5).await);

    assert_eq!(server.handle_console_line("#quit").await, Flow::Quit);

    let terminated = bob.terminated();
    assert!(wait_for(|| terminated.is_cancelled(), 5).await);
    assert!(bob_display.contains("The server has shut down."));
}

#[tokio::test]
async fn test_client_cannot_reach_server() {
    let (mut server, _display, port) = start_server().await;
    server.handle_console_line("#stop").await;

    let result = ChatClient::connect(
        ClientConfig::new("bob", "127.0.0.1", port),
        Arc::new(RecordingDisplay::default()),
    )
    .await;
    assert!(matches!(result, Err(TransportError::Connect { .. })));
}

#[tokio::test]
async fn test_client_login_command_reports_failure() {
    let (mut server, server_display, port) = start_server().await;

    let bob_display = Arc::new(RecordingDisplay::default());
    let mut bob = ChatClient::connect(ClientConfig::new("bob", "127.0.0.1", port), bob_display.clone())
        .await
        .unwrap();
    assert!(wait_for(|| server_display.contains("bob has logged in."), 5).await);

    bob.handle_console_line("#logoff").await;
    assert!(wait_for(|| server_display.contains("bob has disconnected."), 5).await);
    server.handle_console_line("#stop").await;

    assert_eq!(bob.handle_console_line("#login").await, Flow::Continue);
    assert!(bob_display
        .lines()
        .iter()
        .any(|line| line.starts_with("Error executing command: could not connect to 127.0.0.1:")));
    assert!(!bob.is_connected());
}
