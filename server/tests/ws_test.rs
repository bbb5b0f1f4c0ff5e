//! Integration tests for the WebSocket relay: join, broadcast, replay, and cleanup.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use chat_relay::config::WsConfig;
use chat_relay::state::AppState;

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Helper: start the server on a random port and return (state, addr).
async fn start_test_server(ws: WsConfig) -> (AppState, SocketAddr) {
    let state = AppState::new(ws);
    let app = chat_relay::routes::build_router(state.clone(), "/websocket");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (state, addr)
}

async fn connect(addr: SocketAddr, query: &str) -> WsStream {
    let url = format!("ws://{}/websocket{}", addr, query);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Wait until the registry reports `expected` live connections.
async fn wait_for_online(state: &AppState, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.connections.count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "online count stuck at {}, expected {}",
            state.connections.count(),
            expected
        )
    });
}

/// Read the next text frame, skipping control frames.
async fn next_text(ws: &mut WsStream) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("Expected a text frame within timeout");
        match msg {
            Some(Ok(Message::Text(text))) => return text.as_str().to_string(),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            other => panic!("Expected text frame, got: {:?}", other),
        }
    }
}

/// Assert nothing else arrives for a short while.
async fn assert_quiet(ws: &mut WsStream) {
    let result = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(result.is_err(), "Expected no further messages, got {:?}", result);
}

#[tokio::test]
async fn test_group_chat_scenario() {
    let (state, addr) = start_test_server(WsConfig::default()).await;

    let mut alice = connect(addr, "?nickname=Alice").await;
    wait_for_online(&state, 1).await;
    let mut bob = connect(addr, "?nickname=Bob").await;
    wait_for_online(&state, 2).await;

    alice.send(Message::text("hi")).await.unwrap();
    assert_eq!(next_text(&mut alice).await, "Alice:hi");
    assert_eq!(next_text(&mut bob).await, "Alice:hi");

    alice.close(None).await.unwrap();
    wait_for_online(&state, 1).await;

    bob.send(Message::text("loadHistoryMessage")).await.unwrap();
    assert_eq!(next_text(&mut bob).await, "Alice:hi");
    assert_quiet(&mut bob).await;

    assert_eq!(state.connections.count(), 1);
    let history: Vec<String> = state.history.replay().map(|l| l.to_string()).collect();
    assert_eq!(history, ["Alice:hi"]);
}

#[tokio::test]
async fn test_replay_is_private() {
    let (state, addr) = start_test_server(WsConfig::default()).await;

    let mut carol = connect(addr, "?nickname=Carol").await;
    let mut dave = connect(addr, "?nickname=Dave").await;
    wait_for_online(&state, 2).await;

    carol.send(Message::text("first")).await.unwrap();
    carol.send(Message::text("second")).await.unwrap();
    for ws in [&mut carol, &mut dave] {
        assert_eq!(next_text(ws).await, "Carol:first");
        assert_eq!(next_text(ws).await, "Carol:second");
    }

    dave.send(Message::text("loadHistoryMessage")).await.unwrap();
    assert_eq!(next_text(&mut dave).await, "Carol:first");
    assert_eq!(next_text(&mut dave).await, "Carol:second");
    assert_quiet(&mut carol).await;
    assert_eq!(state.history.len(), 2);
}

#[tokio::test]
async fn test_missing_nickname_joins_with_empty_name() {
    let (state, addr) = start_test_server(WsConfig::default()).await;

    let mut anon = connect(addr, "").await;
    wait_for_online(&state, 1).await;

    anon.send(Message::text("hello")).await.unwrap();
    assert_eq!(next_text(&mut anon).await, ":hello");
}

#[tokio::test]
async fn test_percent_encoded_nickname() {
    let (state, addr) = start_test_server(WsConfig::default()).await;

    let mut ws = connect(addr, "?nickname=Jo%20Ann").await;
    wait_for_online(&state, 1).await;

    ws.send(Message::text("hey")).await.unwrap();
    assert_eq!(next_text(&mut ws).await, "Jo Ann:hey");
}

#[tokio::test]
async fn test_ws_ping_pong() {
    let (state, addr) = start_test_server(WsConfig::default()).await;
    let mut ws = connect(addr, "?nickname=Pinger").await;
    wait_for_online(&state, 1).await;

    ws.send(Message::Ping(vec![42, 43, 44].into()))
        .await
        .expect("Failed to send ping");

    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("Expected pong within timeout");

    match msg {
        Some(Ok(Message::Pong(data))) => {
            assert_eq!(data.as_ref(), &[42, 43, 44], "Pong data should match ping");
        }
        other => panic!("Expected Pong message, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_connection_cleanup_on_disconnect() {
    let (state, addr) = start_test_server(WsConfig::default()).await;

    {
        let mut ws = connect(addr, "?nickname=Leaver").await;
        wait_for_online(&state, 1).await;
        ws.close(None).await.unwrap();
    }
    wait_for_online(&state, 0).await;

    // Dropping without a close frame also cleans up
    {
        let _ws = connect(addr, "?nickname=Dropper").await;
        wait_for_online(&state, 1).await;
    }
    wait_for_online(&state, 0).await;
}

#[tokio::test]
async fn test_unresponsive_client_is_dropped() {
    let ws_config = WsConfig {
        ping_interval_secs: 1,
        pong_timeout_secs: 1,
        send_timeout_secs: 1,
    };
    let (state, addr) = start_test_server(ws_config).await;

    // Never read from the socket, so the server's pings are never answered.
    let _silent = connect(addr, "?nickname=Silent").await;
    wait_for_online(&state, 1).await;
    wait_for_online(&state, 0).await;
}

#[tokio::test]
async fn test_health_reports_online_and_history() {
    let (state, addr) = start_test_server(WsConfig::default()).await;
    let mut ws = connect(addr, "?nickname=Eve").await;
    wait_for_online(&state, 1).await;

    ws.send(Message::text("one")).await.unwrap();
    assert_eq!(next_text(&mut ws).await, "Eve:one");

    let body: serde_json::Value = reqwest::get(format!("http://{}/api/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["online"], 1);
    assert_eq!(body["history"], 1);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
