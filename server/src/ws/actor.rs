use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::chat::engine::{ChatSession, ConnectionEvents};
use crate::state::AppState;
use crate::ws::{Connection, ConnectionId, ConnectionSender};

/// Run the actor-per-connection pattern for an accepted WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader loop: turns incoming frames into [`ConnectionEvents`] calls
///
/// Broadcasts from other connections only ever touch the mpsc sender, so a
/// slow socket stalls its own writer task and nothing else.
pub async fn run_connection(socket: WebSocket, state: AppState, query: Option<String>) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let connection = Connection::new(tx.clone());
    let connection_id = connection.id();
    let mut session = ChatSession::new(state.clone(), connection);

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let mut writer_handle = tokio::spawn(writer_task(
        ws_sender,
        rx,
        state.ws.send_timeout(),
        connection_id,
    ));

    session.on_open(query.as_deref());

    // Track pong reception
    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_handle = tokio::spawn(ping_task(
        tx.clone(),
        pong_rx,
        state.ws.ping_interval(),
        state.ws.pong_timeout(),
        connection_id,
    ));

    // Reader loop: process incoming WebSocket messages
    loop {
        tokio::select! {
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(msg)) => match msg {
                    Message::Text(text) => {
                        session.on_message(text.as_str());
                    }
                    Message::Binary(data) => {
                        // Chat is plain text only
                        tracing::debug!(
                            connection_id = %connection_id,
                            bytes = data.len(),
                            "Ignoring binary frame"
                        );
                    }
                    Message::Pong(_) => {
                        let _ = pong_tx.send(());
                    }
                    Message::Ping(data) => {
                        let _ = tx.send(Message::Pong(data));
                    }
                    Message::Close(frame) => {
                        tracing::debug!(
                            connection_id = %connection_id,
                            reason = ?frame,
                            "Client initiated close"
                        );
                        break;
                    }
                },
                Some(Err(e)) => {
                    session.on_error(&e);
                    break;
                }
                None => {
                    tracing::debug!(connection_id = %connection_id, "WebSocket stream ended");
                    break;
                }
            },
            _ = &mut writer_handle => {
                // Writer gave up on the socket; treat the peer as gone.
                tracing::debug!(connection_id = %connection_id, "Writer stopped, closing connection");
                break;
            }
        }
    }

    session.on_close();

    writer_handle.abort();
    ping_handle.abort();
}

/// Ping task: pings on every interval tick and closes the connection when the
/// matching pong does not arrive in time.
///
/// Pongs left over from earlier rounds (or sent unprompted) are discarded
/// before each ping so only a reply to the current ping counts.
async fn ping_task(
    ping_tx: ConnectionSender,
    mut pong_rx: mpsc::UnboundedReceiver<()>,
    ping_interval: Duration,
    pong_timeout: Duration,
    connection_id: ConnectionId,
) {
    let mut ping_timer = interval(ping_interval);
    // Skip the first immediate tick
    ping_timer.tick().await;

    loop {
        ping_timer.tick().await;

        while pong_rx.try_recv().is_ok() {}

        if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
            // Writer task has died — connection is gone
            break;
        }

        match timeout(pong_timeout, pong_rx.recv()).await {
            Ok(Some(())) => {}
            _ => {
                tracing::warn!(connection_id = %connection_id, "Pong timeout, closing connection");
                let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                    code: 1001,
                    reason: "Pong timeout".into(),
                })));
                break;
            }
        }
    }
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
///
/// Stops on the first failed or timed-out write, and after flushing a close frame.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    send_timeout: Duration,
    connection_id: ConnectionId,
) {
    while let Some(msg) = rx.recv().await {
        let is_close = matches!(msg, Message::Close(_));

        match timeout(send_timeout, ws_sender.send(msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
                break;
            }
            Err(_) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    timeout_secs = send_timeout.as_secs(),
                    "WebSocket send timed out, dropping client"
                );
                break;
            }
        }

        if is_close {
            break;
        }
    }
}
