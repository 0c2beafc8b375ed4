//! Terminal socket.
//!
//! Each connection gets a reader (this handler) and a writer task. The first
//! frame must bind the socket to a pending session; afterwards `stdin` and
//! `resize` frames are routed to the session and everything the session
//! sends is written back as JSON text frames.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use protocol::{ClientCommand, TerminalMessage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::AppState;
use crate::session::{Connection, Session, SessionError};

/// `GET /api/v1/terminal/ws`
pub async fn terminal_socket(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let max_message_bytes = state.limits.max_message_bytes;
    ws.max_message_size(max_message_bytes)
        .on_upgrade(move |socket| handle_terminal(socket, state))
}

/// A socket attached to its session.
struct Bound {
    session: Arc<Session>,
    stdin_tx: mpsc::Sender<String>,
}

async fn handle_terminal(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    let (sink, mut stream) = socket.split();

    let (outbound_tx, outbound_rx) = mpsc::channel(state.limits.outbound_queue_capacity);
    let closed = CancellationToken::new();
    let writer = tokio::spawn(write_loop(sink, outbound_rx, closed.clone(), conn_id));

    tracing::debug!(conn_id = %conn_id, "Terminal socket connected");

    // The outbound sender moves into await_bind; after it returns only the
    // bound session holds one, so the socket closes when the session ends.
    if let Some(bound) = await_bind(&mut stream, &state, conn_id, outbound_tx, &closed).await {
        read_loop(&mut stream, &state, bound, &closed, conn_id).await;
    }

    closed.cancel();
    if let Err(e) = writer.await {
        tracing::warn!(conn_id = %conn_id, error = %e, "Terminal writer task failed");
    }
    tracing::debug!(conn_id = %conn_id, "Terminal socket finished");
}

/// Waits for the bind frame and attaches the socket to its session.
///
/// Returns `None` when the socket must be closed instead.
async fn await_bind(
    stream: &mut SplitStream<WebSocket>,
    state: &AppState,
    conn_id: Uuid,
    outbound: mpsc::Sender<TerminalMessage>,
    closed: &CancellationToken,
) -> Option<Bound> {
    let session_id = loop {
        let message = tokio::select! {
            biased;
            _ = state.shutdown.cancelled() => return None,
            message = stream.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => match ClientCommand::parse(text.as_str()) {
                Ok(ClientCommand::Bind { session_id }) => break session_id,
                Ok(command) => {
                    tracing::debug!(conn_id = %conn_id, command = ?command, "First frame is not a bind");
                    return None;
                }
                Err(e) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "Undecodable first frame");
                    return None;
                }
            },
            Some(Ok(Message::Binary(data))) => {
                tracing::debug!(conn_id = %conn_id, len = data.len(), "Ignoring binary frame");
            }
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "Socket error before bind");
                return None;
            }
        }
    };

    let Some(session) = state.registry.get(&session_id) else {
        tracing::info!(conn_id = %conn_id, session_id = %session_id, "Bind for unknown session");
        return None;
    };

    let (stdin_tx, stdin_rx) = mpsc::channel(state.limits.stdin_queue_capacity);
    let connection = Connection {
        conn_id,
        stdin: stdin_rx,
        outbound: outbound.clone(),
        closed: closed.clone(),
    };

    match session.bind(connection) {
        Ok(()) => {
            tracing::info!(conn_id = %conn_id, session_id = %session_id, "Socket bound");
            Some(Bound { session, stdin_tx })
        }
        Err(SessionError::AlreadyBound(_)) => {
            tracing::info!(conn_id = %conn_id, session_id = %session_id, "Session already bound");
            let _ = outbound
                .send(TerminalMessage::toast(
                    "This terminal is already attached to another connection",
                ))
                .await;
            None
        }
        Err(e) => {
            tracing::debug!(conn_id = %conn_id, error = %e, "Bind rejected");
            None
        }
    }
}

/// Routes client frames to the bound session until the socket goes away.
async fn read_loop(
    stream: &mut SplitStream<WebSocket>,
    state: &AppState,
    bound: Bound,
    closed: &CancellationToken,
    conn_id: Uuid,
) {
    let Bound { session, stdin_tx } = bound;
    let session_id = session.id().clone();

    loop {
        let message = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            _ = state.shutdown.cancelled() => break,
            message = stream.next() => message,
        };

        let text = match message {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(data))) => {
                tracing::debug!(session_id = %session_id, len = data.len(), "Ignoring binary frame");
                continue;
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!(session_id = %session_id, error = %e, "Socket read failed");
                break;
            }
        };

        match ClientCommand::parse(text.as_str()) {
            Ok(ClientCommand::Stdin(data)) => {
                // Waits while the shell is behind on input.
                let sent = tokio::select! {
                    biased;
                    _ = closed.cancelled() => break,
                    sent = stdin_tx.send(data) => sent,
                };
                if sent.is_err() {
                    break;
                }
            }
            Ok(ClientCommand::Resize(size)) => {
                let pushed = tokio::select! {
                    biased;
                    _ = closed.cancelled() => break,
                    pushed = session.push_resize(size) => pushed,
                };
                if pushed.is_err() {
                    break;
                }
            }
            Ok(ClientCommand::Bind { .. }) => {
                tracing::debug!(session_id = %session_id, "Ignoring repeated bind");
            }
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "Ignoring malformed frame");
            }
        }
    }

    tracing::debug!(conn_id = %conn_id, session_id = %session_id, "Terminal reader finished");
}

/// Writes outbound frames until every sender is gone, then closes the socket.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<TerminalMessage>,
    closed: CancellationToken,
    conn_id: Uuid,
) {
    while let Some(message) = outbound.recv().await {
        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, error = %e, "Failed to encode frame");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(json.into())).await {
            tracing::debug!(conn_id = %conn_id, error = %e, "Socket write failed");
            closed.cancel();
            return;
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
    closed.cancel();
}
