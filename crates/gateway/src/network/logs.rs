//! Container log socket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures::stream::SplitStream;
use futures::{future, SinkExt, StreamExt};
use serde::Deserialize;

use super::error::ApiError;
use super::stream::StreamAdapter;
use super::AppState;
use crate::exec::{ExecTarget, LogOptions};

/// Query of a log stream request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    pub cluster: Option<String>,
    #[serde(default)]
    pub follow: bool,
    pub tail_lines: Option<u64>,
    #[serde(default)]
    pub previous: bool,
}

impl From<&LogQuery> for LogOptions {
    fn from(query: &LogQuery) -> Self {
        Self {
            follow: query.follow,
            tail_lines: query.tail_lines,
            previous: query.previous,
        }
    }
}

/// `GET /api/v1/log/{namespace}/{pod}/{container}/ws`
pub async fn log_socket(
    State(state): State<AppState>,
    Path((namespace, pod, container)): Path<(String, String, String)>,
    Query(query): Query<LogQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let options = LogOptions::from(&query);
    let target = ExecTarget::new(query.cluster, namespace, pod, container)?;

    let max_message_bytes = state.limits.max_message_bytes;
    Ok(ws
        .max_message_size(max_message_bytes)
        .on_upgrade(move |socket| stream_logs(socket, state, target, options)))
}

async fn stream_logs(socket: WebSocket, state: AppState, target: ExecTarget, options: LogOptions) {
    let (sink, mut stream) = socket.split();
    let mut frames =
        sink.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text.into()))));

    let source = match state.logs.open(&target, &options).await {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!(target_container = %target, error = %e, "Failed to open log stream");
            let _ = frames.close().await;
            return;
        }
    };

    tracing::debug!(target_container = %target, follow = options.follow, "Log stream opened");

    let mut adapter = StreamAdapter::new();
    let result = tokio::select! {
        biased;
        _ = state.shutdown.cancelled() => None,
        _ = client_gone(&mut stream) => None,
        result = adapter.pump(source, &mut frames) => Some(result),
    };

    match result {
        Some(Ok(())) => {
            tracing::debug!(
                target_container = %target,
                frames = adapter.frames(),
                bytes = adapter.bytes(),
                "Log stream ended"
            );
        }
        Some(Err(e)) => {
            tracing::debug!(target_container = %target, error = %e, "Log stream interrupted");
        }
        None => {
            tracing::debug!(target_container = %target, "Log stream stopped");
        }
    }

    let _ = frames.close().await;
}

/// Resolves once the client closes the socket or it breaks.
async fn client_gone(stream: &mut SplitStream<WebSocket>) {
    while let Some(Ok(message)) = stream.next().await {
        if let Message::Close(_) = message {
            break;
        }
    }
}
