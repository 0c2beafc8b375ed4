//! REST handlers.

use axum::extract::{Path, Query, State};
use axum::http::Uri;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::AppState;
use crate::exec::ExecTarget;

/// Query of a start-terminal request.
#[derive(Debug, Default, Deserialize)]
pub struct StartTerminalQuery {
    /// Cluster context to use instead of the default.
    pub cluster: Option<String>,
    /// Preferred shell.
    pub shell: Option<String>,
}

/// Response of a start-terminal request.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartTerminalResponse {
    pub id: String,
}

/// Response of the health endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
}

/// `GET /api/v1/pod/{namespace}/{pod}/shell/{container}`
pub async fn start_terminal(
    State(state): State<AppState>,
    Path((namespace, pod, container)): Path<(String, String, String)>,
    Query(query): Query<StartTerminalQuery>,
) -> Result<Json<StartTerminalResponse>, ApiError> {
    let target = ExecTarget::new(query.cluster, namespace, pod, container)?;
    let started = state.factory.start_terminal(target, query.shell)?;
    Ok(Json(StartTerminalResponse { id: started.id }))
}

/// `GET /api/v1/pod/{namespace}/{pod}/shell` without a container.
pub async fn missing_container(
    Path((namespace, pod)): Path<(String, String)>,
) -> ApiError {
    tracing::debug!(namespace = %namespace, pod = %pod, "Terminal requested without container");
    ApiError::Validation("container must not be empty".to_string())
}

/// `GET /healthz`
pub async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        sessions: state.registry.len(),
    })
}

/// Fallback for unknown routes.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("no route for {}", uri.path()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::exec::testing::{FakeLogSource, FakeTransport};
    use crate::exec::ProcessAttacher;
    use crate::network::{router, ConnectionLimits};
    use crate::session::{SessionFactory, SessionRegistry, SessionSettings};

    pub(crate) fn test_state(max_sessions: usize) -> AppState {
        let registry = SessionRegistry::new();
        let shutdown = CancellationToken::new();
        let attacher = Arc::new(ProcessAttacher::new(Arc::new(FakeTransport::with_shells(
            &["sh"],
        ))));
        let settings = SessionSettings {
            max_sessions,
            ..SessionSettings::default()
        };
        AppState {
            factory: SessionFactory::new(registry.clone(), attacher, settings, shutdown.clone()),
            registry,
            logs: Arc::new(FakeLogSource::new("line one\nline two\n")),
            limits: ConnectionLimits::default(),
            shutdown,
        }
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_start_terminal_returns_token() {
        let state = test_state(8);
        let registry = state.registry.clone();

        let (status, body) = get(
            router(state),
            "/api/v1/pod/team-a/web-0/shell/app?cluster=prod&shell=bash",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let id = body["id"].as_str().unwrap();
        assert_eq!(id.len(), 32);

        let session = registry.get(id).unwrap();
        assert_eq!(session.target().to_string(), "prod/team-a/web-0/app");
        assert_eq!(session.shell_hint(), Some("bash"));
    }

    #[tokio::test]
    async fn test_missing_container_is_validation_error() {
        let (status, body) = get(router(test_state(8)), "/api/v1/pod/team-a/web-0/shell").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_blank_segment_is_validation_error() {
        let (status, body) = get(router(test_state(8)), "/api/v1/pod/%20/web-0/shell/app").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "namespace must not be empty");
    }

    #[tokio::test]
    async fn test_capacity_is_service_unavailable() {
        let state = test_state(1);
        let app = router(state);

        let (status, _) = get(app.clone(), "/api/v1/pod/team-a/web-0/shell/app").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get(app, "/api/v1/pod/team-a/web-0/shell/app").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "CAPACITY_EXCEEDED");
    }

    #[tokio::test]
    async fn test_healthz_counts_sessions() {
        let state = test_state(8);
        let app = router(state);

        let (_, body) = get(app.clone(), "/healthz").await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 0);

        get(app.clone(), "/api/v1/pod/team-a/web-0/shell/app").await;
        let (_, body) = get(app, "/healthz").await;
        assert_eq!(body["sessions"], 1);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (status, body) = get(router(test_state(8)), "/api/v2/whatever").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }
}
