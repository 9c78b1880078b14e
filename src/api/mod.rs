// HTTP layer: axum routers for the simulation and simulton services.

pub mod clock;
pub mod elevator;
pub mod simulation;
pub mod simulton;

use crate::domain::model::Message;
use crate::utils::error::{Result, SimError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;

impl IntoResponse for SimError {
    fn into_response(self) -> Response {
        let status = match &self {
            SimError::NotFound { .. } => StatusCode::NOT_FOUND,
            SimError::ValidationError { .. }
            | SimError::InvalidState { .. }
            | SimError::InvalidConfigValueError { .. }
            | SimError::ConfigValidationError { .. }
            | SimError::MissingConfigError { .. }
            | SimError::SerializationError(_)
            | SimError::LaunchError { .. }
            | SimError::Unreachable { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("❌ {} (Category: {:?})", self, self.category());
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, Json(Message::new(self.user_friendly_message()))).into_response()
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Lets a request handler stop the server it runs in, once the in-flight
/// responses have been sent.
#[derive(Debug, Clone, Default)]
pub struct ShutdownTrigger {
    notify: Arc<Notify>,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        // notify_one 會保留 permit, 即使 serve 尚未開始等待
        self.notify.notify_one();
    }

    pub async fn fired(&self) {
        self.notify.notified().await;
    }
}

pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .map_err(|e| SimError::LaunchError {
            program: format!("http://{}:{}", host, port),
            reason: e.to_string(),
        })
}

/// Serves `app` until SIGINT, SIGTERM or `trigger` fires.
pub async fn serve(listener: TcpListener, app: axum::Router, trigger: ShutdownTrigger) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("🚀 Listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(trigger))
        .await?;
    tracing::info!("Server on {} stopped", addr);
    Ok(())
}

async fn shutdown_signal(trigger: ShutdownTrigger) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
        _ = trigger.fired() => tracing::info!("Shutdown requested"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    /// Sends one request through `app` and decodes the JSON reply.
    pub(crate) async fn call(
        app: &axum::Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let resp = SimError::not_found("clock x").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = SimError::invalid_state("nope").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let io = std::io::Error::other("disk");
        let resp = SimError::from(io).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_not_found_message() {
        let app = axum::Router::new().route(
            "/missing",
            axum::routing::get(|| async { Err::<(), _>(SimError::not_found("thing")) }),
        );
        let (status, body) = call(&app, "GET", "/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Item not found");
    }

    #[tokio::test]
    async fn test_trigger_before_wait() {
        let trigger = ShutdownTrigger::new();
        trigger.fire();
        tokio::time::timeout(std::time::Duration::from_secs(1), trigger.fired())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_serve_stops_on_trigger() {
        let listener = bind("127.0.0.1", 0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let app = axum::Router::new().route("/health", axum::routing::get(health));
        let trigger = ShutdownTrigger::new();
        let server = tokio::spawn(serve(listener, app, trigger.clone()));

        let body = crate::adapters::rest_client::wait_until_reachable(
            &format!("http://127.0.0.1:{}/health", port),
            std::time::Duration::from_secs(3),
        )
        .await
        .unwrap();
        assert_eq!(body["status"], "ok");

        trigger.fire();
        tokio::time::timeout(std::time::Duration::from_secs(3), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
