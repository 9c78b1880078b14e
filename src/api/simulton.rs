use crate::api::{bind, health, serve, ShutdownTrigger};
use crate::core::clock::Clock;
use crate::core::elevator::Elevator;
use crate::core::simulton::SimultonCore;
use crate::domain::model::{SimultonKind, SimultonRequest, SimultonResponse, SimultonState};
use crate::domain::ports::SimultonInstance;
use crate::utils::error::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Shared state of a simulton service.
pub struct SimultonApi<T: SimultonInstance> {
    pub core: Arc<Mutex<SimultonCore<T>>>,
    pub shutdown: ShutdownTrigger,
}

impl<T: SimultonInstance> Clone for SimultonApi<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<T: SimultonInstance> SimultonApi<T> {
    pub fn new(core: SimultonCore<T>) -> Self {
        Self {
            core: Arc::new(Mutex::new(core)),
            shutdown: ShutdownTrigger::new(),
        }
    }
}

/// Routes every simulton service has: health and its own state.
pub fn simulton_routes<T: SimultonInstance + 'static>() -> Router<SimultonApi<T>> {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/simulton",
            get(get_simulton::<T>).put(put_simulton::<T>),
        )
}

async fn get_simulton<T: SimultonInstance + 'static>(
    State(api): State<SimultonApi<T>>,
) -> Json<SimultonResponse> {
    Json(api.core.lock().await.to_response())
}

async fn put_simulton<T: SimultonInstance + 'static>(
    State(api): State<SimultonApi<T>>,
    Json(req): Json<SimultonRequest>,
) -> Result<(StatusCode, Json<SimultonResponse>)> {
    let mut core = api.core.lock().await;
    core.apply(&req, Instant::now())?;
    if core.state() == SimultonState::Shutting {
        // 回應送出後才會真正停止
        api.shutdown.fire();
    }
    Ok((StatusCode::ACCEPTED, Json(core.to_response())))
}

/// Runs the `kind` simulton service until it is told to shut down.
pub async fn run(kind: SimultonKind, host: &str, port: u16) -> Result<()> {
    let listener = bind(host, port).await?;
    tracing::info!("{} simulton starting on {}:{}", kind.title(), host, port);
    match kind {
        SimultonKind::Clock => {
            let mut core: SimultonCore<Clock> = SimultonCore::new(kind, Some(port));
            core.on_startup();
            let api = SimultonApi::new(core);
            let trigger = api.shutdown.clone();
            serve(listener, crate::api::clock::router(api), trigger).await
        }
        SimultonKind::Elevator => {
            let mut core: SimultonCore<Elevator> = SimultonCore::new(kind, Some(port));
            core.on_startup();
            let api = SimultonApi::new(core);
            let trigger = api.shutdown.clone();
            serve(listener, crate::api::elevator::router(api), trigger).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::call;
    use serde_json::json;

    fn app() -> (Router, SimultonApi<Clock>) {
        let mut core = SimultonCore::new(SimultonKind::Clock, Some(9500));
        core.on_startup();
        let api = SimultonApi::new(core);
        (simulton_routes().with_state(api.clone()), api)
    }

    #[tokio::test]
    async fn test_get_simulton() {
        let (app, _) = app();
        let (status, body) = call(&app, "GET", "/api/v1/simulton", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "PAUSED");
        assert_eq!(body["title"], "Clock");
        assert_eq!(body["description"], "Clock API");
        assert_eq!(body["port"], 9500);
    }

    #[tokio::test]
    async fn test_put_running_and_paused() {
        let (app, _) = app();
        let (status, body) = call(
            &app,
            "PUT",
            "/api/v1/simulton",
            Some(json!({"state": "RUNNING", "rate": 2.0})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["state"], "RUNNING");
        assert_eq!(body["rate"], 2.0);

        let (status, body) =
            call(&app, "PUT", "/api/v1/simulton", Some(json!({"state": "PAUSED"}))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["state"], "PAUSED");
        assert_eq!(body["rate"], 2.0);
    }

    #[tokio::test]
    async fn test_put_running_without_rate_rejected() {
        let (app, _) = app();
        let (status, body) =
            call(&app, "PUT", "/api/v1/simulton", Some(json!({"state": "RUNNING"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("positive rate"));
    }

    #[tokio::test]
    async fn test_put_bad_state_rejected() {
        let (app, _) = app();
        let (status, _) =
            call(&app, "PUT", "/api/v1/simulton", Some(json!({"state": "FLYING"}))).await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_shutting_fires_trigger() {
        let (app, api) = app();
        let (status, body) =
            call(&app, "PUT", "/api/v1/simulton", Some(json!({"state": "SHUTTING"}))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["state"], "SHUTTING");
        tokio::time::timeout(std::time::Duration::from_secs(1), api.shutdown.fired())
            .await
            .unwrap();
    }
}
