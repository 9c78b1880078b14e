use crate::api::simulton::{simulton_routes, SimultonApi};
use crate::core::clock::Clock;
use crate::domain::model::{ClockResponse, NewClockParams};
use crate::utils::error::Result;
use crate::utils::validation::validate_non_empty_string;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::time::Instant;
use tower_http::trace::TraceLayer;

pub type ClockApi = SimultonApi<Clock>;

pub fn router(api: ClockApi) -> Router {
    simulton_routes::<Clock>()
        .route("/api/v1/clocks", get(list_clocks).post(create_clock))
        .route("/api/v1/clocks/{id}", get(get_clock).delete(delete_clock))
        .layer(TraceLayer::new_for_http())
        .with_state(api)
}

async fn list_clocks(State(api): State<ClockApi>) -> Json<Vec<ClockResponse>> {
    let now = Instant::now();
    let core = api.core.lock().await;
    Json(core.instances().map(|(_, c)| c.to_response(now)).collect())
}

async fn create_clock(
    State(api): State<ClockApi>,
    Json(params): Json<NewClockParams>,
) -> Result<(StatusCode, Json<ClockResponse>)> {
    validate_non_empty_string("name", &params.name)?;
    let now = Instant::now();
    let mut core = api.core.lock().await;
    let id = core.new_instance_id();
    let clock = core.add_instance(id.clone(), Clock::new(id, params.name), now);
    tracing::info!("Created clock {} '{}'", clock.id(), clock.name());
    Ok((StatusCode::CREATED, Json(clock.to_response(now))))
}

async fn get_clock(State(api): State<ClockApi>, Path(id): Path<String>) -> Result<Json<ClockResponse>> {
    let core = api.core.lock().await;
    Ok(Json(core.instance(&id)?.to_response(Instant::now())))
}

async fn delete_clock(
    State(api): State<ClockApi>,
    Path(id): Path<String>,
) -> Result<Json<ClockResponse>> {
    let mut core = api.core.lock().await;
    let clock = core.remove_instance(&id)?;
    tracing::info!("Deleted clock {}", id);
    Ok(Json(clock.to_response(Instant::now())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::call;
    use crate::core::simulton::SimultonCore;
    use crate::domain::model::SimultonKind;
    use serde_json::json;

    fn app() -> Router {
        let mut core = SimultonCore::new(SimultonKind::Clock, Some(9500));
        core.on_startup();
        router(SimultonApi::new(core))
    }

    fn encoded(id: &str) -> String {
        format!("/api/v1/clocks/{}", id.replace('#', "%23"))
    }

    #[tokio::test]
    async fn test_create_list_get_delete() {
        let app = app();
        let (status, created) =
            call(&app, "POST", "/api/v1/clocks", Some(json!({"name": "lobby"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["name"], "lobby");
        assert_eq!(created["time"], 0.0);
        let id = created["id"].as_str().unwrap().to_string();
        assert!(id.starts_with("Clock#"));

        let (status, list) = call(&app, "GET", "/api/v1/clocks", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, one) = call(&app, "GET", &encoded(&id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(one["id"], id.as_str());

        let (status, _) = call(&app, "DELETE", &encoded(&id), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, "GET", &encoded(&id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Item not found");
    }

    #[tokio::test]
    async fn test_clock_time_advances_while_running() {
        let app = app();
        let (_, created) =
            call(&app, "POST", "/api/v1/clocks", Some(json!({"name": "fast"}))).await;
        let id = created["id"].as_str().unwrap().to_string();

        call(
            &app,
            "PUT",
            "/api/v1/simulton",
            Some(json!({"state": "RUNNING", "rate": 100.0})),
        )
        .await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        call(&app, "PUT", "/api/v1/simulton", Some(json!({"state": "PAUSED"}))).await;

        let (_, first) = call(&app, "GET", &encoded(&id), None).await;
        let frozen = first["time"].as_f64().unwrap();
        assert!(frozen >= 5.0, "time was {}", frozen);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let (_, second) = call(&app, "GET", &encoded(&id), None).await;
        assert_eq!(second["time"].as_f64().unwrap(), frozen);
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let app = app();
        let (status, _) = call(&app, "POST", "/api/v1/clocks", Some(json!({"name": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_unknown_clock() {
        let app = app();
        let (status, _) = call(&app, "DELETE", "/api/v1/clocks/Clock%23nothere", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
