use crate::api::simulton::{simulton_routes, SimultonApi};
use crate::core::elevator::Elevator;
use crate::domain::model::{
    ElevatorResponse, FloorCallParams, LoadParams, NewElevatorParams, PressParams,
};
use crate::utils::error::{Result, SimError};
use crate::utils::validation::validate_non_empty_string;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use std::time::Instant;
use tower_http::trace::TraceLayer;

pub type ElevatorApi = SimultonApi<Elevator>;

pub fn router(api: ElevatorApi) -> Router {
    simulton_routes::<Elevator>()
        .route("/api/v1/elevators", get(list_elevators).post(create_elevator))
        .route("/api/v1/elevators/{id}", get(get_elevator))
        .route("/api/v1/elevators/{id}/call", put(call_elevator))
        .route("/api/v1/elevators/{id}/press", put(press_button))
        .route("/api/v1/elevators/{id}/arrive", put(arrive))
        .route("/api/v1/elevators/{id}/step_in", put(step_in))
        .route("/api/v1/elevators/{id}/step_out", put(step_out))
        .layer(TraceLayer::new_for_http())
        .with_state(api)
}

async fn list_elevators(State(api): State<ElevatorApi>) -> Json<Vec<ElevatorResponse>> {
    let core = api.core.lock().await;
    Json(core.instances().map(|(_, e)| e.to_response()).collect())
}

async fn create_elevator(
    State(api): State<ElevatorApi>,
    Json(params): Json<NewElevatorParams>,
) -> Result<(StatusCode, Json<ElevatorResponse>)> {
    validate_non_empty_string("name", &params.name)?;
    let mut core = api.core.lock().await;
    let id = core.new_instance_id();
    let elevator = Elevator::new(id.clone(), params.name, params.floors)?;
    let elevator = core.add_instance(id, elevator, Instant::now());
    tracing::info!("Created elevator {:?}", elevator);
    Ok((StatusCode::CREATED, Json(elevator.to_response())))
}

async fn get_elevator(
    State(api): State<ElevatorApi>,
    Path(id): Path<String>,
) -> Result<Json<ElevatorResponse>> {
    let core = api.core.lock().await;
    Ok(Json(core.instance(&id)?.to_response()))
}

async fn call_elevator(
    State(api): State<ElevatorApi>,
    Path(id): Path<String>,
    Json(params): Json<FloorCallParams>,
) -> Result<(StatusCode, Json<ElevatorResponse>)> {
    let mut core = api.core.lock().await;
    let elevator = core.instance_mut(&id)?;
    elevator.floor_call(params.floor)?;
    tracing::debug!("Elevator {} called to floor {}", id, params.floor);
    Ok((StatusCode::ACCEPTED, Json(elevator.to_response())))
}

async fn press_button(
    State(api): State<ElevatorApi>,
    Path(id): Path<String>,
    Json(params): Json<PressParams>,
) -> Result<(StatusCode, Json<ElevatorResponse>)> {
    let mut core = api.core.lock().await;
    let elevator = core.instance_mut(&id)?;
    elevator.press(params.button)?;
    tracing::debug!("Elevator {:?} button {} pressed", elevator, params.button);
    Ok((StatusCode::ACCEPTED, Json(elevator.to_response())))
}

async fn arrive(
    State(api): State<ElevatorApi>,
    Path(id): Path<String>,
    Json(params): Json<FloorCallParams>,
) -> Result<(StatusCode, Json<ElevatorResponse>)> {
    let mut core = api.core.lock().await;
    let elevator = core.instance_mut(&id)?;
    elevator.arrive(params.floor)?;
    tracing::debug!("Elevator {} arrived at floor {}", id, params.floor);
    Ok((StatusCode::ACCEPTED, Json(elevator.to_response())))
}

async fn step_in(
    State(api): State<ElevatorApi>,
    Path(id): Path<String>,
    Json(params): Json<LoadParams>,
) -> Result<(StatusCode, Json<ElevatorResponse>)> {
    let mut core = api.core.lock().await;
    let elevator = core.instance_mut(&id)?;
    if !elevator.step_in(params.kilos) {
        return Err(SimError::invalid_state("cannot step in with closed doors"));
    }
    Ok((StatusCode::ACCEPTED, Json(elevator.to_response())))
}

async fn step_out(
    State(api): State<ElevatorApi>,
    Path(id): Path<String>,
    Json(params): Json<LoadParams>,
) -> Result<(StatusCode, Json<ElevatorResponse>)> {
    let mut core = api.core.lock().await;
    let elevator = core.instance_mut(&id)?;
    if !elevator.step_out(params.kilos) {
        return Err(SimError::invalid_state("cannot step out with closed doors"));
    }
    Ok((StatusCode::ACCEPTED, Json(elevator.to_response())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::call;
    use crate::core::simulton::SimultonCore;
    use crate::domain::model::SimultonKind;
    use serde_json::json;

    fn app() -> Router {
        let mut core = SimultonCore::new(SimultonKind::Elevator, Some(9501));
        core.on_startup();
        router(SimultonApi::new(core))
    }

    async fn create(app: &Router, floors: u32) -> String {
        let (status, body) = call(
            app,
            "POST",
            "/api/v1/elevators",
            Some(json!({"name": "north", "floors": floors})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().replace('#', "%23")
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let app = app();
        let id = create(&app, 5).await;

        let (status, body) = call(&app, "GET", &format!("/api/v1/elevators/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "north");
        assert_eq!(body["floors"], 5);
        assert!(body["id"].as_str().unwrap().starts_with("Elevator#"));

        let (_, list) = call(&app, "GET", "/api/v1/elevators", None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (_, simulton) = call(&app, "GET", "/api/v1/simulton", None).await;
        assert_eq!(simulton["title"], "Elevator");
    }

    #[tokio::test]
    async fn test_zero_floors_rejected() {
        let app = app();
        let (status, _) = call(
            &app,
            "POST",
            "/api/v1/elevators",
            Some(json!({"name": "pit", "floors": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_floor_call() {
        let app = app();
        let id = create(&app, 3).await;
        let uri = format!("/api/v1/elevators/{}/call", id);

        let (status, _) = call(&app, "PUT", &uri, Some(json!({"floor": 3}))).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, _) = call(&app, "PUT", &uri, Some(json!({"floor": 4}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "PUT",
            "/api/v1/elevators/Elevator%23nothere/call",
            Some(json!({"floor": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_panel_and_passengers() {
        let app = app();
        let id = create(&app, 3).await;
        let uri = |action: &str| format!("/api/v1/elevators/{}/{}", id, action);

        // 門關著不能進人
        let (status, _) = call(&app, "PUT", &uri("step_in"), Some(json!({"kilos": 80}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // 按 3 樓, 燈亮著等電梯到
        let (status, body) = call(&app, "PUT", &uri("press"), Some(json!({"button": 2}))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["destinations"], json!([3]));
        assert_eq!(body["panel"][2], "*_3_*");

        // 開門
        let (_, body) = call(&app, "PUT", &uri("press"), Some(json!({"button": 3}))).await;
        assert_eq!(body["state"], "DOORS_OPENED");

        let (status, body) = call(&app, "PUT", &uri("step_in"), Some(json!({"kilos": 80}))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["load"], "SOME");

        // 關門後出發
        let (_, body) = call(&app, "PUT", &uri("press"), Some(json!({"button": 4}))).await;
        assert_eq!(body["state"], "GOING");

        let (status, body) = call(&app, "PUT", &uri("arrive"), Some(json!({"floor": 3}))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["current_floor"], 3);
        assert_eq!(body["destinations"], json!([]));
        assert_eq!(body["panel"][2], "3");
        assert_eq!(body["state"], "DOORS_OPENED");

        let (status, body) = call(&app, "PUT", &uri("step_out"), Some(json!({"kilos": 80}))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["load"], "NONE");
    }

    #[tokio::test]
    async fn test_bad_panel_requests() {
        let app = app();
        let id = create(&app, 2).await;

        let (status, _) = call(
            &app,
            "PUT",
            &format!("/api/v1/elevators/{}/press", id),
            Some(json!({"button": 9})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "PUT",
            &format!("/api/v1/elevators/{}/arrive", id),
            Some(json!({"floor": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "PUT",
            "/api/v1/elevators/Elevator%23nothere/press",
            Some(json!({"button": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
