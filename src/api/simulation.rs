use crate::adapters::simulton_proxy::ProcessSimultonFactory;
use crate::api::{bind, health, serve, ShutdownTrigger};
use crate::core::pubsub::Broadcaster;
use crate::core::simulation::{start_simulton, Simulation};
use crate::domain::model::{
    NewSimultonParams, SimulationRequest, SimulationResponse, SimulationState, SimultonResponse,
};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct SimulationApi {
    pub simulation: Arc<Mutex<Simulation>>,
    pub shutdown: ShutdownTrigger,
}

impl SimulationApi {
    pub fn new(simulation: Simulation) -> Self {
        Self {
            simulation: Arc::new(Mutex::new(simulation)),
            shutdown: ShutdownTrigger::new(),
        }
    }
}

pub fn router(api: SimulationApi) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/simulation",
            get(get_simulation).put(put_simulation),
        )
        .route("/api/v1/simultons", get(list_simultons).post(create_simulton))
        .route("/api/v1/simultons/{port}", get(get_simulton))
        .layer(TraceLayer::new_for_http())
        .with_state(api)
}

async fn get_simulation(State(api): State<SimulationApi>) -> Json<SimulationResponse> {
    Json(api.simulation.lock().await.to_response())
}

async fn put_simulation(
    State(api): State<SimulationApi>,
    Json(req): Json<SimulationRequest>,
) -> Result<(StatusCode, Json<SimulationResponse>)> {
    let mut simulation = api.simulation.lock().await;
    let resp = simulation.apply(&req).await?;
    if resp.state == SimulationState::Shutting {
        api.shutdown.fire();
    }
    Ok((StatusCode::ACCEPTED, Json(resp)))
}

async fn create_simulton(
    State(api): State<SimulationApi>,
    Json(params): Json<NewSimultonParams>,
) -> Result<(StatusCode, Json<SimultonResponse>)> {
    // 啟動 simulton 要等健康檢查, 期間不鎖住 simulation
    let (port, factory) = {
        let mut simulation = api.simulation.lock().await;
        (simulation.reserve_port()?, simulation.factory())
    };
    let simulton = start_simulton(factory.as_ref(), &params, port).await?;
    let resp = api.simulation.lock().await.register(simulton).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

async fn list_simultons(State(api): State<SimulationApi>) -> Json<BTreeMap<u16, SimultonResponse>> {
    Json(api.simulation.lock().await.simultons())
}

async fn get_simulton(
    State(api): State<SimulationApi>,
    Path(port): Path<u16>,
) -> Result<Json<SimultonResponse>> {
    Ok(Json(api.simulation.lock().await.simulton(port)?))
}

/// Runs the simulation service until SIGINT, SIGTERM or a SHUTTING request,
/// then takes its simultons down with it.
pub async fn run<C: ConfigProvider>(config: &C, program: PathBuf, verbose: bool) -> Result<()> {
    let listener = bind(config.host(), config.port()).await?;

    let broadcaster = Broadcaster::new();
    let _socket = broadcaster.serve(config.socket_path())?;

    let factory = ProcessSimultonFactory {
        program,
        host: config.host().to_string(),
        health_timeout: config.health_timeout(),
        shutdown_timeout: config.shutdown_timeout(),
        verbose,
    };
    let mut simulation = Simulation::new(config.base_port(), broadcaster, Arc::new(factory));
    simulation.on_startup().await?;

    let api = SimulationApi::new(simulation);
    let trigger = api.shutdown.clone();
    let result = serve(listener, router(api.clone()), trigger).await;

    // SIGINT/SIGTERM 也要收掉子程序
    if let Err(e) = api.simulation.lock().await.shutdown().await {
        tracing::error!("❌ Simulation shutdown failed: {}", e);
    }
    result
}
