use crate::domain::model::{SimulationResponse, SimulationState, SimultonKind, SimultonResponse};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::{Duration, Instant};

pub trait ConfigProvider: Send + Sync {
    fn host(&self) -> &str;
    fn port(&self) -> u16;
    fn base_port(&self) -> u16;
    fn health_timeout(&self) -> Duration;
    fn shutdown_timeout(&self) -> Duration;
    fn socket_path(&self) -> &Path;
}

/// How the simulation thinks of a running simulton.
#[async_trait]
pub trait SimultonHandle: Send + Sync {
    fn port(&self) -> u16;
    fn to_response(&self) -> SimultonResponse;
    async fn run(&mut self, rate: f64) -> Result<bool>;
    async fn pause(&mut self) -> Result<bool>;
    async fn shutdown(&mut self) -> Result<()>;
}

/// Starts simulton processes on behalf of the simulation.
#[async_trait]
pub trait SimultonFactory: Send + Sync {
    async fn start(&self, kind: SimultonKind, port: u16) -> Result<Box<dyn SimultonHandle>>;
}

/// An object living inside a simulton which follows the simulton state.
pub trait SimultonInstance: Send {
    fn on_running(&mut self, _rate: f64, _now: Instant) {}
    fn on_paused(&mut self, _now: Instant) {}
}

/// A process listening to simulation-wide broadcasts.
pub trait Satellite {
    fn on_paused(&mut self) {}
    fn on_running(&mut self, _rate: f64) {}
    fn on_shutting(&mut self) {}

    /// 依照廣播的狀態分派, 回傳是否應該停止監聽
    fn dispatch(&mut self, msg: &SimulationResponse) -> bool {
        match msg.state {
            SimulationState::Paused => self.on_paused(),
            SimulationState::Running => self.on_running(msg.rate),
            SimulationState::Shutting => {
                self.on_shutting();
                return true;
            }
            SimulationState::Init => {}
        }
        false
    }
}
