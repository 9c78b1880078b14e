use crate::adapters::rest_client::RestClient;
use crate::core::launcher::{LaunchSpec, Launcher};
use crate::domain::model::{SimultonKind, SimultonRequest, SimultonResponse, SimultonState};
use crate::domain::ports::{SimultonFactory, SimultonHandle};
use crate::utils::error::{Result, SimError};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::PathBuf;
use std::time::Duration;

pub const SIMULTON_URI: &str = "/api/v1/simulton";

/// This is how the simulation thinks of a simulton process.
pub struct SimultonProxy {
    kind: SimultonKind,
    launcher: Launcher,
    client: RestClient,
    shutdown_timeout: Duration,
    last: SimultonResponse,
}

impl SimultonProxy {
    pub fn new(kind: SimultonKind, launcher: Launcher, shutdown_timeout: Duration) -> Self {
        let client = launcher.rest_client(false, false);
        let last = SimultonResponse {
            description: String::new(),
            port: Some(launcher.port()),
            rate: 0.0,
            state: SimultonState::Init,
            title: String::new(),
            version: String::new(),
        };
        Self {
            kind,
            launcher,
            client,
            shutdown_timeout,
            last,
        }
    }

    pub fn kind(&self) -> SimultonKind {
        self.kind
    }

    pub fn launch(&mut self) -> Result<u32> {
        self.launcher.launch()
    }

    /// Waits for the simulton API and records what it reports about itself.
    pub async fn wait_until_reachable(&mut self, timeout: Duration) -> Result<()> {
        let body = self
            .launcher
            .wait_until_reachable(SIMULTON_URI, timeout)
            .await?
            .ok_or_else(|| SimError::Unreachable {
                url: format!("{}{}", self.launcher.base_url(), SIMULTON_URI),
                timeout_secs: timeout.as_secs(),
            })?;
        let mut resp: SimultonResponse = serde_json::from_value(body)?;
        resp.port = Some(self.launcher.port());
        self.last = resp;
        Ok(())
    }

    async fn request(&mut self, req: SimultonRequest) -> Result<bool> {
        let (status, body) = self.client.put(SIMULTON_URI, &req).await?;
        if status != StatusCode::ACCEPTED {
            tracing::warn!(
                "Simulton {} refused {:?}: {} {}",
                self.launcher.port(),
                req.state,
                status,
                body
            );
            return Ok(false);
        }
        if let Ok(mut resp) = serde_json::from_value::<SimultonResponse>(body) {
            resp.port = Some(self.launcher.port());
            self.last = resp;
        }
        Ok(true)
    }
}

#[async_trait]
impl SimultonHandle for SimultonProxy {
    fn port(&self) -> u16 {
        self.launcher.port()
    }

    fn to_response(&self) -> SimultonResponse {
        self.last.clone()
    }

    async fn run(&mut self, rate: f64) -> Result<bool> {
        self.request(SimultonRequest {
            state: SimultonState::Running,
            rate: Some(rate),
        })
        .await
    }

    async fn pause(&mut self) -> Result<bool> {
        self.request(SimultonRequest {
            state: SimultonState::Paused,
            rate: None,
        })
        .await
    }

    /// Asks the simulton to stop, then lets the launcher make sure it did.
    async fn shutdown(&mut self) -> Result<()> {
        let req = SimultonRequest {
            state: SimultonState::Shutting,
            rate: None,
        };
        match self.request(req).await {
            Ok(true) => {
                self.launcher.wait_to_die(self.shutdown_timeout).await?;
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("Shutdown request to {} failed: {}", self.port(), e),
        }
        self.last.state = SimultonState::Shutting;
        let report = self.launcher.shutdown(self.shutdown_timeout).await?;
        tracing::debug!(
            "Simulton {} exit code {:?} after {:?}",
            report.pid,
            report.exit_code,
            report.signals_sent
        );
        Ok(())
    }
}

/// Starts simultons by re-running the `simultons` executable.
#[derive(Debug, Clone)]
pub struct ProcessSimultonFactory {
    pub program: PathBuf,
    pub host: String,
    pub health_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub verbose: bool,
}

impl ProcessSimultonFactory {
    pub fn launch_spec(&self, kind: SimultonKind, port: u16) -> LaunchSpec {
        let mut args = vec![
            "simulton".to_string(),
            kind.as_str().to_string(),
            "--host".to_string(),
            self.host.clone(),
            "--port".to_string(),
            port.to_string(),
        ];
        if self.verbose {
            args.push("--verbose".to_string());
        }
        LaunchSpec {
            program: self.program.clone(),
            args,
            host: self.host.clone(),
            port,
        }
    }
}

#[async_trait]
impl SimultonFactory for ProcessSimultonFactory {
    async fn start(&self, kind: SimultonKind, port: u16) -> Result<Box<dyn SimultonHandle>> {
        let launcher = Launcher::new(self.launch_spec(kind, port));
        let mut proxy = SimultonProxy::new(kind, launcher, self.shutdown_timeout);
        proxy.launch()?;
        if let Err(e) = proxy.wait_until_reachable(self.health_timeout).await {
            // 沒起來就收掉, 不留孤兒程序
            if let Err(shutdown_err) = proxy.launcher.shutdown(self.shutdown_timeout).await {
                tracing::warn!("Cleanup of simulton {} failed: {}", port, shutdown_err);
            }
            return Err(e);
        }
        Ok(Box::new(proxy))
    }
}
