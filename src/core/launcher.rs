use crate::adapters::rest_client::RestClient;
use crate::utils::error::{Result, SimError};
use crate::utils::monitor::ProcessMonitor;
use serde_json::Value;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use sysinfo::Signal;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// What to run and where it will listen.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub pid: u32,
    pub exit_code: Option<i32>,
    pub signals_sent: Vec<&'static str>,
    pub stdout: String,
    pub stderr: String,
}

/// Starts an HTTP service as a child process, waits for it to come up and
/// takes it down again, escalating from SIGINT to SIGTERM to SIGKILL.
pub struct Launcher {
    spec: LaunchSpec,
    child: Option<Child>,
    pid: Option<u32>,
    exit_status: Option<ExitStatus>,
    stdout: Option<JoinHandle<String>>,
    stderr: Option<JoinHandle<String>>,
    client: reqwest::Client,
}

impl Launcher {
    pub fn new(spec: LaunchSpec) -> Self {
        // 單次健康檢查的逾時要短, 否則拖慢輪詢
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap_or_default();
        Self {
            spec,
            child: None,
            pid: None,
            exit_status: None,
            stdout: None,
            stderr: None,
            client,
        }
    }

    pub fn host(&self) -> &str {
        &self.spec.host
    }

    pub fn port(&self) -> u16 {
        self.spec.port
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.spec.host, self.spec.port)
    }

    pub fn rest_client(&self, verbose: bool, dump_headers: bool) -> RestClient {
        RestClient::new(&self.spec.host, self.spec.port, verbose, dump_headers)
    }

    /// Spawns the service process and returns its pid.
    pub fn launch(&mut self) -> Result<u32> {
        if self.child.is_some() && self.exit_status.is_none() {
            return Err(SimError::LaunchError {
                program: self.spec.program.display().to_string(),
                reason: "already launched".to_string(),
            });
        }

        tracing::info!(
            "🚀 Launching {} {} on port {}",
            self.spec.program.display(),
            self.spec.args.join(" "),
            self.spec.port
        );
        let mut child = Command::new(&self.spec.program)
            .args(&self.spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SimError::LaunchError {
                program: self.spec.program.display().to_string(),
                reason: e.to_string(),
            })?;

        let pid = child.id().ok_or_else(|| SimError::LaunchError {
            program: self.spec.program.display().to_string(),
            reason: "process exited immediately".to_string(),
        })?;

        // 持續讀取輸出, 避免管道塞滿卡住子程序
        self.stdout = child.stdout.take().map(drain);
        self.stderr = child.stderr.take().map(drain);
        self.child = Some(child);
        self.pid = Some(pid);
        self.exit_status = None;

        tracing::debug!("Service process started with pid {}", pid);
        Ok(pid)
    }

    /// Returns the exit status once the child has terminated.
    pub fn try_exited(&mut self) -> Result<Option<ExitStatus>> {
        if self.exit_status.is_some() {
            return Ok(self.exit_status);
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };
        let status = child.try_wait()?;
        self.exit_status = status;
        Ok(status)
    }

    pub fn is_alive(&mut self) -> bool {
        self.child.is_some() && matches!(self.try_exited(), Ok(None))
    }

    /// Polls `uri` until it answers 2xx, the process dies or `timeout` passes.
    ///
    /// Returns the JSON body of the first successful answer.
    pub async fn wait_until_reachable(&mut self, uri: &str, timeout: Duration) -> Result<Option<Value>> {
        let url = format!("{}{}", self.base_url(), uri);
        let start = Instant::now();
        tracing::debug!("wait_until_reachable({}, {:?})", url, timeout);

        while start.elapsed() < timeout {
            if let Some(status) = self.try_exited()? {
                tracing::warn!(
                    "wait_until_reachable({}) => process terminated after {:.2}s ({})",
                    url,
                    start.elapsed().as_secs_f64(),
                    status
                );
                return Ok(None);
            }

            match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let body = resp.json::<Value>().await.unwrap_or(Value::Null);
                    tracing::info!(
                        "✅ {} reachable after {:.2}s",
                        url,
                        start.elapsed().as_secs_f64()
                    );
                    return Ok(Some(body));
                }
                Ok(resp) => tracing::trace!("{} answered {}", url, resp.status()),
                Err(e) => tracing::trace!("{} not yet reachable: {}", url, e),
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        tracing::warn!("wait_until_reachable({}, {:?}) => timed out", url, timeout);
        Ok(None)
    }

    /// Waits up to `timeout` for the process to exit on its own.
    pub async fn wait_to_die(&mut self, timeout: Duration) -> Result<bool> {
        if self.exit_status.is_some() {
            return Ok(true);
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(true);
        };
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => {
                self.exit_status = Some(status?);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    /// Stops the service: SIGINT, then SIGTERM, then SIGKILL, waiting up to
    /// `timeout` after each. Collects whatever the process wrote.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<ShutdownReport> {
        let Some(pid) = self.pid else {
            return Err(SimError::invalid_state("service was never launched"));
        };
        let mut report = ShutdownReport {
            pid,
            ..Default::default()
        };

        if let Some(status) = self.try_exited()? {
            tracing::info!("Service {} is already down, ec: {:?}", pid, status.code());
        } else {
            let mut monitor = ProcessMonitor::new(pid);
            monitor.log_stats("Before shutdown");

            for (signal, name) in [(Signal::Interrupt, "SIGINT"), (Signal::Term, "SIGTERM")] {
                if monitor.send_signal(signal) {
                    report.signals_sent.push(name);
                } else {
                    tracing::warn!("Failed to deliver {} to {}", name, pid);
                }
                if self.wait_to_die(timeout).await? {
                    break;
                }
                tracing::warn!("Service {} still alive {:?} after {}", pid, timeout, name);
            }

            if self.exit_status.is_none() {
                if let Some(child) = self.child.as_mut() {
                    child.start_kill()?;
                    report.signals_sent.push("SIGKILL");
                }
                if !self.wait_to_die(timeout).await? {
                    tracing::error!("❌ Service {} survived SIGKILL", pid);
                }
            }
        }

        report.exit_code = self.exit_status.and_then(|s| s.code());
        report.stdout = collect(self.stdout.take(), timeout).await;
        report.stderr = collect(self.stderr.take(), timeout).await;
        self.child = None;

        let dashes = "===========================";
        tracing::debug!("{} service {} stdout {}\n{}", dashes, pid, dashes, report.stdout);
        tracing::debug!("{} service {} stderr {}\n{}", dashes, pid, dashes, report.stderr);
        tracing::info!(
            "🛑 Service {} down, exit code {:?}, signals {:?}",
            pid,
            report.exit_code,
            report.signals_sent
        );
        Ok(report)
    }
}

fn drain<R>(mut reader: R) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf).await {
            tracing::debug!("Stopped reading child output: {}", e);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

async fn collect(handle: Option<JoinHandle<String>>, timeout: Duration) -> String {
    let Some(handle) = handle else {
        return String::new();
    };
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            tracing::debug!("Output reader failed: {}", e);
            String::new()
        }
        Err(_) => String::new(),
    }
}
