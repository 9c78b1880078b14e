//! Fire-and-forget broadcast of simulation state changes.
//!
//! In-process listeners subscribe to a `tokio::sync::broadcast` channel.
//! Satellite processes connect to a Unix domain socket and receive every
//! message as one JSON line. There are no delivery guarantees: a slow
//! listener skips what it missed, a broken one is dropped.

use crate::domain::model::SimulationResponse;
use crate::domain::ports::Satellite;
use crate::utils::error::{Result, SimError};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/simultons.sock";
const CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<SimulationResponse>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CAPACITY);
        Self { sender }
    }

    /// Publishes `msg` to whoever is listening right now.
    pub fn publish(&self, msg: SimulationResponse) -> usize {
        match self.sender.send(msg) {
            Ok(listeners) => listeners,
            // 沒有訂閱者不算錯誤
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SimulationResponse> {
        self.sender.subscribe()
    }

    pub fn listeners(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Binds `path` and forwards every broadcast to connected satellites.
    pub fn serve(&self, path: impl AsRef<Path>) -> Result<PubSocket> {
        let path = path.as_ref().to_path_buf();
        // 只移除上次殘留的 socket 檔, 其他檔案不動
        match std::fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_socket() => std::fs::remove_file(&path)?,
            Ok(_) => {
                return Err(SimError::InvalidConfigValueError {
                    field: "pubsub.socket_path".to_string(),
                    value: path.display().to_string(),
                    reason: "Path exists and is not a socket".to_string(),
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let listener = UnixListener::bind(&path)?;
        tracing::info!("📡 Broadcasting simulation state on {}", path.display());

        let sender = self.sender.clone();
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        tokio::spawn(forward(stream, sender.subscribe()));
                    }
                    Err(e) => {
                        tracing::warn!("Broadcast socket accept failed: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(PubSocket { path, task })
    }
}

async fn forward(stream: UnixStream, mut rx: broadcast::Receiver<SimulationResponse>) {
    tracing::debug!("Satellite connected");
    let (mut reader, mut writer) = stream.into_split();
    let mut scratch = [0u8; 64];
    loop {
        let msg = tokio::select! {
            recv = rx.recv() => match recv {
                Ok(msg) => msg,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Satellite lagging, skipped {} messages", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            // satellite 不會送資料, 讀到 EOF 代表已斷線
            read = reader.read(&mut scratch) => match read {
                Ok(0) | Err(_) => {
                    tracing::debug!("Satellite disconnected");
                    break;
                }
                Ok(_) => continue,
            },
        };
        let mut line = match serde_json::to_string(&msg) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Cannot encode broadcast: {}", e);
                continue;
            }
        };
        line.push('\n');
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            tracing::debug!("Satellite dropped: {}", e);
            break;
        }
    }
}

/// The listening side of the broadcast socket. Dropping it stops accepting
/// satellites and removes the socket file.
#[derive(Debug)]
pub struct PubSocket {
    path: PathBuf,
    task: JoinHandle<()>,
}

impl PubSocket {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PubSocket {
    fn drop(&mut self) {
        self.task.abort();
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Satellite end of the broadcast socket.
pub struct Subscriber {
    lines: Lines<BufReader<UnixStream>>,
}

impl Subscriber {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).await.map_err(|e| SimError::Unreachable {
            url: format!("unix://{} ({})", path.display(), e),
            timeout_secs: 0,
        })?;
        Ok(Self {
            lines: BufReader::new(stream).lines(),
        })
    }

    /// Next broadcast message, `None` once the publisher is gone.
    pub async fn next(&mut self) -> Result<Option<SimulationResponse>> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(msg) => return Ok(Some(msg)),
                Err(e) => tracing::warn!("Ignoring malformed broadcast '{}': {}", line, e),
            }
        }
    }

    /// Feeds messages to `satellite` until it asks to stop or the stream ends.
    pub async fn run<S: Satellite>(&mut self, satellite: &mut S) -> Result<()> {
        while let Some(msg) = self.next().await? {
            if satellite.dispatch(&msg) {
                break;
            }
        }
        Ok(())
    }
}
