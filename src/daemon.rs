//! Deadair daemon: the always-on studio process.
//!
//! Listens on a Unix socket speaking JSON lines. Most requests are
//! one-shot round trips to the control room; `Watch` turns the
//! connection into a live event feed until the client hangs up.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use crate::broadcast::{
    BreakdownPrediction, BreakdownRecord, ControlRoomConfig, ControlRoomHandle, Event, EventBus, StatusReport,
    metrics_loop,
};
use crate::config::Config;
use crate::dialogue::CannedDialogue;
use crate::error::{Error, Result};
use crate::personas::PersonaRegistry;

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Path to the Unix socket.
    pub socket_path: PathBuf,
    /// Path to the PID file.
    pub pid_path: PathBuf,
    /// Path to the data directory.
    pub data_path: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("deadair");

        Self {
            socket_path: base.join("deadair.sock"),
            pid_path: base.join("deadair.pid"),
            data_path: base,
        }
    }
}

impl DaemonConfig {
    /// Create config from a data directory path.
    pub fn from_path(path: &Path) -> Self {
        Self {
            socket_path: path.join("deadair.sock"),
            pid_path: path.join("deadair.pid"),
            data_path: path.to_path_buf(),
        }
    }
}

/// Request to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonRequest {
    /// Ping to check if daemon is alive.
    Ping,
    /// Get the current studio status.
    Status,
    /// Forecast the next breakdown.
    Predict,
    /// Get recent breakdown records.
    History { limit: usize },
    /// Submit a viewer comment.
    Comment { text: String },
    /// Start a breakdown now.
    ForceBreakdown,
    /// Switch this connection to a live event feed.
    Watch,
    /// Shutdown daemon.
    Shutdown,
}

/// Response from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonResponse {
    /// Pong response.
    Pong,
    /// Studio status.
    Status(StatusReport),
    /// Breakdown forecast.
    Prediction(BreakdownPrediction),
    /// Recent breakdown records, newest last.
    History(Vec<BreakdownRecord>),
    /// Comment received; whether it triggered a breakdown.
    CommentAck { triggered: bool },
    /// Forced breakdown accepted.
    Forced,
    /// Error response.
    Error { message: String },
    /// One event on a watch feed.
    Event(Event),
    /// Shutdown acknowledgment.
    Shutdown,
}

/// The deadair daemon.
pub struct Daemon {
    config: DaemonConfig,
    control_config: ControlRoomConfig,
    metrics_interval: Duration,
    registry: Arc<PersonaRegistry>,
    events: Arc<EventBus>,
    shutdown: broadcast::Sender<()>,
}

impl Daemon {
    /// Create a new daemon from the loaded settings.
    pub fn new(settings: &Config) -> Result<Self> {
        std::fs::create_dir_all(&settings.data_dir)?;

        let mut registry = PersonaRegistry::new();
        if let Some(path) = &settings.personas_file {
            registry.load_from_file(path)?;
            log::info!("loaded extra personas from {:?}", path);
        }

        let (shutdown, _) = broadcast::channel(1);

        Ok(Self {
            config: settings.to_daemon_config(),
            control_config: settings.to_control_config(),
            metrics_interval: Duration::from_secs(settings.timing.metrics_interval_secs),
            registry: Arc::new(registry),
            events: Arc::new(EventBus::new()),
            shutdown,
        })
    }

    /// Run the daemon: put the studio on air, then serve the socket.
    pub async fn run(&self) -> Result<()> {
        // Remove existing socket if present
        if self.config.socket_path.exists() {
            std::fs::remove_file(&self.config.socket_path)?;
        }

        // Write PID file
        std::fs::write(&self.config.pid_path, std::process::id().to_string())?;

        let (handle, control_join) = crate::broadcast::spawn(
            self.control_config.clone(),
            Arc::clone(&self.registry),
            Arc::new(CannedDialogue),
            Arc::clone(&self.events),
            self.shutdown.subscribe(),
        )?;

        tokio::spawn(metrics_loop(handle.clone(), self.metrics_interval, self.shutdown.subscribe()));

        let listener = UnixListener::bind(&self.config.socket_path)?;
        log::info!("Daemon listening on {:?}", self.config.socket_path);

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _)) => {
                            let handle = handle.clone();
                            let events = Arc::clone(&self.events);
                            let shutdown_tx = self.shutdown.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, handle, events, shutdown_tx).await {
                                    log::error!("Connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            log::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    log::info!("Shutdown signal received");
                    break;
                }
            }
        }

        // Let the control room finalize any breakdown in flight.
        let _ = control_join.await;

        self.cleanup()?;
        Ok(())
    }

    /// Clean up daemon resources.
    fn cleanup(&self) -> Result<()> {
        if self.config.socket_path.exists() {
            std::fs::remove_file(&self.config.socket_path)?;
        }
        if self.config.pid_path.exists() {
            std::fs::remove_file(&self.config.pid_path)?;
        }
        Ok(())
    }
}

/// Handle a single client connection.
async fn handle_connection(
    stream: UnixStream,
    handle: ControlRoomHandle,
    events: Arc<EventBus>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let request: DaemonRequest = serde_json::from_str(&line)?;

        if matches!(request, DaemonRequest::Watch) {
            return stream_events(&mut writer, events, shutdown_tx).await;
        }

        let response = process_request(request, &handle, &shutdown_tx).await;

        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        if matches!(response, DaemonResponse::Shutdown) {
            break;
        }

        line.clear();
    }

    Ok(())
}

/// Stream events to a watching client until it hangs up or we shut down.
async fn stream_events(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    events: Arc<EventBus>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<()> {
    let mut sub = events.subscribe();
    let mut shutdown_rx = shutdown_tx.subscribe();

    loop {
        let event = tokio::select! {
            event = sub.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = shutdown_rx.recv() => break,
        };

        let json = serde_json::to_string(&DaemonResponse::Event(event))?;
        // A failed write means the viewer changed the channel; drop them.
        if writer.write_all(json.as_bytes()).await.is_err()
            || writer.write_all(b"\n").await.is_err()
            || writer.flush().await.is_err()
        {
            break;
        }
    }

    Ok(())
}

/// Process a daemon request.
async fn process_request(
    request: DaemonRequest,
    handle: &ControlRoomHandle,
    shutdown_tx: &broadcast::Sender<()>,
) -> DaemonResponse {
    match request {
        DaemonRequest::Ping => DaemonResponse::Pong,

        DaemonRequest::Status => match handle.status().await {
            Ok(status) => DaemonResponse::Status(status),
            Err(e) => DaemonResponse::Error { message: e.to_string() },
        },

        DaemonRequest::Predict => match handle.prediction().await {
            Ok(prediction) => DaemonResponse::Prediction(prediction),
            Err(e) => DaemonResponse::Error { message: e.to_string() },
        },

        DaemonRequest::History { limit } => match handle.history(limit).await {
            Ok(records) => DaemonResponse::History(records),
            Err(e) => DaemonResponse::Error { message: e.to_string() },
        },

        DaemonRequest::Comment { text } => match handle.submit_comment(text).await {
            Ok(triggered) => DaemonResponse::CommentAck { triggered },
            Err(e) => DaemonResponse::Error { message: e.to_string() },
        },

        DaemonRequest::ForceBreakdown => match handle.force_breakdown().await {
            Ok(()) => DaemonResponse::Forced,
            Err(e) => DaemonResponse::Error { message: e.to_string() },
        },

        // Handled upstream; here only if a client sent it mid-stream.
        DaemonRequest::Watch => DaemonResponse::Error {
            message: "watch must be the first request on a connection".to_string(),
        },

        DaemonRequest::Shutdown => {
            let _ = shutdown_tx.send(());
            DaemonResponse::Shutdown
        }
    }
}

/// Check if the daemon is running.
pub fn is_daemon_running(config: &DaemonConfig) -> bool {
    if !config.pid_path.exists() {
        return false;
    }

    // Read PID and check if process exists
    if let Ok(pid_str) = std::fs::read_to_string(&config.pid_path)
        && let Ok(pid) = pid_str.trim().parse::<i32>()
    {
        // Check if process exists (kill with signal 0)
        unsafe {
            return libc::kill(pid, 0) == 0;
        }
    }

    false
}

/// Client for connecting to the daemon.
pub struct DaemonClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl DaemonClient {
    /// Connect to the daemon.
    pub async fn connect(config: &DaemonConfig) -> Result<Self> {
        let stream = UnixStream::connect(&config.socket_path).await.map_err(|e| {
            Error::Daemon(format!("Failed to connect to daemon at {:?}: {}", config.socket_path, e))
        })?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Send a request without waiting for a response.
    pub async fn send(&mut self, request: &DaemonRequest) -> Result<()> {
        let request_json = serde_json::to_string(request)?;
        self.writer.write_all(request_json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read the next response. `None` means the daemon closed the connection.
    pub async fn recv(&mut self) -> Result<Option<DaemonResponse>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let response: DaemonResponse = serde_json::from_str(&line)?;
        Ok(Some(response))
    }

    /// Send a request and receive a response.
    pub async fn request(&mut self, request: DaemonRequest) -> Result<DaemonResponse> {
        self.send(&request).await?;
        self.recv()
            .await?
            .ok_or_else(|| Error::Daemon("daemon closed the connection".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_config_default() {
        let config = DaemonConfig::default();
        assert!(config.socket_path.to_string_lossy().contains("deadair.sock"));
        assert!(config.pid_path.to_string_lossy().contains("deadair.pid"));
    }

    #[test]
    fn test_daemon_config_from_path() {
        let path = Path::new("/tmp/test");
        let config = DaemonConfig::from_path(path);
        assert_eq!(config.socket_path, path.join("deadair.sock"));
        assert_eq!(config.pid_path, path.join("deadair.pid"));
        assert_eq!(config.data_path, path);
    }

    #[test]
    fn test_request_serialization() {
        let request = DaemonRequest::Comment {
            text: "are you real?".to_string(),
        };

        let json = serde_json::to_string(&request).unwrap();
        let parsed: DaemonRequest = serde_json::from_str(&json).unwrap();

        if let DaemonRequest::Comment { text } = parsed {
            assert_eq!(text, "are you real?");
        } else {
            panic!("Wrong request type");
        }
    }

    #[test]
    fn test_response_serialization() {
        let response = DaemonResponse::CommentAck { triggered: true };

        let json = serde_json::to_string(&response).unwrap();
        let parsed: DaemonResponse = serde_json::from_str(&json).unwrap();

        assert!(matches!(parsed, DaemonResponse::CommentAck { triggered: true }));
    }

    #[test]
    fn test_is_daemon_running_no_pid_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = DaemonConfig::from_path(temp.path());
        assert!(!is_daemon_running(&config));
    }

    #[test]
    fn test_is_daemon_running_stale_pid() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = DaemonConfig::from_path(temp.path());
        // PID far above any real process
        std::fs::write(&config.pid_path, "999999999").unwrap();
        assert!(!is_daemon_running(&config));
    }

    #[test]
    fn test_is_daemon_running_own_pid() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = DaemonConfig::from_path(temp.path());
        std::fs::write(&config.pid_path, std::process::id().to_string()).unwrap();
        assert!(is_daemon_running(&config));
    }
}
