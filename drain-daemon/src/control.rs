//! Optional Unix control socket: newline-delimited JSON requests that queue
//! `rotate` and `quit` events, plus the blocking client used by `drainctl`.
//!
//! An `ok` response means the event was queued, not that it was applied.

use std::fs;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use drain_core::Event;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as AsyncBufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{io_err, DaemonError};

/// JSON newline-delimited request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub cmd: String,
}

impl ControlRequest {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

pub struct ControlServer {
    socket: PathBuf,
    listener: UnixListener,
}

impl ControlServer {
    /// Bind `socket`, replacing a stale socket file but refusing one that a
    /// live daemon still answers on. Must be called inside a tokio runtime.
    pub fn bind(socket: &Path) -> Result<Self, DaemonError> {
        prepare_socket_for_bind(socket)?;
        let listener = UnixListener::bind(socket).map_err(|e| io_err(socket, e))?;
        set_socket_permissions(socket)?;
        Ok(Self {
            socket: socket.to_path_buf(),
            listener,
        })
    }

    /// Accept clients until `shutdown` is cancelled, then remove the socket.
    pub async fn serve(
        self,
        events: mpsc::Sender<Event>,
        shutdown: CancellationToken,
    ) -> Result<(), DaemonError> {
        tracing::info!(socket = %self.socket.display(), "control socket listening");

        let result = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                accepted = self.listener.accept() => {
                    let stream = match accepted {
                        Ok((stream, _)) => stream,
                        Err(err) => break Err(io_err(&self.socket, err)),
                    };
                    let events = events.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_client(stream, events).await {
                            tracing::warn!(error = %err, "control client error");
                        }
                    });
                }
            }
        };

        if let Err(err) = fs::remove_file(&self.socket) {
            if err.kind() != ErrorKind::NotFound {
                tracing::warn!(socket = %self.socket.display(), error = %err, "failed to remove control socket");
            }
        }
        result
    }
}

async fn handle_client(stream: UnixStream, events: mpsc::Sender<Event>) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = AsyncBufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("control socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<ControlRequest>(&line) {
            Ok(request) => dispatch(&request, &events).await,
            Err(err) => ControlResponse::error(format!("invalid request JSON: {err}")),
        };
        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

async fn dispatch(request: &ControlRequest, events: &mpsc::Sender<Event>) -> ControlResponse {
    let event = match request.cmd.as_str() {
        "rotate" => Event::Rotate,
        "quit" => Event::Quit,
        "ping" => return ControlResponse::ok(json!({ "pong": true })),
        other => return ControlResponse::error(format!("unknown command '{other}'")),
    };

    let kind = event.kind();
    match events.send(event).await {
        Ok(()) => {
            tracing::info!(event = kind, "queued from control socket");
            ControlResponse::ok(json!({ "queued": kind }))
        }
        Err(_) => ControlResponse::error("event queue closed"),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &ControlResponse,
) -> Result<(), DaemonError> {
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    writer
        .write_all(&line)
        .await
        .map_err(|e| io_err("control socket write", e))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "control socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale control socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Send one JSON request to the control socket and return one response.
pub fn send_request(
    socket: &Path,
    request: &ControlRequest,
) -> Result<ControlResponse, DaemonError> {
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning {
            socket: socket.to_path_buf(),
        });
    }

    let mut stream = StdUnixStream::connect(socket).map_err(|err| {
        if matches!(
            err.kind(),
            ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.to_path_buf(),
            }
        } else {
            io_err(socket, err)
        }
    })?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(socket, e))?;
    stream.flush().map_err(|e| io_err(socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    let response: ControlResponse = serde_json::from_str(line.trim_end())?;
    Ok(response)
}

pub fn request_rotate(socket: &Path) -> Result<Value, DaemonError> {
    response_into_data(send_request(socket, &ControlRequest::new("rotate"))?)
}

pub fn request_quit(socket: &Path) -> Result<Value, DaemonError> {
    response_into_data(send_request(socket, &ControlRequest::new("quit"))?)
}

const PING_ATTEMPTS: u32 = 5;
const PING_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Ping the daemon, retrying briefly while the socket is not up yet.
pub fn request_ping(socket: &Path) -> Result<Value, DaemonError> {
    let request = ControlRequest::new("ping");
    let mut attempt = 1;
    loop {
        match send_request(socket, &request) {
            Err(DaemonError::DaemonNotRunning { .. }) if attempt < PING_ATTEMPTS => {
                attempt += 1;
                sleep(PING_RETRY_DELAY);
            }
            result => return response_into_data(result?),
        }
    }
}

fn response_into_data(response: ControlResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}
