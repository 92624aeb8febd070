// src/sdk/rpc.rs — JSON-RPC 2.0 over a child process's stdio
//
// Messages are framed LSP-style: `Content-Length: N\r\n\r\n` followed by N
// bytes of JSON. One writer task owns stdin, one reader task owns stdout and
// dispatches responses to pending requests and notifications to a channel.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use super::lock;
use crate::infra::errors::ShimError;

/// JSON-RPC "method not found".
const METHOD_NOT_FOUND: i64 = -32601;

/// Largest frame body accepted from the server.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// A server → client notification.
#[derive(Debug, Clone)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

/// How to launch the server process.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Replaces PATH for the child when set.
    pub path_env: Option<std::ffi::OsString>,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, ShimError>>>>>;

pub struct RpcConnection {
    write_tx: mpsc::Sender<Vec<u8>>,
    pending: PendingMap,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    child: tokio::sync::Mutex<Option<Child>>,
}

impl RpcConnection {
    /// Spawn the server and wire up the reader/writer tasks.
    /// Notifications are delivered on the returned receiver until the child exits.
    pub fn spawn(
        options: &SpawnOptions,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Notification>), ShimError> {
        let mut cmd = Command::new(&options.program);
        cmd.args(&options.args)
            .current_dir(&options.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(ref path) = options.path_env {
            cmd.env("PATH", path);
        }

        let mut child = cmd.spawn().map_err(|e| ShimError::Subprocess {
            command: options.program.display().to_string(),
            message: format!("failed to start: {e}"),
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ShimError::vendor("start", "failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ShimError::vendor("start", "failed to capture stdout"))?;

        let alive = Arc::new(AtomicBool::new(true));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        let (write_tx, mut write_rx) = mpsc::channel::<Vec<u8>>(256);
        let alive_writer = Arc::clone(&alive);
        tokio::spawn(async move {
            while let Some(frame) = write_rx.recv().await {
                if let Err(e) = stdin.write_all(&frame).await {
                    tracing::warn!("Copilot stdin write error: {}", e);
                    alive_writer.store(false, Ordering::SeqCst);
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    tracing::warn!("Copilot stdin flush error: {}", e);
                    alive_writer.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        let pending_reader = Arc::clone(&pending);
        let alive_reader = Arc::clone(&alive);
        let reply_tx = write_tx.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(message)) => {
                        dispatch(message, &pending_reader, &notify_tx, &reply_tx).await;
                    }
                    Ok(None) => {
                        tracing::debug!("Copilot server closed stdout");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Copilot stdout read error: {}", e);
                        break;
                    }
                }
            }
            alive_reader.store(false, Ordering::SeqCst);
            // Dropping the senders fails every waiter with ConnectionClosed.
            lock(&pending_reader).clear();
        });

        let connection = Self {
            write_tx,
            pending,
            next_id: AtomicU64::new(1),
            alive,
            child: tokio::sync::Mutex::new(Some(child)),
        };
        Ok((connection, notify_rx))
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send a request and wait for its response. No timeout is applied.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ShimError> {
        if !self.is_alive() {
            return Err(ShimError::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        tracing::debug!("rpc → {} (id={})", method, id);
        if self.write_tx.send(encode_frame(&message)).await.is_err() {
            lock(&self.pending).remove(&id);
            return Err(ShimError::ConnectionClosed);
        }

        match rx.await {
            Ok(result) => result.map_err(|e| match e {
                ShimError::Vendor { message, .. } => ShimError::vendor(method, message),
                other => other,
            }),
            Err(_) => Err(ShimError::ConnectionClosed),
        }
    }

    /// Kill the server process. Pending requests fail with ConnectionClosed.
    pub async fn shutdown(&self) -> Result<(), ShimError> {
        self.alive.store(false, Ordering::SeqCst);
        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill Copilot server: {}", e);
            }
        }
        lock(&self.pending).clear();
        Ok(())
    }
}

async fn dispatch(
    message: Value,
    pending: &PendingMap,
    notify_tx: &mpsc::UnboundedSender<Notification>,
    reply_tx: &mpsc::Sender<Vec<u8>>,
) {
    let method = message["method"].as_str().map(str::to_string);
    let id = message.get("id").cloned().filter(|v| !v.is_null());

    match (method, id) {
        // Response to one of our requests
        (None, Some(id)) => {
            let Some(id) = id.as_u64() else {
                tracing::debug!("Ignoring response with non-numeric id: {}", id);
                return;
            };
            let tx = lock(pending).remove(&id);
            let Some(tx) = tx else {
                tracing::debug!("Ignoring response for unknown id {}", id);
                return;
            };
            let result = if let Some(error) = message.get("error") {
                let text = error["message"].as_str().unwrap_or("unknown error");
                Err(ShimError::vendor("request", text))
            } else {
                Ok(message.get("result").cloned().unwrap_or(Value::Null))
            };
            let _ = tx.send(result);
        }
        // Notification
        (Some(method), None) => {
            let params = message.get("params").cloned().unwrap_or(Value::Null);
            let _ = notify_tx.send(Notification { method, params });
        }
        // Server → client request: nothing here is served, so refuse it.
        (Some(method), Some(id)) => {
            tracing::debug!("Refusing server request '{}'", method);
            let reply = json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {
                    "code": METHOD_NOT_FOUND,
                    "message": format!("'{method}' is not supported by this client"),
                },
            });
            let _ = reply_tx.send(encode_frame(&reply)).await;
        }
        (None, None) => tracing::debug!("Ignoring malformed message: {}", message),
    }
}

/// Encode one message with its `Content-Length` header.
pub fn encode_frame(message: &Value) -> Vec<u8> {
    let body = message.to_string();
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(body.as_bytes());
    frame
}

/// Read one framed message. Returns `Ok(None)` on a clean EOF between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Value>, ShimError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut line = String::new();
    let mut saw_header = false;

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            if saw_header {
                return Err(ShimError::ConnectionClosed);
            }
            return Ok(None);
        }
        let header = line.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            if saw_header {
                break;
            }
            // Stray blank line between frames
            continue;
        }
        saw_header = true;
        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                let len = value.trim().parse::<usize>().map_err(|_| {
                    ShimError::vendor("read", format!("bad Content-Length header: {header}"))
                })?;
                content_length = Some(len);
            }
        }
    }

    let len = content_length
        .ok_or_else(|| ShimError::vendor("read", "frame without Content-Length"))?;
    if len > MAX_FRAME_LEN {
        return Err(ShimError::vendor(
            "read",
            format!("frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"),
        ));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}
