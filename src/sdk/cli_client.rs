// src/sdk/cli_client.rs — Vendor client backed by `copilot --server --stdio`
//
// One server process per client. Session events arrive as `session.event`
// notifications and are fanned out to a broadcast channel per session id.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};

use super::rpc::{Notification, RpcConnection, SpawnOptions};
use super::{
    lock, ClientState, CopilotBackend, ModelInfo, SessionEvent, SessionOptions,
    SessionSummary, VendorClient, VendorSession,
};
use crate::infra::config::Config;
use crate::infra::errors::ShimError;
use crate::probe::{Probe, COPILOT_EXECUTABLE};

/// Per-session event buffer. Deltas are small; a slow reducer can lag this far
/// behind before it starts dropping events.
const EVENT_BUFFER: usize = 1024;

type Subscribers = Arc<Mutex<HashMap<String, broadcast::Sender<SessionEvent>>>>;

/// Builds `CliClient`s for a resolved `copilot` executable.
#[derive(Debug, Clone)]
pub struct CliBackend {
    program: PathBuf,
    args: Vec<String>,
    path_env: Option<OsString>,
}

impl CliBackend {
    /// Resolve the executable from config, falling back to the probe's
    /// install locations.
    pub fn from_config(config: &Config, probe: &Probe) -> Result<Self, ShimError> {
        let program = match config.client.cli_path {
            Some(ref path) => PathBuf::from(path),
            None => probe
                .locate(COPILOT_EXECUTABLE)
                .ok_or_else(|| ShimError::ExecutableNotFound {
                    name: COPILOT_EXECUTABLE.into(),
                })?,
        };

        let mut args = config.client.args.clone();
        if !config.client.log_level.is_empty() {
            args.push("--log-level".into());
            args.push(config.client.log_level.clone());
        }

        Ok(Self {
            program,
            args,
            path_env: Some(probe.search_path()),
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl CopilotBackend for CliBackend {
    fn build_client(&self, working_dir: &Path) -> Result<Arc<dyn VendorClient>, ShimError> {
        Ok(Arc::new(CliClient::new(SpawnOptions {
            program: self.program.clone(),
            args: self.args.clone(),
            cwd: working_dir.to_path_buf(),
            path_env: self.path_env.clone(),
        })))
    }
}

/// A running server process and the sessions listening on it.
struct Live {
    rpc: Arc<RpcConnection>,
    subscribers: Subscribers,
}

pub struct CliClient {
    options: SpawnOptions,
    live: Mutex<Option<Live>>,
}

impl CliClient {
    pub fn new(options: SpawnOptions) -> Self {
        Self {
            options,
            live: Mutex::new(None),
        }
    }

    fn connection(&self) -> Result<(Arc<RpcConnection>, Subscribers), ShimError> {
        let guard = lock(&self.live);
        match guard.as_ref() {
            Some(live) if live.rpc.is_alive() => {
                Ok((live.rpc.clone(), live.subscribers.clone()))
            }
            Some(_) => Err(ShimError::ConnectionClosed),
            None => Err(ShimError::ClientStopped),
        }
    }

    fn attach(
        &self,
        rpc: Arc<RpcConnection>,
        subscribers: &Subscribers,
        session_id: String,
    ) -> Arc<dyn VendorSession> {
        let events = lock(subscribers)
            .entry(session_id.clone())
            .or_insert_with(|| broadcast::channel(EVENT_BUFFER).0)
            .clone();
        Arc::new(CliSession {
            session_id,
            rpc,
            events,
        })
    }
}

/// Fan `session.event` notifications out by session id. When the server goes
/// away every session sees a final error so `send_and_wait` callers unblock.
async fn route_events(mut notifications: mpsc::UnboundedReceiver<Notification>, subscribers: Subscribers) {
    while let Some(n) = notifications.recv().await {
        if n.method != "session.event" {
            tracing::debug!("Ignoring notification '{}'", n.method);
            continue;
        }
        let Some(session_id) = n.params["sessionId"].as_str() else {
            continue;
        };
        let event = SessionEvent::from_json(&n.params["event"]);
        tracing::debug!("event {} → {:?}", session_id, event);
        let sender = lock(&subscribers).get(session_id).cloned();
        if let Some(sender) = sender {
            // No receivers is fine: nobody is listening yet.
            let _ = sender.send(event);
        }
    }

    let drained: Vec<_> = lock(&subscribers).drain().collect();
    for (_, sender) in drained {
        let _ = sender.send(SessionEvent::SessionError {
            message: "Copilot server exited".into(),
        });
    }
}

fn session_id_from(result: &Value, operation: &str) -> Result<String, ShimError> {
    result["sessionId"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ShimError::vendor(operation, "response missing 'sessionId'"))
}

#[async_trait]
impl VendorClient for CliClient {
    fn state(&self) -> ClientState {
        match lock(&self.live).as_ref() {
            Some(live) if live.rpc.is_alive() => ClientState::Connected,
            _ => ClientState::Disconnected,
        }
    }

    async fn start(&self) -> Result<(), ShimError> {
        if self.state() == ClientState::Connected {
            return Ok(());
        }

        let (rpc, notifications) = RpcConnection::spawn(&self.options)?;
        let subscribers: Subscribers = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(route_events(notifications, subscribers.clone()));

        tracing::info!(
            "Copilot server started ({} in {})",
            self.options.program.display(),
            self.options.cwd.display()
        );

        let previous = lock(&self.live).replace(Live {
            rpc: Arc::new(rpc),
            subscribers,
        });
        if let Some(previous) = previous {
            previous.rpc.shutdown().await?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ShimError> {
        let live = lock(&self.live).take();
        if let Some(live) = live {
            live.rpc.shutdown().await?;
            tracing::info!("Copilot server stopped");
        }
        Ok(())
    }

    async fn create_session(
        &self,
        options: SessionOptions,
    ) -> Result<Arc<dyn VendorSession>, ShimError> {
        let (rpc, subscribers) = self.connection()?;
        let result = rpc
            .request(
                "session.create",
                json!({"model": options.model, "streaming": options.streaming}),
            )
            .await?;
        let session_id = session_id_from(&result, "session.create")?;
        tracing::info!("Created Copilot session {}", session_id);
        Ok(self.attach(rpc, &subscribers, session_id))
    }

    async fn resume_session(
        &self,
        session_id: &str,
        options: SessionOptions,
    ) -> Result<Arc<dyn VendorSession>, ShimError> {
        let (rpc, subscribers) = self.connection()?;
        let result = rpc
            .request(
                "session.resume",
                json!({"sessionId": session_id, "streaming": options.streaming}),
            )
            .await?;
        let resumed = session_id_from(&result, "session.resume")?;
        tracing::info!("Resumed Copilot session {}", resumed);
        Ok(self.attach(rpc, &subscribers, resumed))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ShimError> {
        let (rpc, _) = self.connection()?;
        let result = rpc.request("models.list", json!({})).await?;
        let models = result.get("models").cloned().unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(models)?)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ShimError> {
        let (rpc, _) = self.connection()?;
        let result = rpc.request("session.list", json!({})).await?;
        let sessions = result.get("sessions").cloned().unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(sessions)?)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), ShimError> {
        let (rpc, subscribers) = self.connection()?;
        rpc.request("session.delete", json!({"sessionId": session_id}))
            .await?;
        lock(&subscribers).remove(session_id);
        Ok(())
    }

    async fn last_session_id(&self) -> Result<Option<String>, ShimError> {
        let (rpc, _) = self.connection()?;
        let result = rpc.request("session.getLastId", json!({})).await?;
        Ok(result["sessionId"].as_str().map(str::to_string))
    }
}

pub struct CliSession {
    session_id: String,
    rpc: Arc<RpcConnection>,
    events: broadcast::Sender<SessionEvent>,
}

#[async_trait]
impl VendorSession for CliSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn send_and_wait(&self, prompt: &str) -> Result<(), ShimError> {
        // Subscribe before sending so the idle event cannot slip past.
        let mut events = self.events.subscribe();
        self.rpc
            .request(
                "session.send",
                json!({"sessionId": self.session_id, "prompt": prompt}),
            )
            .await?;

        loop {
            match events.recv().await {
                Ok(SessionEvent::SessionIdle) => return Ok(()),
                Ok(SessionEvent::SessionError { message }) => {
                    return Err(ShimError::vendor("session.send", message));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("send_and_wait lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(ShimError::ConnectionClosed);
                }
            }
        }
    }
}
