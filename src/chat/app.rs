// src/chat/app.rs — Shared client lifecycle for all chat sessions

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use uuid::Uuid;

use super::session::{ChatSession, UpdateCallback};
use crate::infra::errors::ShimError;
use crate::infra::paths;
use crate::sdk::{
    ClientState, CopilotBackend, ModelInfo, SessionOptions, SessionSummary, VendorClient,
    VendorSession,
};

/// The correlation id of the session currently allowed to mutate UI state.
#[derive(Debug, Clone, Default)]
pub struct ActiveSession(Arc<RwLock<Option<String>>>);

impl ActiveSession {
    pub fn current(&self) -> Option<String> {
        self.0.read().ok().and_then(|g| g.clone())
    }

    pub fn set(&self, correlation_id: &str) {
        if let Ok(mut g) = self.0.write() {
            *g = Some(correlation_id.to_string());
        }
    }

    pub fn clear(&self) {
        if let Ok(mut g) = self.0.write() {
            *g = None;
        }
    }

    pub fn is_active(&self, correlation_id: &str) -> bool {
        self.current().as_deref() == Some(correlation_id)
    }
}

/// Owns the one vendor client. Construction and start happen under a single
/// async lock, so concurrent callers always share the same client.
pub struct App {
    backend: Arc<dyn CopilotBackend>,
    sandbox_dir: PathBuf,
    client: Mutex<Option<Arc<dyn VendorClient>>>,
    active: ActiveSession,
}

impl App {
    pub fn new(backend: Arc<dyn CopilotBackend>, sandbox_dir: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            sandbox_dir: sandbox_dir.into(),
            client: Mutex::new(None),
            active: ActiveSession::default(),
        })
    }

    pub fn sandbox_dir(&self) -> &Path {
        &self.sandbox_dir
    }

    pub fn active(&self) -> &ActiveSession {
        &self.active
    }

    /// Return the running client, building and starting it on first use.
    pub async fn client(&self) -> Result<Arc<dyn VendorClient>, ShimError> {
        let mut slot = self.client.lock().await;
        let client = match slot.as_ref() {
            Some(client) => client.clone(),
            None => {
                paths::ensure_sandbox(&self.sandbox_dir);
                let client = self.backend.build_client(&self.sandbox_dir)?;
                *slot = Some(client.clone());
                client
            }
        };

        if client.state() != ClientState::Connected {
            tracing::info!("Starting Copilot client in {}", self.sandbox_dir.display());
            client.start().await?;
        }
        Ok(client)
    }

    /// Open a new streaming conversation. Once the vendor accepts it, it
    /// becomes the active session and late events from the previous one are
    /// dropped. On failure the previous session stays active.
    pub async fn create_session(
        self: &Arc<Self>,
        model: Option<&str>,
        on_update: UpdateCallback,
    ) -> Result<ChatSession, ShimError> {
        let client = self.client().await?;
        let vendor = client
            .create_session(SessionOptions::streaming(model.map(str::to_string)))
            .await?;
        tracing::info!(
            "Created session {} (model: {})",
            vendor.session_id(),
            model.unwrap_or("default")
        );
        Ok(self.attach(vendor, on_update))
    }

    /// Reopen a saved vendor session under a fresh correlation id.
    pub async fn resume_session(
        self: &Arc<Self>,
        session_id: &str,
        on_update: UpdateCallback,
    ) -> Result<ChatSession, ShimError> {
        let client = self.client().await?;
        let vendor = client
            .resume_session(session_id, SessionOptions::streaming(None))
            .await?;
        tracing::info!("Resumed session {}", vendor.session_id());
        Ok(self.attach(vendor, on_update))
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ShimError> {
        self.client().await?.list_models().await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ShimError> {
        self.client().await?.list_sessions().await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), ShimError> {
        self.client().await?.delete_session(session_id).await
    }

    pub async fn last_session_id(&self) -> Result<Option<String>, ShimError> {
        self.client().await?.last_session_id().await
    }

    /// Stop and forget the client. The next call builds a fresh one.
    pub async fn shutdown(&self) -> Result<(), ShimError> {
        let client = self.client.lock().await.take();
        self.active.clear();
        match client {
            Some(client) => {
                tracing::info!("Stopping Copilot client");
                client.stop().await
            }
            None => Ok(()),
        }
    }

    /// Mint a correlation id for a vendor session that now exists and make it
    /// the active one.
    fn attach(
        self: &Arc<Self>,
        vendor: Arc<dyn VendorSession>,
        on_update: UpdateCallback,
    ) -> ChatSession {
        let correlation_id = Uuid::new_v4().to_string();
        self.active.set(&correlation_id);
        ChatSession::spawn(self.clone(), vendor, correlation_id, on_update)
    }
}
