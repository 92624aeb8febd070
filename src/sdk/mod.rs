// src/sdk/mod.rs — Vendor SDK layer
//
// The chat shim is written against these traits, never against a concrete
// transport. `cli_client` implements them on top of the Copilot CLI running in
// server mode; tests implement them in memory.

pub mod cli_client;
pub mod rpc;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::infra::errors::ShimError;

/// Lock a std mutex, taking the data even if a holder panicked. The maps
/// guarded this way stay consistent between single operations.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Builds (but does not start) vendor clients.
pub trait CopilotBackend: Send + Sync {
    fn build_client(&self, working_dir: &Path) -> Result<Arc<dyn VendorClient>, ShimError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connected,
}

/// A long-lived client process, shared by every chat session.
#[async_trait]
pub trait VendorClient: Send + Sync {
    fn state(&self) -> ClientState;

    async fn start(&self) -> Result<(), ShimError>;
    async fn stop(&self) -> Result<(), ShimError>;

    async fn create_session(&self, options: SessionOptions)
        -> Result<Arc<dyn VendorSession>, ShimError>;
    async fn resume_session(
        &self,
        session_id: &str,
        options: SessionOptions,
    ) -> Result<Arc<dyn VendorSession>, ShimError>;

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ShimError>;
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ShimError>;
    async fn delete_session(&self, session_id: &str) -> Result<(), ShimError>;
    async fn last_session_id(&self) -> Result<Option<String>, ShimError>;
}

/// One conversation on the vendor side.
#[async_trait]
pub trait VendorSession: Send + Sync {
    /// The vendor's persisted identifier (what `resume_session` takes).
    fn session_id(&self) -> &str;

    /// Events emitted after this call. Each subscriber sees every event.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Submit a prompt and wait until the session goes idle.
    async fn send_and_wait(&self, prompt: &str) -> Result<(), ShimError>;
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub model: Option<String>,
    pub streaming: bool,
}

impl SessionOptions {
    pub fn streaming(model: Option<String>) -> Self {
        Self {
            model,
            streaming: true,
        }
    }
}

/// Events pushed by a vendor session. Kinds the shim does not act on map to `Other`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    AssistantMessageDelta { delta_content: String },
    AssistantMessage { content: String },
    SessionIdle,
    SessionError { message: String },
    Other(String),
}

impl SessionEvent {
    pub fn delta(text: impl Into<String>) -> Self {
        SessionEvent::AssistantMessageDelta {
            delta_content: text.into(),
        }
    }

    /// Decode the `{type, data}` envelope used on the wire.
    pub fn from_json(event: &serde_json::Value) -> Self {
        let kind = event["type"].as_str().unwrap_or_default();
        let data = &event["data"];
        match kind {
            "assistant.message_delta" => SessionEvent::AssistantMessageDelta {
                delta_content: data["deltaContent"].as_str().unwrap_or("").to_string(),
            },
            "assistant.message" => SessionEvent::AssistantMessage {
                content: data["content"].as_str().unwrap_or("").to_string(),
            },
            "session.idle" => SessionEvent::SessionIdle,
            "session.error" => SessionEvent::SessionError {
                message: data["message"]
                    .as_str()
                    .unwrap_or("unknown session error")
                    .to_string(),
            },
            other => SessionEvent::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub capabilities: ModelCapabilities,
    #[serde(default)]
    pub billing: Option<ModelBilling>,
    #[serde(default)]
    pub policy: Option<ModelPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCapabilities {
    #[serde(default)]
    pub supports: ModelSupports,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSupports {
    #[serde(default)]
    pub vision: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelBilling {
    #[serde(default)]
    pub multiplier: f64,
    /// Explicit premium flag; wins over the multiplier when present.
    #[serde(default)]
    pub is_premium: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPolicy {
    pub state: String,
}

impl ModelInfo {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn supports_vision(&self) -> bool {
        self.capabilities.supports.vision
    }

    pub fn multiplier(&self) -> f64 {
        self.billing.as_ref().map(|b| b.multiplier).unwrap_or(0.0)
    }

    /// Models are usable unless the policy explicitly disables them.
    pub fn is_enabled(&self) -> bool {
        self.policy
            .as_ref()
            .map(|p| p.state != "disabled")
            .unwrap_or(true)
    }
}

/// A saved vendor session, as listed by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: Option<String>,
}
