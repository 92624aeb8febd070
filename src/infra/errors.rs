// src/infra/errors.rs — Error types for copilot-chat

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShimError {
    // Probe / subprocess errors
    #[error("'{name}' not found in any known install location")]
    ExecutableNotFound { name: String },

    #[error("'{command}' failed: {message}")]
    Subprocess { command: String, message: String },

    // Vendor SDK errors
    #[error("Copilot {operation} failed: {message}")]
    Vendor { operation: String, message: String },

    #[error("Copilot client connection closed")]
    ConnectionClosed,

    #[error("Copilot client is not running. Start a new session to reconnect.")]
    ClientStopped,

    // Infra
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShimError {
    pub fn vendor(operation: impl Into<String>, message: impl Into<String>) -> Self {
        ShimError::Vendor {
            operation: operation.into(),
            message: message.into(),
        }
    }
}
