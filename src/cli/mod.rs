// src/cli/mod.rs — CLI definition (clap derive)

pub mod ask;
pub mod chat;
pub mod models;
pub mod render;
pub mod sessions;
pub mod status;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::chat::App;
use crate::infra::config::Config;
use crate::probe::Probe;
use crate::sdk::cli_client::CliBackend;

#[derive(Parser)]
#[command(
    name = "copilot-chat",
    about = "Chat with GitHub Copilot from the terminal",
    version
)]
pub struct Cli {
    /// Model id to use ("?" to pick interactively)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Resume a saved session by id
    #[arg(long, global = true, conflicts_with = "continue_last")]
    pub resume: Option<String>,

    /// Resume the most recent session
    #[arg(short = 'c', long = "continue", global = true)]
    pub continue_last: bool,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive chat session (default)
    Chat,
    /// Send a single prompt and print the streamed reply
    Ask {
        /// Prompt text
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// List available models, split into free and premium
    Models,
    /// List or delete saved sessions
    Sessions {
        #[command(subcommand)]
        action: Option<SessionsAction>,
    },
    /// Check that the Copilot CLI is installed and logged in
    Status,
}

#[derive(Subcommand, Clone)]
pub enum SessionsAction {
    /// List saved sessions, most recent first
    List,
    /// Delete a saved session
    Delete {
        /// Session id
        id: String,
    },
}

/// How the REPL should open its first session.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub resume: Option<String>,
    pub continue_last: bool,
}

impl From<&Cli> for ChatOptions {
    fn from(cli: &Cli) -> Self {
        Self {
            model: cli.model.clone(),
            resume: cli.resume.clone(),
            continue_last: cli.continue_last,
        }
    }
}

/// Wire the shim to the real Copilot CLI.
pub fn build_app(config: &Config, probe: &Probe) -> anyhow::Result<Arc<App>> {
    let backend = CliBackend::from_config(config, probe)?;
    tracing::debug!("Using Copilot CLI at {}", backend.program().display());
    Ok(App::new(Arc::new(backend), config.sandbox_dir()))
}
