// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub chat: ChatConfig,
}

/// How the Copilot CLI is launched in server mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Explicit path to the `copilot` executable. When unset it is located
    /// through the probe's candidate directories.
    pub cli_path: Option<String>,
    #[serde(default = "default_server_args")]
    pub args: Vec<String>,
    /// Overrides the sandbox directory the CLI runs in.
    pub working_dir: Option<String>,
    #[serde(default = "default_cli_log_level")]
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cli_path: None,
            args: default_server_args(),
            working_dir: None,
            log_level: default_cli_log_level(),
        }
    }
}

fn default_server_args() -> Vec<String> {
    vec!["--server".into(), "--stdio".into()]
}

fn default_cli_log_level() -> String {
    "error".into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Directories searched after the built-in install locations.
    #[serde(default)]
    pub extra_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Model used when no selection has been persisted yet.
    pub default_model: Option<String>,
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Directory the vendor client works in.
    pub fn sandbox_dir(&self) -> PathBuf {
        match self.client.working_dir {
            Some(ref dir) => PathBuf::from(dir),
            None => paths::sandbox_dir(),
        }
    }
}
