// src/probe/runner.rs — Subprocess execution for the availability probe

use std::ffi::OsString;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::infra::errors::ShimError;

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout followed by stderr. `gh` prints its status report on stderr.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Runs a program to completion. A non-zero exit is an `Ok` with
/// `success == false`; only a spawn failure is an `Err`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: PathBuf,
        args: Vec<String>,
        path_env: OsString,
    ) -> Result<CommandOutput, ShimError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(
        &self,
        program: PathBuf,
        args: Vec<String>,
        path_env: OsString,
    ) -> Result<CommandOutput, ShimError> {
        tracing::debug!("exec {} {}", program.display(), args.join(" "));
        let output = tokio::process::Command::new(&program)
            .args(&args)
            .env("PATH", path_env)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| ShimError::Subprocess {
                command: program.display().to_string(),
                message: e.to_string(),
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
