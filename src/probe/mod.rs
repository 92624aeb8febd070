// src/probe/mod.rs — Availability probe: is the Copilot CLI installed, is the user logged in?
//
// Launchers and GUI shells often start with a minimal PATH, so executables are
// looked up in a fixed list of install locations instead of through PATH, and
// subprocesses get a PATH extended with the same directories.

pub mod runner;

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use crate::infra::config::Config;
use crate::infra::paths;
use runner::{CommandRunner, TokioCommandRunner};

pub const COPILOT_EXECUTABLE: &str = "copilot";
pub const GH_EXECUTABLE: &str = "gh";

const INSTALL_URL: &str = "https://github.com/github/copilot-cli";
const LOGIN_COMMAND: &str = "gh auth login";

/// Package-manager prefixes, searched in order before `~/.local/bin`.
const SYSTEM_BIN_DIRS: [&str; 3] = ["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"];

/// Substrings of `gh auth status` output that mean "logged in". The last one
/// is the check mark as it appears when UTF-8 output is decoded as Latin-1.
const LOGGED_IN_MARKERS: [&str; 3] = ["Logged in to", "✓", "\u{e2}\u{153}\u{201c}"];

pub fn install_url() -> &'static str {
    INSTALL_URL
}

pub fn login_command() -> &'static str {
    LOGIN_COMMAND
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallStatus {
    pub installed: bool,
    pub version: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoginStatus {
    pub logged_in: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvailabilityStatus {
    pub installed: bool,
    pub logged_in: bool,
    pub version: Option<String>,
    pub message: Option<String>,
}

impl AvailabilityStatus {
    pub fn is_ready(&self) -> bool {
        self.installed && self.logged_in
    }
}

pub struct Probe {
    candidates: Vec<PathBuf>,
    home: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl Probe {
    /// Built-in install locations plus `probe.extra_paths` from config.
    pub fn new(config: &Config) -> Self {
        let home = paths::dirs_home();
        let mut candidates: Vec<PathBuf> = SYSTEM_BIN_DIRS.iter().map(PathBuf::from).collect();
        candidates.push(home.join(".local/bin"));
        candidates.extend(config.probe.extra_paths.iter().map(PathBuf::from));
        Self::with_candidates(candidates, home)
    }

    pub fn with_candidates(candidates: Vec<PathBuf>, home: impl Into<PathBuf>) -> Self {
        Self {
            candidates,
            home: home.into(),
            runner: Arc::new(TokioCommandRunner),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// First `<dir>/<name>` that exists, in candidate order.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        self.candidates
            .iter()
            .map(|dir| dir.join(name))
            .find(|path| path.exists())
    }

    /// The candidate directories followed by the inherited PATH.
    pub fn search_path(&self) -> OsString {
        let inherited = std::env::var_os("PATH").unwrap_or_default();
        let mut dirs = self.candidates.clone();
        dirs.extend(std::env::split_paths(&inherited));
        std::env::join_paths(dirs).unwrap_or(inherited)
    }

    fn gh_hosts_file(&self) -> PathBuf {
        self.home.join(".config/gh/hosts.yml")
    }

    pub async fn check_installed(&self) -> InstallStatus {
        let Some(path) = self.locate(COPILOT_EXECUTABLE) else {
            return InstallStatus {
                installed: false,
                version: None,
                message: Some(format!(
                    "Copilot CLI not found in {}. Install it from {}",
                    describe_dirs(&self.candidates),
                    INSTALL_URL
                )),
            };
        };

        match self
            .runner
            .run(path.clone(), vec!["--version".into()], self.search_path())
            .await
        {
            Ok(output) if output.success => {
                let version = output.stdout.trim();
                let version = if version.is_empty() {
                    output.stderr.trim()
                } else {
                    version
                };
                InstallStatus {
                    installed: true,
                    version: Some(version.to_string()),
                    message: None,
                }
            }
            Ok(output) => InstallStatus {
                installed: false,
                version: None,
                message: Some(format!(
                    "{} --version exited with {}: {}",
                    path.display(),
                    exit_label(output.code),
                    output.stderr.trim()
                )),
            },
            Err(e) => InstallStatus {
                installed: false,
                version: None,
                message: Some(e.to_string()),
            },
        }
    }

    /// Lenient by design of the upstream tool: a zero exit is "logged in" even
    /// when the output carries none of the known markers.
    pub async fn check_logged_in(&self) -> LoginStatus {
        let Some(gh) = self.locate(GH_EXECUTABLE) else {
            let hosts = self.gh_hosts_file();
            let logged_in = hosts.exists();
            return LoginStatus {
                logged_in,
                message: Some(if logged_in {
                    format!("gh not found; assuming logged in from {}", hosts.display())
                } else {
                    format!("gh not found and no {}. Run `{}`", hosts.display(), LOGIN_COMMAND)
                }),
            };
        };

        match self
            .runner
            .run(
                gh,
                vec!["auth".into(), "status".into()],
                self.search_path(),
            )
            .await
        {
            Ok(output) if output.success => {
                let text = output.combined();
                if LOGGED_IN_MARKERS.iter().any(|m| text.contains(m)) {
                    LoginStatus {
                        logged_in: true,
                        message: None,
                    }
                } else {
                    tracing::debug!("gh auth status exited 0 without a known marker: {}", text.trim());
                    LoginStatus {
                        logged_in: true,
                        message: Some("gh auth status succeeded with unrecognized output".into()),
                    }
                }
            }
            Ok(output) => LoginStatus {
                logged_in: false,
                message: Some(format!(
                    "Not logged in (gh auth status exited with {}). Run `{}`",
                    exit_label(output.code),
                    LOGIN_COMMAND
                )),
            },
            Err(e) => LoginStatus {
                logged_in: false,
                message: Some(e.to_string()),
            },
        }
    }

    /// Install check first; the login check only runs when the CLI is present.
    pub async fn get_status(&self) -> AvailabilityStatus {
        let install = self.check_installed().await;
        if !install.installed {
            return AvailabilityStatus {
                installed: false,
                logged_in: false,
                version: None,
                message: install.message,
            };
        }

        let login = self.check_logged_in().await;
        AvailabilityStatus {
            installed: true,
            logged_in: login.logged_in,
            version: install.version,
            message: login.message,
        }
    }
}

fn describe_dirs(dirs: &[PathBuf]) -> String {
    if dirs.is_empty() {
        return "(no search paths)".into();
    }
    dirs.iter()
        .map(|d| d.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "a signal".into(),
    }
}
