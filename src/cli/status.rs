// src/cli/status.rs — Availability status display

use crate::infra::config::Config;
use crate::infra::paths;
use crate::probe::{self, AvailabilityStatus, Probe, COPILOT_EXECUTABLE};

/// `copilot-chat status`
pub async fn show_status(probe: &Probe, config: &Config) -> anyhow::Result<()> {
    let status = probe.get_status().await;

    println!("copilot-chat v{}", env!("CARGO_PKG_VERSION"));
    println!();

    match config.client.cli_path {
        Some(ref path) => println!("  CLI:        {} (configured)", path),
        None => match probe.locate(COPILOT_EXECUTABLE) {
            Some(path) => println!("  CLI:        {}", path.display()),
            None => println!("  CLI:        (not found)"),
        },
    }
    if status.installed {
        println!(
            "  Version:    {}",
            status.version.as_deref().unwrap_or("unknown")
        );
        println!(
            "  Login:      {}",
            if status.logged_in { "logged in" } else { "not logged in" }
        );
    }

    let config_path = paths::config_file_path();
    if config_path.exists() {
        println!("  Config:     {} (loaded)", config_path.display());
    } else {
        println!("  Config:     (using defaults)");
    }
    println!("  Sandbox:    {}", config.sandbox_dir().display());

    let hints = hints(&status);
    if !hints.is_empty() {
        println!();
        for line in hints {
            println!("  {line}");
        }
    }
    Ok(())
}

/// Refuse to start a chat when the CLI is missing or logged out.
/// Skipped when an explicit `cli_path` is configured.
pub async fn ensure_ready(probe: &Probe, config: &Config) -> anyhow::Result<()> {
    if config.client.cli_path.is_some() {
        return Ok(());
    }
    let status = probe.get_status().await;
    if status.is_ready() {
        return Ok(());
    }
    anyhow::bail!("{}", hints(&status).join("\n"))
}

fn hints(status: &AvailabilityStatus) -> Vec<String> {
    let reason = |fallback: &str| status.message.clone().unwrap_or_else(|| fallback.into());
    if !status.installed {
        vec![
            reason("Copilot CLI is not installed."),
            format!("Install: {}", probe::install_url()),
        ]
    } else if !status.logged_in {
        vec![
            reason("Not logged in to GitHub."),
            format!("Log in:  {}", probe::login_command()),
        ]
    } else {
        Vec::new()
    }
}
