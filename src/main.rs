// src/main.rs — copilot-chat entry point

use clap::Parser;

use copilot_chat::cli::{self, ChatOptions, Cli, Commands};
use copilot_chat::infra::config::Config;
use copilot_chat::infra::logger;
use copilot_chat::infra::storage::LocalStorage;
use copilot_chat::probe::Probe;

#[tokio::main]
async fn main() {
    // Initialize logging (respects RUST_LOG / COPILOT_CHAT_LOG)
    logger::init_logging("warn");

    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config (falls back to defaults if no config.toml)
    let config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };
    let probe = Probe::new(&config);

    // The probe is all `status` needs; everything else talks to the CLI.
    if let Some(Commands::Status) = cli.command {
        return cli::status::show_status(&probe, &config).await;
    }

    cli::status::ensure_ready(&probe, &config).await?;
    let app = cli::build_app(&config, &probe)?;
    let storage = LocalStorage::open_default();
    let opts = ChatOptions::from(&cli);

    match cli.command {
        None | Some(Commands::Chat) => cli::chat::run_chat(app, &config, &storage, opts).await,
        Some(Commands::Ask { prompt }) => {
            cli::ask::run_ask(app, &config, &storage, opts.model.as_deref(), &prompt.join(" "))
                .await
        }
        Some(Commands::Models) => {
            let result = cli::models::run_models(&app, &config, &storage).await;
            app.shutdown().await?;
            result
        }
        Some(Commands::Sessions { action }) => {
            let result = cli::sessions::run_sessions(&app, action).await;
            app.shutdown().await?;
            result
        }
        Some(Commands::Status) => Ok(()),
    }
}
