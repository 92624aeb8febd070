// src/cli/ask.rs — One-shot prompt

use std::sync::Arc;

use super::models::{create_session_remembering, resolve_model};
use super::render::StreamPrinter;
use crate::chat::App;
use crate::infra::config::Config;
use crate::infra::storage::LocalStorage;

/// Send one prompt on a fresh session, stream the reply to stdout, then stop.
pub async fn run_ask(
    app: Arc<App>,
    config: &Config,
    storage: &LocalStorage,
    model: Option<&str>,
    prompt: &str,
) -> anyhow::Result<()> {
    let explicit = model.is_some();
    let model = resolve_model(&app, config, storage, model).await?;
    let printer = StreamPrinter::stdout();
    let session = create_session_remembering(
        &app,
        storage,
        model.as_deref(),
        explicit,
        printer.callback(),
    )
    .await?;

    let sent = session.send_message(prompt).await;
    session.stop().await?;
    sent?;
    Ok(())
}
