// src/cli/models.rs — Model listing, picker and selection persistence

use std::sync::Arc;

use crate::chat::models::{self, tier_label};
use crate::chat::{App, ChatSession, UpdateCallback};
use crate::infra::errors::ShimError;
use crate::infra::config::Config;
use crate::infra::storage::{LocalStorage, SELECTED_MODEL_KEY};
use crate::sdk::ModelInfo;

/// Asked for on the command line to open the picker instead of naming a model.
const PICK: &str = "?";

/// `copilot-chat models`
pub async fn run_models(app: &App, config: &Config, storage: &LocalStorage) -> anyhow::Result<()> {
    let models = app.list_models().await?;
    if models.is_empty() {
        println!("No models available.");
        return Ok(());
    }

    let current = models::default_model(&models, preferred_model(config, storage).as_deref())
        .map(|m| m.id.clone());
    let tiers = models::partition_models(&models);

    for (title, list) in [("Free", &tiers.free), ("Premium", &tiers.premium)] {
        if list.is_empty() {
            continue;
        }
        println!("{title}:");
        for m in list.iter() {
            let marker = if current.as_deref() == Some(m.id.as_str()) {
                "*"
            } else {
                " "
            };
            println!("  {marker} {}", describe(m));
        }
    }
    Ok(())
}

/// The persisted selection, else the configured default.
pub fn preferred_model(config: &Config, storage: &LocalStorage) -> Option<String> {
    storage
        .get_item(SELECTED_MODEL_KEY)
        .or_else(|| config.chat.default_model.clone())
}

/// Remember the user's pick for next time. Failing to save is not fatal.
pub fn remember_model(storage: &LocalStorage, model: &str) {
    if let Err(e) = storage.set_item(SELECTED_MODEL_KEY, model) {
        tracing::warn!("Could not save model selection: {}", e);
    }
}

/// Open a session on `model`. The choice is remembered only when `remember`
/// is set and the vendor accepted the model.
pub async fn create_session_remembering(
    app: &Arc<App>,
    storage: &LocalStorage,
    model: Option<&str>,
    remember: bool,
    on_update: UpdateCallback,
) -> Result<ChatSession, ShimError> {
    let session = app.create_session(model, on_update).await?;
    if let Some(model) = model.filter(|_| remember) {
        remember_model(storage, model);
    }
    Ok(session)
}

/// Decide which model a new session uses.
///
/// An explicit id wins; `?` opens the picker. Otherwise the persisted choice
/// is validated against the live catalogue. `None` lets the CLI use its own
/// default, which also happens when the catalogue is unavailable and nothing
/// was ever chosen. Nothing is remembered here; that waits until a session
/// on the model exists.
pub async fn resolve_model(
    app: &App,
    config: &Config,
    storage: &LocalStorage,
    requested: Option<&str>,
) -> anyhow::Result<Option<String>> {
    let preferred = preferred_model(config, storage);

    match requested {
        Some(PICK) => {
            let models = app.list_models().await?;
            let id = select_model_interactive(&models, preferred.as_deref())?;
            Ok(Some(id))
        }
        Some(id) => Ok(Some(id.to_string())),
        None => match app.list_models().await {
            Ok(models) => Ok(models::default_model(&models, preferred.as_deref())
                .map(|m| m.id.clone())
                .or(preferred)),
            Err(e) => {
                tracing::warn!("Could not list models: {}", e);
                Ok(preferred)
            }
        },
    }
}

/// Interactive model selection via `inquire::Select`, free models first.
pub fn select_model_interactive(
    models: &[ModelInfo],
    current: Option<&str>,
) -> anyhow::Result<String> {
    if models.is_empty() {
        anyhow::bail!("No models available from Copilot.");
    }

    let tiers = models::partition_models(models);
    let entries: Vec<&ModelInfo> = tiers
        .free
        .iter()
        .chain(tiers.premium.iter())
        .copied()
        .filter(|m| m.is_enabled())
        .collect();
    if entries.is_empty() {
        anyhow::bail!("Every model is disabled by policy.");
    }

    let display_list: Vec<String> = entries.iter().map(|m| describe(m)).collect();
    let start = current
        .and_then(|id| entries.iter().position(|m| m.id == id))
        .unwrap_or(0);

    let choice = inquire::Select::new("Select a model:", display_list.clone())
        .with_help_message("Use arrow keys to browse, type to filter")
        .with_page_size(15)
        .with_starting_cursor(start)
        .prompt()
        .map_err(|_| anyhow::anyhow!("Model selection cancelled"))?;

    let idx = display_list
        .iter()
        .position(|d| d == &choice)
        .unwrap_or(0);
    let id = entries[idx].id.clone();
    eprintln!("  Using: {}", id);
    Ok(id)
}

fn describe(m: &ModelInfo) -> String {
    let vision = if m.supports_vision() { " [vision]" } else { "" };
    format!(
        "{:<28} {:<32} {}{}",
        m.id,
        m.display_name(),
        tier_label(m),
        vision
    )
}
