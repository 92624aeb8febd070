// src/cli/chat.rs — Interactive REPL

use std::sync::Arc;

use super::models::{create_session_remembering, resolve_model, select_model_interactive};
use super::render::StreamPrinter;
use super::ChatOptions;
use crate::chat::{App, ChatSession};
use crate::infra::config::Config;
use crate::infra::storage::LocalStorage;

/// Mutable REPL state that slash commands can modify.
struct ChatState {
    model: Option<String>,
    session: ChatSession,
    turns: u32,
}

/// Run the interactive chat REPL.
pub async fn run_chat(
    app: Arc<App>,
    config: &Config,
    storage: &LocalStorage,
    opts: ChatOptions,
) -> anyhow::Result<()> {
    let printer = StreamPrinter::stdout();
    let model = resolve_model(&app, config, storage, opts.model.as_deref()).await?;
    let session = open_session(&app, storage, &opts, model.as_deref(), &printer).await?;

    eprintln!(
        "copilot-chat v{} | {} | session {}\n",
        env!("CARGO_PKG_VERSION"),
        model.as_deref().unwrap_or("default model"),
        session.session_id(),
    );

    let mut state = ChatState {
        model,
        session,
        turns: 0,
    };

    while let Some(input) = read_input() {
        let trimmed = input.trim();

        if trimmed == "quit" || trimmed == "exit" || trimmed == "/quit" {
            break;
        }

        if trimmed.starts_with('/') {
            if let Err(e) =
                handle_slash_command(trimmed, &mut state, &app, storage, &printer).await
            {
                eprintln!("[error] {}", e);
            }
            continue;
        }

        if trimmed.is_empty() {
            continue;
        }

        match state.session.send_message(trimmed).await {
            Ok(()) => state.turns += 1,
            Err(e) => eprintln!("[error] {}", e),
        }
    }

    eprintln!("\nSession {}: {} turn(s)", state.session.session_id(), state.turns);
    state.session.stop().await?;
    Ok(())
}

async fn open_session(
    app: &Arc<App>,
    storage: &LocalStorage,
    opts: &ChatOptions,
    model: Option<&str>,
    printer: &Arc<StreamPrinter<std::io::Stdout>>,
) -> anyhow::Result<ChatSession> {
    let resume_id = match (&opts.resume, opts.continue_last) {
        (Some(id), _) => Some(id.clone()),
        (None, true) => {
            let last = app.last_session_id().await?;
            if last.is_none() {
                eprintln!("  No previous session; starting a new one.");
            }
            last
        }
        (None, false) => None,
    };

    let session = match resume_id {
        Some(id) => app.resume_session(&id, printer.callback()).await?,
        None => {
            let explicit = opts.model.is_some();
            create_session_remembering(app, storage, model, explicit, printer.callback()).await?
        }
    };
    Ok(session)
}

fn read_input() -> Option<String> {
    use std::io::{self, BufRead, Write};

    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    let mut line = String::new();
    match stdin.lock().read_line(&mut line) {
        Ok(0) => None, // EOF
        Ok(_) => Some(line),
        Err(_) => None,
    }
}

async fn handle_slash_command(
    input: &str,
    state: &mut ChatState,
    app: &Arc<App>,
    storage: &LocalStorage,
    printer: &Arc<StreamPrinter<std::io::Stdout>>,
) -> anyhow::Result<()> {
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0];
    let arg = parts.get(1).map(|s| s.trim()).unwrap_or("");

    match cmd {
        "/model" => {
            // The model is fixed per session, so switching starts a new one.
            let model = if arg.is_empty() {
                let models = app.list_models().await?;
                select_model_interactive(&models, state.model.as_deref())?
            } else {
                arg.to_string()
            };
            state.session =
                create_session_remembering(app, storage, Some(&model), true, printer.callback())
                    .await?;
            state.model = Some(model);
            state.turns = 0;
            eprintln!(
                "  Model switched to {} (session {})",
                state.model.as_deref().unwrap_or_default(),
                state.session.session_id()
            );
        }

        "/new" => {
            state.session = app
                .create_session(state.model.as_deref(), printer.callback())
                .await?;
            state.turns = 0;
            eprintln!("  New session {}", state.session.session_id());
        }

        "/session" => {
            let messages = state.session.messages().await?;
            eprintln!("  Session: {}", state.session.session_id());
            eprintln!(
                "  Model:   {}",
                state.model.as_deref().unwrap_or("default model")
            );
            eprintln!("  Messages: {} ({} turn(s))", messages.len(), state.turns);
        }

        "/help" => {
            eprintln!("Slash commands:");
            eprintln!("  /model [id]        Switch model (picker when no id); starts a new session");
            eprintln!("  /new               Start a new session with the current model");
            eprintln!("  /session           Show the current session");
            eprintln!("  /help              Show this help");
            eprintln!("  /quit, quit, exit  End session");
        }

        _ => {
            eprintln!("Unknown command: {}. Type /help for commands.", cmd);
        }
    }
    Ok(())
}
