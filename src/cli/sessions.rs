// src/cli/sessions.rs — Saved session management

use super::SessionsAction;
use crate::chat::App;
use crate::sdk::SessionSummary;

/// Summaries longer than this are cut for the one-line listing.
const SUMMARY_WIDTH: usize = 60;

pub async fn run_sessions(app: &App, action: Option<SessionsAction>) -> anyhow::Result<()> {
    match action.unwrap_or(SessionsAction::List) {
        SessionsAction::List => {
            let mut sessions = app.list_sessions().await?;
            if sessions.is_empty() {
                println!("No saved sessions.");
                return Ok(());
            }
            sessions.sort_by(|a, b| b.modified_time.cmp(&a.modified_time));
            for s in &sessions {
                println!("{}", format_row(s));
            }
        }
        SessionsAction::Delete { id } => {
            app.delete_session(&id).await?;
            eprintln!("  Deleted session {}", id);
        }
    }
    Ok(())
}

fn format_row(s: &SessionSummary) -> String {
    let when = s
        .modified_time
        .or(s.start_time)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".into());
    let summary = s.summary.as_deref().map(truncate).unwrap_or_default();
    format!("{:<38} {:<16} {}", s.session_id, when, summary)
        .trim_end()
        .to_string()
}

fn truncate(text: &str) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > SUMMARY_WIDTH {
        let cut: String = line.chars().take(SUMMARY_WIDTH - 3).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}
