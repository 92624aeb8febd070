// src/infra/logger.rs — Structured logging with tracing

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Filter precedence: COPILOT_CHAT_LOG, RUST_LOG, `level`.
/// Output goes to stderr so streamed replies on stdout stay clean.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_env("COPILOT_CHAT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
