// src/infra/paths.rs — Path management
//
// All paths respect the COPILOT_CHAT_HOME environment variable for isolation.
// When COPILOT_CHAT_HOME is set, config, local state and the vendor sandbox
// live under that directory. When unset, everything lives under ~/.copilot-chat/.

use std::path::{Path, PathBuf};

/// Returns the COPILOT_CHAT_HOME override, if set.
fn chat_home() -> Option<PathBuf> {
    std::env::var_os("COPILOT_CHAT_HOME").map(PathBuf::from)
}

/// Configuration directory: $COPILOT_CHAT_HOME/ or ~/.copilot-chat/
pub fn config_dir() -> PathBuf {
    if let Some(home) = chat_home() {
        return home;
    }
    dirs_home().join(".copilot-chat")
}

/// Home directory
pub fn dirs_home() -> PathBuf {
    directories::BaseDirs::new()
        .expect("Could not determine home directory")
        .home_dir()
        .to_path_buf()
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Local key-value state (last selected model, ...)
pub fn state_file_path() -> PathBuf {
    config_dir().join("state.json")
}

/// Working directory handed to the vendor client. The CLI keeps its own
/// session history underneath it.
pub fn sandbox_dir() -> PathBuf {
    config_dir().join("sandbox")
}

/// Create the sandbox directory (with parents). Failures are logged, never fatal:
/// the vendor client reports a clearer error if the directory is truly unusable.
pub fn ensure_sandbox(dir: &Path) {
    if dir.is_dir() {
        return;
    }
    match std::fs::create_dir_all(dir) {
        Ok(()) => tracing::debug!("Created sandbox directory {}", dir.display()),
        Err(e) => tracing::warn!("Could not create sandbox {}: {}", dir.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_sandbox_creates_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a/b/sandbox");
        ensure_sandbox(&dir);
        assert!(dir.is_dir());
        // second call is a no-op
        ensure_sandbox(&dir);
        assert!(dir.is_dir());
    }

    #[test]
    fn test_ensure_sandbox_ignores_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();
        // Parent is a regular file; creation fails but must not panic.
        ensure_sandbox(&file.join("sandbox"));
        assert!(!file.join("sandbox").exists());
    }
}
