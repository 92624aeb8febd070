// src/infra/storage.rs — Simple key-value local storage (JSON file)
//
// Mirrors a launcher's "local storage": string keys, string values, whole file
// rewritten on every change. Only the last selected model lives here today.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::infra::errors::ShimError;
use crate::infra::paths;

/// Key holding the last model the user picked.
pub const SELECTED_MODEL_KEY: &str = "selectedModel";

#[derive(Debug, Clone)]
pub struct LocalStorage {
    path: PathBuf,
}

impl LocalStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Storage at the default location (`<config_dir>/state.json`).
    pub fn open_default() -> Self {
        Self::new(paths::state_file_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_item(&self, key: &str) -> Option<String> {
        self.read_all().remove(key)
    }

    pub fn set_item(&self, key: &str, value: &str) -> Result<(), ShimError> {
        let mut items = self.read_all();
        items.insert(key.to_string(), value.to_string());
        self.write_all(&items)
    }

    pub fn remove_item(&self, key: &str) -> Result<(), ShimError> {
        let mut items = self.read_all();
        if items.remove(key).is_some() {
            self.write_all(&items)?;
        }
        Ok(())
    }

    /// A missing or corrupt file reads as empty.
    fn read_all(&self) -> BTreeMap<String, String> {
        let Ok(data) = std::fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };
        match serde_json::from_str(&data) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("Ignoring corrupt state file {}: {}", self.path.display(), e);
                BTreeMap::new()
            }
        }
    }

    fn write_all(&self, items: &BTreeMap<String, String>) -> Result<(), ShimError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(items)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}
