//! JSON-file backed [`KvStore`] so the selection survives between runs.
//!
//! The file holds one flat string map, e.g.
//! `{"queuedesk.location_id":"l1","queuedesk.token":"..."}`. Every call
//! re-reads the file; writes replace it whole.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ticketing::KvStore;

use crate::CliError;

/// Key under which `login` keeps the bearer token.
pub const TOKEN_KEY: &str = "queuedesk.token";

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, CliError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), CliError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, rendered)?;
        Ok(())
    }

    fn modify(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) {
        let result = self.load().and_then(|mut entries| {
            f(&mut entries);
            self.save(&entries)
        });
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "state file not updated");
        }
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.load() {
            Ok(mut entries) => entries.remove(key),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "state file unreadable");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        self.modify(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
        });
    }

    fn remove(&self, key: &str) {
        self.modify(|entries| {
            entries.remove(key);
        });
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
