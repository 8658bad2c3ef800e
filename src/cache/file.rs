// File-backed cache store: one JSON document per key

use super::{sanitize_key, CacheStore};
use crate::error::CacheError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    /// Unix timestamp in milliseconds
    expires_at: i64,
    value: Value,
}

/// Cache store that survives process restarts
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Create a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_key(key)))
    }

    fn remove_file(path: &Path) -> Result<(), CacheError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl CacheStore for FileCache {
    fn get(&self, key: &str) -> Option<Value> {
        let path = self.entry_path(key);
        let raw = std::fs::read(&path).ok()?;

        let entry: StoredEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding unreadable cache entry");
                let _ = Self::remove_file(&path);
                return None;
            }
        };

        if entry.expires_at <= Utc::now().timestamp_millis() {
            let _ = Self::remove_file(&path);
            return None;
        }

        Some(entry.value)
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let entry = StoredEntry {
            expires_at: Utc::now().timestamp_millis().saturating_add(ttl_ms),
            value,
        };

        // Write to a sibling temp file first so readers never see a torn entry
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        serde_json::to_writer(&mut tmp, &entry)?;
        tmp.persist(self.entry_path(key))
            .map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        Self::remove_file(&self.entry_path(key))
    }

    fn delete_by_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let prefix = sanitize_key(prefix);
        let mut removed = 0;

        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".json") && name.starts_with(&prefix) {
                Self::remove_file(&entry.path())?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}
