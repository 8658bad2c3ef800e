// Plugin detection: header parsing, remote probing and result caching

pub mod detector;
pub mod header;

pub use detector::{rank_candidates, root_candidates, PluginDetector};
pub use header::{parse_plugin_header, PluginHeader};

use crate::cache::{detection_key, detection_org_prefix, CacheStore};
use crate::error::{CacheError, DetectionError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// How long a definitive detection stays cached
pub const DETECTION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A plugin located in a remote repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedPlugin {
    /// Path of the main file relative to the repository root
    pub plugin_file: String,
    pub branch: String,
    pub plugin_name: String,
    pub version: Option<String>,
    pub description: Option<String>,
}

/// Definitive outcome of a detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Detection {
    NotAPlugin,
    Found(DetectedPlugin),
}

impl Detection {
    pub fn is_plugin(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

pub type PluginDetectionResult = Result<Detection, DetectionError>;

/// Typed view over the cache store for detection results
///
/// Only `Detection` values can be written; error variants never reach the
/// store. Entries that no longer deserialize are dropped on read.
#[derive(Clone)]
pub struct DetectionCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl DetectionCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_ttl(store, DETECTION_TTL)
    }

    pub fn with_ttl(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn get(&self, org: &str, repo: &str) -> Option<Detection> {
        let key = detection_key(org, repo);
        let value = self.store.get(&key)?;

        match serde_json::from_value(value) {
            Ok(detection) => Some(detection),
            Err(e) => {
                tracing::warn!(%key, error = %e, "Dropping unrecognized cached detection");
                if let Err(e) = self.store.delete(&key) {
                    tracing::warn!(%key, error = %e, "Failed to delete cache entry");
                }
                None
            }
        }
    }

    pub fn put(&self, org: &str, repo: &str, detection: &Detection) -> Result<(), CacheError> {
        let value = serde_json::to_value(detection)?;
        self.store.set(&detection_key(org, repo), value, self.ttl)
    }

    pub fn invalidate(&self, org: &str, repo: &str) -> Result<(), CacheError> {
        self.store.delete(&detection_key(org, repo))
    }

    /// Drop every cached detection of an organization
    pub fn invalidate_org(&self, org: &str) -> Result<usize, CacheError> {
        self.store.delete_by_prefix(&detection_org_prefix(org))
    }
}

/// Find the main plugin file inside a local plugin directory
///
/// Root-level candidates are tried first, then any other root `.php` file.
/// With `recursive`, nested files are searched in sorted path order.
/// Returns the path relative to `dir` with forward slashes.
pub fn locate_main_file(dir: &Path, repo: &str, recursive: bool) -> Option<(String, PluginHeader)> {
    let read_header = |path: &Path| -> Option<PluginHeader> {
        let bytes = std::fs::read(path).ok()?;
        parse_plugin_header(&String::from_utf8_lossy(&bytes))
    };

    let candidates = root_candidates(repo);
    for name in &candidates {
        let path = dir.join(name);
        if path.is_file() {
            if let Some(header) = read_header(&path) {
                return Some((name.clone(), header));
            }
        }
    }

    let mut root_files: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy())
                .is_some_and(|n| header::has_script_extension(&n) && !candidates.contains(&n.to_string()))
        })
        .collect();
    root_files.sort();

    for path in &root_files {
        if let Some(header) = read_header(path) {
            return relative_slash_path(dir, path).map(|rel| (rel, header));
        }
    }

    if !recursive {
        return None;
    }

    walkdir::WalkDir::new(dir)
        .min_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| header::has_script_extension(&entry.file_name().to_string_lossy()))
        .find_map(|entry| {
            let header = read_header(entry.path())?;
            relative_slash_path(dir, entry.path()).map(|rel| (rel, header))
        })
}

fn relative_slash_path(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}
