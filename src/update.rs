// Release check: compare the running build with the published manifest

use crate::cache::CacheStore;
use crate::config::UpdateConfig;
use crate::error::UpdateError;
use crate::source::ContentSource;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Cache key of the last fetched remote version
pub const REMOTE_VERSION_KEY: &str = "self_update_remote_version";

/// How long a fetched remote version is reused
pub const REMOTE_VERSION_TTL: Duration = Duration::from_secs(15 * 60);

/// Where the running build stands relative to the published one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Older,
    Equal,
    Newer,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateStatus {
    /// A newer version is published
    pub available: bool,
    pub installed: String,
    pub remote: Option<String>,
    pub status: VersionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpdateStatus {
    pub fn unknown(installed: &str, error: &UpdateError) -> Self {
        Self {
            available: false,
            installed: installed.to_string(),
            remote: None,
            status: VersionStatus::Unknown,
            error: Some(error.to_string()),
        }
    }
}

/// Looks up the published version and compares it with the running one
pub struct UpdateChecker {
    source: Arc<dyn ContentSource>,
    cache: Arc<dyn CacheStore>,
    config: UpdateConfig,
    installed: String,
}

impl UpdateChecker {
    pub fn new(source: Arc<dyn ContentSource>, cache: Arc<dyn CacheStore>, config: UpdateConfig) -> Self {
        Self {
            source,
            cache,
            config,
            installed: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Compare against `version` instead of the running build
    pub fn with_installed_version(mut self, version: impl Into<String>) -> Self {
        self.installed = version.into();
        self
    }

    pub fn installed_version(&self) -> &str {
        &self.installed
    }

    /// Published version, served from the cache unless `force`
    pub async fn remote_version(&self, force: bool) -> Result<String, UpdateError> {
        if !force {
            if let Some(Value::String(version)) = self.cache.get(REMOTE_VERSION_KEY) {
                return Ok(version);
            }
        }

        let (owner, name) = self.config.repository_parts().ok_or(UpdateError::NotConfigured)?;
        let raw = self
            .source
            .fetch_raw(owner, name, &self.config.branch, &self.config.manifest_path)
            .await?
            .ok_or(UpdateError::ManifestMissing)?;
        let version = parse_manifest_version(&raw).ok_or(UpdateError::Parse)?;

        if let Err(e) = self
            .cache
            .set(REMOTE_VERSION_KEY, Value::String(version.clone()), REMOTE_VERSION_TTL)
        {
            tracing::warn!(error = %e, "Failed to cache remote version");
        }
        Ok(version)
    }

    /// Never fails: lookup errors come back as an `Unknown` status
    pub async fn check(&self, force: bool) -> UpdateStatus {
        let remote = match self.remote_version(force).await {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!(error = %e, "Update check failed");
                return UpdateStatus::unknown(&self.installed, &e);
            }
        };

        let status = match compare_versions(&self.installed, &remote) {
            Ordering::Less => VersionStatus::Older,
            Ordering::Equal => VersionStatus::Equal,
            Ordering::Greater => VersionStatus::Newer,
        };
        tracing::debug!(installed = %self.installed, %remote, ?status, "Update check");

        UpdateStatus {
            available: status == VersionStatus::Older,
            installed: self.installed.clone(),
            remote: Some(remote),
            status,
            error: None,
        }
    }
}

/// `package.version` of a Cargo manifest
///
/// Workspace-inherited versions have no literal value and yield `None`.
pub fn parse_manifest_version(raw: &str) -> Option<String> {
    let manifest: toml::Table = toml::from_str(raw).ok()?;
    let version = manifest.get("package")?.get("version")?.as_str()?.trim();
    (!version.is_empty()).then(|| version.to_string())
}

/// Order two dotted versions
///
/// Missing components count as zero, a leading `v` and `+build` metadata
/// are ignored, and a `-pre` release sorts before its release.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a_core, a_pre) = split_version(a);
    let (b_core, b_pre) = split_version(b);

    for i in 0..a_core.len().max(b_core.len()) {
        let ord = a_core.get(i).unwrap_or(&0).cmp(b_core.get(i).unwrap_or(&0));
        if ord != Ordering::Equal {
            return ord;
        }
    }

    match (a_pre, b_pre) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => a.cmp(b),
    }
}

fn split_version(version: &str) -> (Vec<u64>, Option<&str>) {
    let version = version.trim().trim_start_matches(&['v', 'V'][..]);
    let version = version.split('+').next().unwrap_or(version);
    let (core, pre) = match version.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (version, None),
    };
    let core = core.split('.').map(|part| part.parse().unwrap_or(0)).collect();
    (core, pre)
}
