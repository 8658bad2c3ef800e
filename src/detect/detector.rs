// Remote plugin detector
//
// Probes a repository for a main plugin file in three widening passes:
// well-known root files, ranked root listing, then plausible subdirectories.
// Any error aborts the whole detection; a 429 in particular means every
// further request would fail as well.

use super::header::{has_script_extension, parse_plugin_header};
use super::{DetectedPlugin, Detection, DetectionCache, PluginDetectionResult};
use crate::error::DetectionError;
use crate::source::{ContentEntry, ContentSource, EntryKind};
use std::collections::HashSet;
use std::sync::Arc;

/// Branches probed, in order
pub const BRANCHES: [&str; 2] = ["main", "master"];

/// Ranked root files probed after the fixed candidates
const MAX_LISTED_CANDIDATES: usize = 5;

/// Files probed per subdirectory and branch after the fixed names
const MAX_FILES_PER_DIR: usize = 5;

/// Directory names too generic to hold the main file
const SKIPPED_DIRS: [&str; 7] = ["wp", "wordpress", "plugin", "plugins", "src", "code", "build"];

/// Fixed root-level candidates for a repository, in probe order
pub fn root_candidates(repo: &str) -> Vec<String> {
    vec![
        format!("{}.php", repo),
        "index.php".to_string(),
        format!("{}-plugin.php", repo),
        "plugin.php".to_string(),
        "main.php".to_string(),
    ]
}

/// Order file names by how likely they are to be the main plugin file
///
/// Containing the repository name scores 2, containing "plugin" scores 2
/// and being `index.php` scores 1. Ties keep their listing order.
pub fn rank_candidates<'a>(repo: &str, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let repo = repo.to_lowercase();
    let mut scored: Vec<(u8, String)> = names
        .into_iter()
        .map(|name| {
            let lower = name.to_lowercase();
            let mut score = 0;
            if !repo.is_empty() && lower.contains(&repo) {
                score += 2;
            }
            if lower.contains("plugin") {
                score += 2;
            }
            if lower == "index.php" {
                score += 1;
            }
            (score, name.to_string())
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, name)| name).collect()
}

/// Subdirectories worth searching, given the root listing
fn candidate_dirs(repo: &str, listing: &[ContentEntry]) -> Vec<String> {
    let mut dirs: Vec<String> = listing
        .iter()
        .filter(|entry| entry.kind == EntryKind::Dir)
        .filter(|entry| {
            entry.name.eq_ignore_ascii_case(repo)
                || !SKIPPED_DIRS
                    .iter()
                    .any(|skip| entry.name.eq_ignore_ascii_case(skip))
        })
        .map(|entry| entry.name.clone())
        .collect();

    if !dirs.iter().any(|d| d.eq_ignore_ascii_case(repo)) {
        dirs.push(repo.to_string());
    }
    dirs
}

/// Detects WordPress plugins in remote repositories
pub struct PluginDetector {
    source: Arc<dyn ContentSource>,
    cache: DetectionCache,
}

/// Probes already issued during one detection
#[derive(Default)]
struct ProbeLog {
    seen: HashSet<(String, String)>,
}

impl ProbeLog {
    fn first_time(&mut self, branch: &str, path: &str) -> bool {
        self.seen.insert((branch.to_string(), path.to_string()))
    }
}

impl PluginDetector {
    pub fn new(source: Arc<dyn ContentSource>, cache: DetectionCache) -> Self {
        Self { source, cache }
    }

    pub fn cache(&self) -> &DetectionCache {
        &self.cache
    }

    /// Detect a plugin, serving and storing definitive results in the cache
    pub async fn detect(&self, org: &str, repo: &str) -> PluginDetectionResult {
        if let Some(cached) = self.cache.get(org, repo) {
            tracing::debug!(org, repo, "Detection served from cache");
            return Ok(cached);
        }

        match self.probe(org, repo).await {
            Ok(detection) => {
                if let Err(e) = self.cache.put(org, repo, &detection) {
                    tracing::warn!(org, repo, error = %e, "Failed to cache detection");
                }
                Ok(detection)
            }
            Err(e) => {
                tracing::warn!(org, repo, error = %e, "Detection failed, result not cached");
                Err(e)
            }
        }
    }

    /// Run the probe cascade without touching the cache
    pub async fn probe(&self, org: &str, repo: &str) -> PluginDetectionResult {
        let mut log = ProbeLog::default();

        let candidates = root_candidates(repo);
        if let Some(found) = self.probe_files(org, repo, &candidates, &mut log).await? {
            return Ok(Detection::Found(found));
        }

        let listing = self
            .source
            .list_directory(org, repo, "")
            .await?
            .unwrap_or_default();

        let listed = listing
            .iter()
            .filter(|entry| entry.kind == EntryKind::File && has_script_extension(&entry.name))
            .map(|entry| entry.name.as_str())
            .filter(|name| !candidates.iter().any(|c| c == name));
        let ranked: Vec<String> = rank_candidates(repo, listed)
            .into_iter()
            .take(MAX_LISTED_CANDIDATES)
            .collect();

        if let Some(found) = self.probe_files(org, repo, &ranked, &mut log).await? {
            return Ok(Detection::Found(found));
        }

        for dir in candidate_dirs(repo, &listing) {
            if let Some(found) = self.probe_directory(org, repo, &dir, &mut log).await? {
                return Ok(Detection::Found(found));
            }
        }

        tracing::debug!(org, repo, "No plugin header found");
        Ok(Detection::NotAPlugin)
    }

    /// Probe each path on both branches, file-major
    async fn probe_files(
        &self,
        org: &str,
        repo: &str,
        paths: &[String],
        log: &mut ProbeLog,
    ) -> Result<Option<DetectedPlugin>, DetectionError> {
        for path in paths {
            for branch in BRANCHES {
                if !log.first_time(branch, path) {
                    continue;
                }
                if let Some(found) = self.probe_file(org, repo, branch, path).await? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    async fn probe_directory(
        &self,
        org: &str,
        repo: &str,
        dir: &str,
        log: &mut ProbeLog,
    ) -> Result<Option<DetectedPlugin>, DetectionError> {
        let fixed = [
            "index.php".to_string(),
            format!("{}.php", repo),
            "plugin.php".to_string(),
        ];

        for branch in BRANCHES {
            for name in &fixed {
                let path = format!("{}/{}", dir, name);
                if !log.first_time(branch, &path) {
                    continue;
                }
                if let Some(found) = self.probe_file(org, repo, branch, &path).await? {
                    return Ok(Some(found));
                }
            }
        }

        let Some(entries) = self.source.list_directory(org, repo, dir).await? else {
            return Ok(None);
        };
        let files: Vec<String> = entries
            .iter()
            .filter(|entry| entry.kind == EntryKind::File && has_script_extension(&entry.name))
            .map(|entry| format!("{}/{}", dir, entry.name))
            .take(MAX_FILES_PER_DIR)
            .collect();

        for branch in BRANCHES {
            for path in &files {
                if !log.first_time(branch, path) {
                    continue;
                }
                if let Some(found) = self.probe_file(org, repo, branch, path).await? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    async fn probe_file(
        &self,
        org: &str,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> Result<Option<DetectedPlugin>, DetectionError> {
        tracing::debug!(org, repo, branch, path, "Probing candidate file");

        let Some(content) = self.source.fetch_raw(org, repo, branch, path).await? else {
            return Ok(None);
        };

        Ok(parse_plugin_header(&content).map(|header| DetectedPlugin {
            plugin_file: path.to_string(),
            branch: branch.to_string(),
            plugin_name: header.name,
            version: header.version,
            description: header.description,
        }))
    }
}
