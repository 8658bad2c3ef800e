// Remote content source: raw files, directory listings and organization pages

mod github;
mod memory;

pub use github::GitHubClient;
pub use memory::MemorySource;

use crate::error::{DetectionError, ListError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Entry type reported by a directory listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    #[serde(other)]
    Other,
}

/// One item of a repository directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

impl ContentEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Dir,
        }
    }
}

/// Read access to repository contents
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch a file's raw contents from a branch
    ///
    /// Returns `Ok(None)` for any non-200 answer other than 429, which maps
    /// to `DetectionError::RateLimited`. Transport failures map to
    /// `DetectionError::Network`.
    async fn fetch_raw(
        &self,
        org: &str,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> Result<Option<String>, DetectionError>;

    /// List a directory of the default branch; empty `path` is the root
    ///
    /// `Ok(None)` means the listing is unavailable (non-200, non-429).
    async fn list_directory(
        &self,
        org: &str,
        repo: &str,
        path: &str,
    ) -> Result<Option<Vec<ContentEntry>>, DetectionError>;
}

/// Access to an organization's public repository listing
#[async_trait]
pub trait OrganizationSource: Send + Sync {
    /// Fetch the raw markup of the organization's repository page
    async fn fetch_organization_page(&self, org: &str) -> Result<String, ListError>;

    /// Download URL of a branch archive
    fn archive_url(&self, org: &str, repo: &str, branch: &str) -> String;
}

/// Percent-encode each segment of a slash-separated path
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
