// Offline content source serving canned responses

use super::{encode_path, ContentEntry, ContentSource, OrganizationSource};
use crate::error::{DetectionError, ListError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Canned<T> {
    Body(T),
    Status(u16),
    Transport(String),
}

/// Content source backed by in-memory fixtures
///
/// Unknown files answer 404 and unknown directories are unavailable.
/// Every request is recorded so callers can assert on probe order.
#[derive(Default)]
pub struct MemorySource {
    files: HashMap<String, Canned<String>>,
    listings: HashMap<String, Canned<Vec<ContentEntry>>>,
    pages: HashMap<String, Canned<String>>,
    requests: Mutex<Vec<String>>,
}

fn file_key(org: &str, repo: &str, branch: &str, path: &str) -> String {
    format!("raw:{}/{}/{}/{}", org, repo, branch, encode_path(path))
}

fn listing_key(org: &str, repo: &str, path: &str) -> String {
    format!("list:{}/{}/{}", org, repo, encode_path(path))
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, org: &str, repo: &str, branch: &str, path: &str, body: &str) -> Self {
        self.files
            .insert(file_key(org, repo, branch, path), Canned::Body(body.to_string()));
        self
    }

    pub fn with_file_status(
        mut self,
        org: &str,
        repo: &str,
        branch: &str,
        path: &str,
        status: u16,
    ) -> Self {
        self.files
            .insert(file_key(org, repo, branch, path), Canned::Status(status));
        self
    }

    pub fn with_file_failure(
        mut self,
        org: &str,
        repo: &str,
        branch: &str,
        path: &str,
        message: &str,
    ) -> Self {
        self.files.insert(
            file_key(org, repo, branch, path),
            Canned::Transport(message.to_string()),
        );
        self
    }

    pub fn with_listing(mut self, org: &str, repo: &str, path: &str, entries: Vec<ContentEntry>) -> Self {
        self.listings
            .insert(listing_key(org, repo, path), Canned::Body(entries));
        self
    }

    pub fn with_listing_status(mut self, org: &str, repo: &str, path: &str, status: u16) -> Self {
        self.listings
            .insert(listing_key(org, repo, path), Canned::Status(status));
        self
    }

    pub fn with_org_page(mut self, org: &str, html: &str) -> Self {
        self.pages
            .insert(org.to_string(), Canned::Body(html.to_string()));
        self
    }

    pub fn with_org_status(mut self, org: &str, status: u16) -> Self {
        self.pages.insert(org.to_string(), Canned::Status(status));
        self
    }

    pub fn with_org_failure(mut self, org: &str, message: &str) -> Self {
        self.pages
            .insert(org.to_string(), Canned::Transport(message.to_string()));
        self
    }

    /// Requests served so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Raw-file paths probed so far, as `branch/path`
    pub fn probed_files(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter_map(|r| r.strip_prefix("raw:"))
            .map(|r| r.splitn(3, '/').nth(2).unwrap_or_default().to_string())
            .collect()
    }

    fn record(&self, request: String) {
        self.requests.lock().push(request);
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    async fn fetch_raw(
        &self,
        org: &str,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> Result<Option<String>, DetectionError> {
        let key = file_key(org, repo, branch, path);
        self.record(key.clone());

        match self.files.get(&key) {
            Some(Canned::Body(body)) => Ok(Some(body.clone())),
            Some(Canned::Status(429)) => Err(DetectionError::RateLimited),
            Some(Canned::Status(_)) | None => Ok(None),
            Some(Canned::Transport(message)) => Err(DetectionError::Network(message.clone())),
        }
    }

    async fn list_directory(
        &self,
        org: &str,
        repo: &str,
        path: &str,
    ) -> Result<Option<Vec<ContentEntry>>, DetectionError> {
        let key = listing_key(org, repo, path);
        self.record(key.clone());

        match self.listings.get(&key) {
            Some(Canned::Body(entries)) => Ok(Some(entries.clone())),
            Some(Canned::Status(429)) => Err(DetectionError::RateLimited),
            Some(Canned::Status(_)) | None => Ok(None),
            Some(Canned::Transport(message)) => Err(DetectionError::Network(message.clone())),
        }
    }
}

#[async_trait]
impl OrganizationSource for MemorySource {
    async fn fetch_organization_page(&self, org: &str) -> Result<String, ListError> {
        if org.trim().is_empty() {
            return Err(ListError::NoOrganization);
        }
        self.record(format!("org:{}", org));

        match self.pages.get(org) {
            Some(Canned::Body(html)) => Ok(html.clone()),
            Some(Canned::Status(status)) => Err(ListError::Status(*status)),
            Some(Canned::Transport(message)) => Err(ListError::Network(message.clone())),
            None => Err(ListError::Status(404)),
        }
    }

    fn archive_url(&self, org: &str, repo: &str, branch: &str) -> String {
        format!("memory://{}/{}/{}.zip", org, repo, branch)
    }
}
