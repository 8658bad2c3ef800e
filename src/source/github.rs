// HTTP client for the hosting site: raw files, contents API and org pages

use super::{encode_path, ContentEntry, ContentSource, OrganizationSource};
use crate::config::SourceConfig;
use crate::error::{DetectionError, ListError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Client for a GitHub-compatible host
///
/// This client provides methods to:
/// - Fetch raw file contents by branch
/// - List repository directories through the contents API
/// - Fetch an organization's repository page
pub struct GitHubClient {
    /// HTTP client
    client: Client,

    /// Source configuration
    config: SourceConfig,
}

impl GitHubClient {
    /// Create a client with default configuration
    pub fn new() -> Self {
        Self::with_config(SourceConfig::default())
    }

    /// Create a client with a specific configuration
    pub fn with_config(config: SourceConfig) -> Self {
        let timeout = Duration::from_secs(config.probe_timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, config }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn raw_url(&self, org: &str, repo: &str, branch: &str, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.config.raw_base_url.trim_end_matches('/'),
            urlencoding::encode(org),
            urlencoding::encode(repo),
            urlencoding::encode(branch),
            encode_path(path)
        )
    }

    fn contents_url(&self, org: &str, repo: &str, path: &str) -> String {
        let mut url = format!(
            "{}/repos/{}/{}/contents",
            self.config.api_base_url.trim_end_matches('/'),
            urlencoding::encode(org),
            urlencoding::encode(repo)
        );
        let path = encode_path(path);
        if !path.is_empty() {
            url.push('/');
            url.push_str(&path);
        }
        url
    }
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new()
    }
}

/// The contents API reports an exhausted quota as 403 with a zero budget
fn is_rate_limited(response: &reqwest::Response) -> bool {
    if response.status() == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    response.status() == StatusCode::FORBIDDEN
        && response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            == Some("0")
}

#[async_trait]
impl ContentSource for GitHubClient {
    async fn fetch_raw(
        &self,
        org: &str,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> Result<Option<String>, DetectionError> {
        let url = self.raw_url(org, repo, branch, path);
        tracing::debug!(%url, "Probing raw file");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DetectionError::Network(format!("HTTP request failed: {}", e)))?;

        if is_rate_limited(&response) {
            return Err(DetectionError::RateLimited);
        }
        if response.status() != StatusCode::OK {
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|e| DetectionError::Network(format!("Failed to read body: {}", e)))?;
        Ok(Some(body))
    }

    async fn list_directory(
        &self,
        org: &str,
        repo: &str,
        path: &str,
    ) -> Result<Option<Vec<ContentEntry>>, DetectionError> {
        let url = self.contents_url(org, repo, path);
        tracing::debug!(%url, "Listing directory");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| DetectionError::Network(format!("HTTP request failed: {}", e)))?;

        if is_rate_limited(&response) {
            return Err(DetectionError::RateLimited);
        }
        if response.status() != StatusCode::OK {
            return Ok(None);
        }

        // A file path answers with an object instead of an array
        let entries = response.json::<Vec<ContentEntry>>().await.ok();
        Ok(entries)
    }
}

#[async_trait]
impl OrganizationSource for GitHubClient {
    async fn fetch_organization_page(&self, org: &str) -> Result<String, ListError> {
        if org.trim().is_empty() {
            return Err(ListError::NoOrganization);
        }

        let url = format!(
            "{}/{}?tab=repositories",
            self.config.web_base_url.trim_end_matches('/'),
            urlencoding::encode(org.trim())
        );

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(self.config.listing_timeout_secs))
            .send()
            .await
            .map_err(|e| ListError::Network(format!("HTTP request failed: {}", e)))?;

        if response.status() != StatusCode::OK {
            return Err(ListError::Status(response.status().as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| ListError::Network(format!("Failed to read body: {}", e)))
    }

    fn archive_url(&self, org: &str, repo: &str, branch: &str) -> String {
        format!(
            "{}/{}/{}/archive/refs/heads/{}.zip",
            self.config.web_base_url.trim_end_matches('/'),
            urlencoding::encode(org),
            urlencoding::encode(repo),
            urlencoding::encode(branch)
        )
    }
}
