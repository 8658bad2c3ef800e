// Admin service: the server-side handlers behind the gateway and CLI

use crate::cache::{CacheStore, FileCache};
use crate::config::Config;
use crate::detect::{Detection, DetectionCache, PluginDetector};
use crate::error::{PressdeckError, UpdateError};
use crate::host::{FsPluginRegistry, PackageInstaller, PluginRegistry, ZipPackageInstaller};
use crate::install::{ActivationOutcome, InstallOrchestrator, InstallOutcome};
use crate::repos::{RepositoryLister, RepositoryPage};
use crate::resolver::InstalledStateResolver;
use crate::row::{RowBackend, RowStatus};
use crate::source::{ContentSource, GitHubClient, OrganizationSource};
use crate::update::{UpdateChecker, UpdateStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Collaborators and settings an `AdminService` is assembled from
pub struct ServiceParts {
    pub organization: String,
    pub content: Arc<dyn ContentSource>,
    pub organizations: Arc<dyn OrganizationSource>,
    pub cache: Arc<dyn CacheStore>,
    pub registry: Arc<dyn PluginRegistry>,
    pub installer: Arc<dyn PackageInstaller>,
    pub web_base_url: String,
    pub repo_limit: usize,
    pub cache_duration: Duration,
    pub per_page: usize,
}

/// One entry of a batch install report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub repo_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<InstallOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub success: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<BatchItem>,
    pub summary: BatchSummary,
}

/// What a cache clear removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheClearReport {
    pub repositories: bool,
    pub detections: usize,
}

/// Server-side handlers for one organization
pub struct AdminService {
    organization: String,
    per_page: usize,
    lister: RepositoryLister,
    detector: PluginDetector,
    resolver: InstalledStateResolver,
    orchestrator: InstallOrchestrator,
    registry: Arc<dyn PluginRegistry>,
    updates: Option<UpdateChecker>,
}

impl AdminService {
    pub fn new(parts: ServiceParts) -> Self {
        let lister = RepositoryLister::new(
            parts.organizations.clone(),
            parts.cache.clone(),
            parts.web_base_url,
            parts.repo_limit,
            parts.cache_duration,
        );
        let detector = PluginDetector::new(parts.content, DetectionCache::new(parts.cache));
        let resolver = InstalledStateResolver::new(parts.registry.clone());
        let orchestrator =
            InstallOrchestrator::new(parts.organizations, parts.installer, parts.registry.clone());

        Self {
            organization: parts.organization.trim().to_string(),
            per_page: parts.per_page.max(1),
            lister,
            detector,
            resolver,
            orchestrator,
            registry: parts.registry,
            updates: None,
        }
    }

    pub fn with_update_checker(mut self, checker: UpdateChecker) -> Self {
        self.updates = Some(checker);
        self
    }

    /// Assemble the production stack: HTTP source, file cache, filesystem host
    pub fn from_config(config: &Config) -> Result<Self, PressdeckError> {
        let client = Arc::new(GitHubClient::with_config(config.source.clone()));
        let cache: Arc<dyn CacheStore> = Arc::new(FileCache::open(&config.cache_dir)?);
        let registry: Arc<dyn PluginRegistry> = Arc::new(FsPluginRegistry::open(
            &config.plugins_dir,
            config.state_dir.join("registry.json"),
        )?);
        let installer = Arc::new(ZipPackageInstaller::new(
            Duration::from_secs(config.source.download_timeout_secs),
            &config.source.user_agent,
        ));

        let updates = UpdateChecker::new(client.clone(), cache.clone(), config.update.clone());

        Ok(Self::new(ServiceParts {
            organization: config.organization.clone(),
            content: client.clone(),
            organizations: client,
            cache,
            registry,
            installer,
            web_base_url: config.source.web_base_url.clone(),
            repo_limit: config.repo_limit,
            cache_duration: config.cache_duration(),
            per_page: config.per_page,
        })
        .with_update_checker(updates))
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn default_per_page(&self) -> usize {
        self.per_page
    }

    pub async fn list_repositories(
        &self,
        page: usize,
        per_page: Option<usize>,
        force_refresh: bool,
    ) -> Result<RepositoryPage, PressdeckError> {
        let per_page = per_page.unwrap_or(self.per_page);
        Ok(self
            .lister
            .list(&self.organization, force_refresh, page, per_page)
            .await?)
    }

    /// Refetch the listing, bypassing the cache; returns the first page
    pub async fn refresh_repositories(&self) -> Result<RepositoryPage, PressdeckError> {
        self.list_repositories(1, None, true).await
    }

    /// Drop the cached listing and every cached detection of the organization
    pub fn clear_cache(&self) -> Result<CacheClearReport, PressdeckError> {
        let repositories = self.lister.invalidate(&self.organization);
        let detections = self.detector.cache().invalidate_org(&self.organization)?;
        tracing::info!(org = %self.organization, repositories, detections, "Cache cleared");
        Ok(CacheClearReport {
            repositories,
            detections,
        })
    }

    /// Compare the running build with the published release
    pub async fn check_update(&self, force: bool) -> UpdateStatus {
        match &self.updates {
            Some(checker) => checker.check(force).await,
            None => UpdateStatus::unknown(env!("CARGO_PKG_VERSION"), &UpdateError::NotConfigured),
        }
    }

    /// Flattened status of one repository row
    ///
    /// An installed plugin is reported as a plugin without consulting the
    /// remote source. Detection failures land in `error` with `isPlugin`
    /// left unknown, never as "not a plugin".
    pub async fn get_row_status(&self, repo: &str) -> Result<RowStatus, PressdeckError> {
        let repo = repo.trim();
        if repo.is_empty() {
            return Err(PressdeckError::InvalidRequest("repository name is required".into()));
        }

        let installed = self.resolver.resolve(repo)?;
        if let (true, Some(plugin_file)) = (installed.installed, installed.plugin_file) {
            return Ok(RowStatus {
                repo_name: repo.to_string(),
                is_plugin: Some(true),
                is_installed: Some(true),
                is_active: Some(installed.active),
                settings_url: self.registry.settings_url(&plugin_file),
                plugin_file: Some(plugin_file),
                checking: false,
                installing: false,
                error: None,
            });
        }

        let (is_plugin, error) = match self.detector.detect(&self.organization, repo).await {
            Ok(detection) => (Some(detection.is_plugin()), None),
            Err(e) => (None, Some(e.to_string())),
        };

        Ok(RowStatus {
            repo_name: repo.to_string(),
            is_plugin,
            is_installed: Some(false),
            is_active: Some(false),
            plugin_file: None,
            settings_url: None,
            checking: false,
            installing: false,
            error,
        })
    }

    /// Install a repository's plugin, archiving the detected branch if known
    pub async fn install_plugin(&self, repo: &str, activate: bool) -> Result<InstallOutcome, PressdeckError> {
        let branch = match self.detector.cache().get(&self.organization, repo) {
            Some(Detection::Found(found)) => Some(found.branch),
            _ => None,
        };

        Ok(self
            .orchestrator
            .install(&self.organization, repo, activate, branch.as_deref())
            .await?)
    }

    pub fn activate_plugin(&self, plugin_file: &str) -> Result<ActivationOutcome, PressdeckError> {
        Ok(self.orchestrator.activate(plugin_file)?)
    }

    /// Install several repositories strictly one after another
    pub async fn batch_install(&self, repos: &[String], activate: bool) -> Result<BatchReport, PressdeckError> {
        if repos.is_empty() {
            return Err(PressdeckError::InvalidRequest("no repositories selected".into()));
        }

        let mut results = Vec::with_capacity(repos.len());
        for repo in repos {
            let item = match self.install_plugin(repo, activate).await {
                Ok(outcome) => BatchItem {
                    repo_name: repo.clone(),
                    success: true,
                    data: Some(outcome),
                    error: None,
                },
                Err(e) => BatchItem {
                    repo_name: repo.clone(),
                    success: false,
                    data: None,
                    error: Some(e.to_string()),
                },
            };
            results.push(item);
        }

        let success = results.iter().filter(|r| r.success).count();
        let summary = BatchSummary {
            total: results.len(),
            success,
            errors: results.len() - success,
        };
        tracing::info!(total = summary.total, success = summary.success, "Batch install finished");

        Ok(BatchReport { results, summary })
    }
}

#[async_trait]
impl RowBackend for AdminService {
    async fn row_status(&self, repo: &str) -> Result<RowStatus, PressdeckError> {
        self.get_row_status(repo).await
    }

    async fn install(&self, repo: &str, activate: bool) -> Result<InstallOutcome, PressdeckError> {
        self.install_plugin(repo, activate).await
    }

    async fn activate(&self, plugin_file: &str) -> Result<ActivationOutcome, PressdeckError> {
        self.activate_plugin(plugin_file)
    }
}
