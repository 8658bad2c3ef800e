// Install orchestrator: precondition, package install, locate, activate

use crate::detect::locate_main_file;
use crate::error::{HostError, InstallError, InstallFailure};
use crate::host::{PackageInstaller, PackageRequest, PluginRegistry};
use crate::resolver::slugify;
use crate::source::OrganizationSource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Branch archived when detection did not pick one
pub const DEFAULT_BRANCH: &str = "main";

/// Result of a completed install
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallOutcome {
    pub plugin_dir: PathBuf,
    /// `slug/relative/main.php`
    pub plugin_file: String,
    pub activated: bool,
    pub logs: Vec<String>,
    /// Set when activation was requested and failed; the install stands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_error: Option<String>,
}

/// Result of an activation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationOutcome {
    pub activated: bool,
    pub plugin_file: String,
}

/// Sequences download, extraction, main-file lookup and activation
///
/// Install and activation are separate commit points: a failed activation
/// never undoes the install. A package without a detectable main file is
/// removed again.
pub struct InstallOrchestrator {
    source: Arc<dyn OrganizationSource>,
    installer: Arc<dyn PackageInstaller>,
    registry: Arc<dyn PluginRegistry>,
}

impl InstallOrchestrator {
    pub fn new(
        source: Arc<dyn OrganizationSource>,
        installer: Arc<dyn PackageInstaller>,
        registry: Arc<dyn PluginRegistry>,
    ) -> Self {
        Self {
            source,
            installer,
            registry,
        }
    }

    /// Install a repository's plugin
    ///
    /// # Arguments
    ///
    /// * `org` - Organization owning the repository
    /// * `repo` - Repository name
    /// * `activate` - Activate after a successful install
    /// * `branch` - Branch to archive; defaults to `main`
    pub async fn install(
        &self,
        org: &str,
        repo: &str,
        activate: bool,
        branch: Option<&str>,
    ) -> Result<InstallOutcome, InstallFailure> {
        let (org, repo) = (org.trim(), repo.trim());
        if org.is_empty() {
            return Err(InstallError::InvalidParams("organization".into()).into());
        }
        let slug = slugify(repo);
        if slug.is_empty() {
            return Err(InstallError::InvalidParams("repository name".into()).into());
        }

        let plugins_dir = self.registry.plugins_dir().to_path_buf();
        if let Some(existing) = existing_entry(&plugins_dir, &slug)? {
            return Err(InstallError::AlreadyExists(existing).into());
        }

        let branch = branch.unwrap_or(DEFAULT_BRANCH);
        let url = self.source.archive_url(org, repo, branch);
        tracing::info!(org, repo, branch, %url, "Installing plugin");

        let rename_to = slug.clone();
        let package = self
            .installer
            .install_package(PackageRequest {
                url,
                destination_root: plugins_dir,
                rename: Some(Box::new(move |_: &str| rename_to.clone())),
                overwrite: false,
            })
            .await?;
        let mut logs = package.logs;
        let plugin_dir = package.destination;

        let located = locate_main_file(&plugin_dir, repo, true)
            .or_else(|| locate_main_file(&plugin_dir, &slug, true));
        let Some((relative, header)) = located else {
            tracing::warn!(repo, dir = %plugin_dir.display(), "No plugin file found, rolling back");
            match std::fs::remove_dir_all(&plugin_dir) {
                Ok(()) => logs.push(format!("Removed {} (no plugin file found)", slug)),
                Err(e) => {
                    tracing::warn!(repo, error = %e, "Rollback failed");
                    logs.push(format!("Failed to remove {}: {}", slug, e));
                }
            }
            return Err(InstallFailure::new(InstallError::NoPluginFile, logs));
        };

        let dir_name = plugin_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| slug.clone());
        let plugin_file = format!("{}/{}", dir_name, relative);
        logs.push(format!("Found plugin '{}' in {}", header.name, plugin_file));

        let mut activated = false;
        let mut activation_error = None;
        if activate {
            match self.registry.activate(&plugin_file) {
                Ok(()) => {
                    activated = true;
                    logs.push("Plugin activated.".to_string());
                }
                Err(e) => {
                    tracing::warn!(repo, %plugin_file, error = %e, "Activation failed after install");
                    logs.push(format!("Activation failed: {}", e));
                    activation_error = Some(e.to_string());
                }
            }
        }

        tracing::info!(repo, %plugin_file, activated, "Plugin installed");
        Ok(InstallOutcome {
            plugin_dir,
            plugin_file,
            activated,
            logs,
            activation_error,
        })
    }

    /// Activate an installed plugin by its plugin file
    pub fn activate(&self, plugin_file: &str) -> Result<ActivationOutcome, HostError> {
        let plugin_file = plugin_file.trim();
        if plugin_file.is_empty() {
            return Err(HostError::UnknownPlugin(String::new()));
        }
        self.registry.activate(plugin_file)?;
        Ok(ActivationOutcome {
            activated: true,
            plugin_file: plugin_file.to_string(),
        })
    }
}

/// Name of an entry in the plugin root matching `slug` case-insensitively
fn existing_entry(plugins_dir: &Path, slug: &str) -> Result<Option<String>, InstallError> {
    let entries = match std::fs::read_dir(plugins_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    Ok(entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .find(|name| name.eq_ignore_ascii_case(slug)))
}
