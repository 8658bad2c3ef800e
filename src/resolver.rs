// Installed-state resolver
//
// Answers whether a repository is installed locally and whether it is
// active. Computed live on every call.

use crate::detect::locate_main_file;
use crate::error::HostError;
use crate::host::{PluginMetadata, PluginRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Normalize a repository name into a plugin directory slug
///
/// Lowercases, collapses runs of non-alphanumerics into `-` and trims
/// separators from both ends.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            slug.push(c);
        } else {
            pending_sep = true;
        }
    }
    slug
}

/// Local install state of a repository's plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledState {
    pub installed: bool,
    /// Present iff installed
    pub plugin_file: Option<String>,
    pub active: bool,
    pub metadata: Option<PluginMetadata>,
}

impl InstalledState {
    pub fn not_installed() -> Self {
        Self::default()
    }
}

pub struct InstalledStateResolver {
    registry: Arc<dyn PluginRegistry>,
}

impl InstalledStateResolver {
    pub fn new(registry: Arc<dyn PluginRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<dyn PluginRegistry> {
        &self.registry
    }

    /// Resolve the installed state of `repo`; absence is not an error
    pub fn resolve(&self, repo: &str) -> Result<InstalledState, HostError> {
        let slug = slugify(repo);
        if slug.is_empty() {
            return Ok(InstalledState::not_installed());
        }

        let registered = self.registry.plugins()?.into_iter().find(|plugin| {
            plugin
                .directory()
                .is_some_and(|dir| dir.eq_ignore_ascii_case(&slug))
        });

        if let Some(plugin) = registered {
            tracing::debug!(repo, plugin_file = %plugin.plugin_file, "Matched registered plugin");
            return Ok(self.state_for(plugin.plugin_file, Some(plugin.metadata)));
        }

        self.scan_plugin_root(repo, &slug)
    }

    /// Fallback: case-insensitive directory match plus main-file lookup
    fn scan_plugin_root(&self, repo: &str, slug: &str) -> Result<InstalledState, HostError> {
        let root = self.registry.plugins_dir();
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(InstalledState::not_installed())
            }
            Err(e) => return Err(e.into()),
        };

        let mut dirs: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter(|e| e.file_name().to_string_lossy().eq_ignore_ascii_case(slug))
            .collect();
        dirs.sort_by_key(|e| e.file_name());

        for dir in dirs {
            let dir_name = dir.file_name().to_string_lossy().into_owned();
            let located = locate_main_file(&dir.path(), repo, false)
                .or_else(|| locate_main_file(&dir.path(), slug, false))
                .or_else(|| locate_main_file(&dir.path(), repo, true));

            if let Some((file, header)) = located {
                let plugin_file = format!("{}/{}", dir_name, file);
                tracing::debug!(repo, %plugin_file, "Matched plugin directory on disk");
                let metadata = PluginMetadata {
                    name: header.name,
                    version: header.version,
                    description: header.description,
                };
                return Ok(self.state_for(plugin_file, Some(metadata)));
            }
        }

        Ok(InstalledState::not_installed())
    }

    fn state_for(&self, plugin_file: String, metadata: Option<PluginMetadata>) -> InstalledState {
        let active =
            self.registry.is_active(&plugin_file) || self.registry.is_network_active(&plugin_file);
        InstalledState {
            installed: true,
            plugin_file: Some(plugin_file),
            active,
            metadata,
        }
    }
}
