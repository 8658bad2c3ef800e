// Filesystem-backed plugin registry

use super::{PluginMetadata, PluginRegistry, RegisteredPlugin};
use crate::detect::header::{has_script_extension, parse_plugin_header};
use crate::error::HostError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct RegistryState {
    active: BTreeSet<String>,
    network_active: BTreeSet<String>,
    settings_urls: BTreeMap<String, String>,
}

/// Plugin registry reading headers from a plugin directory
///
/// Plugins are the PHP files with a valid header either directly in the
/// plugin root or one level down. Activation state lives in a JSON file.
pub struct FsPluginRegistry {
    plugins_dir: PathBuf,
    state_path: PathBuf,
    state: Mutex<RegistryState>,
}

impl FsPluginRegistry {
    /// Open a registry, loading activation state if present
    pub fn open(plugins_dir: impl Into<PathBuf>, state_path: impl Into<PathBuf>) -> Result<Self, HostError> {
        let state_path = state_path.into();
        let state = match std::fs::read(&state_path) {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| HostError::State(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryState::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            plugins_dir: plugins_dir.into(),
            state_path,
            state: Mutex::new(state),
        })
    }

    pub fn deactivate(&self, plugin_file: &str) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.active.remove(plugin_file);
        state.network_active.remove(plugin_file);
        self.persist(&state)
    }

    pub fn set_network_active(&self, plugin_file: &str) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.network_active.insert(plugin_file.to_string());
        self.persist(&state)
    }

    pub fn set_settings_url(&self, plugin_file: &str, url: &str) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state
            .settings_urls
            .insert(plugin_file.to_string(), url.to_string());
        self.persist(&state)
    }

    fn persist(&self, state: &RegistryState) -> Result<(), HostError> {
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_vec_pretty(state).map_err(|e| HostError::State(e.to_string()))?;
        std::fs::write(&self.state_path, raw)?;
        Ok(())
    }

    fn read_plugin(path: &Path, plugin_file: String) -> Option<RegisteredPlugin> {
        let bytes = std::fs::read(path).ok()?;
        let header = parse_plugin_header(&String::from_utf8_lossy(&bytes))?;
        Some(RegisteredPlugin {
            plugin_file,
            metadata: PluginMetadata {
                name: header.name,
                version: header.version,
                description: header.description,
            },
        })
    }
}

fn sorted_entries(dir: &Path) -> std::io::Result<Vec<std::fs::DirEntry>> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

impl PluginRegistry for FsPluginRegistry {
    fn plugins(&self) -> Result<Vec<RegisteredPlugin>, HostError> {
        let entries = match sorted_entries(&self.plugins_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut plugins = Vec::new();
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();

            if path.is_dir() {
                if name.starts_with('.') {
                    continue;
                }
                for inner in sorted_entries(&path)? {
                    let file = inner.file_name().to_string_lossy().into_owned();
                    if inner.path().is_file() && has_script_extension(&file) {
                        if let Some(plugin) = Self::read_plugin(&inner.path(), format!("{}/{}", name, file)) {
                            plugins.push(plugin);
                        }
                    }
                }
            } else if has_script_extension(&name) {
                if let Some(plugin) = Self::read_plugin(&path, name) {
                    plugins.push(plugin);
                }
            }
        }

        Ok(plugins)
    }

    fn is_active(&self, plugin_file: &str) -> bool {
        self.state.lock().active.contains(plugin_file)
    }

    fn is_network_active(&self, plugin_file: &str) -> bool {
        self.state.lock().network_active.contains(plugin_file)
    }

    fn activate(&self, plugin_file: &str) -> Result<(), HostError> {
        if plugin_file.contains("..") {
            return Err(HostError::PermissionDenied(format!(
                "refusing path outside the plugin root: {}",
                plugin_file
            )));
        }

        let path = self.plugins_dir.join(plugin_file);
        if Self::read_plugin(&path, plugin_file.to_string()).is_none() {
            return Err(HostError::UnknownPlugin(plugin_file.to_string()));
        }

        let mut state = self.state.lock();
        state.active.insert(plugin_file.to_string());
        self.persist(&state)?;
        tracing::info!(plugin_file, "Plugin activated");
        Ok(())
    }

    fn settings_url(&self, plugin_file: &str) -> Option<String> {
        self.state.lock().settings_urls.get(plugin_file).cloned()
    }

    fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }
}
