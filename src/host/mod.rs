// Host collaborators: plugin registry and package installer

mod package;
mod registry;

pub use package::ZipPackageInstaller;
pub use registry::FsPluginRegistry;

use crate::error::{HostError, InstallFailure};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Header metadata of an installed plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
}

/// A plugin known to the host registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredPlugin {
    /// `dir/file.php` relative to the plugin root
    pub plugin_file: String,
    pub metadata: PluginMetadata,
}

impl RegisteredPlugin {
    /// Directory component of the plugin file, if it lives in one
    pub fn directory(&self) -> Option<&str> {
        self.plugin_file.split_once('/').map(|(dir, _)| dir)
    }
}

/// The host application's plugin registry
pub trait PluginRegistry: Send + Sync {
    /// All registered plugins
    fn plugins(&self) -> Result<Vec<RegisteredPlugin>, HostError>;

    fn is_active(&self, plugin_file: &str) -> bool;

    /// Network-wide activation on multi-site installs
    fn is_network_active(&self, plugin_file: &str) -> bool;

    fn activate(&self, plugin_file: &str) -> Result<(), HostError>;

    /// Admin settings page of a plugin, when it declares one
    fn settings_url(&self, plugin_file: &str) -> Option<String>;

    /// Plugin storage root
    fn plugins_dir(&self) -> &Path;
}

/// Source directory rename hook: extracted name in, final name out
pub type RenameHook = Box<dyn Fn(&str) -> String + Send + Sync>;

/// A package install request
pub struct PackageRequest {
    /// Zip archive URL
    pub url: String,

    /// Directory receiving the extracted package
    pub destination_root: PathBuf,

    /// Maps the extracted top-level directory name to its final name
    pub rename: Option<RenameHook>,

    /// Replace an existing destination instead of failing
    pub overwrite: bool,
}

/// Result of a successful package install
#[derive(Debug, Clone)]
pub struct PackageOutcome {
    /// Final location of the package
    pub destination: PathBuf,

    /// Installer messages, in order
    pub logs: Vec<String>,
}

/// The host application's package installer
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Fetch an archive and extract it under the destination root
    async fn install_package(&self, request: PackageRequest) -> Result<PackageOutcome, InstallFailure>;
}
