// Configuration types and TOML loading

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the configured organization
pub const ORG_ENV_VAR: &str = "PRESSDECK_ORG";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Organization whose repositories are listed
    pub organization: String,

    /// Maximum number of repositories kept after deduplication (1..=100)
    pub repo_limit: usize,

    /// TTL of the cached repository listing in seconds (>= 300)
    pub cache_duration_secs: u64,

    /// Default page size for listings
    pub per_page: usize,

    /// Host plugin storage root (the `wp-content/plugins` directory)
    pub plugins_dir: PathBuf,

    /// Directory for the file-backed cache store
    pub cache_dir: PathBuf,

    /// Directory for persisted row-state snapshots
    pub state_dir: PathBuf,

    pub source: SourceConfig,
    pub queue: QueueConfig,
    pub gateway: GatewayConfig,
    pub update: UpdateConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".pressdeck"));

        Self {
            organization: String::new(),
            repo_limit: 15,
            cache_duration_secs: 3600,
            per_page: 15,
            plugins_dir: PathBuf::from("wp-content/plugins"),
            cache_dir: data_dir.join("cache"),
            state_dir: data_dir.join("state"),
            source: SourceConfig::default(),
            queue: QueueConfig::default(),
            gateway: GatewayConfig::default(),
            update: UpdateConfig::default(),
        }
    }
}

/// Remote content source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Web host serving organization pages and archives
    pub web_base_url: String,

    /// Host serving raw file contents by branch
    pub raw_base_url: String,

    /// Contents API host used for directory listings
    pub api_base_url: String,

    /// Timeout for single-file probes and directory listings
    pub probe_timeout_secs: u64,

    /// Timeout for the organization listing page
    pub listing_timeout_secs: u64,

    /// Timeout for package downloads
    pub download_timeout_secs: u64,

    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            web_base_url: "https://github.com".to_string(),
            raw_base_url: "https://raw.githubusercontent.com".to_string(),
            api_base_url: "https://api.github.com".to_string(),
            probe_timeout_secs: 15,
            listing_timeout_secs: 30,
            download_timeout_secs: 300,
            user_agent: concat!("pressdeck/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Client-side check queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Delay between consecutive status checks
    pub check_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            check_delay_ms: 250,
        }
    }
}

impl QueueConfig {
    pub fn check_delay(&self) -> Duration {
        Duration::from_millis(self.check_delay_ms)
    }
}

/// HTTP gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind: String,

    /// Per-request timeout; must cover a package download
    pub request_timeout_secs: u64,

    pub body_limit_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            request_timeout_secs: 330,
            body_limit_bytes: 64 * 1024,
        }
    }
}

/// Release check settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Repository publishing pressdeck, as `owner/name`; unset disables checks
    pub repository: Option<String>,

    pub branch: String,

    /// Manifest whose `package.version` is the published version
    pub manifest_path: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            repository: None,
            branch: "main".to_string(),
            manifest_path: "Cargo.toml".to_string(),
        }
    }
}

impl UpdateConfig {
    /// `(owner, name)` of the configured repository
    pub fn repository_parts(&self) -> Option<(&str, &str)> {
        let (owner, name) = self.repository.as_deref()?.trim().split_once('/')?;
        (!owner.is_empty() && !name.is_empty() && !name.contains('/')).then_some((owner, name))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "pressdeck")
}

impl Config {
    /// Default location of `config.toml`
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from a TOML file, applying env overrides
    ///
    /// A missing file at the default location yields the defaults; an
    /// explicitly requested file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_toml(&std::fs::read_to_string(path)?)?,
                _ => Self::default(),
            },
        };

        if let Ok(org) = std::env::var(ORG_ENV_VAR) {
            if !org.trim().is_empty() {
                config.organization = org.trim().to_string();
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.repo_limit) {
            return Err(ConfigError::Invalid(format!(
                "repo_limit must be between 1 and 100, got {}",
                self.repo_limit
            )));
        }
        if self.cache_duration_secs < 300 {
            return Err(ConfigError::Invalid(format!(
                "cache_duration_secs must be at least 300, got {}",
                self.cache_duration_secs
            )));
        }
        if self.per_page == 0 {
            return Err(ConfigError::Invalid("per_page must be positive".into()));
        }
        if let (Some(repo), None) = (&self.update.repository, self.update.repository_parts()) {
            return Err(ConfigError::Invalid(format!(
                "update.repository must look like owner/name, got '{}'",
                repo
            )));
        }
        Ok(())
    }

    pub fn cache_duration(&self) -> Duration {
        Duration::from_secs(self.cache_duration_secs)
    }
}
