// Error types for detection, listing, installation and the cache layer

use serde::Serialize;
use thiserror::Error;

/// Coarse error taxonomy surfaced to callers and the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Absence of a thing (no plugin file, unknown plugin)
    NotFound,
    /// The remote source refused with 429
    RateLimited,
    /// Retryable transport failure or timeout
    TransientNetwork,
    /// Markup or payload that could not be interpreted
    StructuralParse,
    /// An operation precondition did not hold
    PreconditionFailed,
    /// The host refused the operation
    PermissionDenied,
    /// The caller supplied unusable input
    InvalidInput,
}

/// Unified error type for pressdeck operations
///
/// Individual error types are exposed through `From` conversions.
#[derive(Debug, Error)]
pub enum PressdeckError {
    #[error("Detection failed: {0}")]
    Detection(#[from] DetectionError),

    #[error("Repository listing failed: {0}")]
    List(#[from] ListError),

    #[error("Install failed: {0}")]
    Install(#[from] InstallFailure),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl PressdeckError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Detection(e) => e.kind(),
            Self::List(e) => e.kind(),
            Self::Install(e) => e.error.kind(),
            Self::Host(e) => e.kind(),
            Self::Cache(_) => ErrorKind::TransientNetwork,
            Self::Config(_) | Self::InvalidRequest(_) => ErrorKind::InvalidInput,
        }
    }

    /// Installer logs collected before the failure, if any
    pub fn logs(&self) -> &[String] {
        match self {
            Self::Install(failure) => &failure.logs,
            _ => &[],
        }
    }
}

/// Errors while probing a repository for a plugin header
///
/// Never cached: only definitive detections reach the cache.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DetectionError {
    #[error("Rate limited by the content source, try again later")]
    RateLimited,

    #[error("Network error: {0}")]
    Network(String),
}

impl DetectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited => ErrorKind::RateLimited,
            Self::Network(_) => ErrorKind::TransientNetwork,
        }
    }
}

/// Errors while looking up the published release
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpdateError {
    #[error("Update checks need `update.repository` set to owner/name")]
    NotConfigured,

    #[error("Could not fetch remote version: {0}")]
    Fetch(#[from] DetectionError),

    #[error("Remote manifest not found")]
    ManifestMissing,

    #[error("Could not parse remote version")]
    Parse,
}

/// Errors while listing an organization's repositories
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ListError {
    #[error("No organization configured")]
    NoOrganization,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("No repositories could be parsed from the organization page")]
    Parse,
}

impl ListError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoOrganization => ErrorKind::InvalidInput,
            Self::Network(_) => ErrorKind::TransientNetwork,
            Self::Status(429) => ErrorKind::RateLimited,
            Self::Status(404) => ErrorKind::NotFound,
            Self::Status(_) => ErrorKind::TransientNetwork,
            Self::Parse => ErrorKind::StructuralParse,
        }
    }
}

/// Errors from the host plugin registry
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Plugin file '{0}' is not registered")]
    UnknownPlugin(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Registry state is corrupt: {0}")]
    State(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownPlugin(_) => ErrorKind::NotFound,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::State(_) => ErrorKind::StructuralParse,
            Self::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorKind::PermissionDenied
            }
            Self::Io(_) => ErrorKind::PreconditionFailed,
        }
    }
}

/// Errors along the install path
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Missing required parameter: {0}")]
    InvalidParams(String),

    #[error("Plugin directory '{0}' already exists")]
    AlreadyExists(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Package extraction failed: {0}")]
    Extract(String),

    #[error("No plugin file found in the installed package")]
    NoPluginFile,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InstallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParams(_) => ErrorKind::InvalidInput,
            Self::AlreadyExists(_) => ErrorKind::PreconditionFailed,
            Self::Download(_) => ErrorKind::TransientNetwork,
            Self::Extract(_) => ErrorKind::StructuralParse,
            Self::NoPluginFile => ErrorKind::NotFound,
            Self::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorKind::PermissionDenied
            }
            Self::Io(_) => ErrorKind::PreconditionFailed,
        }
    }
}

/// An install error together with the installer logs gathered so far
#[derive(Debug, Error)]
#[error("{error}")]
pub struct InstallFailure {
    pub error: InstallError,
    pub logs: Vec<String>,
}

impl InstallFailure {
    pub fn new(error: InstallError, logs: Vec<String>) -> Self {
        Self { error, logs }
    }
}

impl From<InstallError> for InstallFailure {
    fn from(error: InstallError) -> Self {
        Self {
            error,
            logs: Vec::new(),
        }
    }
}

/// Cache store errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
