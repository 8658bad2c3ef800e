// Zip package installer: download, unpack, rename, place

use super::{PackageInstaller, PackageOutcome, PackageRequest};
use crate::error::{InstallError, InstallFailure};
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Package installer for zip archives served over HTTP
pub struct ZipPackageInstaller {
    client: Client,
}

impl ZipPackageInstaller {
    pub fn new(download_timeout: Duration, user_agent: &str) -> Self {
        let client = Client::builder()
            .timeout(download_timeout)
            .user_agent(user_agent.to_string())
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, InstallError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| InstallError::Download(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(InstallError::Download(format!(
                "Download failed: {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| InstallError::Download(format!("Failed to read package: {}", e)))?;
        Ok(bytes.to_vec())
    }

    /// Unpack archive bytes and move the package into place
    ///
    /// A single top-level directory in the archive is treated as the package
    /// root; its name is passed through the rename hook.
    pub fn unpack(
        bytes: &[u8],
        request: &PackageRequest,
        logs: &mut Vec<String>,
    ) -> Result<PathBuf, InstallError> {
        let is_zip = bytes.len() > 3 && bytes[..4] == [0x50, 0x4b, 0x03, 0x04];
        if !is_zip {
            return Err(InstallError::Extract(
                "Package is not a zip archive".to_string(),
            ));
        }

        logs.push("Unpacking the package…".to_string());
        std::fs::create_dir_all(&request.destination_root)?;
        let staging = tempfile::Builder::new()
            .prefix(".pressdeck-")
            .tempdir_in(&request.destination_root)?;

        extract_zip(bytes, staging.path())?;

        let (source_dir, source_name) = package_root(staging.path())?;
        let final_name = match &request.rename {
            Some(rename) => rename(&source_name),
            None => source_name.clone(),
        };
        if final_name.is_empty() || final_name.contains(['/', '\\']) || final_name.starts_with('.') {
            return Err(InstallError::InvalidParams(format!(
                "invalid destination name '{}'",
                final_name
            )));
        }
        if final_name != source_name {
            logs.push(format!("Renaming {} to {}", source_name, final_name));
        }

        let destination = request.destination_root.join(&final_name);
        if destination.exists() {
            if !request.overwrite {
                return Err(InstallError::AlreadyExists(final_name));
            }
            logs.push("Removing the current plugin…".to_string());
            std::fs::remove_dir_all(&destination)?;
        }

        logs.push("Installing the plugin…".to_string());
        std::fs::rename(&source_dir, &destination)?;
        Ok(destination)
    }
}

/// Extract a zip archive, refusing entries that escape `dest_dir`
fn extract_zip(bytes: &[u8], dest_dir: &Path) -> Result<(), InstallError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| InstallError::Extract(format!("ZIP error: {}", e)))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| InstallError::Extract(format!("ZIP entry error: {}", e)))?;

        let Some(relative) = file.enclosed_name() else {
            return Err(InstallError::Extract(format!(
                "Unsafe path in archive: {}",
                file.name()
            )));
        };
        let target = dest_dir.join(relative);

        if file.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = std::fs::File::create(&target)?;
            std::io::copy(&mut file, &mut out)?;
        }
    }

    Ok(())
}

/// The single top-level directory, or the staging dir itself
fn package_root(staging: &Path) -> Result<(PathBuf, String), InstallError> {
    let entries: Vec<_> = std::fs::read_dir(staging)?.filter_map(|e| e.ok()).collect();

    match entries.as_slice() {
        [] => Err(InstallError::Extract("Package is empty".to_string())),
        [only] if only.path().is_dir() => Ok((
            only.path(),
            only.file_name().to_string_lossy().into_owned(),
        )),
        _ => {
            // Flat archive: move the contents into a directory of their own
            let wrapped = staging.join("package");
            std::fs::create_dir(&wrapped)?;
            for entry in entries {
                std::fs::rename(entry.path(), wrapped.join(entry.file_name()))?;
            }
            Ok((wrapped, "package".to_string()))
        }
    }
}

#[async_trait]
impl PackageInstaller for ZipPackageInstaller {
    async fn install_package(&self, request: PackageRequest) -> Result<PackageOutcome, InstallFailure> {
        let mut logs = vec![format!("Downloading install package from {}…", request.url)];

        let bytes = match self.download(&request.url).await {
            Ok(bytes) => bytes,
            Err(e) => return Err(InstallFailure::new(e, logs)),
        };

        match Self::unpack(&bytes, &request, &mut logs) {
            Ok(destination) => {
                logs.push("Plugin installed successfully.".to_string());
                Ok(PackageOutcome { destination, logs })
            }
            Err(e) => {
                logs.push(format!("Installation failed: {}", e));
                Err(InstallFailure::new(e, logs))
            }
        }
    }
}
