//! Remote sources of deployment manifests

use crate::catalog::Version;
use crate::{OicError, Result};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// One deployment descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDocument {
    /// File name or URL the content came from
    pub name: String,
    pub content: String,
}

/// Somewhere the deployment descriptors of a version can be fetched from
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Human-readable location, for messages
    fn describe(&self) -> String;

    /// Fetch every descriptor for `version`. Any failure is fatal for the run.
    async fn fetch(&self, version: &Version) -> Result<Vec<ManifestDocument>>;
}

/// Descriptors from a `v<version>` branch of a git repository
#[derive(Debug, Clone)]
pub struct GitManifestSource {
    repo_url: String,
    descriptor_dir: String,
    checkout_dir: PathBuf,
}

impl GitManifestSource {
    pub fn new(
        repo_url: impl Into<String>,
        descriptor_dir: impl Into<String>,
        checkout_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            repo_url: repo_url.into(),
            descriptor_dir: descriptor_dir.into(),
            checkout_dir: checkout_dir.as_ref().to_path_buf(),
        }
    }

    pub fn branch_for(version: &Version) -> String {
        format!("v{}", version)
    }

    async fn clone_branch(&self, branch: &str) -> Result<()> {
        if self.checkout_dir.exists() {
            fs::remove_dir_all(&self.checkout_dir)?;
        }

        let output = Command::new("git")
            .args(["clone", "--depth", "1", "--branch", branch, &self.repo_url])
            .arg(&self.checkout_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| OicError::ManifestFetch(format!("could not run git: {}", e)))?;

        if !output.status.success() {
            return Err(OicError::ManifestFetch(format!(
                "git clone of {} at {} failed: {}",
                self.repo_url,
                branch,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Read every `*.yml` / `*.yaml` file in `dir`, sorted by name
pub fn read_descriptors(dir: &Path) -> Result<Vec<ManifestDocument>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        OicError::ManifestFetch(format!("cannot read {}: {}", dir.display(), e))
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yml") | Some("yaml")
                )
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(OicError::ManifestFetch(format!(
            "no deployment descriptors in {}",
            dir.display()
        )));
    }

    paths
        .into_iter()
        .map(|path| {
            let content = fs::read_to_string(&path)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            Ok(ManifestDocument { name, content })
        })
        .collect()
}

#[async_trait]
impl ManifestSource for GitManifestSource {
    fn describe(&self) -> String {
        format!("{} ({})", self.repo_url, self.descriptor_dir)
    }

    async fn fetch(&self, version: &Version) -> Result<Vec<ManifestDocument>> {
        let branch = Self::branch_for(version);
        self.clone_branch(&branch).await?;
        read_descriptors(&self.checkout_dir.join(&self.descriptor_dir))
    }
}

/// Descriptor served from a fixed URL; `{version}` is substituted
#[derive(Debug, Clone)]
pub struct UrlManifestSource {
    url_template: String,
    client: reqwest::Client,
}

impl UrlManifestSource {
    pub fn new(url_template: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()?;

        Ok(Self {
            url_template: url_template.into(),
            client,
        })
    }

    pub fn url_for(&self, version: &Version) -> String {
        self.url_template.replace("{version}", &version.to_string())
    }
}

#[async_trait]
impl ManifestSource for UrlManifestSource {
    fn describe(&self) -> String {
        self.url_template.clone()
    }

    async fn fetch(&self, version: &Version) -> Result<Vec<ManifestDocument>> {
        let url = self.url_for(version);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OicError::ManifestFetch(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(OicError::ManifestFetch(format!(
                "{}: HTTP {}",
                url,
                response.status()
            )));
        }

        let content = response
            .text()
            .await
            .map_err(|e| OicError::ManifestFetch(format!("{}: {}", url, e)))?;

        Ok(vec![ManifestDocument { name: url, content }])
    }
}
