//! Persistent credential file for the restricted registry.
//!
//! Uses the container tool's `auths` layout: one entry per registry host with
//! the username, the secret and a base64 `username:secret` pair. Writes are
//! atomic (write tmp, rename).

use crate::{OicError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Username and secret for a registry
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// base64 of `username:secret`
    pub fn encoded(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.username, self.secret))
    }

    /// Inverse of [`Credentials::encoded`]
    pub fn decode(encoded: &str) -> Result<Self> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| OicError::Auth(format!("malformed auth entry: {}", e)))?;
        let raw = String::from_utf8(raw)
            .map_err(|_| OicError::Auth("auth entry is not UTF-8".to_string()))?;
        let (username, secret) = raw
            .split_once(':')
            .ok_or_else(|| OicError::Auth("auth entry lacks ':' separator".to_string()))?;
        Ok(Self::new(username, secret))
    }
}

// Keep the secret out of logs and panics
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Per-registry entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AuthEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth: Option<String>,
}

/// Credential file format
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    auths: BTreeMap<String, AuthEntry>,
}

/// Credential file for registries
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Credential store at the default path (`~/.oic/auth.json`)
    pub fn default_path() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            OicError::Config("Cannot determine home directory for credential store".to_string())
        })?;
        Ok(Self {
            path: home.join(".oic").join("auth.json"),
        })
    }

    /// Credential store at a custom path
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Credentials stored for a registry host
    pub fn get(&self, registry: &str) -> Result<Option<Credentials>> {
        let file = self.load()?;
        let Some(entry) = file.auths.get(&normalize_registry(registry)) else {
            return Ok(None);
        };

        if let (Some(username), Some(password)) = (&entry.username, &entry.password) {
            return Ok(Some(Credentials::new(username.clone(), password.clone())));
        }
        match entry.auth {
            Some(ref auth) => Credentials::decode(auth).map(Some),
            None => Ok(None),
        }
    }

    /// Store credentials for a registry. Overwrites an existing entry.
    pub fn store(&self, registry: &str, credentials: &Credentials) -> Result<()> {
        let mut file = self.load()?;
        file.auths.insert(
            normalize_registry(registry),
            AuthEntry {
                username: Some(credentials.username.clone()),
                password: Some(credentials.secret.clone()),
                auth: Some(credentials.encoded()),
            },
        );
        self.save(&file)
    }

    /// Load the credential file. Returns empty if not found.
    fn load(&self) -> Result<CredentialFile> {
        if !self.path.exists() {
            return Ok(CredentialFile::default());
        }
        let data = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&data).map_err(|e| {
            OicError::Config(format!(
                "Failed to parse credential file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn save(&self, file: &CredentialFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, serde_json::to_string_pretty(file)?)?;
        restrict_permissions(&tmp_path)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

fn normalize_registry(registry: &str) -> String {
    registry.trim().trim_end_matches('/').to_lowercase()
}
