//! Container image references

use crate::{OicError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Docker/OCI image reference of the form `[registry/][namespace/]repository:tag`
///
/// Equality, hashing and ordering all go through the full string form, so two
/// references that print the same are the same reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageReference {
    /// Registry host (e.g., "docker.io", "registry1.dso.mil")
    registry: Option<String>,
    /// Path between registry and repository (e.g., "blackducksoftware")
    namespace: Option<String>,
    /// Final path segment (e.g., "blackduck-webapp")
    repository: String,
    /// Tag (e.g., "2024.7.0")
    tag: String,
}

impl ImageReference {
    /// Parse an image reference string. The tag is mandatory.
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(OicError::InvalidImageRef(
                "Empty image reference".to_string(),
            ));
        }
        if reference.contains('@') {
            return Err(OicError::InvalidImageRef(format!(
                "{}: digest references are not supported",
                reference
            )));
        }

        // The tag separator is the last ':' that is not part of a registry port
        let (path, tag) = match reference.rsplit_once(':') {
            Some((path, tag)) if !tag.contains('/') => (path, tag),
            _ => {
                return Err(OicError::InvalidImageRef(format!(
                    "{}: missing tag",
                    reference
                )))
            }
        };
        if tag.is_empty() {
            return Err(OicError::InvalidImageRef(format!(
                "{}: empty tag",
                reference
            )));
        }

        let mut segments: Vec<&str> = path.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(OicError::InvalidImageRef(format!(
                "{}: empty path segment",
                reference
            )));
        }

        let registry = if segments.len() > 1 && looks_like_registry(segments[0]) {
            Some(segments.remove(0).to_string())
        } else {
            None
        };

        // segments is non-empty: split always yields at least one element
        let repository = segments.pop().unwrap_or_default().to_string();
        let namespace = if segments.is_empty() {
            None
        } else {
            Some(segments.join("/"))
        };

        Ok(Self {
            registry,
            namespace,
            repository,
            tag: tag.to_string(),
        })
    }

    /// Registry host, if the reference names one
    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    /// Namespace path, if any
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Final repository segment
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Get the tag
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// `repository:tag`, without registry or namespace
    pub fn name_and_tag(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    /// Get the full image name with registry, namespace and tag
    pub fn full_name(&self) -> String {
        let mut name = String::new();
        if let Some(ref registry) = self.registry {
            name.push_str(registry);
            name.push('/');
        }
        if let Some(ref namespace) = self.namespace {
            name.push_str(namespace);
            name.push('/');
        }
        name.push_str(&self.repository);
        name.push(':');
        name.push_str(&self.tag);
        name
    }

    /// Same repository and tag at a different registry location
    pub fn relocated(&self, registry: &str, namespace: &str) -> Self {
        let namespace = namespace.trim_matches('/');
        Self {
            registry: Some(registry.trim_end_matches('/').to_string()),
            namespace: if namespace.is_empty() {
                None
            } else {
                Some(namespace.to_string())
            },
            repository: self.repository.clone(),
            tag: self.tag.clone(),
        }
    }
}

/// A first path segment is a registry host when it has a dot, a port, or is localhost
fn looks_like_registry(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

impl FromStr for ImageReference {
    type Err = OicError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ImageReference {
    type Error = OicError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ImageReference> for String {
    fn from(value: ImageReference) -> Self {
        value.full_name()
    }
}

impl PartialEq for ImageReference {
    fn eq(&self, other: &Self) -> bool {
        self.full_name() == other.full_name()
    }
}

impl Eq for ImageReference {}

impl Hash for ImageReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full_name().hash(state);
    }
}

impl PartialOrd for ImageReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ImageReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.full_name().cmp(&other.full_name())
    }
}
