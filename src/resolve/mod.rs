//! Version to image list resolution
//!
//! Two strategies: read the pinned list from the version catalog, or fetch the
//! version's deployment descriptors and collect every image they reference.
//! Either way the result is deduplicated and sorted by full reference.

pub mod source;

use crate::catalog::{Version, VersionCatalog};
use crate::image::ImageReference;
use crate::log::EventSink;
use crate::{OicError, Result};
use regex::Regex;
use serde_yaml::Value;
use std::collections::BTreeSet;
use std::sync::OnceLock;

pub use source::{GitManifestSource, ManifestDocument, ManifestSource, UrlManifestSource};

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[\w.-]+(/[\w.-]+)+:[\w.-]+$").expect("token pattern is a valid regex")
    })
}

/// How image lists are obtained
pub enum Strategy {
    /// Images pinned in the catalog
    Catalog,
    /// Images referenced by the version's deployment descriptors
    Manifest(Box<dyn ManifestSource>),
}

/// Image token that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedToken {
    pub token: String,
    pub reason: String,
}

/// Output of a resolve
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Deduplicated, sorted by full reference string
    pub images: Vec<ImageReference>,
    /// Tokens dropped during manifest parsing
    pub rejected: Vec<RejectedToken>,
}

/// Resolves a version to its image list
pub struct Resolver<'a> {
    catalog: &'a VersionCatalog,
    strategy: Strategy,
    sink: &'a dyn EventSink,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a VersionCatalog, strategy: Strategy, sink: &'a dyn EventSink) -> Self {
        Self {
            catalog,
            strategy,
            sink,
        }
    }

    /// Resolve straight from the catalog
    pub fn catalog(catalog: &'a VersionCatalog, sink: &'a dyn EventSink) -> Self {
        Self::new(catalog, Strategy::Catalog, sink)
    }

    /// Resolve from a manifest source; the catalog still gates which versions are allowed
    pub fn manifest(
        catalog: &'a VersionCatalog,
        source: Box<dyn ManifestSource>,
        sink: &'a dyn EventSink,
    ) -> Self {
        Self::new(catalog, Strategy::Manifest(source), sink)
    }

    pub async fn resolve(&self, version: &Version) -> Result<Resolution> {
        if !self.catalog.contains(version) {
            return Err(OicError::VersionNotFound(version.to_string()));
        }

        match self.strategy {
            Strategy::Catalog => self.resolve_from_catalog(version),
            Strategy::Manifest(ref source) => self.resolve_from_manifest(version, source.as_ref()).await,
        }
    }

    fn resolve_from_catalog(&self, version: &Version) -> Result<Resolution> {
        let pinned = self.catalog.lookup(version)?;
        if pinned.is_empty() {
            return Err(OicError::Config(format!(
                "no images are pinned for {} in the catalog; supply a catalog file or use manifest mode",
                version
            )));
        }

        self.sink.info(&format!(
            "Resolved {} images for {} from the catalog.",
            pinned.len(),
            version
        ));
        Ok(Resolution {
            images: sorted_unique(pinned.iter().cloned()),
            rejected: Vec::new(),
        })
    }

    async fn resolve_from_manifest(
        &self,
        version: &Version,
        source: &dyn ManifestSource,
    ) -> Result<Resolution> {
        self.sink.info(&format!(
            "Fetching deployment manifests for {} from {}.",
            version,
            source.describe()
        ));
        let documents = source.fetch(version).await?;

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for document in &documents {
            for token in extract_image_tokens(&document.content) {
                match validate_token(&token) {
                    Ok(reference) => accepted.push(reference),
                    Err(e) => {
                        self.sink.error(&format!(
                            "Invalid image reference format in {}: {} ({})",
                            document.name, token, e
                        ));
                        rejected.push(RejectedToken {
                            token,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        let images = sorted_unique(accepted);
        for image in &images {
            self.sink.info(&format!("Valid image reference found: {}", image));
        }
        self.sink.info(&format!(
            "Resolved {} images for {} from {} manifest documents ({} rejected).",
            images.len(),
            version,
            documents.len(),
            rejected.len()
        ));

        Ok(Resolution { images, rejected })
    }
}

fn sorted_unique(images: impl IntoIterator<Item = ImageReference>) -> Vec<ImageReference> {
    images
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Check a raw token against `registry-path/repository-path:tag` and parse it
pub fn validate_token(token: &str) -> Result<ImageReference> {
    if !token_pattern().is_match(token) {
        return Err(OicError::InvalidImageRef(format!(
            "{}: expected registry-path/repository-path:tag",
            token
        )));
    }
    ImageReference::parse(token)
}

/// Every value of an `image` key in a deployment descriptor, in document order
pub fn extract_image_tokens(document: &str) -> Vec<String> {
    match serde_yaml::from_str::<Value>(document) {
        Ok(value) => {
            let mut tokens = Vec::new();
            collect_image_values(&value, &mut tokens);
            tokens
        }
        Err(_) => scan_image_lines(document),
    }
}

fn collect_image_values(value: &Value, tokens: &mut Vec<String>) {
    match value {
        Value::Mapping(mapping) => {
            for (key, child) in mapping {
                if key.as_str() == Some("image") {
                    if let Some(token) = child.as_str() {
                        tokens.push(token.trim().to_string());
                        continue;
                    }
                }
                collect_image_values(child, tokens);
            }
        }
        Value::Sequence(items) => {
            for item in items {
                collect_image_values(item, tokens);
            }
        }
        Value::Tagged(tagged) => collect_image_values(&tagged.value, tokens),
        _ => {}
    }
}

/// Line-based fallback for descriptors that are not valid YAML
fn scan_image_lines(document: &str) -> Vec<String> {
    document
        .lines()
        .filter_map(|line| {
            let line = line.trim_start().trim_start_matches("- ");
            let rest = line.strip_prefix("image:")?;
            let token = rest.split_whitespace().next()?;
            let token = token.trim_matches(|c| c == '"' || c == '\'');
            if token.is_empty() {
                None
            } else {
                Some(token.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LogLevel, RunLog};
    use async_trait::async_trait;

    struct StaticSource {
        documents: Vec<ManifestDocument>,
    }

    #[async_trait]
    impl ManifestSource for StaticSource {
        fn describe(&self) -> String {
            "static".to_string()
        }

        async fn fetch(&self, _version: &Version) -> Result<Vec<ManifestDocument>> {
            Ok(self.documents.clone())
        }
    }

    struct OfflineSource;

    #[async_trait]
    impl ManifestSource for OfflineSource {
        fn describe(&self) -> String {
            "offline".to_string()
        }

        async fn fetch(&self, version: &Version) -> Result<Vec<ManifestDocument>> {
            Err(OicError::ManifestFetch(format!("no branch v{}", version)))
        }
    }

    const SWARM: &str = r#"
version: '3.6'
services:
  webapp:
    image: blackducksoftware/blackduck-webapp:2024.7.0
  nginx:
    image: "blackducksoftware/blackduck-nginx:2.0.82"
  cfssl:
    image: blackducksoftware/blackduck-cfssl:1.0.28
  scan:
    image: ${REGISTRY}/blackduck-scan
"#;

    const SWARM_EXTRA: &str = r#"
services:
  webapp:
    image: blackducksoftware/blackduck-webapp:2024.7.0
  bdba:
    image: sigsynopsys/bdba-worker:2024.6.1
"#;

    fn version() -> Version {
        Version::parse("2024.7.0").unwrap()
    }

    fn doc(name: &str, content: &str) -> ManifestDocument {
        ManifestDocument {
            name: name.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_extract_from_yaml() {
        let tokens = extract_image_tokens(SWARM);
        assert_eq!(
            tokens,
            vec![
                "blackducksoftware/blackduck-webapp:2024.7.0",
                "blackducksoftware/blackduck-nginx:2.0.82",
                "blackducksoftware/blackduck-cfssl:1.0.28",
                "${REGISTRY}/blackduck-scan",
            ]
        );
    }

    #[test]
    fn test_extract_falls_back_to_lines() {
        let broken = "services:\n  a:\n    image: ns/a:1\n  b: [unclosed\n    image: 'ns/b:2'\n";
        assert_eq!(extract_image_tokens(broken), vec!["ns/a:1", "ns/b:2"]);
    }

    #[test]
    fn test_validate_token() {
        assert!(validate_token("blackducksoftware/blackduck-webapp:2024.7.0").is_ok());
        assert!(validate_token("registry1.dso.mil/ironbank/app:1.0").is_ok());
        assert!(validate_token("alpine:3.18").is_err());
        assert!(validate_token("ns/app").is_err());
        assert!(validate_token("${REGISTRY}/app:1").is_err());
    }

    #[tokio::test]
    async fn test_manifest_mode_dedups_sorts_and_reports_rejects() {
        let log = RunLog::in_memory();
        let catalog = VersionCatalog::builtin();
        let source = StaticSource {
            documents: vec![doc("a.yml", SWARM), doc("b.yml", SWARM_EXTRA)],
        };
        let resolver = Resolver::manifest(&catalog, Box::new(source), &log);

        let resolution = resolver.resolve(&version()).await.unwrap();
        let names: Vec<String> = resolution.images.iter().map(|i| i.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "blackducksoftware/blackduck-cfssl:1.0.28",
                "blackducksoftware/blackduck-nginx:2.0.82",
                "blackducksoftware/blackduck-webapp:2024.7.0",
                "sigsynopsys/bdba-worker:2024.6.1",
            ]
        );
        assert_eq!(resolution.rejected.len(), 1);
        assert_eq!(resolution.rejected[0].token, "${REGISTRY}/blackduck-scan");

        let errors: Vec<_> = log
            .entries()
            .into_iter()
            .filter(|e| e.level == LogLevel::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("${REGISTRY}/blackduck-scan"));
    }

    #[tokio::test]
    async fn test_manifest_fetch_failure_is_fatal() {
        let log = RunLog::in_memory();
        let catalog = VersionCatalog::builtin();
        let resolver = Resolver::manifest(&catalog, Box::new(OfflineSource), &log);

        assert!(matches!(
            resolver.resolve(&version()).await,
            Err(OicError::ManifestFetch(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_version_is_rejected_before_fetch() {
        let log = RunLog::in_memory();
        let catalog = VersionCatalog::builtin();
        let resolver = Resolver::manifest(&catalog, Box::new(OfflineSource), &log);

        let unknown = Version::parse("2019.1.0").unwrap();
        assert!(matches!(
            resolver.resolve(&unknown).await,
            Err(OicError::VersionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_catalog_mode() {
        let log = RunLog::in_memory();
        let catalog = VersionCatalog::from_document(
            "2024.7.0: [worker-A:1.0, core-a:1.0, ubi-core-a:1.0, core-a:1.0]",
        )
        .unwrap();
        let resolution = Resolver::catalog(&catalog, &log)
            .resolve(&version())
            .await
            .unwrap();
        let names: Vec<String> = resolution.images.iter().map(|i| i.to_string()).collect();
        assert_eq!(names, vec!["core-a:1.0", "ubi-core-a:1.0", "worker-A:1.0"]);
        assert!(resolution.rejected.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_mode_needs_pinned_images() {
        let log = RunLog::in_memory();
        let catalog = VersionCatalog::builtin();
        assert!(matches!(
            Resolver::catalog(&catalog, &log).resolve(&version()).await,
            Err(OicError::Config(_))
        ));
    }
}
