//! Version catalog: supported product versions and their image sets

use crate::image::ImageReference;
use crate::{OicError, Result};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

/// Product versions supported out of the box, newest first
const BUILTIN_VERSIONS: &[&str] = &[
    "2024.7.0", "2024.4.1", "2024.4.0", "2024.1.1", "2024.1.0", "2023.7.3", "2023.7.2",
    "2023.7.1", "2023.7.0", "2023.4.2", "2023.4.1", "2023.4.0", "2023.1.2", "2023.1.1",
    "2023.1.0",
];

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})\.(\d)\.(\d)$").expect("version pattern is a valid regex")
    })
}

/// Product version of the form `YYYY.N.N`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    year: u16,
    minor: u8,
    patch: u8,
}

impl Version {
    /// Validate and normalize user input. Anything but `YYYY.N.N` is rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let captures = version_pattern()
            .captures(trimmed)
            .ok_or_else(|| OicError::InvalidVersion(trimmed.to_string()))?;

        let field = |i: usize| -> Result<u16> {
            captures[i]
                .parse()
                .map_err(|_| OicError::InvalidVersion(trimmed.to_string()))
        };

        Ok(Self {
            year: field(1)?,
            minor: field(2)? as u8,
            patch: field(3)? as u8,
        })
    }

    pub fn year(&self) -> u16 {
        self.year
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}.{}.{}", self.year, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = OicError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Maps versions to their ordered image sets
#[derive(Debug, Clone, Default)]
pub struct VersionCatalog {
    entries: BTreeMap<Version, Vec<ImageReference>>,
}

impl VersionCatalog {
    /// Built-in list of supported versions, without pinned images
    pub fn builtin() -> Self {
        let entries = BUILTIN_VERSIONS
            .iter()
            .filter_map(|v| Version::parse(v).ok())
            .map(|v| (v, Vec::new()))
            .collect();
        Self { entries }
    }

    /// Load a catalog document of the form `{version: [image, ...]}` (YAML or JSON)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OicError::Config(format!("Failed to read catalog {}: {}", path.display(), e))
        })?;
        Self::from_document(&raw).map_err(|e| match e {
            OicError::Config(msg) => {
                OicError::Config(format!("Invalid catalog {}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse a catalog document
    pub fn from_document(raw: &str) -> Result<Self> {
        let document: BTreeMap<String, Vec<String>> =
            serde_yaml::from_str(raw).map_err(|e| OicError::Config(e.to_string()))?;

        let mut entries = BTreeMap::new();
        for (version, images) in document {
            let parsed = Version::parse(&version)
                .map_err(|_| OicError::Config(format!("bad version key '{}'", version)))?;

            let mut seen = HashSet::new();
            let mut ordered = Vec::with_capacity(images.len());
            for image in images {
                let reference = ImageReference::parse(&image).map_err(|e| {
                    OicError::Config(format!("version {}: {}", parsed, e))
                })?;
                if seen.insert(reference.clone()) {
                    ordered.push(reference);
                }
            }
            entries.insert(parsed, ordered);
        }

        if entries.is_empty() {
            return Err(OicError::Config("catalog lists no versions".to_string()));
        }
        Ok(Self { entries })
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.entries.contains_key(version)
    }

    /// Images pinned for a version
    pub fn lookup(&self, version: &Version) -> Result<&[ImageReference]> {
        self.entries
            .get(version)
            .map(|images| images.as_slice())
            .ok_or_else(|| OicError::VersionNotFound(version.to_string()))
    }

    /// Known versions, newest first
    pub fn versions(&self) -> Vec<Version> {
        self.entries.keys().rev().copied().collect()
    }

    /// Versions laid out in rows of `columns`, newest first
    pub fn display_rows(&self, columns: usize) -> Vec<Vec<Version>> {
        self.versions()
            .chunks(columns.max(1))
            .map(|row| row.to_vec())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_valid_versions() {
        let version = Version::parse(" 2024.7.0 ").unwrap();
        assert_eq!(version.to_string(), "2024.7.0");
        assert_eq!(version.year(), 2024);
    }

    #[test]
    fn test_rejects_malformed_versions() {
        for input in [
            "", "2024", "2024.7", "24.7.0", "2024.10.0", "2024.7.10", "v2024.7.0",
            "2024.7.0-ubi", "2024.7.0 extra", "list", "2024-7-0",
        ] {
            assert!(
                matches!(Version::parse(input), Err(OicError::InvalidVersion(_))),
                "accepted {:?}",
                input
            );
        }
    }

    #[test]
    fn test_versions_order_numerically() {
        let older = Version::parse("2023.7.3").unwrap();
        let newer = Version::parse("2024.1.0").unwrap();
        assert!(older < newer);
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = VersionCatalog::builtin();
        assert_eq!(catalog.len(), BUILTIN_VERSIONS.len());

        let latest = Version::parse("2024.7.0").unwrap();
        assert!(catalog.contains(&latest));
        assert_eq!(catalog.versions()[0], latest);
        assert!(catalog.lookup(&latest).unwrap().is_empty());

        let unknown = Version::parse("2019.1.0").unwrap();
        assert!(matches!(
            catalog.lookup(&unknown),
            Err(OicError::VersionNotFound(_))
        ));
    }

    #[test]
    fn test_from_document_keeps_order_and_dedups() {
        let catalog = VersionCatalog::from_document(
            "2024.7.0:\n  - core-a:1.0\n  - worker-A:1.0\n  - core-a:1.0\n  - ubi-core-a:1.0\n",
        )
        .unwrap();
        let images: Vec<String> = catalog
            .lookup(&Version::parse("2024.7.0").unwrap())
            .unwrap()
            .iter()
            .map(|i| i.to_string())
            .collect();
        assert_eq!(images, vec!["core-a:1.0", "worker-A:1.0", "ubi-core-a:1.0"]);
    }

    #[test]
    fn test_from_document_accepts_json() {
        let catalog =
            VersionCatalog::from_document(r#"{"2024.4.1": ["ns/a:1"], "2024.7.0": []}"#).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.versions()[0].to_string(), "2024.7.0");
    }

    #[test]
    fn test_from_document_rejects_bad_content() {
        assert!(matches!(
            VersionCatalog::from_document("2024.7: [a:1]"),
            Err(OicError::Config(_))
        ));
        assert!(matches!(
            VersionCatalog::from_document("2024.7.0: [no-tag]"),
            Err(OicError::Config(_))
        ));
        assert!(matches!(
            VersionCatalog::from_document("- just\n- a list\n"),
            Err(OicError::Config(_))
        ));
        assert!(matches!(
            VersionCatalog::from_document("{}"),
            Err(OicError::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let err = VersionCatalog::load(tmp.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err, OicError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog.yaml");
        std::fs::write(&path, "2024.7.0:\n  - core-a:1.0\n").unwrap();
        let catalog = VersionCatalog::load(&path).unwrap();
        assert!(catalog.contains(&Version::parse("2024.7.0").unwrap()));
    }

    #[test]
    fn test_display_rows_fill_columns() {
        let catalog = VersionCatalog::builtin();
        let rows = catalog.display_rows(4);
        // 15 versions in 4 columns: 4 rows, last row short
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].len(), 4);
        assert_eq!(rows[3].len(), 3);
        assert_eq!(rows[0][0].to_string(), "2024.7.0");
        assert_eq!(rows[0][1].to_string(), "2024.4.1");
        assert_eq!(rows[1][0].to_string(), "2024.1.0");
    }
}
