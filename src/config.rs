//! Built-in defaults for a collection run
//!
//! Everything here can be overridden from the command line; these values
//! describe the Black Duck deployment bundle the tool was written for.

use crate::bundle::ArchiveTool;
use crate::image::FilterCriteria;
use crate::registry::RestrictedRegistry;
use crate::retry::RetryPolicy;
use crate::tool::Tool;
use std::path::PathBuf;
use std::time::Duration;

/// Version used when none is given on the command line
pub const DEFAULT_VERSION: &str = "2024.7.0";

/// Repository whose `v<version>` branches carry the deployment descriptors
pub const DEFAULT_MANIFEST_REPO: &str = "https://github.com/blackducksoftware/hub.git";

/// Directory inside the manifest repository holding the descriptors
pub const DEFAULT_DESCRIPTOR_DIR: &str = "docker-swarm";

/// Restricted registry serving the hardened images
pub const DEFAULT_RESTRICTED_REGISTRY: &str = "registry1.dso.mil";

/// Namespace prefix of the hardened images on the restricted registry
pub const DEFAULT_RESTRICTED_NAMESPACE: &str = "ironbank/synopsys/blackduck";

/// Container CLI used for pull, save and login
pub const DEFAULT_CONTAINER_TOOL: &str = "docker";

/// Marker identifying hardened-base-image variants
pub const HARDENED_MARKER: &str = "ubi";

/// Marker identifying the first optional worker (binary analysis)
pub const WORKER_A_MARKER: &str = "bdba-worker";

/// Marker identifying the second optional worker (Reversing Labs)
pub const WORKER_B_MARKER: &str = "rl-service";

/// Pull attempts per image
pub const DEFAULT_PULL_ATTEMPTS: u32 = 3;

/// Delay between pull attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Environment variable consulted for the restricted registry secret
pub const SECRET_ENV: &str = "OIC_REGISTRY_SECRET";

/// Where the image list of a run comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestLocation {
    /// Images pinned in the catalog
    Catalog,
    /// `v<version>` branch of a git repository
    Git {
        repo_url: String,
        descriptor_dir: String,
    },
    /// Single descriptor at a URL, `{version}` substituted
    Url(String),
}

impl Default for ManifestLocation {
    fn default() -> Self {
        Self::Git {
            repo_url: DEFAULT_MANIFEST_REPO.to_string(),
            descriptor_dir: DEFAULT_DESCRIPTOR_DIR.to_string(),
        }
    }
}

/// Settings of one `oic bundle` run
#[derive(Debug, Clone)]
pub struct BundleConfig {
    pub version: String,
    pub workdir: PathBuf,
    /// Version catalog document; the built-in table when unset
    pub catalog: Option<PathBuf>,
    pub manifest: ManifestLocation,
    pub criteria: FilterCriteria,
    pub container_tool: String,
    pub archive_tool: ArchiveTool,
    pub restricted: RestrictedRegistry,
    pub retry: RetryPolicy,
    /// Remove per-image archives once they are bundled
    pub prune_archives: bool,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            workdir: PathBuf::from("."),
            catalog: None,
            manifest: ManifestLocation::default(),
            criteria: FilterCriteria::default(),
            container_tool: DEFAULT_CONTAINER_TOOL.to_string(),
            archive_tool: ArchiveTool::default(),
            restricted: RestrictedRegistry::default(),
            retry: RetryPolicy::default(),
            prune_archives: false,
        }
    }
}

impl BundleConfig {
    /// External tools this run cannot start without
    pub fn required_tools(&self) -> Vec<Tool> {
        let mut tools = vec![Tool::Container(self.container_tool.clone())];
        if matches!(self.manifest, ManifestLocation::Git { .. }) {
            tools.push(Tool::Git);
        }
        if self.archive_tool == ArchiveTool::SevenZip {
            tools.push(Tool::SevenZip);
        }
        tools
    }
}
