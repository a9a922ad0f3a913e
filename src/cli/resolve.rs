//! `oic resolve` command implementation

use crate::catalog::Version;
use crate::config::{ManifestLocation, DEFAULT_DESCRIPTOR_DIR, DEFAULT_MANIFEST_REPO, DEFAULT_VERSION};
use crate::image::FilterCriteria;
use crate::log::RunLog;
use crate::storage::WorkPaths;
use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// How a version is turned into an image list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ResolveMode {
    /// Images pinned in the catalog document
    Catalog,
    /// Images referenced by the version's deployment descriptors
    #[default]
    Manifest,
}

/// Where image lists come from
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Version catalog document (YAML or JSON); built-in version table when omitted
    #[arg(long, env = "OIC_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Resolution mode
    #[arg(long, value_enum, default_value_t = ResolveMode::Manifest)]
    pub mode: ResolveMode,

    /// Git repository holding the deployment descriptors
    #[arg(long, default_value = DEFAULT_MANIFEST_REPO)]
    pub manifest_repo: String,

    /// Descriptor directory inside the repository
    #[arg(long, default_value = DEFAULT_DESCRIPTOR_DIR)]
    pub descriptor_dir: String,

    /// Fetch a single descriptor from this URL instead of cloning ({version} is substituted)
    #[arg(long)]
    pub manifest_url: Option<String>,
}

impl SourceArgs {
    pub fn location(&self) -> ManifestLocation {
        match (self.mode, &self.manifest_url) {
            (ResolveMode::Catalog, _) => ManifestLocation::Catalog,
            (ResolveMode::Manifest, Some(url)) => ManifestLocation::Url(url.clone()),
            (ResolveMode::Manifest, None) => ManifestLocation::Git {
                repo_url: self.manifest_repo.clone(),
                descriptor_dir: self.descriptor_dir.clone(),
            },
        }
    }
}

/// Optional image groups
#[derive(Args, Debug, Clone, Copy)]
pub struct FilterArgs {
    /// Include the binary analysis worker images
    #[arg(long)]
    pub with_bdba: bool,

    /// Include the Reversing Labs service images
    #[arg(long)]
    pub with_rl: bool,

    /// Collect the hardened (UBI) images from the restricted registry instead of the standard ones
    #[arg(long)]
    pub ubi: bool,
}

impl FilterArgs {
    pub fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            include_extra_worker_a: self.with_bdba,
            include_extra_worker_b: self.with_rl,
            include_hardened_variant: self.ubi,
        }
    }
}

/// Arguments for the `resolve` command
#[derive(Args)]
pub struct ResolveArgs {
    /// Product version (YYYY.N.N)
    #[arg(default_value = DEFAULT_VERSION)]
    pub version: String,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Print the full resolved list, ignoring the filter flags
    #[arg(long)]
    pub all: bool,

    /// Working directory for the descriptor checkout
    #[arg(long, env = "OIC_WORKDIR", default_value = ".")]
    pub workdir: PathBuf,
}

/// Execute the `resolve` command
pub async fn execute(args: ResolveArgs) -> anyhow::Result<()> {
    let log = RunLog::in_memory();
    let version = super::logged(&log, "Invalid version", Version::parse(&args.version))?;
    let catalog = super::load_catalog(args.source.catalog.as_deref())?;

    let paths = WorkPaths::new(&args.workdir);
    let resolver = super::build_resolver(
        &args.source.location(),
        &catalog,
        paths.manifest_checkout(),
        &log,
    )?;
    let resolved = resolver.resolve(&version).await;
    paths.clean_intermediates();
    let resolution = super::logged(&log, &format!("Failed to resolve {}", version), resolved)?;

    let images = if args.all {
        resolution.images
    } else {
        super::select_images(&resolution.images, &args.filter.criteria(), &log)
    };
    for image in &images {
        println!("{}", image);
    }

    if !resolution.rejected.is_empty() {
        eprintln!(
            "{} invalid image references were skipped",
            resolution.rejected.len()
        );
    }

    Ok(())
}
