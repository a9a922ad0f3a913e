//! `oic bundle` command implementation

use super::login::RegistryArgs;
use super::resolve::{FilterArgs, SourceArgs};
use crate::bundle::{ArchiveTool, BundleOutput, Bundler};
use crate::catalog::Version;
use crate::config::{
    BundleConfig, DEFAULT_CONTAINER_TOOL, DEFAULT_PULL_ATTEMPTS, DEFAULT_VERSION,
};
use crate::log::{EventSink, RunLog};
use crate::pipeline::{FetchPipeline, PullReport};
use crate::registry::RegistrySession;
use crate::retry::RetryPolicy;
use crate::storage::WorkPaths;
use crate::tool::{probe, DockerCli};
use crate::OicError;
use clap::Args;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Arguments for the `bundle` command
#[derive(Args)]
pub struct BundleArgs {
    /// Product version (YYYY.N.N)
    #[arg(default_value = DEFAULT_VERSION)]
    pub version: String,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    #[command(flatten)]
    pub registry: RegistryArgs,

    /// Working directory for archives, the bundle and the run log
    #[arg(long, env = "OIC_WORKDIR", default_value = ".")]
    pub workdir: PathBuf,

    /// Container CLI used for pull, save and login
    #[arg(long, env = "OIC_CONTAINER_TOOL", default_value = DEFAULT_CONTAINER_TOOL)]
    pub container_tool: String,

    /// Program that builds the bundle
    #[arg(long, value_enum, default_value_t = ArchiveTool::Tar)]
    pub archive_tool: ArchiveTool,

    /// Pull attempts per image
    #[arg(long, default_value_t = DEFAULT_PULL_ATTEMPTS)]
    pub retries: u32,

    /// Seconds to wait between attempts
    #[arg(long, default_value_t = 5)]
    pub retry_delay: u64,

    /// Delete the per-image archives once they are in the bundle
    #[arg(long)]
    pub prune_archives: bool,
}

impl BundleArgs {
    pub fn config(&self) -> BundleConfig {
        BundleConfig {
            version: self.version.clone(),
            workdir: self.workdir.clone(),
            catalog: self.source.catalog.clone(),
            manifest: self.source.location(),
            criteria: self.filter.criteria(),
            container_tool: self.container_tool.clone(),
            archive_tool: self.archive_tool,
            restricted: self.registry.target(),
            retry: RetryPolicy::new(self.retries, Duration::from_secs(self.retry_delay)),
            prune_archives: self.prune_archives,
        }
    }
}

/// Execute the `bundle` command
pub async fn execute(args: BundleArgs) -> anyhow::Result<()> {
    let config = args.config();
    let paths = WorkPaths::new(&config.workdir);
    let log = RunLog::to_file(paths.run_log());
    log.info(&format!("Starting {} {}.", crate::APP_NAME, crate::VERSION));
    super::logged(
        &log,
        &format!("Failed to prepare working directory {}", paths.root().display()),
        paths.ensure_directories(),
    )?;
    for removed in paths
        .clean_previous_outputs()
        .into_iter()
        .chain(paths.clean_intermediates())
    {
        log.info(&format!("Removed leftover {}", removed.display()));
    }

    let result = run(&config, &args.registry, &paths, &log).await;
    for removed in paths.clean_intermediates() {
        log.info(&format!("Cleaned up {}", removed.display()));
    }

    let (report, output) = result?;
    print_summary(&report, &output);
    Ok(())
}

async fn run(
    config: &BundleConfig,
    registry: &RegistryArgs,
    paths: &WorkPaths,
    log: &RunLog,
) -> anyhow::Result<(PullReport, BundleOutput)> {
    let version = super::logged(log, "Invalid version", Version::parse(&config.version))?;
    log.info(&format!("Selected version: {}", version));

    let catalog = super::logged(
        log,
        "Failed to load the version catalog",
        super::load_catalog(config.catalog.as_deref()),
    )?;

    let tools = probe::check(&config.required_tools(), log).await;
    super::logged(log, "Tool check failed", tools.require())?;

    let resolver = super::logged(
        log,
        "Failed to set up the manifest source",
        super::build_resolver(&config.manifest, &catalog, paths.manifest_checkout(), log),
    )?;
    let resolution = super::logged(
        log,
        &format!("Failed to resolve images for {}", version),
        resolver.resolve(&version).await,
    )?;
    let listing: String = resolution
        .images
        .iter()
        .map(|image| format!("{}\n", image))
        .collect();
    super::logged(
        log,
        &format!("Failed to write {}", paths.resolved_images().display()),
        fs::write(paths.resolved_images(), listing).map_err(OicError::from),
    )?;

    let selected = super::select_images(&resolution.images, &config.criteria, log);

    let tool = DockerCli::new(&config.container_tool);
    let session = if config.criteria.include_hardened_variant {
        let credentials = super::logged(log, "Missing registry credentials", registry.credentials(log))?;
        let session = RegistrySession::authenticate(&tool, config.restricted.clone(), &credentials, log).await?;
        Some(session)
    } else {
        None
    };

    let pipeline = FetchPipeline::new(&tool, paths.archives_dir(), log)
        .with_retry(config.retry)
        .with_hardened_marker(config.restricted.marker.clone());
    let report = super::logged(
        log,
        "Failed to prepare the archives directory",
        pipeline.run(&selected, session.as_ref()).await,
    )?;

    let bundler = Bundler::new(config.archive_tool, paths.bundle(), paths.bundle_checksum(), log);
    let manifest = report.manifest();
    let output = bundler.bundle(&manifest).await?;

    if config.prune_archives {
        for archive in manifest.files() {
            if fs::remove_file(archive).is_ok() {
                log.info(&format!("Removed {}", archive.display()));
            }
        }
    }

    Ok((report, output))
}

fn print_summary(report: &PullReport, output: &BundleOutput) {
    println!();
    println!(
        "Archived {}/{} images into {}",
        report.succeeded(),
        report.requested(),
        output.path.display()
    );
    println!("SHA-256: {}", output.digest);

    if !report.is_complete() {
        eprintln!("WARNING: {} images could not be collected:", report.failed());
        for failure in report.failures() {
            eprintln!("  {}", failure.pulled_reference());
        }
    }

    println!();
    println!("To load the images on the air-gapped host:");
    println!("  1. Copy images.tar.gz and images.tar.gz.sha256 to the host");
    println!("  2. sha256sum -c images.tar.gz.sha256");
    println!("  3. tar xvf images.tar.gz");
    println!("  4. for i in $(ls *.tar); do docker load -i $i; done");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::config::ManifestLocation;
    use clap::Parser;

    fn bundle_args(extra: &[&str]) -> BundleArgs {
        let mut argv = vec!["oic", "bundle"];
        argv.extend_from_slice(extra);
        let cli = Cli::try_parse_from(argv).unwrap();
        let Commands::Bundle(args) = cli.command else {
            panic!("expected bundle");
        };
        args
    }

    #[test]
    fn test_config_from_flags() {
        let args = bundle_args(&[
            "2024.1.1",
            "--mode",
            "catalog",
            "--catalog",
            "catalog.yml",
            "--with-bdba",
            "--archive-tool",
            "7z",
            "--retries",
            "5",
            "--retry-delay",
            "0",
            "--workdir",
            "/tmp/oic",
            "--prune-archives",
        ]);
        let config = args.config();

        assert_eq!(config.version, "2024.1.1");
        assert_eq!(config.manifest, ManifestLocation::Catalog);
        assert_eq!(config.catalog, Some(PathBuf::from("catalog.yml")));
        assert!(config.criteria.include_extra_worker_a);
        assert!(!config.criteria.include_hardened_variant);
        assert_eq!(config.archive_tool, ArchiveTool::SevenZip);
        assert_eq!(config.retry, RetryPolicy::new(5, Duration::ZERO));
        assert_eq!(config.workdir, PathBuf::from("/tmp/oic"));
        assert!(config.prune_archives);
    }

    #[test]
    fn test_defaults_match_config_defaults() {
        let config = bundle_args(&[]).config();
        let defaults = BundleConfig::default();
        assert_eq!(config.version, defaults.version);
        assert_eq!(config.retry, defaults.retry);
        assert_eq!(config.restricted, defaults.restricted);
        assert_eq!(config.archive_tool, defaults.archive_tool);
    }

    #[tokio::test]
    async fn test_catalog_failure_reaches_run_log() {
        let tmp = tempfile::TempDir::new().unwrap();
        let missing = tmp.path().join("missing-catalog.yml");
        let args = bundle_args(&[
            "2024.7.0",
            "--mode",
            "catalog",
            "--catalog",
            missing.to_str().unwrap(),
        ]);
        let config = args.config();
        let paths = WorkPaths::new(tmp.path());
        let log = RunLog::to_file(paths.run_log());

        let err = run(&config, &args.registry, &paths, &log).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OicError>(),
            Some(OicError::Config(_))
        ));

        let persisted = RunLog::load(paths.run_log()).unwrap();
        assert!(persisted.logs.iter().any(|e| {
            e.level == crate::log::LogLevel::Error
                && e.message.starts_with("Failed to load the version catalog")
                && e.message.contains("missing-catalog.yml")
        }));
    }

    #[test]
    fn test_rejects_unknown_archive_tool() {
        assert!(Cli::try_parse_from(["oic", "bundle", "--archive-tool", "zip"]).is_err());
    }
}
