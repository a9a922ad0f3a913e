//! CLI command definitions and handlers

pub mod bundle;
pub mod check;
pub mod login;
pub mod resolve;
pub mod versions;

use crate::catalog::VersionCatalog;
use crate::config::ManifestLocation;
use crate::image::{FilterCriteria, FilterMarkers, ImageFilter, ImageReference};
use crate::log::EventSink;
use crate::resolve::{GitManifestSource, Resolver, UrlManifestSource};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// oic - collect a product's container images into one archive for offline installs
#[derive(Parser)]
#[command(name = "oic")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Resolve, pull, save and bundle the images of a version
    Bundle(bundle::BundleArgs),

    /// Print the image list a version resolves to
    Resolve(resolve::ResolveArgs),

    /// List supported versions
    Versions(versions::VersionsArgs),

    /// Log in to the restricted registry and store the credentials
    Login(login::LoginArgs),

    /// Check that the required external tools are installed
    Check(check::CheckArgs),
}

/// Record a failed step in the run log and attach the step to the error
pub(crate) fn logged<T>(
    sink: &dyn EventSink,
    context: &str,
    result: crate::Result<T>,
) -> anyhow::Result<T> {
    result.map_err(|e| {
        sink.error(&format!("{}: {}", context, e));
        anyhow::Error::new(e).context(context.to_string())
    })
}

/// Catalog document when given, else the built-in version table
pub(crate) fn load_catalog(path: Option<&Path>) -> crate::Result<VersionCatalog> {
    match path {
        Some(path) => VersionCatalog::load(path),
        None => Ok(VersionCatalog::builtin()),
    }
}

/// Resolver for a manifest location; git checkouts go to `checkout_dir`
pub(crate) fn build_resolver<'a>(
    location: &ManifestLocation,
    catalog: &'a VersionCatalog,
    checkout_dir: PathBuf,
    sink: &'a dyn EventSink,
) -> crate::Result<Resolver<'a>> {
    let resolver = match location {
        ManifestLocation::Catalog => Resolver::catalog(catalog, sink),
        ManifestLocation::Git {
            repo_url,
            descriptor_dir,
        } => Resolver::manifest(
            catalog,
            Box::new(GitManifestSource::new(
                repo_url.clone(),
                descriptor_dir.clone(),
                checkout_dir,
            )),
            sink,
        ),
        ManifestLocation::Url(template) => Resolver::manifest(
            catalog,
            Box::new(UrlManifestSource::new(template.clone())?),
            sink,
        ),
    };
    Ok(resolver)
}

/// Apply the feature flags, warning about images claimed by several markers
pub(crate) fn select_images(
    images: &[ImageReference],
    criteria: &FilterCriteria,
    sink: &dyn EventSink,
) -> Vec<ImageReference> {
    let filter = ImageFilter::new(FilterMarkers::default());
    for overlap in filter.overlaps(images) {
        let names: Vec<&str> = overlap.categories.iter().map(|c| c.as_str()).collect();
        sink.warn(&format!(
            "{} matches several image groups ({}); treating it as {}",
            overlap.image,
            names.join(", "),
            overlap.chosen.as_str()
        ));
    }

    let selected = filter.apply(images, criteria);
    sink.info(&format!(
        "Selected {} of {} images (bdba worker: {}, rl service: {}, hardened: {}).",
        selected.len(),
        images.len(),
        criteria.include_extra_worker_a,
        criteria.include_extra_worker_b,
        criteria.include_hardened_variant
    ));
    selected
}
