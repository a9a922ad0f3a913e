//! oic - offline image collector
//!
//! Resolves a product version to its container images, pulls them through an
//! existing container tool, saves each one to a tar archive and bundles the
//! archives into a single transport file for air-gapped installs.

pub mod bundle;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod image;
pub mod log;
pub mod pipeline;
pub mod registry;
pub mod resolve;
pub mod retry;
pub mod storage;
pub mod tool;

use thiserror::Error;

/// Main error type for oic operations
#[derive(Error, Debug)]
pub enum OicError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid image reference: {0}")]
    InvalidImageRef(String),

    #[error("Invalid version '{0}': expected YYYY.N.N (e.g. 2024.7.0)")]
    InvalidVersion(String),

    #[error("Version {0} not found in the catalog")]
    VersionNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to retrieve deployment manifest: {0}")]
    ManifestFetch(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("`{program} {command}` failed (exit code {code:?}): {stderr}")]
    Tool {
        program: String,
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Missing required tools: {0}")]
    MissingTool(String),

    #[error("Bundle error: {0}")]
    Bundle(String),
}

pub type Result<T> = std::result::Result<T, OicError>;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "oic";
