//! Packs the per-image archives of a run into one gzip-compressed tarball

use crate::log::EventSink;
use crate::pipeline::ArchiveManifest;
use crate::{OicError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Program used to produce the bundle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ArchiveTool {
    /// Built-in tar and gzip
    #[default]
    Tar,
    /// External 7-Zip binary
    #[value(name = "7z")]
    SevenZip,
}

impl fmt::Display for ArchiveTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tar => f.write_str("tar"),
            Self::SevenZip => f.write_str("7z"),
        }
    }
}

/// What a successful bundle produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOutput {
    pub path: PathBuf,
    /// Hex SHA-256 of the bundle
    pub digest: String,
    pub checksum_path: PathBuf,
    /// Archives packed, by file name
    pub entries: Vec<String>,
}

/// Writes `images.tar.gz` and its checksum file
pub struct Bundler<'a> {
    tool: ArchiveTool,
    output: PathBuf,
    checksum: PathBuf,
    sink: &'a dyn EventSink,
}

impl<'a> Bundler<'a> {
    pub fn new(
        tool: ArchiveTool,
        output: impl AsRef<Path>,
        checksum: impl AsRef<Path>,
        sink: &'a dyn EventSink,
    ) -> Self {
        Self {
            tool,
            output: output.as_ref().to_path_buf(),
            checksum: checksum.as_ref().to_path_buf(),
            sink,
        }
    }

    /// Bundle exactly the archives in `manifest`.
    ///
    /// An empty manifest still yields a valid, empty archive. On failure the
    /// partial output is removed.
    pub async fn bundle(&self, manifest: &ArchiveManifest) -> Result<BundleOutput> {
        let entries = entry_names(manifest)?;
        if let Some(parent) = self.output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        if manifest.is_empty() {
            self.sink
                .warn("No image archives to bundle; writing an empty archive.");
        }
        self.sink.info(&format!(
            "Bundling {} archives into {} with {}.",
            manifest.len(),
            self.output.display(),
            self.tool
        ));

        let written = match self.tool {
            ArchiveTool::Tar => write_tar_gz(manifest, &self.output),
            ArchiveTool::SevenZip => self.write_with_seven_zip(manifest).await,
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&self.output);
            let err = match e {
                OicError::Bundle(_) | OicError::MissingTool(_) => e,
                other => OicError::Bundle(other.to_string()),
            };
            self.sink.error(&format!("Failed to create {}: {}", self.output.display(), err));
            return Err(err);
        }

        let digest = compute_digest(&self.output)?;
        let file_name = file_name_of(&self.output)?;
        fs::write(&self.checksum, format!("{}  {}\n", digest, file_name))?;

        self.sink.info(&format!(
            "Created {} (sha256 {}).",
            self.output.display(),
            digest
        ));

        Ok(BundleOutput {
            path: self.output.clone(),
            digest,
            checksum_path: self.checksum.clone(),
            entries,
        })
    }

    /// `7z a -ttar` into an inner tar, then `7z a -tgzip` over it
    async fn write_with_seven_zip(&self, manifest: &ArchiveManifest) -> Result<()> {
        let inner = self.output.with_extension("");
        if inner.exists() {
            fs::remove_file(&inner)?;
        }
        if self.output.exists() {
            fs::remove_file(&self.output)?;
        }

        let result = async {
            if manifest.is_empty() {
                // 7z refuses to create an archive from nothing
                let file = File::create(&inner)?;
                tar::Builder::new(file).into_inner()?;
            } else {
                let mut args = vec!["a".to_string(), "-ttar".to_string(), path_arg(&inner)];
                args.extend(manifest.files().iter().map(|f| path_arg(f)));
                run_seven_zip(&args).await?;
            }
            run_seven_zip(&[
                "a".to_string(),
                "-tgzip".to_string(),
                path_arg(&self.output),
                path_arg(&inner),
            ])
            .await
        }
        .await;

        let _ = fs::remove_file(&inner);
        result
    }
}

/// Archive entry names; two archives with the same file name cannot share a bundle
fn entry_names(manifest: &ArchiveManifest) -> Result<Vec<String>> {
    let mut names = Vec::with_capacity(manifest.len());
    for file in manifest.files() {
        let name = file_name_of(file)?;
        if names.contains(&name) {
            return Err(OicError::Bundle(format!("duplicate archive name {}", name)));
        }
        names.push(name);
    }
    Ok(names)
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| OicError::Bundle(format!("{} has no file name", path.display())))
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Write a gzip-compressed tar holding every archive at its top level
fn write_tar_gz(manifest: &ArchiveManifest, output: &Path) -> Result<()> {
    let file = File::create(output)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for archive in manifest.files() {
        if !archive.is_file() {
            return Err(OicError::Bundle(format!(
                "archive {} is missing",
                archive.display()
            )));
        }
        builder.append_path_with_name(archive, file_name_of(archive)?)?;
    }

    builder.into_inner()?.finish()?;
    Ok(())
}

async fn run_seven_zip(args: &[String]) -> Result<()> {
    let output = Command::new("7z")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => OicError::MissingTool("7z".to_string()),
            _ => OicError::Io(e),
        })?;

    if !output.status.success() {
        return Err(OicError::Tool {
            program: "7z".to_string(),
            command: args.first().cloned().unwrap_or_default(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Hex SHA-256 of a file
pub fn compute_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
