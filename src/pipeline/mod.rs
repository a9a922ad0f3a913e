//! Fetch-and-persist: pull every selected image and save it to its own archive
//!
//! Images are processed strictly in order. A failed image is recorded and
//! the batch moves on; nothing short of being unable to create the archives
//! directory stops a run here.

use crate::config::HARDENED_MARKER;
use crate::image::ImageReference;
use crate::log::EventSink;
use crate::registry::RegistrySession;
use crate::retry::RetryPolicy;
use crate::storage::paths::ARCHIVE_SUFFIX;
use crate::tool::ContainerTool;
use crate::Result;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// What happened to one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    Success { archive: PathBuf },
    Failed { reason: String },
}

/// Per-image record of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullResult {
    /// Reference as resolved
    pub reference: ImageReference,
    /// Reference actually pulled, when the session rewrote it
    pub rewritten_reference: Option<ImageReference>,
    pub outcome: PullOutcome,
    /// Pull attempts made
    pub attempts: u32,
}

impl PullResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PullOutcome::Success { .. })
    }

    /// Reference handed to the container tool
    pub fn pulled_reference(&self) -> &ImageReference {
        self.rewritten_reference.as_ref().unwrap_or(&self.reference)
    }

    pub fn archive(&self) -> Option<&Path> {
        match self.outcome {
            PullOutcome::Success { ref archive } => Some(archive),
            PullOutcome::Failed { .. } => None,
        }
    }
}

/// Archives written by this run, in pull order. Input of the bundler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveManifest {
    files: Vec<PathBuf>,
}

impl ArchiveManifest {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Results of a whole batch
#[derive(Debug, Clone, Default)]
pub struct PullReport {
    pub results: Vec<PullResult>,
}

impl PullReport {
    pub fn requested(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.requested() - self.succeeded()
    }

    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &PullResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    /// The definitive list of archives produced, for the bundler
    pub fn manifest(&self) -> ArchiveManifest {
        ArchiveManifest::new(
            self.results
                .iter()
                .filter_map(|r| r.archive().map(Path::to_path_buf))
                .collect(),
        )
    }
}

/// Archive file name for an image: `<repository>.tar`, or
/// `<repository>-<tag>.tar` when the tag marks a hardened variant so both
/// variants of one repository can sit side by side.
pub fn archive_file_name(image: &ImageReference, hardened_marker: &str) -> String {
    if !hardened_marker.is_empty() && image.tag().contains(hardened_marker) {
        format!("{}-{}.{}", image.repository(), image.tag(), ARCHIVE_SUFFIX)
    } else {
        format!("{}.{}", image.repository(), ARCHIVE_SUFFIX)
    }
}

/// Sequential pull-and-save over a filtered image list
pub struct FetchPipeline<'a> {
    tool: &'a dyn ContainerTool,
    archives_dir: PathBuf,
    retry: RetryPolicy,
    hardened_marker: String,
    sink: &'a dyn EventSink,
}

impl<'a> FetchPipeline<'a> {
    pub fn new(
        tool: &'a dyn ContainerTool,
        archives_dir: impl AsRef<Path>,
        sink: &'a dyn EventSink,
    ) -> Self {
        Self {
            tool,
            archives_dir: archives_dir.as_ref().to_path_buf(),
            retry: RetryPolicy::default(),
            hardened_marker: HARDENED_MARKER.to_string(),
            sink,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_hardened_marker(mut self, marker: impl Into<String>) -> Self {
        self.hardened_marker = marker.into();
        self
    }

    /// Archive name not yet taken in this run: the usual name, else
    /// `<repository>-<tag>.tar`. None when both are taken.
    fn unused_archive_name(&self, image: &ImageReference, used: &HashSet<String>) -> Option<String> {
        let preferred = archive_file_name(image, &self.hardened_marker);
        let tagged = format!("{}-{}.{}", image.repository(), image.tag(), ARCHIVE_SUFFIX);
        [preferred, tagged].into_iter().find(|name| !used.contains(name))
    }

    /// Pull and save every image in order
    pub async fn run(
        &self,
        images: &[ImageReference],
        session: Option<&RegistrySession>,
    ) -> Result<PullReport> {
        fs::create_dir_all(&self.archives_dir)?;

        let source = match session {
            Some(s) => format!("{} (hardened images) and their public registries", s.target().host),
            None => "their public registries".to_string(),
        };
        self.sink.info(&format!(
            "Pulling {} images from {} with {}.",
            images.len(),
            source,
            self.tool.name()
        ));

        let mut report = PullReport::default();
        let mut used_names = HashSet::new();
        for (idx, image) in images.iter().enumerate() {
            self.sink.info(&format!(
                "[{}/{}] Processing {}",
                idx + 1,
                images.len(),
                image
            ));
            let result = self.fetch_one(image, session, &mut used_names).await;
            report.results.push(result);
        }

        self.log_summary(&report);
        Ok(report)
    }

    async fn fetch_one(
        &self,
        image: &ImageReference,
        session: Option<&RegistrySession>,
        used_names: &mut HashSet<String>,
    ) -> PullResult {
        let rewritten = session
            .filter(|s| s.applies_to(image))
            .map(|s| s.rewrite(image));
        let target = rewritten.as_ref().unwrap_or(image);
        if rewritten.is_some() {
            self.sink
                .info(&format!("Rewrote {} to {}", image, target));
        }

        self.sink.info(&format!("Pulling image: {}", target));
        let pulled = self
            .retry
            .run(&format!("pull {}", target), self.sink, |_| self.tool.pull(target))
            .await;
        let attempts = pulled.attempts;

        if let Err(e) = pulled.result {
            self.sink.error(&format!(
                "Failed to pull image {} after {} attempts: {}",
                target, attempts, e
            ));
            return PullResult {
                reference: image.clone(),
                rewritten_reference: rewritten,
                outcome: PullOutcome::Failed {
                    reason: format!("pull failed: {}", e),
                },
                attempts,
            };
        }
        self.sink.info(&format!("Successfully pulled {}", target));

        let Some(name) = self.unused_archive_name(image, used_names) else {
            self.sink.error(&format!(
                "Cannot save {}: every archive name for it is already used in this run",
                target
            ));
            return PullResult {
                reference: image.clone(),
                rewritten_reference: rewritten,
                outcome: PullOutcome::Failed {
                    reason: "archive name already used in this run".to_string(),
                },
                attempts,
            };
        };
        let archive = self.archives_dir.join(&name);
        self.sink
            .info(&format!("Saving image {} to {}", target, archive.display()));
        let saved = self
            .retry
            .run(&format!("save {}", target), self.sink, |_| {
                self.tool.save(target, &archive)
            })
            .await;

        let outcome = match saved.result {
            Ok(()) => {
                self.sink.info(&format!(
                    "Successfully saved {} to {}",
                    target,
                    archive.display()
                ));
                used_names.insert(name);
                PullOutcome::Success { archive }
            }
            Err(e) => {
                if archive.exists() {
                    let _ = fs::remove_file(&archive);
                }
                self.sink.error(&format!(
                    "Failed to save image {} to {}: {}",
                    target,
                    archive.display(),
                    e
                ));
                PullOutcome::Failed {
                    reason: format!("save failed: {}", e),
                }
            }
        };

        PullResult {
            reference: image.clone(),
            rewritten_reference: rewritten,
            outcome,
            attempts,
        }
    }

    fn log_summary(&self, report: &PullReport) {
        self.sink.info(&format!(
            "Pulled and saved {}/{} images ({} failed).",
            report.succeeded(),
            report.requested(),
            report.failed()
        ));
        if !report.is_complete() {
            let failed: Vec<String> = report
                .failures()
                .map(|r| r.pulled_reference().to_string())
                .collect();
            self.sink.warn(&format!(
                "Only {} of {} requested images were archived; missing: {}",
                report.succeeded(),
                report.requested(),
                failed.join(", ")
            ));
        }
    }
}
