//! Working directory layout for a collection run

use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix of per-image archives
pub const ARCHIVE_SUFFIX: &str = "tar";

/// Manages paths inside the working directory of a run
#[derive(Debug, Clone)]
pub struct WorkPaths {
    root: PathBuf,
}

impl WorkPaths {
    /// Create a new WorkPaths instance rooted at `root`
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Get the root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(self.archives_dir())?;
        Ok(())
    }

    /// Directory receiving per-image archives
    pub fn archives_dir(&self) -> PathBuf {
        self.root.join("archives")
    }

    /// Final transport archive
    pub fn bundle(&self) -> PathBuf {
        self.root.join("images.tar.gz")
    }

    /// Checksum file written next to the bundle
    pub fn bundle_checksum(&self) -> PathBuf {
        self.root.join("images.tar.gz.sha256")
    }

    /// Checkout of the manifest repository
    pub fn manifest_checkout(&self) -> PathBuf {
        self.root.join("hub")
    }

    /// Resolved image list, one reference per line
    pub fn resolved_images(&self) -> PathBuf {
        self.root.join("resolved-images.txt")
    }

    /// JSON run log
    pub fn run_log(&self) -> PathBuf {
        self.root.join("logfile.json")
    }

    /// Remove the manifest checkout and resolved list. Best-effort.
    pub fn clean_intermediates(&self) -> Vec<PathBuf> {
        let mut removed = Vec::new();
        let checkout = self.manifest_checkout();
        if checkout.exists() && fs::remove_dir_all(&checkout).is_ok() {
            removed.push(checkout);
        }
        let resolved = self.resolved_images();
        if resolved.exists() && fs::remove_file(&resolved).is_ok() {
            removed.push(resolved);
        }
        removed
    }

    /// Remove archives and the bundle left behind by an earlier run. Best-effort.
    pub fn clean_previous_outputs(&self) -> Vec<PathBuf> {
        let mut removed = self.stale_archives();
        removed.retain(|path| fs::remove_file(path).is_ok());
        for path in [self.bundle(), self.bundle_checksum()] {
            if path.exists() && fs::remove_file(&path).is_ok() {
                removed.push(path);
            }
        }
        removed
    }

    /// Per-image archives currently in the archives directory
    pub fn stale_archives(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.archives_dir()) else {
            return Vec::new();
        };
        let mut archives: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(ARCHIVE_SUFFIX)
            })
            .collect();
        archives.sort();
        archives
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_structure() {
        let tmp = TempDir::new().unwrap();
        let paths = WorkPaths::new(tmp.path());

        assert_eq!(paths.root(), tmp.path());
        assert_eq!(paths.archives_dir(), tmp.path().join("archives"));
        assert_eq!(paths.bundle(), tmp.path().join("images.tar.gz"));
        assert_eq!(paths.run_log(), tmp.path().join("logfile.json"));
        assert_eq!(paths.manifest_checkout(), tmp.path().join("hub"));
    }

    #[test]
    fn test_ensure_directories() {
        let tmp = TempDir::new().unwrap();
        let paths = WorkPaths::new(tmp.path().join("work"));

        paths.ensure_directories().unwrap();

        assert!(paths.root().exists());
        assert!(paths.archives_dir().exists());
    }

    #[test]
    fn test_clean_intermediates() {
        let tmp = TempDir::new().unwrap();
        let paths = WorkPaths::new(tmp.path());
        paths.ensure_directories().unwrap();

        fs::create_dir_all(paths.manifest_checkout().join("docker-swarm")).unwrap();
        fs::write(paths.resolved_images(), "a:1\n").unwrap();

        let removed = paths.clean_intermediates();
        assert_eq!(removed.len(), 2);
        assert!(!paths.manifest_checkout().exists());
        assert!(!paths.resolved_images().exists());

        // Nothing left to remove
        assert!(paths.clean_intermediates().is_empty());
    }

    #[test]
    fn test_clean_previous_outputs_only_touches_archives() {
        let tmp = TempDir::new().unwrap();
        let paths = WorkPaths::new(tmp.path());
        paths.ensure_directories().unwrap();

        fs::write(paths.archives_dir().join("old.tar"), b"x").unwrap();
        fs::write(paths.archives_dir().join("notes.txt"), b"keep").unwrap();
        fs::write(paths.bundle(), b"gz").unwrap();

        assert_eq!(paths.stale_archives(), vec![paths.archives_dir().join("old.tar")]);

        let removed = paths.clean_previous_outputs();
        assert_eq!(removed.len(), 2);
        assert!(!paths.archives_dir().join("old.tar").exists());
        assert!(paths.archives_dir().join("notes.txt").exists());
        assert!(!paths.bundle().exists());
    }
}
