//! File set analysis.
//!
//! One pass over file metadata produces the [`FileSetProfile`] the planner
//! sizes chunks from. Unreadable files are not an analysis failure: they count
//! as zero bytes here and fail later, inside their chunk, where the recovery
//! layer records them and the orchestrator reports them as skipped.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::MIB;
use crate::error::Result;
use crate::utils::run_blocking;

/// Aggregate size statistics for a set of input files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSetProfile {
    /// Number of files.
    pub file_count: usize,
    /// Sum of file sizes in bytes.
    pub total_size: u64,
    /// Integer mean size in bytes.
    pub avg_size: u64,
    /// Smallest file size.
    pub min_size: u64,
    /// Largest file size.
    pub max_size: u64,
    /// Whether any single file exceeds the large-file threshold.
    pub has_large_files: bool,
}

impl FileSetProfile {
    /// Build a profile from sizes already collected.
    pub fn from_sizes(sizes: &[u64], large_file_threshold: u64) -> Self {
        if sizes.is_empty() {
            return Self::default();
        }

        let total_size: u64 = sizes.iter().sum();
        let min_size = sizes.iter().copied().min().unwrap_or(0);
        let max_size = sizes.iter().copied().max().unwrap_or(0);

        Self {
            file_count: sizes.len(),
            total_size,
            avg_size: total_size / sizes.len() as u64,
            min_size,
            max_size,
            has_large_files: max_size > large_file_threshold,
        }
    }
}

/// Collects file metadata for planning.
#[derive(Debug, Clone)]
pub struct FileSetAnalyzer {
    large_file_threshold: u64,
}

impl FileSetAnalyzer {
    /// Create an analyzer with the given large-file threshold in bytes.
    pub fn new(large_file_threshold: u64) -> Self {
        Self {
            large_file_threshold,
        }
    }

    /// The threshold above which a file is considered large.
    pub fn large_file_threshold(&self) -> u64 {
        self.large_file_threshold
    }

    /// Size of each file in input order. Unreadable files report 0.
    pub fn file_sizes(&self, paths: &[PathBuf]) -> Vec<u64> {
        paths.iter().map(|path| file_size(path)).collect()
    }

    /// [`file_sizes`](Self::file_sizes) on a blocking thread, for callers on
    /// the async runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::WorkerFailed`](crate::error::MergeError::WorkerFailed)
    /// if the scan thread panics.
    pub async fn scan(&self, paths: &[PathBuf]) -> Result<Vec<u64>> {
        let analyzer = self.clone();
        let paths = paths.to_vec();
        run_blocking(move || Ok(analyzer.file_sizes(&paths))).await
    }

    /// Profile a set of files.
    pub fn analyze(&self, paths: &[PathBuf]) -> FileSetProfile {
        let sizes = self.file_sizes(paths);
        let profile = FileSetProfile::from_sizes(&sizes, self.large_file_threshold);

        debug!(
            files = profile.file_count,
            total_mib = profile.total_size / MIB,
            avg = profile.avg_size,
            max = profile.max_size,
            large = profile.has_large_files,
            "Analyzed file set"
        );

        profile
    }
}

impl Default for FileSetAnalyzer {
    fn default() -> Self {
        Self::new(5 * MIB)
    }
}

fn file_size(path: &Path) -> u64 {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) => 0,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Size unavailable, counting as zero");
            0
        }
    }
}
