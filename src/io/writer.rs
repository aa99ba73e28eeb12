//! PDF writing and saving operations.
//!
//! This module provides safe PDF writing with:
//! - Atomic writes (always staged, then renamed into place)
//! - A configurable staging directory
//! - Compression and pruning of unreferenced objects
//! - Write statistics
//!
//! Writing is blocking and is meant to run on a blocking thread.
//!
//! # Examples
//!
//! ```no_run
//! use pdfstream::io::PdfWriter;
//! use lopdf::Document;
//! use std::path::Path;
//!
//! # fn example(mut doc: Document) -> Result<(), Box<dyn std::error::Error>> {
//! let writer = PdfWriter::new();
//! let stats = writer.write(&mut doc, Path::new("output.pdf"))?;
//! println!("Wrote {}", stats.format_file_size());
//! # Ok(())
//! # }
//! ```

use lopdf::Document;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{MergeError, Result};
use crate::utils::format_file_size;

const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Options for writing PDF files.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Compress streams before writing.
    pub compress: bool,

    /// Drop unreferenced objects before writing.
    pub prune: bool,

    /// Where staging files go. `None` stages next to the output.
    pub temp_directory: Option<PathBuf>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compress: true,
            prune: true,
            temp_directory: None,
        }
    }
}

/// Statistics about a write operation.
#[derive(Debug, Clone)]
pub struct WriteStatistics {
    /// Time taken to write the file.
    pub write_time: Duration,

    /// Size of the written file in bytes.
    pub file_size: u64,

    /// Path where the file was written.
    pub output_path: PathBuf,

    /// Whether compression was applied.
    pub compressed: bool,
}

impl WriteStatistics {
    /// Format file size as human-readable string.
    pub fn format_file_size(&self) -> String {
        format_file_size(self.file_size)
    }
}

/// PDF writer with configurable behavior.
#[derive(Debug, Clone, Default)]
pub struct PdfWriter {
    options: WriteOptions,
}

impl PdfWriter {
    /// Create a new PDF writer with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with custom options.
    pub fn with_options(options: WriteOptions) -> Self {
        Self { options }
    }

    /// Check that `path` can be written before any work is done.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory (or the staging directory)
    /// does not exist or is read-only.
    pub fn can_write(&self, path: &Path) -> Result<()> {
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
        for dir in parent.into_iter().chain(self.options.temp_directory.as_deref()) {
            let metadata = std::fs::metadata(dir).map_err(|e| {
                MergeError::output_failed(path, format!("{}: {e}", dir.display()))
            })?;

            if !metadata.is_dir() {
                return Err(MergeError::output_failed(
                    path,
                    format!("{} is not a directory", dir.display()),
                ));
            }

            if metadata.permissions().readonly() {
                return Err(MergeError::output_failed(
                    path,
                    format!("{} is not writable", dir.display()),
                ));
            }
        }

        Ok(())
    }

    fn staging_path(&self, path: &Path) -> PathBuf {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output.pdf".to_string());
        let staged = format!(".{file_name}.{}.tmp", std::process::id());

        match &self.options.temp_directory {
            Some(dir) => dir.join(staged),
            None => path.with_file_name(staged),
        }
    }

    /// Write `doc` to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::OutputFailed`] if the staging file cannot be
    /// created, written, or moved into place.
    pub fn write(&self, doc: &mut Document, path: &Path) -> Result<WriteStatistics> {
        let start = Instant::now();
        let options = &self.options;

        if options.prune {
            doc.prune_objects();
        }
        if options.compress {
            doc.compress();
        }
        doc.renumber_objects();

        let staged = self.staging_path(path);
        let result = write_file(doc, &staged).and_then(|()| persist(&staged, path));

        if let Err(e) = result {
            if staged.exists() {
                if let Err(cleanup) = std::fs::remove_file(&staged) {
                    warn!(path = %staged.display(), error = %cleanup, "Failed to remove staging file");
                }
            }
            return Err(MergeError::output_failed(path, e.to_string()));
        }

        let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let stats = WriteStatistics {
            write_time: start.elapsed(),
            file_size,
            output_path: path.to_path_buf(),
            compressed: options.compress,
        };

        debug!(
            path = %path.display(),
            size = %stats.format_file_size(),
            elapsed_ms = stats.write_time.as_millis() as u64,
            "Wrote output"
        );

        Ok(stats)
    }
}

fn write_file(doc: &mut Document, path: &Path) -> std::io::Result<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
    doc.save_to(&mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}

/// Move the staging file into place. Falls back to copy when the staging
/// directory is on another file system.
fn persist(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!(error = %rename_err, "Rename failed, copying staged output");
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}
