//! Input expansion and small shared helpers.

use std::path::PathBuf;

use crate::error::{MergeError, Result};

/// Expand glob patterns into paths, in pattern order.
///
/// Each pattern's matches are sorted by the glob crate (alphabetically).
/// A pattern that matches nothing contributes nothing.
pub fn collect_paths_for_patterns<T>(patterns: T) -> Result<Vec<PathBuf>>
where
    T: IntoIterator,
    T::Item: AsRef<str>,
{
    let mut resolved_paths = Vec::new();

    for pattern in patterns {
        resolved_paths.extend(collect_paths_for_pattern(pattern.as_ref())?);
    }

    Ok(resolved_paths)
}

fn collect_paths_for_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob::glob(pattern)
        .map_err(|err| MergeError::invalid_options(format!("bad pattern '{pattern}': {err}")))?;

    paths
        .map(|entry| entry.map_err(|err| MergeError::io(err.path().to_path_buf(), err.into_error())))
        .filter(|entry| !matches!(entry, Ok(path) if path.is_dir()))
        .collect()
}

/// Format a byte count as a human-readable string.
pub fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} bytes")
    }
}

/// Run blocking document work off the async runtime.
pub(crate) async fn run_blocking<R, F>(f: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MergeError::WorkerFailed {
            reason: e.to_string(),
        })?
}
