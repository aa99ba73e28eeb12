//! Chunked document merging.
//!
//! [`StreamingMerger`] drives the whole job; [`ChunkMerger`] is the seam to
//! the document library, with [`LopdfMerger`] as the default.

mod assembler;
pub mod chunk;
pub mod pool;
pub mod streaming;

#[cfg(test)]
pub(crate) mod test_support;

pub use assembler::DocumentAssembler;
pub use chunk::{ChunkMerger, ChunkPart, LopdfMerger};
pub use pool::{Chunk, ChunkCursor, ChunkWorkerPool};
pub use streaming::{MergeResult, MergeState, StreamingMerger};

use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::config::MergeOptions;
use crate::error::MergeAbort;

/// Merge `files` into `output` with a fresh `lopdf` engine, no cancellation
/// and no progress reporting.
///
/// # Errors
///
/// See [`StreamingMerger::merge_streaming`]. Invalid options are reported as
/// [`MergeAbort::Fatal`].
///
/// # Examples
///
/// ```no_run
/// use pdfstream::config::MergeOptions;
/// use std::path::{Path, PathBuf};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let files = vec![PathBuf::from("a.pdf"), PathBuf::from("b.pdf")];
/// let result = pdfstream::merge::merge_streaming(
///     MergeOptions::default(),
///     &files,
///     Path::new("merged.pdf"),
/// )
/// .await?;
/// println!("Merged {} pages", result.total_pages);
/// # Ok(())
/// # }
/// ```
pub async fn merge_streaming(
    options: MergeOptions,
    files: &[PathBuf],
    output: &Path,
) -> Result<MergeResult, MergeAbort> {
    let merger = StreamingMerger::new(options)?;
    merger
        .merge_streaming(&CancellationToken::new(), files, output, |_, _| {})
        .await
}
