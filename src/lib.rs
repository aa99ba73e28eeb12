//! pdfstream - Merge large sets of PDF files under a memory ceiling.
//!
//! The engine splits the ordered input list into chunks, sizes them from the
//! file set and from live memory pressure, merges chunks in parallel when it
//! is safe to, and appends them to the output strictly in input order. Every
//! chunk merge runs under retry and recovery, so a transient failure costs a
//! retry and a permanent one costs only that chunk's files.
//!
//! It provides:
//!
//! - File set analysis and adaptive chunk planning
//! - A memory pressure monitor with a pluggable probe
//! - An order-preserving bounded worker pool
//! - Exponential backoff with timeout and cancellation
//! - A pull-based error log of chunks that could not be recovered
//!
//! # Examples
//!
//! ## Basic Merge
//!
//! ```no_run
//! use pdfstream::{MergeOptions, StreamingMerger};
//! use std::path::{Path, PathBuf};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = MergeOptions::default().with_max_memory(256 * 1024 * 1024);
//! let merger = StreamingMerger::new(options)?;
//!
//! let files = vec![PathBuf::from("a.pdf"), PathBuf::from("b.pdf")];
//! let result = merger
//!     .merge_streaming(&CancellationToken::new(), &files, Path::new("merged.pdf"), |done, msg| {
//!         println!("{:>5.1}% {msg}", done * 100.0);
//!     })
//!     .await?;
//!
//! println!(
//!     "Merged {} files ({} pages), skipped {}",
//!     result.processed_files,
//!     result.total_pages,
//!     result.skipped_files.len()
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Inspecting Failures
//!
//! ```no_run
//! # use pdfstream::StreamingMerger;
//! # fn example(merger: &StreamingMerger) {
//! let summary = merger.recovery().error_summary();
//! for record in merger.recovery().errors() {
//!     eprintln!("{} [{}]: {}", record.operation, record.category, record.message);
//! }
//! println!("{} failed chunk(s)", summary.total);
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod config;
pub mod error;
pub mod io;
pub mod memory;
pub mod merge;
pub mod planner;
pub mod recovery;
pub mod retry;
pub mod utils;

// Re-export commonly used types
pub use config::MergeOptions;
pub use error::{ErrorCategory, MergeAbort, MergeError, Result};
pub use memory::{MemoryMonitor, MemoryPressureLevel};
pub use merge::{MergeResult, StreamingMerger};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
