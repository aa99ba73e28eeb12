//! Error types for pdfstream.
//!
//! Every failure the engine can observe is a [`MergeError`]. Each variant maps
//! onto a closed [`ErrorCategory`], which is what the retry and recovery layers
//! act on: the category decides whether an attempt is retried and which
//! remediation runs before the next one.
//!
//! # Error Categories
//!
//! - **Validation**: bad input or options. Fatal, never retried.
//! - **Io**: transient file system trouble. Retried.
//! - **Memory**: allocation pressure. Retried after a forced reclamation.
//! - **Permission**: access denied or encrypted input. Never retried.
//! - **Corrupted**: the document cannot be parsed. Never retried.
//!
//! Job-level outcomes that end a merge early are reported as [`MergeAbort`],
//! which carries whatever partial result exists.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::merge::MergeResult;

/// Result type alias for pdfstream operations.
pub type Result<T> = std::result::Result<T, MergeError>;

/// Closed classification of every error the engine handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input or configuration.
    Validation,
    /// Transient I/O failure.
    Io,
    /// Memory exhaustion.
    Memory,
    /// Access denied.
    Permission,
    /// Unparseable or structurally broken document.
    Corrupted,
}

impl ErrorCategory {
    /// Whether errors of this category are worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Io | Self::Memory)
    }

    /// Short lowercase name, used in logs and summaries.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Io => "io",
            Self::Memory => "memory",
            Self::Permission => "permission",
            Self::Corrupted => "corrupted",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for pdfstream operations.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// No files were provided for merging.
    #[error("No input files specified for merging")]
    NoFilesToMerge,

    /// Options failed validation.
    #[error("Invalid configuration: {message}")]
    InvalidOptions {
        /// Description of what is wrong.
        message: String,
    },

    /// Input file was not found.
    #[error("File not found: {}", .path.display())]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Input file could not be read because access was denied.
    #[error("Permission denied: {}\n  Reason: {source}", .path.display())]
    PermissionDenied {
        /// Path to the inaccessible file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Reading an input failed.
    #[error("Failed to read {}\n  Reason: {source}", .path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An allocation could not be satisfied.
    #[error("Out of memory while processing {context}")]
    OutOfMemory {
        /// What was being processed.
        context: String,
    },

    /// Document is corrupted or has an invalid structure.
    #[error("Corrupted or invalid PDF: {}\n  Details: {details}", .path.display())]
    CorruptedDocument {
        /// Path to the corrupted document.
        path: PathBuf,
        /// Details about the corruption.
        details: String,
    },

    /// Document is encrypted and cannot be processed.
    #[error(
        "PDF is encrypted and cannot be processed: {}\n  Hint: Decrypt the PDF first using 'qpdf --decrypt' or similar tools",
        .path.display()
    )]
    EncryptedDocument {
        /// Path to the encrypted document.
        path: PathBuf,
    },

    /// The output artifact could not be created, appended to, or written.
    #[error("Failed to write output: {}\n  Reason: {reason}", .path.display())]
    OutputFailed {
        /// Output path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A worker task died before reporting a result.
    #[error("Worker task failed: {reason}")]
    WorkerFailed {
        /// Join error description.
        reason: String,
    },

    /// An attempt sequence exceeded its time budget.
    #[error("Operation timed out after {elapsed_ms} ms")]
    TimedOut {
        /// Time spent before giving up.
        elapsed_ms: u64,
    },
}

impl MergeError {
    /// Build an error from an I/O failure on `path`, classifying by kind.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => Self::FileNotFound { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path, source },
            io::ErrorKind::OutOfMemory => Self::OutOfMemory {
                context: path.display().to_string(),
            },
            _ => Self::Io { path, source },
        }
    }

    /// Create an InvalidOptions error.
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            message: message.into(),
        }
    }

    /// Create a CorruptedDocument error.
    pub fn corrupted(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        Self::CorruptedDocument {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create an OutOfMemory error.
    pub fn out_of_memory(context: impl Into<String>) -> Self {
        Self::OutOfMemory {
            context: context.into(),
        }
    }

    /// Create an OutputFailed error.
    pub fn output_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::OutputFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NoFilesToMerge | Self::InvalidOptions { .. } => ErrorCategory::Validation,
            Self::FileNotFound { .. }
            | Self::Io { .. }
            | Self::OutputFailed { .. }
            | Self::WorkerFailed { .. }
            | Self::TimedOut { .. } => ErrorCategory::Io,
            Self::OutOfMemory { .. } => ErrorCategory::Memory,
            Self::PermissionDenied { .. } | Self::EncryptedDocument { .. } => {
                ErrorCategory::Permission
            }
            Self::CorruptedDocument { .. } => ErrorCategory::Corrupted,
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Get the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoFilesToMerge | Self::InvalidOptions { .. } => 1,
            Self::FileNotFound { .. } | Self::PermissionDenied { .. } => 2,
            Self::CorruptedDocument { .. } | Self::EncryptedDocument { .. } => 3,
            Self::OutputFailed { .. } | Self::Io { .. } => 5,
            Self::WorkerFailed { .. } | Self::TimedOut { .. } => 6,
            Self::OutOfMemory { .. } => 7,
        }
    }
}

/// A merge that ended before producing a complete result.
#[derive(Debug, thiserror::Error)]
pub enum MergeAbort {
    /// The cancellation token fired. Output appended before that point was
    /// still written and is described by `partial`.
    #[error("Operation cancelled by user")]
    Cancelled {
        /// What was merged before cancellation.
        partial: Box<MergeResult>,
    },

    /// A job-level fatal condition.
    #[error("{error}")]
    Fatal {
        /// The condition that stopped the job.
        #[source]
        error: MergeError,
        /// Whatever had been merged when it happened, if anything.
        partial: Option<Box<MergeResult>>,
    },
}

impl MergeAbort {
    pub(crate) fn fatal(error: MergeError) -> Self {
        Self::Fatal {
            error,
            partial: None,
        }
    }

    /// Whether this abort was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The partial result, if one exists.
    pub fn partial(&self) -> Option<&MergeResult> {
        match self {
            Self::Cancelled { partial } => Some(partial),
            Self::Fatal { partial, .. } => partial.as_deref(),
        }
    }

    /// The underlying error category. `None` for cancellation.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Cancelled { .. } => None,
            Self::Fatal { error, .. } => Some(error.category()),
        }
    }

    /// Get the process exit code for this abort.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled { .. } => 130, // Standard exit code for SIGINT
            Self::Fatal { error, .. } => error.exit_code(),
        }
    }
}

impl From<MergeError> for MergeAbort {
    fn from(error: MergeError) -> Self {
        Self::fatal(error)
    }
}
