//! Category-aware recovery around retried operations.
//!
//! The [`RecoveryManager`] sits between the worker pool and the
//! [`RetryManager`]. It adds remediation the retry loop does not know about
//! (a forced memory reclamation after a memory-class failure, or when pressure
//! is already critical before the first attempt) and keeps an append-only log
//! of every failure that survived all retries.
//!
//! The log is pull-based: nothing is raised asynchronously. Callers inspect it
//! with [`errors`](RecoveryManager::errors) and
//! [`error_summary`](RecoveryManager::error_summary) and reset it with
//! [`clear_errors`](RecoveryManager::clear_errors). It lives as long as the
//! manager, across merge calls.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{ErrorCategory, MergeError, Result};
use crate::memory::{MemoryMonitor, MemoryPressureLevel};
use crate::retry::{RetryManager, RetryOutcome};

/// One terminal failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
    /// Name of the failed operation.
    pub operation: String,
    /// Classification of the final error.
    pub category: ErrorCategory,
    /// Rendered error message.
    pub message: String,
    /// Whether the category is retryable (i.e. retries were exhausted).
    pub retryable: bool,
    /// Attempts made before giving up.
    pub attempts: u32,
}

/// Aggregate view of the error log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// Number of records.
    pub total: usize,
    /// Records per category.
    pub by_category: BTreeMap<ErrorCategory, usize>,
    /// Records whose category was retryable.
    pub retryable: usize,
    /// Message of the most recent record.
    pub last_message: Option<String>,
}

/// Live recovery statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStats {
    /// Current memory usage in bytes.
    pub memory_usage: u64,
    /// Forced reclamation passes so far.
    pub collections: u64,
    /// Records in the error log.
    pub error_count: usize,
}

/// Wraps retried operations with remediation and failure bookkeeping.
#[derive(Debug)]
pub struct RecoveryManager {
    retry: RetryManager,
    monitor: Arc<MemoryMonitor>,
    enable_gc: bool,
    errors: Mutex<Vec<ErrorRecord>>,
}

impl RecoveryManager {
    /// Create a recovery manager.
    pub fn new(retry: RetryManager, monitor: Arc<MemoryMonitor>, enable_gc: bool) -> Self {
        Self {
            retry,
            monitor,
            enable_gc,
            errors: Mutex::new(Vec::new()),
        }
    }

    /// The retry manager in use.
    pub fn retry_manager(&self) -> &RetryManager {
        &self.retry
    }

    /// Run `operation` under retry with recovery.
    ///
    /// A terminal failure is appended to the error log before it is returned.
    /// Cancellation is not an error and is not logged.
    pub async fn execute<F, Fut, T>(
        &self,
        name: &str,
        cancel: &CancellationToken,
        operation: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.enable_gc && self.monitor.check_pressure() == MemoryPressureLevel::Critical {
            info!(operation = name, "Memory pressure critical, reclaiming before attempt");
            self.monitor.force_gc();
        }

        let outcome = self
            .retry
            .execute_with_hook(name, cancel, operation, |err| {
                if self.enable_gc && err.category() == ErrorCategory::Memory {
                    self.monitor.force_gc();
                }
            })
            .await;

        if let RetryOutcome::Failed {
            error, attempts, ..
        } = &outcome
        {
            self.record(name, error, *attempts);
        }

        outcome
    }

    /// Append a failure to the log.
    pub fn record(&self, operation: &str, err: &MergeError, attempts: u32) {
        let record = ErrorRecord {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            category: err.category(),
            message: err.to_string(),
            retryable: err.is_retryable(),
            attempts,
        };

        error!(
            operation,
            category = %record.category,
            attempts,
            "{}",
            record.message
        );

        self.errors.lock().push(record);
    }

    /// Copy of the error log, oldest first.
    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.errors.lock().clone()
    }

    /// Number of records in the log.
    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }

    /// Aggregate view of the log.
    pub fn error_summary(&self) -> ErrorSummary {
        let errors = self.errors.lock();
        let mut summary = ErrorSummary {
            total: errors.len(),
            ..Default::default()
        };

        for record in errors.iter() {
            *summary.by_category.entry(record.category).or_default() += 1;
            if record.retryable {
                summary.retryable += 1;
            }
        }
        summary.last_message = errors.last().map(|r| r.message.clone());

        summary
    }

    /// Empty the log.
    pub fn clear_errors(&self) {
        self.errors.lock().clear();
    }

    /// Live statistics.
    pub fn stats(&self) -> RecoveryStats {
        RecoveryStats {
            memory_usage: self.monitor.current_usage(),
            collections: self.monitor.collections(),
            error_count: self.error_count(),
        }
    }
}
