//! The streaming merge orchestrator.
//!
//! One call to [`StreamingMerger::merge_streaming`] walks these states:
//!
//! ```text
//! Idle -> Analyzing -> Planning -> Processing -> Finalizing -> Completed
//!                                                           -> Cancelled
//!      (any state) -> Failed
//! ```
//!
//! During Processing the orchestrator dispatches chunks to a
//! [`ChunkWorkerPool`], consulting the planner before every dispatch when
//! adaptive chunking is on, and appends finished parts in chunk order. The
//! orchestrator is the only writer of the output.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::analysis::{FileSetAnalyzer, FileSetProfile};
use crate::config::MergeOptions;
use crate::error::{MergeAbort, MergeError, Result};
use crate::memory::{MemoryMonitor, MemoryProbe, SystemProbe};
use crate::merge::chunk::{ChunkMerger, LopdfMerger};
use crate::merge::pool::{ChunkCursor, ChunkWorkerPool};
use crate::planner::{ChunkPlan, ChunkPlanner};
use crate::recovery::RecoveryManager;
use crate::retry::{RetryManager, RetryOutcome, StopReason};
use crate::utils::{format_file_size, run_blocking};

/// Where a merge call currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeState {
    /// No call has run yet.
    Idle,
    /// Reading file sizes.
    Analyzing,
    /// Deriving the initial plan.
    Planning,
    /// Dispatching and appending chunks.
    Processing,
    /// Writing the output.
    Finalizing,
    /// The call returned a result.
    Completed,
    /// The call returned a fatal error.
    Failed,
    /// The call was cancelled.
    Cancelled,
}

impl fmt::Display for MergeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Analyzing => "analyzing",
            Self::Planning => "planning",
            Self::Processing => "processing",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Outcome of a merge call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    /// Where the output was written.
    pub output_path: PathBuf,
    /// Pages in the output.
    pub total_pages: usize,
    /// Files whose pages made it into the output.
    pub processed_files: usize,
    /// Files dropped because their chunk failed, in input order.
    pub skipped_files: Vec<PathBuf>,
    /// Wall time of the call.
    pub processing_time: Duration,
    /// Memory reading taken when the call finished, in bytes.
    pub memory_usage: u64,
    /// Chunks that completed, merged or skipped.
    pub chunks_processed: usize,
}

impl MergeResult {
    /// Format the final memory reading as a human-readable string.
    pub fn format_memory_usage(&self) -> String {
        format_file_size(self.memory_usage)
    }
}

/// Running totals for one call.
#[derive(Debug)]
struct Progress {
    total_files: usize,
    processed_files: usize,
    skipped_files: Vec<PathBuf>,
    total_pages: usize,
    chunks_processed: usize,
}

impl Progress {
    fn new(total_files: usize) -> Self {
        Self {
            total_files,
            processed_files: 0,
            skipped_files: Vec::new(),
            total_pages: 0,
            chunks_processed: 0,
        }
    }

    fn files_done(&self) -> usize {
        self.processed_files + self.skipped_files.len()
    }

    fn fraction(&self) -> f64 {
        self.files_done() as f64 / self.total_files as f64
    }
}

/// Memory-bounded merge engine.
///
/// The memory monitor and the recovery manager (with its error log) are
/// created once and shared by every call on this engine.
pub struct StreamingMerger<M: ChunkMerger = LopdfMerger> {
    options: MergeOptions,
    analyzer: FileSetAnalyzer,
    planner: ChunkPlanner,
    monitor: Arc<MemoryMonitor>,
    recovery: Arc<RecoveryManager>,
    merger: Arc<M>,
    state: Mutex<MergeState>,
}

impl StreamingMerger<LopdfMerger> {
    /// Create an engine that merges with `lopdf` and reads the memory of the
    /// current process.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::InvalidOptions`] if `options` fail validation.
    pub fn new(options: MergeOptions) -> Result<Self> {
        let merger = LopdfMerger::new(&options);
        Self::with_merger(options, merger, Arc::new(SystemProbe::new()))
    }
}

impl<M: ChunkMerger> StreamingMerger<M> {
    /// Create an engine with a custom merge primitive and memory probe.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::InvalidOptions`] if `options` fail validation.
    pub fn with_merger(
        options: MergeOptions,
        merger: M,
        probe: Arc<dyn MemoryProbe>,
    ) -> Result<Self> {
        options.validate()?;

        let monitor = Arc::new(MemoryMonitor::new(
            probe,
            options.max_memory_usage,
            options.pressure,
        ));
        let recovery = Arc::new(RecoveryManager::new(
            RetryManager::new(options.retry.clone()),
            Arc::clone(&monitor),
            options.enable_gc,
        ));

        Ok(Self {
            analyzer: FileSetAnalyzer::new(options.planner.large_file_threshold),
            planner: ChunkPlanner::new(&options),
            monitor,
            recovery,
            merger: Arc::new(merger),
            state: Mutex::new(MergeState::Idle),
            options,
        })
    }

    /// The validated options.
    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// The shared memory monitor.
    pub fn monitor(&self) -> &Arc<MemoryMonitor> {
        &self.monitor
    }

    /// The shared recovery manager and its error log.
    pub fn recovery(&self) -> &Arc<RecoveryManager> {
        &self.recovery
    }

    /// State of the most recent call.
    pub fn state(&self) -> MergeState {
        *self.state.lock()
    }

    fn transition(&self, next: MergeState) {
        let previous = std::mem::replace(&mut *self.state.lock(), next);
        debug!(from = %previous, to = %next, "Merge state");
    }

    /// Profile `files` without merging them.
    pub fn analyze_files(&self, files: &[PathBuf]) -> FileSetProfile {
        self.analyzer.analyze(files)
    }

    /// Chunk size for `files` from their profile alone, ignoring live
    /// memory pressure.
    pub fn calculate_optimal_chunk_size(&self, files: &[PathBuf]) -> usize {
        self.planner.base_chunk_size(&self.analyze_files(files))
    }

    /// Whether `files` would be processed concurrently at the current
    /// pressure level.
    pub fn should_use_concurrent_processing(&self, files: &[PathBuf]) -> bool {
        let profile = self.analyze_files(files);
        self.planner
            .should_use_concurrent(&profile, self.monitor.check_pressure())
    }

    /// Merge `files`, in order, into `output`.
    ///
    /// `on_progress` is called after every chunk with the fraction of files
    /// done and a short message. A chunk that fails after retries drops its
    /// files into [`MergeResult::skipped_files`] and the merge continues.
    ///
    /// # Errors
    ///
    /// - [`MergeAbort::Cancelled`] when `cancel` fires. Chunks already in
    ///   flight finish and are appended, and the output is still written.
    /// - [`MergeAbort::Fatal`] for invalid input or when the output cannot be
    ///   opened, appended to, or written.
    pub async fn merge_streaming<P>(
        &self,
        cancel: &CancellationToken,
        files: &[PathBuf],
        output: &Path,
        mut on_progress: P,
    ) -> std::result::Result<MergeResult, MergeAbort>
    where
        P: FnMut(f64, &str),
    {
        let started = Instant::now();

        if files.is_empty() {
            self.transition(MergeState::Failed);
            return Err(MergeAbort::fatal(MergeError::NoFilesToMerge));
        }

        self.transition(MergeState::Analyzing);
        let sizes = match self.analyzer.scan(files).await {
            Ok(sizes) => sizes,
            Err(e) => {
                self.transition(MergeState::Failed);
                error!(error = %e, "Could not scan input sizes");
                return Err(MergeAbort::fatal(e));
            }
        };
        let profile = FileSetProfile::from_sizes(&sizes, self.analyzer.large_file_threshold());

        self.transition(MergeState::Planning);
        let initial = self
            .planner
            .plan(&profile, files.len(), self.monitor.check_pressure());
        let fixed_plan = (!self.options.use_streaming).then_some(ChunkPlan {
            worker_count: 1,
            use_concurrent: false,
            ..initial
        });
        let adaptive = self.options.use_streaming && self.options.enable_adaptive_chunking;

        info!(
            files = profile.file_count,
            total = %format_file_size(profile.total_size),
            chunk_size = initial.chunk_size,
            workers = initial.worker_count,
            concurrent = initial.use_concurrent,
            adaptive,
            "Starting streaming merge"
        );

        let merger = Arc::clone(&self.merger);
        let out = output.to_path_buf();
        let mut target = match run_blocking(move || merger.open(&out)).await {
            Ok(target) => target,
            Err(e) => {
                self.transition(MergeState::Failed);
                error!(output = %output.display(), error = %e, "Could not open output");
                return Err(MergeAbort::fatal(e));
            }
        };

        self.transition(MergeState::Processing);
        let job = cancel.child_token();
        let mut cursor = ChunkCursor::new(files);
        let mut pool = ChunkWorkerPool::new();
        let mut progress = Progress::new(files.len());
        let mut plan = fixed_plan.unwrap_or(initial);
        let mut cancelled = false;

        loop {
            if !cancelled && job.is_cancelled() {
                cancelled = true;
                info!(
                    done = progress.files_done(),
                    in_flight = pool.in_flight(),
                    "Cancellation requested, draining in-flight chunks"
                );
            }

            while !cancelled && !cursor.is_done() {
                let next = match fixed_plan {
                    Some(fixed) => fixed,
                    None if adaptive => self.planner.plan(
                        &profile,
                        cursor.remaining(),
                        self.monitor.check_pressure(),
                    ),
                    None => initial,
                };
                if next.pressure > plan.pressure {
                    warn!(
                        from = %plan.pressure,
                        to = %next.pressure,
                        chunk_size = next.chunk_size,
                        "Memory pressure rising, shrinking chunks"
                    );
                }
                plan = next;

                if pool.in_flight() >= plan.worker_count {
                    break;
                }

                let mut size = plan.chunk_size;
                if self.options.enable_memory_prediction {
                    size = self.planner.fit_to_headroom(
                        size,
                        &sizes[cursor.position()..],
                        self.monitor.headroom(),
                    );
                }

                let Some(chunk) = cursor.take(size) else {
                    break;
                };
                debug!(
                    chunk = chunk.index,
                    start = chunk.start,
                    files = chunk.len(),
                    in_flight = pool.in_flight(),
                    pressure = %plan.pressure,
                    "Dispatching chunk"
                );

                let task = run_chunk(
                    Arc::clone(&self.recovery),
                    Arc::clone(&self.merger),
                    job.clone(),
                    chunk.index,
                    chunk.files.clone(),
                );
                pool.spawn(chunk, task);
            }

            let Some((chunk, joined)) = pool.next().await else {
                break;
            };

            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.recovery.record(&format!("chunk-{}", chunk.index), &e, 1);
                    RetryOutcome::Failed {
                        error: e,
                        attempts: 1,
                        reason: StopReason::NotRetryable,
                    }
                }
            };

            let message = match outcome {
                RetryOutcome::Succeeded { value, retries } => {
                    let merger = Arc::clone(&self.merger);
                    let appended = run_blocking(move || {
                        let mut target = target;
                        let pages = merger.append(&mut target, value)?;
                        Ok((target, pages))
                    })
                    .await;

                    let pages = match appended {
                        Ok((returned, pages)) => {
                            target = returned;
                            pages
                        }
                        Err(e) => {
                            job.cancel();
                            self.transition(MergeState::Failed);
                            error!(chunk = chunk.index, error = %e, "Append to output failed");
                            let partial = self.result(output, &progress, started);
                            return Err(MergeAbort::Fatal {
                                error: e,
                                partial: Some(Box::new(partial)),
                            });
                        }
                    };

                    progress.processed_files += chunk.len();
                    progress.total_pages += pages;
                    progress.chunks_processed += 1;
                    debug!(chunk = chunk.index, pages, retries, "Appended chunk");
                    format!(
                        "Merged files {}-{} of {}",
                        chunk.start + 1,
                        chunk.start + chunk.len(),
                        progress.total_files
                    )
                }
                RetryOutcome::Failed { error, attempts, .. } => {
                    warn!(
                        chunk = chunk.index,
                        files = chunk.len(),
                        attempts,
                        category = %error.category(),
                        "Skipping chunk"
                    );
                    progress.skipped_files.extend(chunk.files);
                    progress.chunks_processed += 1;
                    format!("Skipped chunk {} after {attempts} attempt(s)", chunk.index)
                }
                RetryOutcome::Cancelled { .. } => {
                    cancelled = true;
                    debug!(chunk = chunk.index, "Chunk cancelled before completing");
                    continue;
                }
            };

            on_progress(progress.fraction(), &message);
        }

        self.transition(MergeState::Finalizing);
        let merger = Arc::clone(&self.merger);
        let out = output.to_path_buf();
        if let Err(e) = run_blocking(move || merger.finalize(target, &out)).await {
            self.transition(MergeState::Failed);
            error!(output = %output.display(), error = %e, "Could not write output");
            let partial = self.result(output, &progress, started);
            return Err(MergeAbort::Fatal {
                error: e,
                partial: Some(Box::new(partial)),
            });
        }

        let result = self.result(output, &progress, started);

        info!(
            pages = result.total_pages,
            processed = result.processed_files,
            skipped = result.skipped_files.len(),
            chunks = result.chunks_processed,
            peak_workers = pool.peak_in_flight(),
            elapsed_ms = result.processing_time.as_millis() as u64,
            memory = %result.format_memory_usage(),
            cancelled,
            "Streaming merge finished"
        );

        if cancelled {
            self.transition(MergeState::Cancelled);
            Err(MergeAbort::Cancelled {
                partial: Box::new(result),
            })
        } else {
            self.transition(MergeState::Completed);
            Ok(result)
        }
    }

    fn result(&self, output: &Path, progress: &Progress, started: Instant) -> MergeResult {
        MergeResult {
            output_path: output.to_path_buf(),
            total_pages: progress.total_pages,
            processed_files: progress.processed_files,
            skipped_files: progress.skipped_files.clone(),
            processing_time: started.elapsed(),
            memory_usage: self.monitor.current_usage(),
            chunks_processed: progress.chunks_processed,
        }
    }
}

impl<M: ChunkMerger> fmt::Debug for StreamingMerger<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingMerger")
            .field("options", &self.options)
            .field("monitor", &self.monitor)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// One chunk's merge under retry and recovery.
///
/// An attempt cut off by the retry timeout keeps running on its blocking
/// thread, so the chunk is not finished until every attempt has returned.
/// Until then it still occupies its worker slot.
async fn run_chunk<M: ChunkMerger>(
    recovery: Arc<RecoveryManager>,
    merger: Arc<M>,
    cancel: CancellationToken,
    index: usize,
    files: Vec<PathBuf>,
) -> RetryOutcome<M::Part> {
    let name = format!("chunk-{index}");
    let attempts = TaskTracker::new();

    let outcome = recovery
        .execute(&name, &cancel, || {
            let merger = Arc::clone(&merger);
            let files = files.clone();
            let handle = attempts.spawn_blocking(move || merger.merge_chunk(&files));
            async move {
                handle.await.map_err(|e| MergeError::WorkerFailed {
                    reason: e.to_string(),
                })?
            }
        })
        .await;

    attempts.close();
    if !attempts.is_empty() {
        debug!(chunk = index, running = attempts.len(), "Waiting for abandoned attempts");
    }
    attempts.wait().await;

    outcome
}
