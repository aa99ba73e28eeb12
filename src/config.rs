//! Configuration for the streaming merge engine.
//!
//! [`MergeOptions`] is supplied by the caller and stays read-only for the
//! lifetime of a [`StreamingMerger`](crate::merge::StreamingMerger). Every
//! numeric heuristic the engine uses (safety factor, large-file threshold,
//! pressure thresholds, retry timing) lives here so it can be tuned without
//! touching the algorithms.
//!
//! Options can be built in code or read from a JSON job definition:
//!
//! ```
//! use pdfstream::config::MergeOptions;
//!
//! let options = MergeOptions::from_json(r#"{ "concurrent_workers": 2, "max_chunk_size": 8 }"#).unwrap();
//! assert_eq!(options.concurrent_workers, 2);
//! assert_eq!(options.min_chunk_size, MergeOptions::default().min_chunk_size);
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{MergeError, Result};

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Timing and budget for retried operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempt budget, including the first attempt.
    pub max_retries: u32,

    /// Delay before the second attempt.
    pub initial_delay: Duration,

    /// Upper bound for any single backoff delay.
    pub max_delay: Duration,

    /// Multiplier applied per attempt.
    pub backoff_factor: f64,

    /// Bound on the whole attempt sequence, measured from the first attempt.
    pub timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl RetryConfig {
    /// Config that gives up after the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 1,
            ..Default::default()
        }
    }

    /// Backoff delay after the failed attempt numbered `attempt` (from 0).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.powi(attempt.min(i32::MAX as u32) as i32);
        let scaled = self.initial_delay.as_nanos() as f64 * factor;
        if !scaled.is_finite() || scaled >= self.max_delay.as_nanos() as f64 {
            self.max_delay
        } else {
            Duration::from_nanos(scaled as u64)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(MergeError::invalid_options(
                "retry.max_retries must be at least 1",
            ));
        }
        if !(self.backoff_factor >= 1.0) {
            return Err(MergeError::invalid_options(format!(
                "retry.backoff_factor must be >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(MergeError::invalid_options(
                "retry.initial_delay cannot exceed retry.max_delay",
            ));
        }
        Ok(())
    }
}

/// Constants that drive chunk planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerTuning {
    /// Multiplier for a file's transient working set over its raw size.
    pub safety_factor: u64,

    /// Any file above this size marks the set as having large files.
    pub large_file_threshold: u64,

    /// Concurrency is only considered for sets with more files than this.
    pub worker_threshold: usize,
}

impl Default for PlannerTuning {
    fn default() -> Self {
        Self {
            safety_factor: 4,
            large_file_threshold: 5 * MIB,
            worker_threshold: 4,
        }
    }
}

/// Memory pressure boundaries, as fractions of the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureThresholds {
    /// Usage at or above this fraction is Warning.
    pub warning: f64,

    /// Usage above this fraction is Critical.
    pub critical: f64,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            warning: 0.70,
            critical: 0.85,
        }
    }
}

/// Complete configuration for a streaming merge engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Memory ceiling in bytes.
    pub max_memory_usage: u64,

    /// Where the output is staged before the final rename.
    /// Defaults to the output file's directory.
    pub temp_directory: Option<PathBuf>,

    /// Allow forced reclamation passes.
    pub enable_gc: bool,

    /// Re-plan and run chunks concurrently. When false, one plan is made up
    /// front and chunks run sequentially.
    pub use_streaming: bool,

    /// Compress and prune the output before writing.
    pub optimize_memory: bool,

    /// Upper bound on parallel chunk workers.
    pub concurrent_workers: usize,

    /// Smallest chunk the planner may produce.
    pub min_chunk_size: usize,

    /// Largest chunk the planner may produce.
    pub max_chunk_size: usize,

    /// Consult the planner before every chunk.
    pub enable_adaptive_chunking: bool,

    /// Trim chunks whose predicted footprint would exceed the ceiling.
    pub enable_memory_prediction: bool,

    /// Retry timing for chunk merges.
    pub retry: RetryConfig,

    /// Planner constants.
    pub planner: PlannerTuning,

    /// Pressure boundaries.
    pub pressure: PressureThresholds,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            max_memory_usage: 512 * MIB,
            temp_directory: None,
            enable_gc: true,
            use_streaming: true,
            optimize_memory: true,
            concurrent_workers: default_workers(),
            min_chunk_size: 1,
            max_chunk_size: 50,
            enable_adaptive_chunking: true,
            enable_memory_prediction: false,
            retry: RetryConfig::default(),
            planner: PlannerTuning::default(),
            pressure: PressureThresholds::default(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(8)
}

impl MergeOptions {
    /// Parse options from a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| MergeError::invalid_options(format!("Malformed options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Set the memory ceiling.
    pub fn with_max_memory(mut self, bytes: u64) -> Self {
        self.max_memory_usage = bytes;
        self
    }

    /// Set the chunk size bounds.
    pub fn with_chunk_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_chunk_size = min;
        self.max_chunk_size = max;
        self
    }

    /// Set the worker bound.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.concurrent_workers = workers;
        self
    }

    /// Set the retry config.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the staging directory.
    pub fn with_temp_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_directory = Some(dir.into());
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::InvalidOptions`] if:
    /// - The memory ceiling is zero
    /// - Chunk bounds are zero or inverted
    /// - The worker bound is zero
    /// - Pressure thresholds are not `0 < warning < critical <= 1`
    /// - The safety factor is zero
    /// - The retry config is unusable
    pub fn validate(&self) -> Result<()> {
        if self.max_memory_usage == 0 {
            return Err(MergeError::invalid_options(
                "max_memory_usage must be greater than zero",
            ));
        }

        if self.min_chunk_size == 0 {
            return Err(MergeError::invalid_options(
                "min_chunk_size must be at least 1",
            ));
        }

        if self.min_chunk_size > self.max_chunk_size {
            return Err(MergeError::invalid_options(format!(
                "min_chunk_size ({}) cannot exceed max_chunk_size ({})",
                self.min_chunk_size, self.max_chunk_size
            )));
        }

        if self.concurrent_workers == 0 {
            return Err(MergeError::invalid_options(
                "concurrent_workers must be at least 1",
            ));
        }

        let PressureThresholds { warning, critical } = self.pressure;
        if !(warning > 0.0 && warning < critical && critical <= 1.0) {
            return Err(MergeError::invalid_options(format!(
                "pressure thresholds must satisfy 0 < warning < critical <= 1, got {warning} and {critical}"
            )));
        }

        if self.planner.safety_factor == 0 {
            return Err(MergeError::invalid_options(
                "planner.safety_factor must be at least 1",
            ));
        }

        self.retry.validate()
    }
}
