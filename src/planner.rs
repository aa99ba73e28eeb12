//! Chunk size and concurrency planning.
//!
//! The planner is deterministic: the same profile, pressure level and options
//! always give the same [`ChunkPlan`]. The steps are:
//!
//! 1. `ceiling / avg_size / safety_factor`, clamped to the chunk bounds.
//! 2. Halved when the set contains large files.
//! 3. Halved again under Warning pressure. Critical pressure pins the chunk to
//!    the minimum and the pool to a single worker.
//! 4. Concurrency only for sets above the worker threshold, at Normal
//!    pressure, with more than one worker configured.
//! 5. Worker count capped by the configured bound and the chunks remaining.
//!
//! Every halving floors at 1 and is clamped back into the chunk bounds, so
//! `min_chunk_size <= chunk_size <= max_chunk_size` holds for every plan.

use serde::{Deserialize, Serialize};

use crate::analysis::FileSetProfile;
use crate::config::MergeOptions;
use crate::memory::MemoryPressureLevel;

/// How the next chunk(s) should be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPlan {
    /// Files per chunk.
    pub chunk_size: usize,
    /// Parallel chunk workers.
    pub worker_count: usize,
    /// Whether chunks run concurrently.
    pub use_concurrent: bool,
    /// Pressure level the plan was derived under.
    pub pressure: MemoryPressureLevel,
}

/// Derives [`ChunkPlan`]s from a profile and a pressure reading.
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    ceiling: u64,
    min_chunk_size: usize,
    max_chunk_size: usize,
    concurrent_workers: usize,
    safety_factor: u64,
    worker_threshold: usize,
}

impl ChunkPlanner {
    /// Create a planner from validated options.
    pub fn new(options: &MergeOptions) -> Self {
        Self {
            ceiling: options.max_memory_usage,
            min_chunk_size: options.min_chunk_size,
            max_chunk_size: options.max_chunk_size,
            concurrent_workers: options.concurrent_workers,
            safety_factor: options.planner.safety_factor.max(1),
            worker_threshold: options.planner.worker_threshold,
        }
    }

    fn clamp(&self, size: usize) -> usize {
        size.clamp(self.min_chunk_size, self.max_chunk_size)
    }

    fn halve(&self, size: usize) -> usize {
        self.clamp((size / 2).max(1))
    }

    /// Steps 1 and 2: chunk size from the profile alone.
    pub fn base_chunk_size(&self, profile: &FileSetProfile) -> usize {
        let base = match profile.avg_size {
            0 => self.max_chunk_size,
            avg => {
                let fit = self.ceiling / avg / self.safety_factor;
                self.clamp(usize::try_from(fit).unwrap_or(usize::MAX))
            }
        };

        if profile.has_large_files {
            self.halve(base)
        } else {
            base
        }
    }

    /// Step 4.
    pub fn should_use_concurrent(
        &self,
        profile: &FileSetProfile,
        pressure: MemoryPressureLevel,
    ) -> bool {
        profile.file_count > self.worker_threshold
            && pressure == MemoryPressureLevel::Normal
            && self.concurrent_workers > 1
    }

    /// Full plan for `remaining_files` of the set described by `profile`.
    pub fn plan(
        &self,
        profile: &FileSetProfile,
        remaining_files: usize,
        pressure: MemoryPressureLevel,
    ) -> ChunkPlan {
        let base = self.base_chunk_size(profile);

        let chunk_size = match pressure {
            MemoryPressureLevel::Normal => base,
            MemoryPressureLevel::Warning => self.halve(base),
            MemoryPressureLevel::Critical => self.min_chunk_size,
        };

        let use_concurrent = self.should_use_concurrent(profile, pressure);

        let worker_count = if use_concurrent {
            let chunks_left = remaining_files.div_ceil(chunk_size);
            self.concurrent_workers.min(chunks_left).max(1)
        } else {
            1
        };

        ChunkPlan {
            chunk_size,
            worker_count,
            use_concurrent,
            pressure,
        }
    }

    /// Trim `planned` so the predicted footprint of the files it would take
    /// fits in `headroom`. `sizes` are the sizes of the upcoming files in
    /// order. Never goes below the minimum chunk size.
    pub fn fit_to_headroom(&self, planned: usize, sizes: &[u64], headroom: u64) -> usize {
        let limit = planned.min(sizes.len());
        let mut predicted = 0u64;
        let mut fits = 0;

        for size in &sizes[..limit] {
            predicted = predicted.saturating_add(size.saturating_mul(self.safety_factor));
            if predicted > headroom {
                break;
            }
            fits += 1;
        }

        if fits == limit {
            planned
        } else {
            fits.max(self.min_chunk_size)
        }
    }
}
