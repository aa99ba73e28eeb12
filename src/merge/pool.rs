//! Bounded, order-preserving chunk execution.
//!
//! Tasks are spawned onto the runtime as soon as they are dispatched, but
//! their results come back strictly in dispatch order: a chunk that finishes
//! early waits behind every chunk dispatched before it. The caller decides
//! how many tasks may be in flight and re-checks that cap before each
//! dispatch, so the cap can shrink mid-run.

use futures::StreamExt;
use futures::stream::FuturesOrdered;
use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use tokio::task::JoinHandle;

use crate::error::{MergeError, Result};

/// A contiguous run of input files merged as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk in dispatch order.
    pub index: usize,
    /// Index of the chunk's first file in the input list.
    pub start: usize,
    /// The files, in input order.
    pub files: Vec<PathBuf>,
}

impl Chunk {
    /// Number of files in the chunk.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the chunk has no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Cuts an ordered file list into consecutive chunks of varying size.
#[derive(Debug)]
pub struct ChunkCursor<'a> {
    files: &'a [PathBuf],
    position: usize,
    next_index: usize,
}

impl<'a> ChunkCursor<'a> {
    /// Start at the first file.
    pub fn new(files: &'a [PathBuf]) -> Self {
        Self {
            files,
            position: 0,
            next_index: 0,
        }
    }

    /// Files not yet handed out.
    pub fn remaining(&self) -> usize {
        self.files.len() - self.position
    }

    /// Index of the next file to hand out.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Whether every file has been handed out.
    pub fn is_done(&self) -> bool {
        self.position >= self.files.len()
    }

    /// Take the next `size` files (fewer at the tail). A size of zero is
    /// treated as one.
    pub fn take(&mut self, size: usize) -> Option<Chunk> {
        if self.is_done() {
            return None;
        }

        let end = (self.position + size.max(1)).min(self.files.len());
        let chunk = Chunk {
            index: self.next_index,
            start: self.position,
            files: self.files[self.position..end].to_vec(),
        };

        self.position = end;
        self.next_index += 1;
        Some(chunk)
    }
}

/// In-flight chunk tasks, drained in dispatch order.
pub struct ChunkWorkerPool<T> {
    tasks: FuturesOrdered<JoinHandle<T>>,
    chunks: VecDeque<Chunk>,
    peak_in_flight: usize,
}

impl<T: Send + 'static> ChunkWorkerPool<T> {
    /// An empty pool.
    pub fn new() -> Self {
        Self {
            tasks: FuturesOrdered::new(),
            chunks: VecDeque::new(),
            peak_in_flight: 0,
        }
    }

    /// Start `task` for `chunk`. Its result is returned by [`next`](Self::next)
    /// after the results of every chunk spawned earlier.
    pub fn spawn<F>(&mut self, chunk: Chunk, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.tasks.push_back(tokio::spawn(task));
        self.chunks.push_back(chunk);
        self.peak_in_flight = self.peak_in_flight.max(self.tasks.len());
    }

    /// Wait for the oldest in-flight chunk. `None` when nothing is in flight.
    ///
    /// A task that panicked is reported as [`MergeError::WorkerFailed`].
    pub async fn next(&mut self) -> Option<(Chunk, Result<T>)> {
        let joined = self.tasks.next().await?;
        let chunk = self.chunks.pop_front()?;

        let result = joined.map_err(|e| MergeError::WorkerFailed {
            reason: format!("chunk {}: {e}", chunk.index),
        });
        Some((chunk, result))
    }

    /// Tasks spawned and not yet returned by `next`.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Highest number of tasks in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight
    }
}

impl<T: Send + 'static> Default for ChunkWorkerPool<T> {
    fn default() -> Self {
        Self::new()
    }
}
