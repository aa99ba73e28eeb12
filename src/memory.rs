//! Memory pressure monitoring.
//!
//! The [`MemoryMonitor`] turns raw memory readings into a coarse
//! [`MemoryPressureLevel`] against the configured ceiling. Readings come from a
//! [`MemoryProbe`], so tests and embedders can drive pressure synthetically
//! with [`SyntheticProbe`] while production uses [`SystemProbe`].
//!
//! The monitor is shared (`Arc`) between the orchestrator, the planner path
//! and the recovery layer. All of its methods take `&self` and are safe to
//! call from concurrent workers.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use sysinfo::{Pid, System};
use tracing::{debug, warn};

use crate::config::PressureThresholds;

/// Coarse reading of memory use against the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPressureLevel {
    /// Below the warning threshold.
    Normal,
    /// Between the warning and critical thresholds.
    Warning,
    /// Above the critical threshold.
    Critical,
}

impl fmt::Display for MemoryPressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
        })
    }
}

/// Source of memory readings.
pub trait MemoryProbe: Send + Sync {
    /// Bytes currently attributed to this process.
    fn current_usage(&self) -> u64;

    /// Total memory of the host, or 0 if unknown.
    fn system_memory(&self) -> u64 {
        0
    }

    /// Release whatever the probe can release. Called on forced reclamation.
    fn reclaim(&self) {}
}

/// Probe backed by `sysinfo`, reading the resident set of this process.
pub struct SystemProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SystemProbe {
    /// Create a probe for the current process.
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            warn!("Could not resolve current pid; memory readings will be zero");
        }

        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemProbe {
    fn current_usage(&self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };

        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return 0;
        }
        system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }

    fn system_memory(&self) -> u64 {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.total_memory()
    }

    fn reclaim(&self) {
        // Dropping the cached process table is all sysinfo lets go of.
        *self.system.lock() = System::new();
    }
}

/// Probe whose reading is set by the caller.
#[derive(Debug, Default)]
pub struct SyntheticProbe {
    usage: AtomicU64,
    reclaims: AtomicU64,
}

impl SyntheticProbe {
    /// Create a probe reporting `usage` bytes.
    pub fn new(usage: u64) -> Self {
        Self {
            usage: AtomicU64::new(usage),
            reclaims: AtomicU64::new(0),
        }
    }

    /// Change the reported usage.
    pub fn set_usage(&self, usage: u64) {
        self.usage.store(usage, Ordering::SeqCst);
    }

    /// How many times `reclaim` was called.
    pub fn reclaims(&self) -> u64 {
        self.reclaims.load(Ordering::SeqCst)
    }
}

impl MemoryProbe for SyntheticProbe {
    fn current_usage(&self) -> u64 {
        self.usage.load(Ordering::SeqCst)
    }

    fn reclaim(&self) {
        self.reclaims.fetch_add(1, Ordering::SeqCst);
    }
}

/// Diagnostic snapshot of memory state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Current usage in bytes.
    pub allocated: u64,
    /// Highest usage observed by this monitor.
    pub total_allocated: u64,
    /// Host memory in bytes, 0 if unknown.
    pub system: u64,
    /// Number of forced reclamation passes.
    pub collections: u64,
    /// Configured ceiling in bytes.
    pub ceiling: u64,
}

/// Samples memory and classifies pressure against a ceiling.
pub struct MemoryMonitor {
    probe: Arc<dyn MemoryProbe>,
    ceiling: u64,
    thresholds: PressureThresholds,
    peak: AtomicU64,
    collections: AtomicU64,
}

impl MemoryMonitor {
    /// Create a monitor reading from `probe`.
    pub fn new(probe: Arc<dyn MemoryProbe>, ceiling: u64, thresholds: PressureThresholds) -> Self {
        Self {
            probe,
            ceiling,
            thresholds,
            peak: AtomicU64::new(0),
            collections: AtomicU64::new(0),
        }
    }

    /// Configured ceiling in bytes.
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Current usage in bytes. Updates the observed peak.
    pub fn current_usage(&self) -> u64 {
        let usage = self.probe.current_usage();
        self.peak.fetch_max(usage, Ordering::Relaxed);
        usage
    }

    /// Classify a usage figure against the ceiling.
    pub fn level_for(&self, usage: u64) -> MemoryPressureLevel {
        let ratio = usage as f64 / self.ceiling.max(1) as f64;
        if ratio > self.thresholds.critical {
            MemoryPressureLevel::Critical
        } else if ratio >= self.thresholds.warning {
            MemoryPressureLevel::Warning
        } else {
            MemoryPressureLevel::Normal
        }
    }

    /// Take a reading and classify it.
    pub fn check_pressure(&self) -> MemoryPressureLevel {
        self.level_for(self.current_usage())
    }

    /// Bytes left under the ceiling at the current reading.
    pub fn headroom(&self) -> u64 {
        self.ceiling.saturating_sub(self.current_usage())
    }

    /// Request an immediate reclamation pass.
    pub fn force_gc(&self) {
        let before = self.probe.current_usage();
        self.probe.reclaim();
        let count = self.collections.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(before, collections = count, "Forced memory reclamation");
    }

    /// Number of reclamation passes so far.
    pub fn collections(&self) -> u64 {
        self.collections.load(Ordering::SeqCst)
    }

    /// Diagnostic snapshot.
    pub fn stats(&self) -> MemoryStats {
        let allocated = self.current_usage();
        MemoryStats {
            allocated,
            total_allocated: self.peak.load(Ordering::Relaxed),
            system: self.probe.system_memory(),
            collections: self.collections(),
            ceiling: self.ceiling,
        }
    }
}

impl fmt::Debug for MemoryMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryMonitor")
            .field("ceiling", &self.ceiling)
            .field("thresholds", &self.thresholds)
            .field("collections", &self.collections())
            .finish_non_exhaustive()
    }
}
