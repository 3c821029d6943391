//! Process-memory sampling for the pipeline's adaptive batching policy.

use std::sync::Mutex;
use sysinfo::{ProcessesToUpdate, System};

/// Pressure bands derived from the configured memory limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemoryPressure {
    /// Below 80% of the limit.
    Normal,
    /// Above 80%: batch thresholds halve.
    Elevated,
    /// Above 90%: buffered chunks are frozen and submitted immediately.
    Critical,
}

/// Samples this process's resident memory against a configured limit.
pub(crate) struct MemoryGauge {
    limit_bytes: u64,
    system: Mutex<System>,
}

impl MemoryGauge {
    pub(crate) fn new(limit_mb: u64) -> Self {
        Self {
            limit_bytes: limit_mb.saturating_mul(1024 * 1024).max(1),
            system: Mutex::new(System::new()),
        }
    }

    /// Fraction of the limit currently used; 0.0 when sampling fails.
    pub(crate) fn usage_fraction(&self) -> f64 {
        let Ok(pid) = sysinfo::get_current_pid() else {
            return 0.0;
        };
        let Ok(mut system) = self.system.lock() else {
            return 0.0;
        };
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let Some(process) = system.process(pid) else {
            return 0.0;
        };
        process.memory() as f64 / self.limit_bytes as f64
    }

    pub(crate) fn pressure(&self) -> MemoryPressure {
        let usage = self.usage_fraction();
        if usage > 0.9 {
            MemoryPressure::Critical
        } else if usage > 0.8 {
            MemoryPressure::Elevated
        } else {
            MemoryPressure::Normal
        }
    }

    /// True when usage still exceeds the hint threshold after a batch.
    pub(crate) fn wants_gc_hint(&self) -> bool {
        self.usage_fraction() > 0.7
    }
}
