//! Named wall-clock timers for backend round trips.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Accumulated statistics for one timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimerStats {
    /// Completed start/stop cycles.
    pub count: u64,
    /// Total elapsed time.
    pub total: Duration,
    /// Longest single cycle.
    pub max: Duration,
}

impl TimerStats {
    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.max = self.max.max(elapsed);
    }

    /// Mean duration per cycle.
    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((self.total.as_nanos() / u128::from(self.count)) as u64)
        }
    }
}

/// Shared registry of named timers.
///
/// Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct TimingAccessor {
    timers: Arc<Mutex<BTreeMap<String, TimerStats>>>,
}

impl TimingAccessor {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A manual timer; call [`Timer::start`] and [`Timer::stop`].
    pub fn timer(&self, name: impl Into<String>) -> Timer {
        Timer {
            name: name.into(),
            accessor: self.clone(),
            started: None,
        }
    }

    /// Start a timer that records when dropped.
    pub fn time(&self, name: impl Into<String>) -> TimingGuard {
        TimingGuard {
            name: name.into(),
            accessor: self.clone(),
            started: Instant::now(),
        }
    }

    fn record(&self, name: &str, elapsed: Duration) {
        self.timers
            .lock()
            .entry(name.to_string())
            .or_default()
            .record(elapsed);
    }

    /// Stats for one timer.
    pub fn stats(&self, name: &str) -> Option<TimerStats> {
        self.timers.lock().get(name).copied()
    }

    /// Copy of every timer's stats.
    pub fn snapshot(&self) -> BTreeMap<String, TimerStats> {
        self.timers.lock().clone()
    }

    /// Forget all recorded timings.
    pub fn reset(&self) {
        self.timers.lock().clear();
    }

    /// Log every timer's stats.
    pub fn print(&self) {
        for (name, stats) in self.snapshot() {
            tracing::info!(
                target: "docgraph::timing",
                timer = %name,
                count = stats.count,
                total_ms = stats.total.as_millis() as u64,
                mean_us = stats.mean().as_micros() as u64,
                max_us = stats.max.as_micros() as u64,
                "Timer summary"
            );
        }
    }
}

/// A manually started and stopped timer.
#[derive(Debug)]
pub struct Timer {
    name: String,
    accessor: TimingAccessor,
    started: Option<Instant>,
}

impl Timer {
    /// Begin a cycle; restarting discards the running cycle.
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// End the running cycle and record it. No-op when not started.
    pub fn stop(&mut self) -> Option<Duration> {
        let elapsed = self.started.take()?.elapsed();
        self.accessor.record(&self.name, elapsed);
        Some(elapsed)
    }
}

/// Records the elapsed time under its name when dropped.
#[derive(Debug)]
pub struct TimingGuard {
    name: String,
    accessor: TimingAccessor,
    started: Instant,
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        self.accessor.record(&self.name, self.started.elapsed());
    }
}
