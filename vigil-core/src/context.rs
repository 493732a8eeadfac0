//! Loop state handed to every task invocation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::model::Model;

/// Accumulated timing for one registered task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskTiming {
    pub name: String,
    pub total: Duration,
    pub runs: u64,
    pub failures: u64,
}

impl TaskTiming {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            total: Duration::ZERO,
            runs: 0,
            failures: 0,
        }
    }

    /// Mean duration of a single run, or zero if it never ran.
    pub fn mean(&self) -> Duration {
        if self.runs == 0 {
            Duration::ZERO
        } else {
            self.total.div_f64(self.runs as f64)
        }
    }
}

/// Per-task timings in registration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimingTable {
    entries: Vec<TaskTiming>,
}

impl TimingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&TaskTiming> {
        self.entries.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskTiming> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the time spent inside all tasks.
    pub fn total(&self) -> Duration {
        self.entries.iter().map(|t| t.total).sum()
    }

    pub(crate) fn push(&mut self, name: &str) {
        self.entries.push(TaskTiming::new(name));
    }

    pub(crate) fn remove(&mut self, index: usize) -> TaskTiming {
        self.entries.remove(index)
    }

    pub(crate) fn record(&mut self, index: usize, elapsed: Duration, failed: bool) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.total += elapsed;
            entry.runs += 1;
            if failed {
                entry.failures += 1;
            }
        }
    }
}

/// Snapshot of the loop passed to [`Task::run`](crate::task::Task::run).
#[derive(Clone, Copy)]
pub struct MonitorContext<'a> {
    /// Global step counter for this call.
    pub step: u64,
    /// Step the monitor resumed from (zero for a fresh run).
    pub init_step: u64,
    /// Number of `notify` calls made since the monitor started.
    pub iteration: u64,
    /// Wall-clock time the loop started.
    pub started_at: DateTime<Utc>,
    /// Wall time since the loop started.
    pub total_time: Duration,
    /// Wall time not spent inside tasks.
    pub optimisation_time: Duration,
    /// True only while exit tasks run during `stop`.
    pub finished: bool,
    pub model: &'a dyn Model,
    pub timings: &'a TimingTable,
}

impl MonitorContext<'_> {
    /// Steps taken since the monitor started (or resumed).
    pub fn steps_taken(&self) -> u64 {
        self.step.saturating_sub(self.init_step)
    }

    /// Iterations per second of total wall time.
    pub fn iteration_rate(&self) -> f64 {
        rate(self.iteration, self.total_time)
    }

    /// Iterations per second of optimisation time.
    pub fn optimisation_rate(&self) -> f64 {
        rate(self.iteration, self.optimisation_time)
    }
}

impl std::fmt::Debug for MonitorContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorContext")
            .field("step", &self.step)
            .field("init_step", &self.init_step)
            .field("iteration", &self.iteration)
            .field("started_at", &self.started_at)
            .field("total_time", &self.total_time)
            .field("optimisation_time", &self.optimisation_time)
            .field("finished", &self.finished)
            .field("model", &self.model.name())
            .finish()
    }
}

/// Events per second, zero when no time has elapsed.
pub(crate) fn rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}
