//! The monitor loop: dispatches due tasks once per optimizer step.
//!
//! The optimizer calls [`Monitor::notify`] after every step. Each registered
//! task is checked in registration order, and the ones whose condition fires
//! are run synchronously on the caller's thread with their wall time added to
//! the timing table. [`Monitor::stop`] runs the exit-flagged tasks one last
//! time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::condition::Condition;
use crate::context::{MonitorContext, TaskTiming, TimingTable, rate};
use crate::error::{MonitorError, Result};
use crate::model::Model;
use crate::task::{Task, TaskConfig};

/// What to do when a task action returns an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the current dispatch and return the error to the caller.
    #[default]
    FailFast,
    /// Log the error, count it against the task, and keep going.
    BestEffort,
}

struct TaskEntry {
    name: String,
    condition: Box<dyn Condition>,
    run_on_exit: bool,
    task: Box<dyn Task>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
struct LoopClock {
    started: Instant,
    started_at: DateTime<Utc>,
}

impl LoopClock {
    fn now() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

/// Ordered collection of tasks driven by an external optimization loop.
pub struct Monitor {
    policy: FailurePolicy,
    entries: Vec<TaskEntry>,
    timings: TimingTable,
    phase: Phase,
    clock: Option<LoopClock>,
    last_step: Option<u64>,
    init_step: u64,
    iteration: u64,
}

impl Monitor {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            entries: Vec::new(),
            timings: TimingTable::new(),
            phase: Phase::Idle,
            clock: None,
            last_step: None,
            init_step: 0,
            iteration: 0,
        }
    }

    /// Build a monitor from a list of tasks, rejecting duplicate names.
    pub fn with_tasks<I>(policy: FailurePolicy, tasks: I) -> Result<Self>
    where
        I: IntoIterator<Item = (TaskConfig, Box<dyn Task>)>,
    {
        let mut monitor = Self::new(policy);
        for (config, task) in tasks {
            monitor.add_task(config, task)?;
        }
        Ok(monitor)
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Register a task at the end of the list.
    pub fn add_task(&mut self, config: TaskConfig, task: Box<dyn Task>) -> Result<()> {
        if self.phase == Phase::Stopped {
            return Err(MonitorError::Stopped);
        }
        if config.name.trim().is_empty() {
            return Err(MonitorError::invalid_argument("task name must not be empty"));
        }
        if self.entries.iter().any(|e| e.name == config.name) {
            return Err(MonitorError::DuplicateTask(config.name));
        }
        debug!(
            task = %config.name,
            condition = %config.condition.describe(),
            run_on_exit = config.run_on_exit,
            "Registered monitor task"
        );
        self.timings.push(&config.name);
        self.entries.push(TaskEntry {
            name: config.name,
            condition: config.condition,
            run_on_exit: config.run_on_exit,
            task,
        });
        Ok(())
    }

    /// Unregister a task, returning it. Its timing record is discarded.
    pub fn remove_task(&mut self, name: &str) -> Result<Box<dyn Task>> {
        let index = self
            .entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| MonitorError::UnknownTask(name.to_string()))?;
        self.timings.remove(index);
        let entry = self.entries.remove(index);
        debug!(task = %name, "Removed monitor task");
        Ok(entry.task)
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Continue counting from `step`, e.g. after restoring a checkpoint.
    pub fn resume_from(&mut self, step: u64) -> Result<()> {
        if self.phase != Phase::Idle || self.last_step.is_some() {
            return Err(MonitorError::InvalidState(
                "resume_from must be called before the first notify".into(),
            ));
        }
        self.init_step = step;
        self.last_step = Some(step);
        info!(step, "Monitor resuming from step");
        Ok(())
    }

    /// Record the loop start. Called implicitly by the first `notify`.
    pub fn start(&mut self) -> Result<()> {
        match self.phase {
            Phase::Idle => {
                self.clock = Some(LoopClock::now());
                self.phase = Phase::Running;
                info!(tasks = self.entries.len(), "Monitor started");
                Ok(())
            }
            Phase::Running => Ok(()),
            Phase::Stopped => Err(MonitorError::Stopped),
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.phase == Phase::Stopped
    }

    /// Current global step (zero before the first notify of a fresh run).
    pub fn step(&self) -> u64 {
        self.last_step.unwrap_or(0)
    }

    /// Number of `notify` calls so far.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn timings(&self) -> &TimingTable {
        &self.timings
    }

    /// Advance the step counter by one and run the tasks that are due.
    pub fn notify(&mut self, model: &dyn Model) -> Result<()> {
        let step = match self.last_step {
            None => 1,
            Some(previous) => previous.checked_add(1).ok_or_else(|| {
                MonitorError::InvalidState(format!("step counter exhausted at {previous}"))
            })?,
        };
        self.notify_at(step, model)
    }

    /// Run the tasks that are due at an explicit step.
    ///
    /// `step` must be strictly greater than the previous one.
    pub fn notify_at(&mut self, step: u64, model: &dyn Model) -> Result<()> {
        if self.phase == Phase::Stopped {
            return Err(MonitorError::Stopped);
        }
        if let Some(previous) = self.last_step {
            if step <= previous {
                return Err(MonitorError::NonMonotonicStep {
                    previous,
                    requested: step,
                });
            }
        }
        self.start()?;
        self.last_step = Some(step);
        self.iteration += 1;

        for index in 0..self.entries.len() {
            if self.entries[index].condition.check(step) {
                self.run_entry(index, step, model, false)?;
            }
        }
        Ok(())
    }

    /// Run every exit-flagged task once more and stop the monitor.
    ///
    /// Calling `stop` again is a no-op.
    pub fn stop(&mut self, model: &dyn Model) -> Result<()> {
        if self.phase == Phase::Stopped {
            debug!("Monitor already stopped");
            return Ok(());
        }
        if self.clock.is_none() {
            self.clock = Some(LoopClock::now());
        }
        self.phase = Phase::Stopped;

        let step = self.step();
        for index in 0..self.entries.len() {
            if self.entries[index].run_on_exit {
                self.run_entry(index, step, model, true)?;
            }
        }

        let summary = self.summary();
        info!(
            step,
            iterations = summary.iterations,
            total_secs = summary.total_time.as_secs_f64(),
            optimisation_secs = summary.optimisation_time.as_secs_f64(),
            "Monitor stopped"
        );
        Ok(())
    }

    /// Per-task accumulated time, in registration order.
    pub fn summary(&self) -> MonitorSummary {
        let total_time = self.total_time();
        MonitorSummary {
            step: self.step(),
            iterations: self.iteration,
            total_time,
            optimisation_time: total_time.saturating_sub(self.timings.total()),
            tasks: self.timings.iter().cloned().collect(),
        }
    }

    fn total_time(&self) -> Duration {
        self.clock
            .map(|c| c.started.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    fn run_entry(
        &mut self,
        index: usize,
        step: u64,
        model: &dyn Model,
        finished: bool,
    ) -> Result<()> {
        let clock = self.clock.unwrap_or_else(LoopClock::now);
        let total_time = clock.started.elapsed();
        let ctx = MonitorContext {
            step,
            init_step: self.init_step,
            iteration: self.iteration,
            started_at: clock.started_at,
            total_time,
            optimisation_time: total_time.saturating_sub(self.timings.total()),
            finished,
            model,
            timings: &self.timings,
        };

        let entry = &mut self.entries[index];
        let begin = Instant::now();
        let result = entry.task.run(&ctx);
        let elapsed = begin.elapsed();
        self.timings.record(index, elapsed, result.is_err());

        let name = &self.entries[index].name;
        match result {
            Ok(()) => {
                debug!(task = %name, step, elapsed_ms = elapsed.as_millis() as u64, "Task ran");
                Ok(())
            }
            Err(source) => match self.policy {
                FailurePolicy::FailFast => Err(MonitorError::Task {
                    name: name.clone(),
                    source,
                }),
                FailurePolicy::BestEffort => {
                    warn!(task = %name, step, error = %source, "Task failed, continuing");
                    Ok(())
                }
            },
        }
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("policy", &self.policy)
            .field("tasks", &self.task_names())
            .field("phase", &self.phase)
            .field("step", &self.last_step)
            .field("iteration", &self.iteration)
            .finish()
    }
}

/// Timing report produced by [`Monitor::summary`].
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSummary {
    pub step: u64,
    pub iterations: u64,
    pub total_time: Duration,
    pub optimisation_time: Duration,
    pub tasks: Vec<TaskTiming>,
}

impl MonitorSummary {
    pub fn task(&self, name: &str) -> Option<&TaskTiming> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn iteration_rate(&self) -> f64 {
        rate(self.iterations, self.total_time)
    }
}

impl fmt::Display for MonitorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .tasks
            .iter()
            .map(|t| t.name.len())
            .max()
            .unwrap_or(0)
            .max("Task".len());
        writeln!(
            f,
            "{:<width$}  {:>6}  {:>12}  {:>12}",
            "Task", "Runs", "Total (s)", "Mean (ms)"
        )?;
        for t in &self.tasks {
            writeln!(
                f,
                "{:<width$}  {:>6}  {:>12.4}  {:>12.3}",
                t.name,
                t.runs,
                t.total.as_secs_f64(),
                t.mean().as_secs_f64() * 1000.0
            )?;
        }
        write!(
            f,
            "Step {} after {} iterations: total {:.3}s, optimisation {:.3}s ({:.1} it/s)",
            self.step,
            self.iterations,
            self.total_time.as_secs_f64(),
            self.optimisation_time.as_secs_f64(),
            self.iteration_rate()
        )
    }
}
