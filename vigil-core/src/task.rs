//! The task trait and its per-registration configuration.

use crate::condition::{Always, Condition, Periodic};
use crate::context::MonitorContext;
use crate::error::{MonitorError, TaskError};

/// A unit of work run by the monitor when its condition fires.
pub trait Task {
    fn run(&mut self, ctx: &MonitorContext<'_>) -> Result<(), TaskError>;
}

impl<F> Task for F
where
    F: FnMut(&MonitorContext<'_>) -> Result<(), TaskError>,
{
    fn run(&mut self, ctx: &MonitorContext<'_>) -> Result<(), TaskError> {
        self(ctx)
    }
}

/// Box a closure as a task.
pub fn from_fn<F>(f: F) -> Box<dyn Task>
where
    F: FnMut(&MonitorContext<'_>) -> Result<(), TaskError> + 'static,
{
    Box::new(f)
}

/// How a task is registered: its name, when it fires, and whether it runs at exit.
#[derive(Debug)]
pub struct TaskConfig {
    pub name: String,
    pub condition: Box<dyn Condition>,
    pub run_on_exit: bool,
}

impl TaskConfig {
    /// A task that fires on every step and not at exit.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: Box::new(Always),
            run_on_exit: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.condition = Box::new(condition);
        self
    }

    /// Fire every `period` steps.
    pub fn every(self, period: i64) -> Result<Self, MonitorError> {
        Ok(self.with_condition(Periodic::new(period)?))
    }

    pub fn with_exit(mut self, run_on_exit: bool) -> Self {
        self.run_on_exit = run_on_exit;
        self
    }
}
