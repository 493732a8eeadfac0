//! Sleeps for a fixed duration; stands in for slow work in demos and tests.

use std::time::Duration;

use crate::context::MonitorContext;
use crate::error::TaskError;
use crate::task::Task;

#[derive(Debug, Clone, Copy)]
pub struct SleepTask {
    duration: Duration,
}

impl SleepTask {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Task for SleepTask {
    fn run(&mut self, _ctx: &MonitorContext<'_>) -> Result<(), TaskError> {
        std::thread::sleep(self.duration);
        Ok(())
    }
}
