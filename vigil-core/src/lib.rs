//! # Vigil Core
//!
//! A step-driven task monitor for optimization and training loops.
//!
//! The optimizer calls [`Monitor::notify`] once per step. The monitor checks
//! each registered task's [`Condition`] against the step counter, runs the
//! due ones in registration order, and keeps per-task timing totals. Built-in
//! tasks print throughput, sleep, write checkpoints, and record scalar
//! summaries; any closure can be a task too.
//!
//! ```no_run
//! use vigil_core::model::NoModel;
//! use vigil_core::tasks::{PrintTimingsTask, SleepTask};
//! use vigil_core::{FailurePolicy, Monitor, TaskConfig};
//!
//! # fn main() -> Result<(), vigil_core::MonitorError> {
//! let mut monitor = Monitor::new(FailurePolicy::FailFast);
//! monitor.add_task(
//!     TaskConfig::new("print").every(10)?.with_exit(true),
//!     Box::new(PrintTimingsTask::new()),
//! )?;
//! monitor.add_task(TaskConfig::new("sleep").every(5)?, Box::new(SleepTask::from_millis(1)))?;
//!
//! for _ in 0..100 {
//!     // ... one optimizer step ...
//!     monitor.notify(&NoModel)?;
//! }
//! monitor.stop(&NoModel)?;
//! println!("{}", monitor.summary());
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod monitor;
pub mod persistence;
pub mod summary;
pub mod task;
pub mod tasks;

// Re-export commonly used types at the crate root.
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use condition::{Always, Condition, FnCondition, GrowingInterval, Never, Periodic};
pub use config::{MonitorConfig, MonitorSetup, TaskKind, TaskSpec, build_monitor, load_config};
pub use context::{MonitorContext, TaskTiming, TimingTable};
pub use error::{ConfigError, MonitorError, Result, TaskError};
pub use model::{Model, Parameter};
pub use monitor::{FailurePolicy, Monitor, MonitorSummary};
pub use summary::{ScalarEvent, SharedSummaryWriter, SummaryWriter};
pub use task::{Task, TaskConfig, from_fn};
