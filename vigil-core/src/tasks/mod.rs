//! Built-in task variants.

pub mod checkpoint;
pub mod print_timings;
pub mod scalar;
pub mod sleep;

pub use checkpoint::CheckpointTask;
pub use print_timings::PrintTimingsTask;
pub use scalar::{ModelSummaryTask, ScalarFn, ScalarSummaryTask};
pub use sleep::SleepTask;
