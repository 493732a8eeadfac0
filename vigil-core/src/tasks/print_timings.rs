//! Prints iteration and optimisation rates.

use std::io::{self, Write};
use std::time::Duration;

use crate::context::{MonitorContext, rate};
use crate::error::TaskError;
use crate::task::Task;

#[derive(Debug, Clone, Copy)]
struct Mark {
    iteration: u64,
    total: Duration,
    optimisation: Duration,
}

/// Writes one line of throughput figures per run.
///
/// "Recent" rates cover the interval since this task last ran.
pub struct PrintTimingsTask {
    out: Box<dyn Write>,
    last: Option<Mark>,
}

impl PrintTimingsTask {
    /// Print to stdout.
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }

    pub fn with_writer(out: impl Write + 'static) -> Self {
        Self {
            out: Box::new(out),
            last: None,
        }
    }
}

impl Default for PrintTimingsTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Task for PrintTimingsTask {
    fn run(&mut self, ctx: &MonitorContext<'_>) -> Result<(), TaskError> {
        let last = self.last.unwrap_or(Mark {
            iteration: 0,
            total: Duration::ZERO,
            optimisation: Duration::ZERO,
        });
        let recent_iterations = ctx.iteration.saturating_sub(last.iteration);
        let recent_rate = rate(recent_iterations, ctx.total_time.saturating_sub(last.total));
        let recent_opt_rate = rate(
            recent_iterations,
            ctx.optimisation_time.saturating_sub(last.optimisation),
        );

        writeln!(
            self.out,
            "Iteration {}\ttotal itr.rate {:.2}/s\trecent itr.rate {:.2}/s\topt.step {}\ttotal opt.rate {:.2}/s\trecent opt.rate {:.2}/s",
            ctx.iteration,
            ctx.iteration_rate(),
            recent_rate,
            ctx.step,
            ctx.optimisation_rate(),
            recent_opt_rate,
        )?;
        self.out.flush()?;

        self.last = Some(Mark {
            iteration: ctx.iteration,
            total: ctx.total_time,
            optimisation: ctx.optimisation_time,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TimingTable;
    use crate::model::NoModel;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn ctx<'a>(timings: &'a TimingTable, iteration: u64, secs: u64) -> MonitorContext<'a> {
        MonitorContext {
            step: iteration,
            init_step: 0,
            iteration,
            started_at: chrono::Utc::now(),
            total_time: Duration::from_secs(secs),
            optimisation_time: Duration::from_secs(secs) / 2,
            finished: false,
            model: &NoModel,
            timings,
        }
    }

    #[test]
    fn test_prints_total_and_recent_rates() {
        let buf = SharedBuf::default();
        let mut task = PrintTimingsTask::with_writer(buf.clone());
        let timings = TimingTable::new();

        task.run(&ctx(&timings, 10, 10)).unwrap();
        task.run(&ctx(&timings, 30, 12)).unwrap();

        let text = String::from_utf8(buf.0.borrow().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(
            lines[0].starts_with("Iteration 10\ttotal itr.rate 1.00/s\trecent itr.rate 1.00/s")
        );
        assert!(lines[0].contains("total opt.rate 2.00/s"));
        // 20 iterations over the last 2 seconds, 1 second of it optimising.
        assert!(lines[1].contains("recent itr.rate 10.00/s"));
        assert!(lines[1].contains("recent opt.rate 20.00/s"));
        assert!(lines[1].contains("opt.step 30"));
    }
}
