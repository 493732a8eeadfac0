//! Tasks that write scalars into a shared [`SummaryWriter`](crate::summary::SummaryWriter).

use crate::context::MonitorContext;
use crate::error::TaskError;
use crate::summary::SharedSummaryWriter;
use crate::task::Task;

/// Computes the value a [`ScalarSummaryTask`] records.
pub type ScalarFn = Box<dyn FnMut(&MonitorContext<'_>) -> Result<f64, TaskError>>;

fn write_scalar(
    writer: &SharedSummaryWriter,
    step: u64,
    tag: &str,
    value: f64,
) -> Result<(), TaskError> {
    writer
        .try_borrow_mut()
        .map_err(|_| TaskError::Summary("summary writer is already in use".into()))?
        .add_scalar(step, tag, value)
}

fn flush(writer: &SharedSummaryWriter) -> Result<(), TaskError> {
    writer
        .try_borrow_mut()
        .map_err(|_| TaskError::Summary("summary writer is already in use".into()))?
        .flush()
}

/// Records the value of a user function under a fixed tag.
///
/// Covers objective tracking and held-out evaluation such as test-set error.
pub struct ScalarSummaryTask {
    writer: SharedSummaryWriter,
    tag: String,
    func: ScalarFn,
}

impl ScalarSummaryTask {
    pub fn new<F>(writer: SharedSummaryWriter, tag: impl Into<String>, func: F) -> Self
    where
        F: FnMut(&MonitorContext<'_>) -> Result<f64, TaskError> + 'static,
    {
        Self {
            writer,
            tag: tag.into(),
            func: Box::new(func),
        }
    }

    /// Records the model objective under `objective`.
    pub fn objective(writer: SharedSummaryWriter) -> Self {
        Self::new(writer, "objective", |ctx| Ok(ctx.model.objective()))
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl Task for ScalarSummaryTask {
    fn run(&mut self, ctx: &MonitorContext<'_>) -> Result<(), TaskError> {
        let value = (self.func)(ctx)?;
        write_scalar(&self.writer, ctx.step, &self.tag, value)?;
        if ctx.finished {
            flush(&self.writer)?;
        }
        Ok(())
    }
}

/// Records the objective and every parameter element of the model.
///
/// Scalar parameters are tagged `param/<name>`; array elements
/// `param/<name>/<index>`.
pub struct ModelSummaryTask {
    writer: SharedSummaryWriter,
    only: Option<Vec<String>>,
}

impl ModelSummaryTask {
    pub fn new(writer: SharedSummaryWriter) -> Self {
        Self { writer, only: None }
    }

    /// Restrict parameter output to the named parameters.
    pub fn with_parameters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

impl Task for ModelSummaryTask {
    fn run(&mut self, ctx: &MonitorContext<'_>) -> Result<(), TaskError> {
        write_scalar(&self.writer, ctx.step, "objective", ctx.model.objective())?;
        for param in ctx.model.parameters() {
            if let Some(only) = &self.only {
                if !only.iter().any(|n| *n == param.name) {
                    continue;
                }
            }
            if param.is_scalar() {
                let tag = format!("param/{}", param.name);
                write_scalar(&self.writer, ctx.step, &tag, param.values[0])?;
            } else {
                for (i, value) in param.values.iter().enumerate() {
                    let tag = format!("param/{}/{i}", param.name);
                    write_scalar(&self.writer, ctx.step, &tag, *value)?;
                }
            }
        }
        if ctx.finished {
            flush(&self.writer)?;
        }
        Ok(())
    }
}
