//! The seam between the monitor and the model being optimized.
//!
//! The monitor never trains anything itself. Tasks only need to read the
//! current objective and parameters, and checkpoint restore needs to write
//! parameters back.

use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// A named, flattened parameter array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub values: Vec<f64>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, vec![value])
    }

    pub fn is_scalar(&self) -> bool {
        self.values.len() == 1
    }
}

/// A model observed by monitor tasks.
pub trait Model {
    /// Short name used in checkpoint and summary file names.
    fn name(&self) -> &str;

    /// Current value of the training objective (e.g. log marginal likelihood).
    fn objective(&self) -> f64;

    /// Snapshot of all trainable parameters.
    fn parameters(&self) -> Vec<Parameter>;

    /// Overwrite parameters, e.g. from a checkpoint.
    fn assign(&mut self, parameters: &[Parameter]) -> Result<(), TaskError>;
}

/// Placeholder model for loops that have no model handle to expose.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoModel;

impl Model for NoModel {
    fn name(&self) -> &str {
        "none"
    }

    fn objective(&self) -> f64 {
        f64::NAN
    }

    fn parameters(&self) -> Vec<Parameter> {
        Vec::new()
    }

    fn assign(&mut self, parameters: &[Parameter]) -> Result<(), TaskError> {
        if parameters.is_empty() {
            Ok(())
        } else {
            Err(TaskError::model("NoModel has no parameters to assign"))
        }
    }
}
