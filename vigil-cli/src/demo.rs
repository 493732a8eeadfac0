//! Toy regression model driven by `vigil run`.
//!
//! Stands in for a real model so the monitor can be exercised end to end:
//! a two-feature linear model fit to synthetic data with full-batch
//! gradient descent.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vigil_core::{Model, Parameter, TaskError};

const TRUE_WEIGHTS: [f64; 2] = [2.0, -1.0];
const TRUE_BIAS: f64 = 0.5;
const NOISE: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct Dataset {
    pub x: Vec<[f64; 2]>,
    pub y: Vec<f64>,
}

impl Dataset {
    fn sample(rng: &mut StdRng, n: usize) -> Self {
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for _ in 0..n {
            let row = [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)];
            let noise = rng.gen_range(-NOISE..NOISE);
            y.push(TRUE_WEIGHTS[0] * row[0] + TRUE_WEIGHTS[1] * row[1] + TRUE_BIAS + noise);
            x.push(row);
        }
        Self { x, y }
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Train and test sets drawn from the same distribution.
pub fn synthetic_split(n_train: usize, n_test: usize, seed: u64) -> (Dataset, Dataset) {
    let mut rng = StdRng::seed_from_u64(seed);
    let train = Dataset::sample(&mut rng, n_train);
    let test = Dataset::sample(&mut rng, n_test);
    (train, test)
}

#[derive(Debug, Clone)]
pub struct LinearModel {
    weights: [f64; 2],
    bias: f64,
    train: Dataset,
}

impl LinearModel {
    pub fn new(train: Dataset) -> Self {
        Self {
            weights: [0.0; 2],
            bias: 0.0,
            train,
        }
    }

    /// One full-batch gradient descent step on the mean squared error.
    pub fn gradient_step(&mut self, learning_rate: f64) {
        if self.train.is_empty() {
            return;
        }
        let n = self.train.len() as f64;
        let mut grad_w = [0.0; 2];
        let mut grad_b = 0.0;
        for (row, y) in self.train.x.iter().zip(&self.train.y) {
            let err = dot(&self.weights, row) + self.bias - y;
            grad_w[0] += 2.0 * err * row[0] / n;
            grad_w[1] += 2.0 * err * row[1] / n;
            grad_b += 2.0 * err / n;
        }
        self.weights[0] -= learning_rate * grad_w[0];
        self.weights[1] -= learning_rate * grad_w[1];
        self.bias -= learning_rate * grad_b;
    }
}

fn dot(w: &[f64; 2], x: &[f64; 2]) -> f64 {
    w[0] * x[0] + w[1] * x[1]
}

/// Predict from a parameter snapshot, as a monitor task sees the model.
pub fn predict(parameters: &[Parameter], x: &[[f64; 2]]) -> Result<Vec<f64>, TaskError> {
    let weights = find(parameters, "weights", 2)?;
    let bias = find(parameters, "bias", 1)?[0];
    let w = [weights[0], weights[1]];
    Ok(x.iter().map(|row| dot(&w, row) + bias).collect())
}

pub fn rmse(predictions: &[f64], targets: &[f64]) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    let sse: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| (p - t).powi(2))
        .sum();
    (sse / targets.len() as f64).sqrt()
}

fn find<'a>(parameters: &'a [Parameter], name: &str, len: usize) -> Result<&'a [f64], TaskError> {
    let param = parameters
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| TaskError::model(format!("missing parameter '{name}'")))?;
    if param.values.len() != len {
        return Err(TaskError::model(format!(
            "parameter '{name}' has {} values, expected {len}",
            param.values.len()
        )));
    }
    Ok(&param.values)
}

impl Model for LinearModel {
    fn name(&self) -> &str {
        "linear"
    }

    fn objective(&self) -> f64 {
        let params = self.parameters();
        match predict(&params, &self.train.x) {
            Ok(pred) => rmse(&pred, &self.train.y).powi(2),
            Err(_) => f64::NAN,
        }
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::new("weights", self.weights.to_vec()),
            Parameter::scalar("bias", self.bias),
        ]
    }

    fn assign(&mut self, parameters: &[Parameter]) -> Result<(), TaskError> {
        let weights = find(parameters, "weights", 2)?;
        let bias = find(parameters, "bias", 1)?[0];
        self.weights = [weights[0], weights[1]];
        self.bias = bias;
        Ok(())
    }
}
