//! Firing conditions: predicates over the step counter.

use crate::error::MonitorError;

/// Decides whether a task fires at a given step.
pub trait Condition {
    /// Returns `true` when the task should run at `step`.
    fn check(&mut self, step: u64) -> bool;

    /// Human-readable description, used in logs and `Debug` output.
    fn describe(&self) -> String;
}

impl std::fmt::Debug for dyn Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Fires every `period` steps, never at step 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Periodic {
    period: u64,
}

impl Periodic {
    /// Create a periodic condition. Non-positive periods are rejected.
    pub fn new(period: i64) -> Result<Self, MonitorError> {
        if period <= 0 {
            return Err(MonitorError::invalid_argument(format!(
                "period must be positive, got {period}"
            )));
        }
        Ok(Self {
            period: period as u64,
        })
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    /// The pure predicate behind [`Condition::check`].
    pub fn is_due(&self, step: u64) -> bool {
        step > 0 && step % self.period == 0
    }
}

impl Condition for Periodic {
    fn check(&mut self, step: u64) -> bool {
        self.is_due(step)
    }

    fn describe(&self) -> String {
        format!("every {} steps", self.period)
    }
}

/// Fires on every step.
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl Condition for Always {
    fn check(&mut self, _step: u64) -> bool {
        true
    }

    fn describe(&self) -> String {
        "always".into()
    }
}

/// Never fires during the loop. Useful for exit-only tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl Condition for Never {
    fn check(&mut self, _step: u64) -> bool {
        false
    }

    fn describe(&self) -> String {
        "never".into()
    }
}

/// Fires at `start`, then at intervals that grow geometrically up to a cap.
///
/// Handy for logging that is dense early in training and sparse later.
/// Fractional intervals are rounded up to whole steps.
#[derive(Debug, Clone)]
pub struct GrowingInterval {
    /// Next step that fires; `None` once the step counter is exhausted.
    next: Option<u64>,
    interval: f64,
    growth: f64,
    max_interval: f64,
}

impl GrowingInterval {
    pub fn new(
        start: u64,
        initial_interval: f64,
        growth: f64,
        max_interval: f64,
    ) -> Result<Self, MonitorError> {
        if !(initial_interval > 0.0) {
            return Err(MonitorError::invalid_argument(format!(
                "initial interval must be positive, got {initial_interval}"
            )));
        }
        if !(growth >= 1.0) {
            return Err(MonitorError::invalid_argument(format!(
                "interval growth must be at least 1.0, got {growth}"
            )));
        }
        if !(max_interval >= initial_interval) || max_interval.is_infinite() {
            return Err(MonitorError::invalid_argument(format!(
                "max interval must be finite and at least {initial_interval}, got {max_interval}"
            )));
        }
        Ok(Self {
            next: Some(start),
            interval: initial_interval,
            growth,
            max_interval,
        })
    }

    fn gap(&self) -> u64 {
        (self.interval.ceil() as u64).max(1)
    }
}

impl Condition for GrowingInterval {
    fn check(&mut self, step: u64) -> bool {
        let Some(mut next) = self.next else {
            return false;
        };
        if step < next {
            return false;
        }
        loop {
            let gap = self.gap();
            let grown = (self.interval * self.growth).min(self.max_interval);
            if grown == self.interval {
                // Fixed interval from here on: jump to the first due step past `step`.
                self.next = ((step - next) / gap)
                    .checked_add(1)
                    .and_then(|n| n.checked_mul(gap))
                    .and_then(|d| next.checked_add(d));
                return true;
            }
            self.interval = grown;
            match next.checked_add(gap) {
                Some(n) if n > step => {
                    self.next = Some(n);
                    return true;
                }
                Some(n) => next = n,
                None => {
                    self.next = None;
                    return true;
                }
            }
        }
    }

    fn describe(&self) -> String {
        match self.next {
            Some(next) => format!(
                "growing interval (next {next}, x{} up to {})",
                self.growth, self.max_interval
            ),
            None => "growing interval (exhausted)".into(),
        }
    }
}

/// Wraps an arbitrary predicate over the step counter.
pub struct FnCondition<F> {
    label: String,
    predicate: F,
}

impl<F> FnCondition<F>
where
    F: Fn(u64) -> bool,
{
    pub fn new(label: impl Into<String>, predicate: F) -> Self {
        Self {
            label: label.into(),
            predicate,
        }
    }
}

impl<F> Condition for FnCondition<F>
where
    F: Fn(u64) -> bool,
{
    fn check(&mut self, step: u64) -> bool {
        (self.predicate)(step)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
