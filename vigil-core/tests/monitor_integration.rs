//! Integration tests for the monitor driving a small training loop.
//!
//! A one-parameter least-squares model is fit by gradient descent while the
//! monitor prints, checkpoints, and records scalars, mirroring how the
//! monitor is wired into a real optimizer.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tempfile::TempDir;
use vigil_core::summary::{latest_by_tag, read_scalars};
use vigil_core::tasks::{CheckpointTask, ModelSummaryTask, ScalarSummaryTask, SleepTask};
use vigil_core::{
    CheckpointStore, FailurePolicy, Model, Monitor, MonitorError, Parameter, SummaryWriter,
    Task, TaskConfig, TaskError, from_fn,
};

struct Slope {
    w: f64,
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Slope {
    fn new() -> Self {
        let xs: Vec<f64> = (0..20).map(|i| i as f64 / 10.0).collect();
        let ys = xs.iter().map(|x| 3.0 * x).collect();
        Self { w: 0.0, xs, ys }
    }

    fn step(&mut self, lr: f64) {
        let n = self.xs.len() as f64;
        let grad: f64 = self
            .xs
            .iter()
            .zip(&self.ys)
            .map(|(x, y)| 2.0 * (self.w * x - y) * x)
            .sum::<f64>()
            / n;
        self.w -= lr * grad;
    }
}

impl Model for Slope {
    fn name(&self) -> &str {
        "slope"
    }

    fn objective(&self) -> f64 {
        let n = self.xs.len() as f64;
        self.xs
            .iter()
            .zip(&self.ys)
            .map(|(x, y)| (self.w * x - y).powi(2))
            .sum::<f64>()
            / n
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![Parameter::scalar("w", self.w)]
    }

    fn assign(&mut self, parameters: &[Parameter]) -> Result<(), TaskError> {
        let w = parameters
            .iter()
            .find(|p| p.name == "w")
            .and_then(|p| p.values.first())
            .ok_or_else(|| TaskError::model("missing parameter 'w'"))?;
        self.w = *w;
        Ok(())
    }
}

#[test]
fn test_training_loop_with_checkpoints_and_scalars() {
    let dir = TempDir::new().unwrap();
    let store = CheckpointStore::new(dir.path().join("checkpoints"), 3).unwrap();
    let writer = SummaryWriter::create(dir.path(), "slope").unwrap().into_shared();

    let mut monitor = Monitor::with_tasks(
        FailurePolicy::FailFast,
        [
            (
                TaskConfig::new("checkpoint").every(15).unwrap().with_exit(true),
                Box::new(CheckpointTask::new(store.clone())) as Box<dyn Task>,
            ),
            (
                TaskConfig::new("model_summary").every(10).unwrap().with_exit(true),
                Box::new(ModelSummaryTask::new(writer.clone())) as Box<dyn Task>,
            ),
            (
                TaskConfig::new("test_error").every(25).unwrap().with_exit(true),
                Box::new(ScalarSummaryTask::new(writer.clone(), "test_error", |ctx| {
                    let w = ctx.model.parameters()[0].values[0];
                    Ok((w - 3.0).abs())
                })) as Box<dyn Task>,
            ),
        ],
    )
    .unwrap();

    let mut model = Slope::new();
    for _ in 0..100 {
        model.step(0.1);
        monitor.notify(&model).unwrap();
    }
    monitor.stop(&model).unwrap();

    // Checkpoints at 15..90 plus exit at 100; three retained.
    let steps: Vec<u64> = store.list().unwrap().iter().map(|c| c.step).collect();
    assert_eq!(steps, vec![75, 90, 100]);

    let events = read_scalars(writer.borrow().path()).unwrap();
    let latest = latest_by_tag(&events);
    assert_eq!(latest["objective"].step, 100);
    assert_eq!(latest["test_error"].step, 100);
    assert!(latest["test_error"].value.unwrap() < 0.1);
    // model_summary: 10 periodic runs + exit, two scalars each
    let summaries = events.iter().filter(|e| e.tag == "param/w").count();
    assert_eq!(summaries, 11);

    let summary = monitor.summary();
    assert_eq!(summary.task("checkpoint").unwrap().runs, 7);
    assert_eq!(summary.task("test_error").unwrap().runs, 5);
}

#[test]
fn test_resume_from_latest_checkpoint() {
    let dir = TempDir::new().unwrap();
    let store = CheckpointStore::new(dir.path(), 2).unwrap();

    let mut model = Slope::new();
    {
        let mut monitor = Monitor::new(FailurePolicy::FailFast);
        monitor
            .add_task(
                TaskConfig::new("checkpoint").every(10).unwrap(),
                Box::new(CheckpointTask::new(store.clone())),
            )
            .unwrap();
        for _ in 0..25 {
            model.step(0.05);
            monitor.notify(&model).unwrap();
        }
    }

    let saved_w = store
        .load(&store.latest().unwrap().unwrap())
        .unwrap()
        .parameters[0]
        .values[0];

    let mut restored = Slope::new();
    let step = store.restore_latest(&mut restored).unwrap().unwrap();
    assert_eq!(step, 20);
    assert_eq!(restored.w, saved_w);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let mut monitor = Monitor::new(FailurePolicy::FailFast);
    monitor
        .add_task(
            TaskConfig::new("record").every(10).unwrap(),
            from_fn(move |ctx| {
                sink.borrow_mut().push((ctx.step, ctx.init_step, ctx.steps_taken()));
                Ok(())
            }),
        )
        .unwrap();
    monitor.resume_from(step).unwrap();
    for _ in 0..10 {
        restored.step(0.05);
        monitor.notify(&restored).unwrap();
    }
    assert_eq!(*seen.borrow(), vec![(30, 20, 10)]);
}

#[test]
fn test_timing_summary_accumulates_sleep() {
    let mut monitor = Monitor::new(FailurePolicy::FailFast);
    monitor
        .add_task(
            TaskConfig::new("sleep").every(1).unwrap(),
            Box::new(SleepTask::new(Duration::from_millis(10))),
        )
        .unwrap();

    let model = Slope::new();
    for _ in 0..5 {
        monitor.notify(&model).unwrap();
    }

    let summary = monitor.summary();
    let sleep = summary.task("sleep").unwrap();
    assert_eq!(sleep.runs, 5);
    assert!(sleep.total >= Duration::from_millis(50));
    assert!(
        sleep.total < Duration::from_millis(500),
        "sleep total {:?} far above 50ms",
        sleep.total
    );
    assert!(summary.total_time >= sleep.total);
    assert!(summary.optimisation_time <= summary.total_time - sleep.total);
}

#[test]
fn test_duplicate_names_rejected_at_construction() {
    let result = Monitor::with_tasks(
        FailurePolicy::FailFast,
        [
            (TaskConfig::new("print"), from_fn(|_| Ok(()))),
            (TaskConfig::new("print"), from_fn(|_| Ok(()))),
        ],
    );
    assert!(matches!(result, Err(MonitorError::DuplicateTask(name)) if name == "print"));
}

#[test]
fn test_checkpoint_failure_propagates_to_caller() {
    struct Diverged;

    impl Model for Diverged {
        fn name(&self) -> &str {
            "diverged"
        }

        fn objective(&self) -> f64 {
            f64::INFINITY
        }

        fn parameters(&self) -> Vec<Parameter> {
            vec![Parameter::scalar("w", f64::NAN)]
        }

        fn assign(&mut self, _parameters: &[Parameter]) -> Result<(), TaskError> {
            Ok(())
        }
    }

    let dir = TempDir::new().unwrap();
    let mut monitor = Monitor::new(FailurePolicy::FailFast);
    monitor
        .add_task(
            TaskConfig::new("checkpoint"),
            Box::new(CheckpointTask::new(CheckpointStore::new(dir.path(), 1).unwrap())),
        )
        .unwrap();

    let err = monitor.notify(&Diverged).unwrap_err();
    assert!(matches!(
        err,
        MonitorError::Task {
            ref name,
            source: TaskError::Model(_)
        } if name == "checkpoint"
    ));
}
