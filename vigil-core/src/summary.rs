//! Scalar summary log: one JSON object per line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::TaskError;

/// A single recorded scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarEvent {
    pub step: u64,
    pub tag: String,
    /// `None` when the value was not finite.
    pub value: Option<f64>,
    pub wall_time: DateTime<Utc>,
}

/// Appends scalar events to `<dir>/<run>.scalars.jsonl`.
#[derive(Debug)]
pub struct SummaryWriter {
    path: PathBuf,
    out: BufWriter<File>,
    flush_immediately: bool,
    written: u64,
}

/// Writer shared by several tasks on the monitor's thread.
pub type SharedSummaryWriter = Rc<RefCell<SummaryWriter>>;

impl SummaryWriter {
    pub fn create(dir: &Path, run_name: &str) -> Result<Self, TaskError> {
        if run_name.is_empty() || run_name.contains(['/', '\\']) {
            return Err(TaskError::Summary(format!(
                "invalid run name '{run_name}'"
            )));
        }
        std::fs::create_dir_all(dir)?;
        let path = Self::log_path(dir, run_name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
            flush_immediately: false,
            written: 0,
        })
    }

    /// Flush after every event instead of only on [`flush`](Self::flush) and drop.
    pub fn with_flush_immediately(mut self, flush_immediately: bool) -> Self {
        self.flush_immediately = flush_immediately;
        self
    }

    /// Where a writer for `run_name` in `dir` puts its events.
    pub fn log_path(dir: &Path, run_name: &str) -> PathBuf {
        dir.join(format!("{run_name}.scalars.jsonl"))
    }

    pub fn into_shared(self) -> SharedSummaryWriter {
        Rc::new(RefCell::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of events written by this writer.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn add_scalar(&mut self, step: u64, tag: &str, value: f64) -> Result<(), TaskError> {
        let event = ScalarEvent {
            step,
            tag: tag.to_string(),
            value: value.is_finite().then_some(value),
            wall_time: Utc::now(),
        };
        serde_json::to_writer(&mut self.out, &event)?;
        self.out.write_all(b"\n")?;
        self.written += 1;
        if self.flush_immediately {
            self.out.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), TaskError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Parse a scalar log. Blank lines are skipped.
pub fn read_scalars(path: &Path) -> Result<Vec<ScalarEvent>, TaskError> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        events.push(serde_json::from_str(&line)?);
    }
    Ok(events)
}

/// The most recent event per tag, ordered by tag.
pub fn latest_by_tag(events: &[ScalarEvent]) -> BTreeMap<&str, &ScalarEvent> {
    let mut latest: BTreeMap<&str, &ScalarEvent> = BTreeMap::new();
    for event in events {
        match latest.get(event.tag.as_str()) {
            Some(prev) if prev.step > event.step => {}
            _ => {
                latest.insert(event.tag.as_str(), event);
            }
        }
    }
    latest
}
