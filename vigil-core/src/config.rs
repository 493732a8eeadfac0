//! Configuration system for Vigil.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace config -> explicit file -> environment. The task list is
//! declarative: each [`TaskSpec`] names a built-in task, when it fires, and
//! whether it runs at exit.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::checkpoint::CheckpointStore;
use crate::condition::{Always, Periodic};
use crate::error::ConfigError;
use crate::monitor::{FailurePolicy, Monitor};
use crate::summary::{SharedSummaryWriter, SummaryWriter};
use crate::task::{Task, TaskConfig};
use crate::tasks::{CheckpointTask, ModelSummaryTask, PrintTimingsTask, SleepTask};

/// Top-level monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// What to do when a task fails.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Print the timing table once `vigil run` has stopped the monitor.
    /// The monitor itself only logs its totals.
    #[serde(default = "default_true")]
    pub print_summary_on_stop: bool,
    /// Root directory for run outputs (checkpoints, scalar logs).
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Flush the scalar log after every event.
    #[serde(default)]
    pub flush_immediately: bool,
    /// Tasks to register, in order.
    #[serde(default = "default_tasks")]
    pub tasks: Vec<TaskSpec>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            print_summary_on_stop: true,
            output_dir: default_output_dir(),
            flush_immediately: false,
            tasks: default_tasks(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("runs")
}

fn default_max_to_keep() -> usize {
    5
}

fn default_tasks() -> Vec<TaskSpec> {
    vec![
        TaskSpec {
            name: "print_timings".into(),
            kind: TaskKind::PrintTimings,
            every: Some(50),
            on_exit: true,
        },
        TaskSpec {
            name: "checkpoint".into(),
            kind: TaskKind::Checkpoint {
                max_to_keep: default_max_to_keep(),
                subdir: None,
            },
            every: Some(15),
            on_exit: true,
        },
        TaskSpec {
            name: "model_summary".into(),
            kind: TaskKind::ModelSummary { parameters: None },
            every: Some(100),
            on_exit: true,
        },
    ]
}

/// A declaratively configured built-in task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: TaskKind,
    /// Period in steps; every step when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub every: Option<i64>,
    #[serde(default)]
    pub on_exit: bool,
}

/// Which built-in task a [`TaskSpec`] creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    PrintTimings,
    Sleep {
        millis: u64,
    },
    Checkpoint {
        #[serde(default = "default_max_to_keep")]
        max_to_keep: usize,
        /// Directory under the run directory; `checkpoints` when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subdir: Option<String>,
    },
    ModelSummary {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parameters: Option<Vec<String>>,
    },
}

impl MonitorConfig {
    /// Parse a TOML document on top of the defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Figment::from(Serialized::defaults(MonitorConfig::default()))
            .merge(Toml::string(toml))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn run_dir(&self, run: &str) -> PathBuf {
        self.output_dir.join(run)
    }

    /// Directory used by the first checkpoint task, if one is configured.
    pub fn checkpoint_dir(&self, run: &str) -> Option<PathBuf> {
        self.tasks.iter().find_map(|spec| match &spec.kind {
            TaskKind::Checkpoint { subdir, .. } => Some(
                self.run_dir(run)
                    .join(subdir.as_deref().unwrap_or("checkpoints")),
            ),
            _ => None,
        })
    }
}

/// A monitor assembled from configuration, with the resources its tasks share.
pub struct MonitorSetup {
    pub monitor: Monitor,
    /// Store of the first checkpoint task, for restoring before the loop.
    pub checkpoints: Option<CheckpointStore>,
    run_dir: PathBuf,
    run: String,
    flush_immediately: bool,
    writer: Option<SharedSummaryWriter>,
}

impl MonitorSetup {
    /// The run's scalar log writer, created on first use.
    pub fn summary_writer(&mut self) -> Result<SharedSummaryWriter, ConfigError> {
        if let Some(writer) = &self.writer {
            return Ok(writer.clone());
        }
        let writer = SummaryWriter::create(&self.run_dir, &self.run)
            .map_err(|e| ConfigError::InvalidTask {
                name: "summary_writer".into(),
                reason: e.to_string(),
            })?
            .with_flush_immediately(self.flush_immediately)
            .into_shared();
        self.writer = Some(writer.clone());
        Ok(writer)
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}

/// Build a monitor with every configured task registered, in order.
pub fn build_monitor(config: &MonitorConfig, run: &str) -> Result<MonitorSetup, ConfigError> {
    let mut setup = MonitorSetup {
        monitor: Monitor::new(config.failure_policy),
        checkpoints: None,
        run_dir: config.run_dir(run),
        run: run.to_string(),
        flush_immediately: config.flush_immediately,
        writer: None,
    };

    for spec in &config.tasks {
        let invalid = |reason: String| ConfigError::InvalidTask {
            name: spec.name.clone(),
            reason,
        };

        let mut task_config = TaskConfig::new(spec.name.clone()).with_exit(spec.on_exit);
        task_config = match spec.every {
            Some(period) => {
                let periodic = Periodic::new(period).map_err(|e| invalid(e.to_string()))?;
                task_config.with_condition(periodic)
            }
            None => task_config.with_condition(Always),
        };

        let task: Box<dyn Task> = match &spec.kind {
            TaskKind::PrintTimings => Box::new(PrintTimingsTask::new()),
            TaskKind::Sleep { millis } => Box::new(SleepTask::from_millis(*millis)),
            TaskKind::Checkpoint {
                max_to_keep,
                subdir,
            } => {
                let dir = setup
                    .run_dir
                    .join(subdir.as_deref().unwrap_or("checkpoints"));
                let store = CheckpointStore::new(dir, *max_to_keep)
                    .map_err(|e| invalid(e.to_string()))?;
                if setup.checkpoints.is_none() {
                    setup.checkpoints = Some(store.clone());
                }
                Box::new(CheckpointTask::new(store))
            }
            TaskKind::ModelSummary { parameters } => {
                let mut task = ModelSummaryTask::new(setup.summary_writer()?);
                if let Some(names) = parameters {
                    task = task.with_parameters(names.iter().cloned());
                }
                Box::new(task)
            }
        };

        debug!(task = %spec.name, kind = ?spec.kind, "Building configured task");
        setup.monitor.add_task(task_config, task)?;
    }

    Ok(setup)
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `VIGIL_`)
/// 2. Explicit config file
/// 3. Workspace-local config (`.vigil/config.toml`)
/// 4. User config (`~/.config/vigil/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<MonitorConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(MonitorConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("config file {} not found", path.display()),
            )
            .into());
        }
        figment = figment.merge(Toml::file(path));
    }

    // VIGIL_FAILURE_POLICY, VIGIL_OUTPUT_DIR, etc.
    figment = figment.merge(Env::prefixed("VIGIL_").split("__"));

    figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))
}

pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "vigil", "vigil")
        .map(|d| d.config_dir().join("config.toml"))
}

pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".vigil").join("config.toml")
}
