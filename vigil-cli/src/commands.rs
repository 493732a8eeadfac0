//! Subcommand handlers.

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tracing::{info, warn};
use vigil_core::config::workspace_config_path;
use vigil_core::summary::{latest_by_tag, read_scalars};
use vigil_core::tasks::ScalarSummaryTask;
use vigil_core::{
    CheckpointStore, FailurePolicy, MonitorConfig, MonitorSummary, SummaryWriter, TaskConfig,
    build_monitor, load_config,
};

use crate::demo::{self, LinearModel};
use crate::{Commands, ConfigAction};

const TRAIN_SIZE: usize = 200;
const TEST_SIZE: usize = 100;

/// Options of `vigil run`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub run: String,
    pub iterations: u64,
    pub learning_rate: f64,
    pub seed: u64,
    pub eval_every: i64,
    pub resume: bool,
}

pub(crate) fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            run,
            iterations,
            learning_rate,
            seed,
            eval_every,
            resume,
            best_effort,
        } => {
            let mut config = load(workspace, config_path)?;
            if best_effort {
                config.failure_policy = FailurePolicy::BestEffort;
            }
            let opts = RunOptions {
                run,
                iterations,
                learning_rate,
                seed,
                eval_every,
                resume,
            };
            let summary = run_demo(&config, &opts)?;
            if config.print_summary_on_stop {
                println!("{summary}");
            }
            Ok(())
        }
        Commands::Checkpoints { run, json } => {
            let config = load(workspace, config_path)?;
            list_checkpoints(&config, &run, json)
        }
        Commands::Scalars { run, prefix } => {
            let config = load(workspace, config_path)?;
            show_scalars(&config, &run, prefix.as_deref())
        }
        Commands::Config { action } => match action {
            ConfigAction::Init => init_config(workspace),
            ConfigAction::Show => {
                let config = load(workspace, config_path)?;
                let toml = config
                    .to_toml()
                    .map_err(|e| anyhow!("Failed to serialize config: {e}"))?;
                println!("{toml}");
                Ok(())
            }
        },
    }
}

/// Load the layered config and anchor a relative output directory at the workspace.
fn load(workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<MonitorConfig> {
    let mut config = load_config(Some(workspace), config_path)
        .map_err(|e| anyhow!("Configuration error: {e}"))?;
    if config.output_dir.is_relative() {
        config.output_dir = workspace.join(&config.output_dir);
    }
    Ok(config)
}

/// Train the demo model under a monitor built from `config`.
pub fn run_demo(config: &MonitorConfig, opts: &RunOptions) -> anyhow::Result<MonitorSummary> {
    let (train, test) = demo::synthetic_split(TRAIN_SIZE, TEST_SIZE, opts.seed);
    let mut model = LinearModel::new(train);

    let mut setup =
        build_monitor(config, &opts.run).map_err(|e| anyhow!("Failed to build monitor: {e}"))?;
    let writer = setup
        .summary_writer()
        .map_err(|e| anyhow!("Failed to open scalar log: {e}"))?;
    setup.monitor.add_task(
        TaskConfig::new("test_rmse")
            .every(opts.eval_every)?
            .with_exit(true),
        Box::new(ScalarSummaryTask::new(writer, "test_rmse", move |ctx| {
            let predictions = demo::predict(&ctx.model.parameters(), &test.x)?;
            Ok(demo::rmse(&predictions, &test.y))
        })),
    )?;

    if opts.resume {
        let store = setup
            .checkpoints
            .as_ref()
            .ok_or_else(|| anyhow!("--resume needs a checkpoint task in the configuration"))?;
        match store.restore_latest(&mut model)? {
            Some(step) => {
                setup.monitor.resume_from(step)?;
                info!(step, "Resuming run");
            }
            None => warn!(dir = %store.dir().display(), "No checkpoint to resume from"),
        }
    }

    let mut monitor = setup.monitor;
    info!(
        run = %opts.run,
        iterations = opts.iterations,
        tasks = monitor.len(),
        "Starting training loop"
    );
    for _ in 0..opts.iterations {
        model.gradient_step(opts.learning_rate);
        monitor.notify(&model)?;
    }
    monitor.stop(&model)?;
    Ok(monitor.summary())
}

fn list_checkpoints(config: &MonitorConfig, run: &str, json: bool) -> anyhow::Result<()> {
    let dir = config
        .checkpoint_dir(run)
        .ok_or_else(|| anyhow!("No checkpoint task is configured"))?;
    let checkpoints = CheckpointStore::read_manifest(&dir)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&checkpoints)?);
        return Ok(());
    }
    if checkpoints.is_empty() {
        println!("No checkpoints in {}", dir.display());
        return Ok(());
    }
    println!("{:>8}  {:>14}  {:<19}  PATH", "STEP", "OBJECTIVE", "CREATED");
    for c in &checkpoints {
        let objective = c
            .objective
            .map(|v| format!("{v:.6}"))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:>8}  {:>14}  {:<19}  {}",
            c.step,
            objective,
            c.created_at.format("%Y-%m-%d %H:%M:%S"),
            c.path.display()
        );
    }
    Ok(())
}

fn show_scalars(config: &MonitorConfig, run: &str, prefix: Option<&str>) -> anyhow::Result<()> {
    let path = SummaryWriter::log_path(&config.run_dir(run), run);
    let events = read_scalars(&path)
        .with_context(|| format!("Failed to read scalar log {}", path.display()))?;

    let latest = latest_by_tag(&events);
    let rows: Vec<_> = latest
        .iter()
        .filter(|(tag, _)| prefix.is_none_or(|p| tag.starts_with(p)))
        .collect();
    if rows.is_empty() {
        println!("No scalars recorded");
        return Ok(());
    }
    let width = rows.iter().map(|(tag, _)| tag.len()).max().unwrap_or(3).max(3);
    println!("{:<width$}  {:>8}  VALUE", "TAG", "STEP");
    for (tag, event) in rows {
        let value = event
            .value
            .map(|v| format!("{v:.6}"))
            .unwrap_or_else(|| "nan".into());
        println!("{tag:<width$}  {:>8}  {value}", event.step);
    }
    Ok(())
}

fn init_config(workspace: &Path) -> anyhow::Result<()> {
    let path: PathBuf = workspace_config_path(workspace);
    if path.exists() {
        println!("Configuration already exists at {}", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml = MonitorConfig::default()
        .to_toml()
        .map_err(|e| anyhow!("Failed to serialize config: {e}"))?;
    std::fs::write(&path, toml)?;
    println!("Created {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use vigil_core::TaskSpec;
    use vigil_core::config::TaskKind;

    fn quiet_config(dir: &Path) -> MonitorConfig {
        MonitorConfig {
            output_dir: dir.to_path_buf(),
            print_summary_on_stop: false,
            tasks: vec![
                TaskSpec {
                    name: "checkpoint".into(),
                    kind: TaskKind::Checkpoint {
                        max_to_keep: 3,
                        subdir: None,
                    },
                    every: Some(10),
                    on_exit: true,
                },
                TaskSpec {
                    name: "model_summary".into(),
                    kind: TaskKind::ModelSummary { parameters: None },
                    every: Some(20),
                    on_exit: false,
                },
            ],
            ..MonitorConfig::default()
        }
    }

    fn opts(iterations: u64, resume: bool) -> RunOptions {
        RunOptions {
            run: "unit".into(),
            iterations,
            learning_rate: 0.1,
            seed: 3,
            eval_every: 25,
            resume,
        }
    }

    fn checkpoint_steps(config: &MonitorConfig) -> Vec<u64> {
        CheckpointStore::read_manifest(&config.checkpoint_dir("unit").unwrap())
            .unwrap()
            .iter()
            .map(|c| c.step)
            .collect()
    }

    #[test]
    fn test_run_writes_checkpoints_and_scalars() {
        let dir = TempDir::new().unwrap();
        let config = quiet_config(dir.path());

        let summary = run_demo(&config, &opts(60, false)).unwrap();
        assert_eq!(summary.step, 60);
        assert_eq!(summary.task("test_rmse").unwrap().runs, 3);

        assert_eq!(checkpoint_steps(&config), vec![40, 50, 60]);

        let events =
            read_scalars(&SummaryWriter::log_path(&config.run_dir("unit"), "unit")).unwrap();
        let rmse: Vec<u64> = events
            .iter()
            .filter(|e| e.tag == "test_rmse")
            .map(|e| e.step)
            .collect();
        assert_eq!(rmse, vec![25, 50, 60]);
        assert!(events.iter().any(|e| e.tag == "param/bias"));
    }

    #[test]
    fn test_resume_continues_from_checkpoint_step() {
        let dir = TempDir::new().unwrap();
        let config = quiet_config(dir.path());
        run_demo(&config, &opts(30, false)).unwrap();

        let summary = run_demo(&config, &opts(15, true)).unwrap();
        assert_eq!(summary.step, 45);
        assert_eq!(summary.iterations, 15);
    }

    #[test]
    fn test_fresh_run_into_used_directory_keeps_its_checkpoints() {
        let dir = TempDir::new().unwrap();
        let config = quiet_config(dir.path());
        run_demo(&config, &opts(60, false)).unwrap();

        run_demo(&config, &opts(25, false)).unwrap();
        assert_eq!(checkpoint_steps(&config), vec![10, 20, 25]);
        let store_dir = config.checkpoint_dir("unit").unwrap();
        for c in CheckpointStore::read_manifest(&store_dir).unwrap() {
            assert!(c.path.exists(), "missing {}", c.path.display());
        }

        let summary = run_demo(&config, &opts(5, true)).unwrap();
        assert_eq!(summary.step, 30);
    }

    #[test]
    fn test_resume_without_checkpoint_task_fails() {
        let dir = TempDir::new().unwrap();
        let config = MonitorConfig {
            output_dir: dir.path().to_path_buf(),
            tasks: vec![],
            ..MonitorConfig::default()
        };
        assert!(run_demo(&config, &opts(5, true)).is_err());
    }

    #[test]
    fn test_init_config_writes_defaults_once() {
        let dir = TempDir::new().unwrap();
        init_config(dir.path()).unwrap();
        let path = workspace_config_path(dir.path());
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            MonitorConfig::from_toml_str(&written).unwrap(),
            MonitorConfig::default()
        );

        std::fs::write(&path, "print_summary_on_stop = false\n").unwrap();
        init_config(dir.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "print_summary_on_stop = false\n"
        );
    }

    #[test]
    fn test_load_anchors_relative_output_dir() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            let home = jail.directory().join("home");
            jail.set_env("HOME", home.display());
            jail.set_env("XDG_CONFIG_HOME", home.join(".config").display());
            jail.set_env("VIGIL_FLUSH_IMMEDIATELY", "true");

            let workspace = jail.directory().to_path_buf();
            std::fs::create_dir_all(workspace.join(".vigil")).map_err(|e| e.to_string())?;
            jail.create_file(".vigil/config.toml", "output_dir = \"out\"\n")?;

            let config = load(&workspace, None).map_err(|e| e.to_string())?;
            assert_eq!(config.output_dir, workspace.join("out"));
            assert!(config.flush_immediately);
            Ok(())
        });
    }
}
