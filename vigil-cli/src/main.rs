//! Vigil CLI: run a monitored demo training loop and inspect its outputs.

mod commands;
mod demo;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Vigil: step-driven monitoring for training loops
#[derive(Parser, Debug)]
#[command(name = "vigil", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Train the demo regression model with the configured monitor tasks
    Run {
        /// Name of the run; outputs go under <output_dir>/<run>
        #[arg(short, long, default_value = "demo")]
        run: String,
        /// Number of optimizer steps
        #[arg(short = 'n', long, default_value = "500")]
        iterations: u64,
        /// Gradient descent learning rate
        #[arg(long, default_value = "0.05")]
        learning_rate: f64,
        /// Seed for the synthetic data
        #[arg(long, default_value = "0")]
        seed: u64,
        /// Period of the test-set RMSE task
        #[arg(long, default_value = "25")]
        eval_every: i64,
        /// Restore the latest checkpoint and continue counting from its step
        #[arg(long)]
        resume: bool,
        /// Keep going when a task fails
        #[arg(long)]
        best_effort: bool,
    },
    /// List checkpoints of a run
    Checkpoints {
        #[arg(short, long, default_value = "demo")]
        run: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the latest value of every scalar recorded by a run
    Scalars {
        #[arg(short, long, default_value = "demo")]
        run: String,
        /// Only show tags starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write the default configuration to .vigil/config.toml
    Init,
    /// Print the effective configuration
    Show,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "vigil", "vigil")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "vigil.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.config.as_deref())
}
