//! Sonotag CLI - train, predict and inspect patch-based audio taggers.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Sonotag - patch-sampled training for audio taggers
#[derive(Parser, Debug)]
#[command(name = "sonotag-cli", author, version, about = "Sonotag - patch-sampled training for audio taggers")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model from a run configuration
    ///
    /// Creates a new experiment under `<exp_dir>/experiments/`, writes the
    /// per-epoch log and keeps the checkpoint with the best validation cost.
    Train {
        /// Run configuration (TOML)
        config: PathBuf,

        /// Restrict train and validation to N ids drawn with a fixed seed
        #[arg(long)]
        sample: Option<usize>,
    },

    /// Predict the test split with one or more trained experiments
    ///
    /// With several experiments the item predictions are averaged.
    Predict {
        /// Run configuration (TOML)
        config: PathBuf,

        /// Experiment id (repeatable)
        #[arg(short, long = "experiment", required = true)]
        experiments: Vec<String>,

        /// Output JSON file (defaults to `<exp_dir>/predictions_<fold>.json`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show split sizes and per-feature frame counts
    Inspect {
        /// Run configuration (TOML)
        config: PathBuf,

        /// Number of training items to show frame counts for
        #[arg(long, default_value_t = 5)]
        items: usize,
    },

    /// List trained experiments
    List {
        /// Experiment directory
        exp_dir: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("failed to install the log subscriber");
    }

    let result = match args.command {
        Command::Train { config, sample } => commands::train::execute(config, sample).await,
        Command::Predict { config, experiments, output } => {
            commands::predict::execute(config, experiments, output).await
        }
        Command::Inspect { config, items } => commands::inspect::execute(&config, items),
        Command::List { exp_dir, json } => commands::list::execute(&exp_dir, json),
    };

    if let Err(e) = result {
        eprintln!("{} {e:#}", "error:".red().bold());
        std::process::exit(1);
    }
}
