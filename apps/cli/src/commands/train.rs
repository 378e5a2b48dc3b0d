//! Training command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use sonotag_models::ModelFactory;
use sonotag_training::{build_run_data, RunConfig, StdoutProgressSink, TrainingError, TrainingRun};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::warn;

pub async fn execute(config_path: PathBuf, sample: Option<usize>) -> Result<()> {
    let config = Arc::new(
        RunConfig::load(&config_path)
            .with_context(|| format!("Failed to load run configuration: {}", config_path.display()))?,
    );
    if let Some(n) = sample {
        println!("{}", format!("Debug subset: {n} ids per split").yellow());
    }

    let data = build_run_data(&config, sample).context("Failed to prepare training data")?;
    let run = TrainingRun::new(Arc::clone(&config));
    let mut model = ModelFactory::create(config.model, run.experiment_id().to_string(), &config.model_spec())
        .context("Failed to build the model")?;
    run.prepare().context("Failed to create the experiment directory")?;

    let experiment_dir = run.layout().experiment_dir(run.experiment_id());
    println!();
    println!("{}", "Training".bold().cyan());
    println!("  Experiment: {}", run.experiment_id().as_str().cyan());
    println!("  Model: {}", config.model.to_string().dimmed());
    println!("  Directory: {}", experiment_dir.display().to_string().dimmed());
    println!();

    let cancel = run.cancel_flag();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next batch");
            cancel.store(true, Ordering::Relaxed);
        }
    });

    let outcome = tokio::task::spawn_blocking(move || {
        let result = run.run(model.as_mut(), &data, &StdoutProgressSink);
        (run.experiment_id().clone(), result)
    })
    .await
    .context("Training task panicked")?;
    signal.abort();

    let (experiment_id, result) = outcome;
    let manifest = match result {
        Ok(manifest) => manifest,
        Err(TrainingError::Cancelled) => anyhow::bail!("training of {experiment_id} was cancelled"),
        Err(e) => return Err(e).with_context(|| format!("Training of {experiment_id} failed")),
    };

    println!();
    println!("{}", "Training complete".bold().green());
    println!("  Experiment: {}", manifest.experiment_id.as_str().cyan());
    match (manifest.summary.best_epoch, manifest.summary.best_val_cost) {
        (Some(epoch), Some(cost)) => println!("  Best epoch: {epoch} (val cost {cost:.6})"),
        _ => println!("  {}", "No epoch produced a finite validation cost.".yellow()),
    }
    println!("  Final learning rate: {}", manifest.summary.final_learning_rate);
    if let Some(path) = manifest.best_checkpoint() {
        println!("  Checkpoint: {}", path.display().to_string().dimmed());
    }
    println!();
    Ok(())
}
