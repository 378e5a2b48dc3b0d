//! Prediction command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use sonotag_training::{predict_experiments, RunConfig};
use std::path::PathBuf;

pub async fn execute(config_path: PathBuf, experiments: Vec<String>, output: Option<PathBuf>) -> Result<()> {
    let config = RunConfig::load(&config_path)
        .with_context(|| format!("Failed to load run configuration: {}", config_path.display()))?;
    let output = output.unwrap_or_else(|| config.exp_dir.join(format!("predictions_{}.json", config.fold)));

    let (predictions, config) = tokio::task::spawn_blocking(move || {
        let predictions = predict_experiments(&config, &experiments);
        (predictions, config)
    })
    .await
    .context("Prediction task panicked")?;
    let predictions = predictions.context("Failed to predict the test split")?;

    predictions
        .write_json(&output)
        .with_context(|| format!("Failed to write predictions: {}", output.display()))?;

    println!();
    println!("{}", "Predictions written".bold().green());
    println!("  Items: {}", predictions.len());
    println!("  Fold: {}", config.fold);
    println!("  Output: {}", output.display().to_string().dimmed());
    println!();
    Ok(())
}
