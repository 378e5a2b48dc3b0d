//! List command: experiments found under an experiment directory.

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;
use sonotag_training::discover_experiments;
use std::path::Path;

pub fn execute(exp_dir: &Path, json_output: bool) -> Result<()> {
    let experiments = discover_experiments(exp_dir)
        .with_context(|| format!("Failed to discover experiments in {}", exp_dir.display()))?;

    if json_output {
        let out: Vec<_> = experiments
            .iter()
            .map(|e| {
                json!({
                    "id": e.experiment_id.as_str(),
                    "created_at": e.manifest.created_at,
                    "fold": e.manifest.fold,
                    "model": e.manifest.model,
                    "features": e.manifest.features,
                    "best_epoch": e.manifest.summary.best_epoch,
                    "best_val_cost": e.manifest.summary.best_val_cost,
                    "checkpoint_path": e.checkpoint_path,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Experiments ({})", experiments.len()).bold().cyan());
    println!();

    if experiments.is_empty() {
        println!("  {}", "No finished experiments found.".dimmed());
        println!();
        return Ok(());
    }

    println!("{:<40} {:<5} {:<8} {:<6} {:<12} {}", "ID", "Fold", "Model", "Best", "Val cost", "Features");
    println!("{}", "─".repeat(90));
    for e in &experiments {
        let summary = &e.manifest.summary;
        let best = summary.best_epoch.map_or_else(|| "-".to_string(), |b| b.to_string());
        let cost = summary.best_val_cost.map_or_else(|| "-".to_string(), |c| format!("{c:.6}"));
        println!(
            "{:<40} {:<5} {:<8} {:<6} {:<12} {}",
            e.experiment_id.as_str().cyan(),
            e.manifest.fold,
            e.manifest.model.to_string(),
            best,
            cost,
            e.manifest.features.join(",").dimmed()
        );
    }
    println!();
    Ok(())
}
