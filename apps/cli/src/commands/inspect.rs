//! Inspect command: split sizes and representation frame counts.

use anyhow::{Context, Result};
use colored::Colorize;
use sonotag_data::{aligned_frames, frame_count, load_index};
use sonotag_training::{load_split, RunConfig};
use std::path::Path;

pub fn execute(config_path: &Path, items: usize) -> Result<()> {
    let config = RunConfig::load(config_path)
        .with_context(|| format!("Failed to load run configuration: {}", config_path.display()))?;
    let index = load_index(&config.index).with_context(|| format!("Failed to load index: {}", config.index.display()))?;

    println!();
    println!("{}", "Run configuration".bold().cyan());
    println!("  Index: {} ids", index.len());
    println!(
        "  Patch: {} frames x {} bands ({} features)",
        config.patch_width,
        config.total_bands(),
        config.features.len()
    );

    let mut splits = vec![("train", config.ground_truth.train.clone()), ("val", config.ground_truth.val.clone())];
    if let Some(test) = &config.ground_truth.test {
        splits.push(("test", test.clone()));
    }
    let mut train_items = Vec::new();
    for (name, path) in splits {
        let split = load_split(&index, &path, config.num_classes, None, None)
            .with_context(|| format!("Failed to load {name} split: {}", path.display()))?;
        println!("  {name:<5} {} items", split.len());
        if name == "train" {
            train_items = split;
        }
    }

    println!();
    println!("{}", format!("Frame counts (first {} training items)", items.min(train_items.len())).bold().cyan());
    let mut header = format!("{:<24}", "ID");
    for feature in &config.features {
        header.push_str(&format!(" {:>12}", feature.name));
    }
    header.push_str(&format!(" {:>10}", "aligned"));
    println!("{header}");
    println!("{}", "─".repeat(header.chars().count()));

    for item in train_items.iter().take(items) {
        let mut line = format!("{:<24}", &*item.id);
        for feature in &config.features {
            match frame_count(&feature.file_path(&item.repr_path), feature.bands) {
                Ok(frames) => line.push_str(&format!(" {frames:>12}")),
                Err(e) => {
                    line.push_str(&format!(" {:>12}", "unreadable".red()));
                    tracing::warn!(id = %item.id, feature = %feature.name, error = %e, "cannot read representation");
                }
            }
        }
        let aligned = aligned_frames(&config.features, &item.repr_path)
            .map_or_else(|_| "-".to_string(), |a| a.to_string());
        line.push_str(&format!(" {aligned:>10}"));
        println!("{line}");
    }
    println!();
    Ok(())
}
