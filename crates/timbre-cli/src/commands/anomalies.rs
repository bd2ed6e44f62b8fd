use anyhow::{Context, Result};

use timbre_analysis::artifacts::ArtifactDir;
use timbre_analysis::AnomalyModel;
use timbre_etl::Config;

use super::open_store;

pub fn show_anomalies(config: &Config, limit: usize, json: bool) -> Result<()> {
    let path = ArtifactDir::new(&config.artifacts_dir).anomaly_model_path();
    if !path.exists() {
        println!("No anomaly model at {}", path.display());
        println!("\nRun `timbre analyze` to fit one.");
        return Ok(());
    }
    let model = AnomalyModel::load(&path)
        .with_context(|| format!("Failed to load anomaly model {}", path.display()))?;

    let snapshot = open_store(config)?.get_all().context("Failed to read corpus")?;
    let mut flagged = model.get_anomalies(&snapshot)?;
    let total = flagged.len();
    flagged.truncate(limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&flagged)?);
        return Ok(());
    }

    println!("\n⚠ {} of {} samples flagged as anomalous\n", total, snapshot.len());
    for sample in &flagged {
        println!(
            "  {:>9.4}  {:<40} {}",
            sample.score, sample.metadata.filename, sample.metadata.genre
        );
    }
    if total > flagged.len() {
        println!("\n  ({} more; raise --limit to see them)", total - flagged.len());
    }

    Ok(())
}
