use anyhow::{Context, Result};
use std::path::Path;

use timbre_etl::audio::load_sample;
use timbre_etl::Config;

use super::{load_cluster_model, open_orchestrator};

pub fn run_ingest(config: &Config, file: &Path, genre: &str) -> Result<()> {
    let sample = load_sample(file, genre, config.extraction.sample_rate)
        .with_context(|| format!("Failed to decode {}", file.display()))?;

    let orchestrator = open_orchestrator(config)?;
    let model = load_cluster_model(config)?;
    let report = orchestrator.ingest(sample, model.as_ref(), &config.extraction_deadline())?;

    println!("✓ Ingested {}", file.display());
    println!("  id: {}", report.id);
    println!("  cluster: {}", report.cluster_id());
    println!("  total samples: {}", report.total_count);

    Ok(())
}
