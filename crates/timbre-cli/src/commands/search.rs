use anyhow::{Context, Result};
use std::path::Path;

use timbre_etl::audio::load_sample;
use timbre_etl::Config;

use super::open_orchestrator;

pub fn run_search(config: &Config, file: &Path, n: usize, json: bool) -> Result<()> {
    let query = load_sample(file, "query", config.extraction.sample_rate)
        .with_context(|| format!("Failed to decode {}", file.display()))?;

    let orchestrator = open_orchestrator(config)?;
    let embedding = orchestrator
        .query_embedding(&query, &config.extraction_deadline())
        .context("Failed to embed query")?;
    let hits = orchestrator.store().search(embedding.as_slice(), n)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    println!("\n🔎 Nearest to {}\n", query.filename);
    if hits.is_empty() {
        println!("  The corpus is empty. Run `timbre build <data_dir>` first.");
        return Ok(());
    }

    println!("  {:>3}  {:<40} {:<16} {:>10}", "#", "filename", "genre", "distance");
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "  {:>3}  {:<40} {:<16} {:>10.4}",
            rank + 1,
            hit.filename,
            hit.genre,
            hit.distance
        );
    }

    Ok(())
}
