use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;

use timbre_etl::audio::load_sample;
use timbre_etl::{scan_library, Config};

use super::{load_cluster_model, open_orchestrator};

pub fn run_build(config: &Config, data_dir: &Path) -> Result<()> {
    if !data_dir.is_dir() {
        anyhow::bail!("Not a directory: {}", data_dir.display());
    }

    println!("\n🎵 Building corpus from {}\n", data_dir.display());

    let entries = scan_library(data_dir);
    println!("  Found {} audio files", entries.len());
    if entries.is_empty() {
        println!("\n  Expected layout: <data_dir>/<genre>/<file>");
        return Ok(());
    }

    let mut samples = Vec::with_capacity(entries.len());
    let mut genres = Vec::with_capacity(entries.len());
    let mut failures: Vec<String> = Vec::new();
    for entry in &entries {
        match load_sample(&entry.path, &entry.genre, config.extraction.sample_rate) {
            Ok(sample) => {
                genres.push(entry.genre.clone());
                samples.push(sample);
            }
            Err(e) => {
                log::warn!("Skipping {}: {:#}", entry.path.display(), e);
                failures.push(format!("{}: {:#}", entry.path.display(), e));
            }
        }
    }
    println!("  ✓ Decoded {} files", samples.len());

    let orchestrator = open_orchestrator(config)?;
    let model = load_cluster_model(config)?;
    if model.is_some() {
        println!("  ✓ Using saved cluster model");
    }

    let outcomes =
        orchestrator.ingest_batch(samples, model.as_ref(), || config.extraction_deadline());

    let mut added: BTreeMap<String, usize> = BTreeMap::new();
    let mut total = None;
    for (genre, outcome) in genres.into_iter().zip(outcomes) {
        match outcome {
            Ok(report) => {
                *added.entry(genre).or_insert(0) += 1;
                total = Some(report.total_count);
            }
            Err(failure) => failures.push(failure.to_string()),
        }
    }

    println!("\n  Added per genre:");
    for (genre, count) in &added {
        println!("    {:<20} {}", genre, count);
    }
    let total = match total {
        Some(total) => total,
        None => orchestrator.store().count()?,
    };
    println!("\n  ✓ Corpus now holds {} samples", total);

    if !failures.is_empty() {
        println!("\n  ⚠ {} files failed:", failures.len());
        for failure in &failures {
            println!("    {}", failure);
        }
    }

    Ok(())
}
