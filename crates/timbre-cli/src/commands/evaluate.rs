use anyhow::{Context, Result};

use timbre_analysis::artifacts::{write_evaluation, ArtifactDir};
use timbre_analysis::GenreClassifier;
use timbre_etl::Config;

use super::open_store;

pub fn run_evaluate(
    config: &Config,
    test_fraction: Option<f64>,
    neighbors: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut classifier_config = config.classifier_config();
    if let Some(fraction) = test_fraction {
        classifier_config.test_fraction = fraction;
    }
    if let Some(k) = neighbors {
        classifier_config.neighbors = k;
    }
    let classifier = GenreClassifier::new(classifier_config)?;

    let snapshot = open_store(config)?.get_all().context("Failed to read corpus")?;
    snapshot.require_non_empty()?;
    let report = classifier
        .evaluate(&snapshot)
        .context("Genre evaluation failed")?;

    let dir = ArtifactDir::new(&config.artifacts_dir);
    dir.create().context("Failed to create artifacts directory")?;
    let path = write_evaluation(&dir, &report)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n🎯 Genre classification ({}-NN)\n", classifier.config().neighbors);
    println!("  Training set: {} samples", report.train_size);
    println!("  Test set: {} samples", report.test_size);
    println!("\n  Overall accuracy: {:.2}%", report.accuracy * 100.0);
    println!("  Macro F1: {:.2}%", report.macro_f1 * 100.0);

    println!(
        "\n  {:<20} {:>9} {:>9} {:>9} {:>8}",
        "genre", "precision", "recall", "f1", "support"
    );
    for (genre, scores) in &report.per_genre {
        println!(
            "  {:<20} {:>8.2}% {:>8.2}% {:>8.2}% {:>8}",
            genre,
            scores.precision * 100.0,
            scores.recall * 100.0,
            scores.f1 * 100.0,
            scores.support
        );
    }

    println!("\n  ✓ Wrote {}", path.display());
    Ok(())
}
