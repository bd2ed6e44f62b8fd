use anyhow::{bail, Context, Result};

use timbre_analysis::find_optimal_k;
use timbre_etl::Config;

use super::open_store;

pub fn run_optimal_k(config: &Config, min: usize, max: usize) -> Result<()> {
    if min < 2 || min > max {
        bail!("Invalid K range {}..={}: need 2 <= min <= max", min, max);
    }

    let snapshot = open_store(config)?.get_all().context("Failed to read corpus")?;
    snapshot.require_non_empty()?;

    let sweep = find_optimal_k(&snapshot.embeddings, min..=max, &config.cluster_config()?)
        .context("K sweep failed")?;

    println!("\n📈 K sweep over {} samples\n", snapshot.len());
    println!("  {:>4}  {:>10}  {:>14}", "k", "silhouette", "inertia");
    for point in &sweep.points {
        let silhouette = point
            .silhouette
            .map_or_else(|| String::from("-"), |s| format!("{:.4}", s));
        println!("  {:>4}  {:>10}  {:>14.2}", point.k, silhouette, point.inertia);
    }

    if let Some(best) = sweep.best_k() {
        println!("\n  Best k by silhouette: {}", best);
    }

    Ok(())
}
