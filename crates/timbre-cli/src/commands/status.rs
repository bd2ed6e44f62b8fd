use anyhow::Result;

use timbre_etl::Config;

use super::open_store;

pub fn show_status(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let count = store.count()?;

    println!("\n📊 Timbre Status\n");
    println!("  Database: {}", config.database_path.display());
    println!("  Samples: {}", count);
    match store.dimension()? {
        Some(dim) => println!("  Embedding dimension: {}", dim),
        None => println!("  Embedding dimension: <not set>"),
    }
    println!("  Distance metric: {}", store.metric());

    if count == 0 {
        println!("\n  Run `timbre build <data_dir>` to populate the corpus");
        return Ok(());
    }

    println!("\n  Genres:");
    for (genre, n) in store.genre_counts()? {
        println!("    {:<20} {}", genre, n);
    }

    let derived = store.derived_counts()?;
    println!("\n  Clustered: {}", derived.clustered);
    println!("  Noise: {}", derived.noise);
    println!("  Anomalies: {}", derived.anomalies);
    if derived.clustered + derived.noise == 0 {
        println!("\n  Run `timbre analyze` to cluster the corpus");
    }

    Ok(())
}
