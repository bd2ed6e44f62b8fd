use anyhow::{bail, Context, Result};

use timbre_analysis::artifacts::{
    annotate_samples, write_annotations, write_centroids, write_cluster_summaries, write_k_sweep,
    write_npy, ArtifactDir,
};
use timbre_analysis::clustering::{projected_centroids, summarize_clusters};
use timbre_analysis::{
    find_optimal_k, AnomalyScorer, ClusterMethod, ClusteringEngine, Projection, ProjectionEngine,
};
use timbre_etl::Config;

use super::open_store;

/// Largest K tried by the sweep that precedes the fit.
const SWEEP_MAX_K: usize = 10;

pub fn run_analyze(config: &Config, k_override: Option<usize>) -> Result<()> {
    let store = open_store(config)?;
    let snapshot = store.get_all().context("Failed to read corpus")?;
    snapshot.require_non_empty()?;
    let n = snapshot.len();

    println!("\n🔬 Analyzing {} samples\n", n);

    let mut cluster_config = config.cluster_config()?;
    if let Some(k) = k_override {
        match cluster_config.method {
            ClusterMethod::CentroidPartition { .. } => {
                cluster_config.method = ClusterMethod::CentroidPartition { k };
            }
            ClusterMethod::DensityPartition { .. } => {
                bail!("--k only applies to k-means clustering");
            }
        }
    }

    let sweep = if n >= 2 {
        let sweep = find_optimal_k(
            &snapshot.embeddings,
            2..=SWEEP_MAX_K.min(n),
            &cluster_config,
        )
        .context("K sweep failed")?;
        match sweep.best_k() {
            Some(best) => println!("  ✓ K sweep: best silhouette at k={}", best),
            None => println!("  ✓ K sweep: no K produced a silhouette"),
        }
        Some(sweep)
    } else {
        None
    };

    let fit = ClusteringEngine::new(cluster_config)
        .fit(&snapshot.embeddings)
        .context("Clustering failed")?;
    println!(
        "  ✓ Clustered: {} clusters, {} noise",
        fit.metrics.cluster_count, fit.metrics.noise_count
    );
    if let Some(silhouette) = fit.metrics.silhouette {
        println!("    silhouette: {:.4}", silhouette);
    }
    if let Some(db_index) = fit.metrics.davies_bouldin {
        println!("    davies-bouldin: {:.4}", db_index);
    }

    let anomaly_model = AnomalyScorer::new(config.anomaly_config())?
        .fit(&snapshot.embeddings)
        .context("Anomaly fit failed")?;
    let verdicts = anomaly_model.verdicts(&snapshot.embeddings)?;
    let flagged = verdicts.iter().filter(|v| v.is_anomaly).count();
    println!("  ✓ Anomaly model: {} samples flagged", flagged);

    let method = config.projection_method()?;
    let engine = ProjectionEngine::new(method, config.projection.seed);
    let projection_2d = project(&engine, &snapshot.embeddings, 2, config)?;
    let projection_3d = project(&engine, &snapshot.embeddings, 3, config)?;
    println!("  ✓ Projected to 2D and 3D ({})", method.name());

    let labels: Vec<_> = snapshot.ids.iter().copied().zip(fit.labels.iter().copied()).collect();
    let scored: Vec<_> = snapshot.ids.iter().copied().zip(verdicts.iter().copied()).collect();
    store
        .apply_refit(&labels, &scored)
        .context("Failed to write the refit to the store")?;
    println!("  ✓ Updated store");

    let dir = ArtifactDir::new(&config.artifacts_dir);
    dir.create().context("Failed to create artifacts directory")?;

    write_cluster_summaries(&dir, &summarize_clusters(&fit.labels, &snapshot.metadata)?)?;
    if let Some(sweep) = &sweep {
        write_k_sweep(&dir, sweep)?;
    }
    write_centroids(&dir, &projected_centroids(&fit.labels, &projection_2d)?)?;
    let annotations = annotate_samples(
        &snapshot,
        &fit.labels,
        Some(verdicts.as_slice()),
        Some(&projection_2d),
        Some(&projection_3d),
    )?;
    write_annotations(&dir, &annotations)?;
    write_npy(&dir.projection_path(method.name(), 2), &projection_2d)?;
    write_npy(&dir.projection_path(method.name(), 3), &projection_3d)?;
    fit.model.save(&dir.cluster_model_path())?;
    anomaly_model.save(&dir.anomaly_model_path())?;

    println!("  ✓ Wrote artifacts to {}", dir.root().display());

    Ok(())
}

fn project(
    engine: &ProjectionEngine,
    embeddings: &[Vec<f32>],
    dimension: usize,
    config: &Config,
) -> Result<Projection> {
    engine
        .fit_transform(embeddings, dimension, &config.projection_deadline())
        .with_context(|| format!("{}D projection failed", dimension))
}
