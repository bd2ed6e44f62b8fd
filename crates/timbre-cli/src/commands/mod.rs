pub mod analyze;
pub mod anomalies;
pub mod build;
pub mod config;
pub mod evaluate;
pub mod ingest;
pub mod optimal_k;
pub mod search;
pub mod status;

pub use analyze::run_analyze;
pub use anomalies::show_anomalies;
pub use build::run_build;
pub use evaluate::run_evaluate;
pub use ingest::run_ingest;
pub use optimal_k::run_optimal_k;
pub use search::run_search;
pub use status::show_status;

use anyhow::{Context, Result};
use std::sync::Arc;

use timbre_analysis::artifacts::ArtifactDir;
use timbre_analysis::ClusterModel;
use timbre_core::VectorStore;
use timbre_etl::{Config, FeatureExtractor, IngestionOrchestrator};

pub(crate) fn open_store(config: &Config) -> Result<VectorStore> {
    VectorStore::open(&config.database_path, config.distance_metric).with_context(|| {
        format!(
            "Failed to open store at {}",
            config.database_path.display()
        )
    })
}

pub(crate) fn open_orchestrator(config: &Config) -> Result<IngestionOrchestrator> {
    let store = Arc::new(open_store(config)?);
    let extractor = FeatureExtractor::new(config.extractor_config())?;
    Ok(IngestionOrchestrator::new(store, extractor)?)
}

/// The cluster model saved by the last `timbre analyze`, if there is one.
pub(crate) fn load_cluster_model(config: &Config) -> Result<Option<ClusterModel>> {
    let path = ArtifactDir::new(&config.artifacts_dir).cluster_model_path();
    if !path.exists() {
        log::debug!("No cluster model at {}", path.display());
        return Ok(None);
    }
    let model = ClusterModel::load(&path)
        .with_context(|| format!("Failed to load cluster model {}", path.display()))?;
    Ok(Some(model))
}
