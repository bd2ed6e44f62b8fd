use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use timbre_analysis::{
    AnomalyConfig, ClassifierConfig, ClusterConfig, ClusterMethod, ProjectionMethod,
};
use timbre_core::{Deadline, DistanceMetric};

use crate::features::ExtractorConfig;

/// Configuration for timbre.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (TIMBRE_* prefix)
/// 3. Config file (~/.config/timbre/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite vector store.
    ///
    /// Can be set via:
    /// - CLI: --db /path/to/db
    /// - ENV: TIMBRE_DATABASE_PATH
    /// - Config: database_path = "/path/to/db"
    /// - Default: ~/.local/share/timbre/timbre.db
    pub database_path: PathBuf,

    /// Where `timbre analyze` writes projections, reports and model blobs.
    pub artifacts_dir: PathBuf,

    /// Distance used by similarity search. Fixed when the store is created.
    pub distance_metric: DistanceMetric,

    pub extraction: ExtractionSection,
    pub clustering: ClusteringSection,
    pub anomaly: AnomalySection,
    pub projection: ProjectionSection,
    pub classifier: ClassifierSection,
    pub logging: LoggingSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            artifacts_dir: default_artifacts_dir(),
            distance_metric: DistanceMetric::default(),
            extraction: ExtractionSection::default(),
            clustering: ClusteringSection::default(),
            anomaly: AnomalySection::default(),
            projection: ProjectionSection::default(),
            classifier: ClassifierSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSection {
    /// Rate every file is resampled to before feature extraction.
    pub sample_rate: u32,
    pub n_mfcc: usize,
    /// Per-file extraction budget; unbounded when absent.
    pub timeout_secs: Option<u64>,
}

impl Default for ExtractionSection {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            n_mfcc: 13,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringSection {
    /// `kmeans` or `dbscan`.
    pub method: String,
    pub k: usize,
    pub eps: f64,
    pub min_points: usize,
    pub seed: u64,
    pub n_init: usize,
    pub max_iterations: usize,
}

impl Default for ClusteringSection {
    fn default() -> Self {
        Self {
            method: String::from("kmeans"),
            k: 6,
            eps: 0.5,
            min_points: 5,
            seed: 42,
            n_init: 10,
            max_iterations: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalySection {
    pub contamination: f64,
    pub n_estimators: usize,
    pub max_samples: usize,
    pub seed: u64,
}

impl Default for AnomalySection {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            n_estimators: 100,
            max_samples: 256,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionSection {
    /// `tsne` or `umap`.
    pub method: String,
    pub perplexity: f64,
    pub iterations: usize,
    pub neighbors: usize,
    pub min_dist: f64,
    pub seed: u64,
    pub timeout_secs: Option<u64>,
}

impl Default for ProjectionSection {
    fn default() -> Self {
        Self {
            method: String::from("tsne"),
            perplexity: 30.0,
            iterations: 1000,
            neighbors: 15,
            min_dist: 0.1,
            seed: 42,
            timeout_secs: None,
        }
    }
}

/// Held-out genre evaluation run by `timbre evaluate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSection {
    pub neighbors: usize,
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            neighbors: 5,
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    pub level: String,
    pub coloured: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            coloured: true,
        }
    }
}

impl Config {
    /// Load configuration from the default file and environment variables.
    ///
    /// Searches for config file at: ~/.config/timbre/config.toml
    /// Reads environment variables with TIMBRE_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from an explicit file (the `--config` flag) and the environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .with_context(|| format!("Failed to load config file {}", config_path.display()))?;
        }

        let mut env_opts = env::Options::with_top_level("timbre");
        env_opts.add_section("extraction");
        env_opts.add_section("clustering");
        env_opts.add_section("anomaly");
        env_opts.add_section("projection");
        env_opts.add_section("classifier");
        env_opts.add_section("logging");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?;

        log::debug!("Loaded configuration (file: {})", config_path.display());
        Ok(config)
    }

    /// Resolve the `[clustering]` section into a typed clustering config.
    pub fn cluster_config(&self) -> Result<ClusterConfig> {
        let section = &self.clustering;
        let method = match section.method.to_ascii_lowercase().as_str() {
            "kmeans" | "k-means" => ClusterMethod::CentroidPartition { k: section.k },
            "dbscan" => ClusterMethod::DensityPartition {
                eps: section.eps,
                min_points: section.min_points,
            },
            other => anyhow::bail!(
                "Unknown clustering method: {}\n\nValid methods: kmeans, dbscan",
                other
            ),
        };
        Ok(ClusterConfig {
            method,
            seed: section.seed,
            n_init: section.n_init,
            max_iterations: section.max_iterations,
            ..ClusterConfig::default()
        })
    }

    /// Resolve the `[projection]` method string into a typed method.
    pub fn projection_method(&self) -> Result<ProjectionMethod> {
        let section = &self.projection;
        match section.method.to_ascii_lowercase().as_str() {
            "tsne" | "t-sne" => Ok(ProjectionMethod::Probabilistic {
                perplexity: section.perplexity,
                iterations: section.iterations,
            }),
            "umap" => Ok(ProjectionMethod::Graph {
                neighbors: section.neighbors,
                min_dist: section.min_dist,
            }),
            other => anyhow::bail!(
                "Unknown projection method: {}\n\nValid methods: tsne, umap",
                other
            ),
        }
    }

    pub fn anomaly_config(&self) -> AnomalyConfig {
        AnomalyConfig {
            contamination: self.anomaly.contamination,
            n_estimators: self.anomaly.n_estimators,
            max_samples: self.anomaly.max_samples,
            seed: self.anomaly.seed,
        }
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            neighbors: self.classifier.neighbors,
            test_fraction: self.classifier.test_fraction,
            seed: self.classifier.seed,
        }
    }

    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            n_mfcc: self.extraction.n_mfcc,
            ..ExtractorConfig::default()
        }
    }

    /// A fresh deadline for one file's extraction.
    pub fn extraction_deadline(&self) -> Deadline {
        Deadline::from_budget(self.extraction.timeout_secs.map(Duration::from_secs))
    }

    /// A fresh deadline for one projection fit.
    pub fn projection_deadline(&self) -> Deadline {
        Deadline::from_budget(self.projection.timeout_secs.map(Duration::from_secs))
    }
}

/// Get the default database path.
///
/// Returns: ~/.local/share/timbre/timbre.db (or platform equivalent)
fn default_db_path() -> PathBuf {
    data_dir().join("timbre.db")
}

fn default_artifacts_dir() -> PathBuf {
    data_dir().join("artifacts")
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("timbre")
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/timbre/config.toml
/// - macOS: ~/Library/Application Support/timbre/config.toml
/// - Windows: %APPDATA%\timbre\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("timbre")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Timbre Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (TIMBRE_* prefix, e.g. TIMBRE_CLUSTERING_METHOD)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Path to the SQLite vector store
#
# Can also be set via:
# - CLI: timbre --db /custom/path.db build ./samples
# - Environment: TIMBRE_DATABASE_PATH=/custom/path.db
#
# Default: Platform-specific data directory
#database_path = "/path/to/custom/timbre.db"

# Output directory for projections, cluster reports and fitted models
#artifacts_dir = "/path/to/artifacts"

# Similarity metric: "euclidean" or "cosine"
# Fixed for the lifetime of a store; changing it requires a rebuild.
distance_metric = "euclidean"

[extraction]
# Every file is resampled to this rate before analysis
sample_rate = 22050
# Cepstral coefficients per frame; the vector holds 2 * n_mfcc + 19 values
n_mfcc = 13
# Abandon a single file after this many seconds
#timeout_secs = 30

[clustering]
# "kmeans" (uses k) or "dbscan" (uses eps and min_points)
method = "kmeans"
k = 6
eps = 0.5
min_points = 5
seed = 42
n_init = 10
max_iterations = 300

[anomaly]
# Expected share of outliers, between 0 and 0.5
contamination = 0.1
n_estimators = 100
max_samples = 256
seed = 42

[projection]
# "tsne" (uses perplexity and iterations) or "umap" (uses neighbors and min_dist)
method = "tsne"
perplexity = 30.0
iterations = 1000
neighbors = 15
min_dist = 0.1
seed = 42
#timeout_secs = 600

[classifier]
# Held-out genre evaluation for `timbre evaluate`
neighbors = 5
# Share of each genre held out for testing
test_fraction = 0.2
seed = 42

[logging]
# trace, debug, info, warn or error
level = "info"
coloured = true
"#
}

/// Create the example config at `config_path` unless a file is already there.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file_at(config_path: &Path) -> Result<bool> {
    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.database_path.as_os_str().is_empty());
        assert_eq!(config.distance_metric, DistanceMetric::Euclidean);
        assert_eq!(config.extraction.sample_rate, 22_050);
        assert_eq!(config.clustering.k, 6);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_load() {
        // Should not fail even if config file doesn't exist
        let result = Config::load();
        assert!(result.is_ok());
    }

    #[test]
    fn test_example_config_parses_to_defaults() {
        let parsed: Config = toml::from_str(example_config()).unwrap();
        let defaults = Config::default();
        assert_eq!(parsed.extraction, defaults.extraction);
        assert_eq!(parsed.clustering, defaults.clustering);
        assert_eq!(parsed.anomaly, defaults.anomaly);
        assert_eq!(parsed.projection, defaults.projection);
        assert_eq!(parsed.classifier, defaults.classifier);
        assert_eq!(parsed.logging, defaults.logging);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "distance_metric = \"cosine\"\n[clustering]\nmethod = \"dbscan\"\neps = 1.5\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.distance_metric, DistanceMetric::Cosine);
        assert_eq!(
            config.cluster_config().unwrap().method,
            ClusterMethod::DensityPartition {
                eps: 1.5,
                min_points: 5
            }
        );
        // Untouched sections keep their defaults.
        assert_eq!(config.projection, ProjectionSection::default());
    }

    #[test]
    fn test_methods_resolve_once() {
        let mut config = Config::default();
        assert_eq!(
            config.cluster_config().unwrap().method,
            ClusterMethod::CentroidPartition { k: 6 }
        );
        assert_eq!(
            config.projection_method().unwrap(),
            ProjectionMethod::Probabilistic {
                perplexity: 30.0,
                iterations: 1000
            }
        );

        config.projection.method = String::from("UMAP");
        assert_eq!(
            config.projection_method().unwrap(),
            ProjectionMethod::Graph {
                neighbors: 15,
                min_dist: 0.1
            }
        );
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let mut config = Config::default();
        config.clustering.method = String::from("spectral");
        let err = config.cluster_config().unwrap_err();
        assert!(err.to_string().contains("spectral"));

        config.projection.method = String::from("pca");
        assert!(config.projection_method().is_err());
    }

    #[test]
    fn test_ensure_config_file_at() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        assert!(ensure_config_file_at(&path).unwrap());
        assert!(!ensure_config_file_at(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), example_config());
    }

    #[test]
    fn test_deadlines_follow_timeouts() {
        let mut config = Config::default();
        assert!(config.extraction_deadline().remaining().is_none());
        config.projection.timeout_secs = Some(60);
        assert!(config.projection_deadline().remaining().is_some());
        config.extraction.timeout_secs = Some(0);
        assert!(matches!(
            config.extraction_deadline().check("extract"),
            Err(timbre_core::Error::Timeout { .. })
        ));
    }

    #[test]
    fn test_classifier_config_follows_section() {
        let mut config = Config::default();
        assert_eq!(config.classifier_config(), ClassifierConfig::default());
        config.classifier.neighbors = 9;
        config.classifier.test_fraction = 0.3;
        let resolved = config.classifier_config();
        assert_eq!(resolved.neighbors, 9);
        assert!((resolved.test_fraction - 0.3).abs() < f64::EPSILON);
    }
}
