use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use timbre_etl::config::{self, LoggingSection};
use timbre_etl::Config;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "timbre", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the database (default: ~/.local/share/timbre/timbre.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to the config file (default: ~/.config/timbre/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level regardless of the configured level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Build the corpus from a directory of genre folders
    ///
    /// Walks the library one level deep: every immediate subdirectory names a
    /// genre, and every audio file below it is labelled with that genre.
    /// For each file found:
    ///
    /// - Decodes it and downmixes to mono at the configured sample rate
    /// - Extracts the fixed-length timbre feature vector
    /// - Standardizes it into an embedding
    /// - Assigns a cluster if a cluster model from `timbre analyze` exists
    ///
    /// All decoded files are committed to the store in one transaction.
    ///
    /// Supported formats: MP3, WAV, FLAC, OGG
    ///
    /// Output:
    /// - Number of files found and decoded
    /// - Samples added per genre
    /// - Every file that failed, with the stage it failed in
    Build {
        /// Root of the sample library
        data_dir: PathBuf,
    },
    /// Add a single audio file to the corpus
    ///
    /// Runs the full ingestion pipeline for one file and prints its new id,
    /// its cluster (-1 when no cluster could be assigned) and the new corpus size.
    Ingest {
        /// Path to the audio file
        file: PathBuf,

        /// Genre label to store with the sample
        #[arg(long, default_value = "unknown")]
        genre: String,
    },
    /// Find the corpus samples that sound most like a file
    ///
    /// The file is embedded but not stored.
    Search {
        /// Path to the query audio file
        file: PathBuf,

        /// Number of results
        #[arg(short, default_value_t = 5)]
        n: usize,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cluster, score and project the whole corpus
    ///
    /// Reads every embedding and runs, in order:
    ///
    /// - A K sweep (silhouette and inertia for K = 2..10)
    /// - The configured clustering method
    /// - The isolation-forest anomaly model
    /// - 2D and 3D projections with the configured method
    ///
    /// Cluster labels and anomaly verdicts are written back to the store.
    /// Summaries, annotations, projections and the fitted models are written
    /// to the artifacts directory.
    Analyze {
        /// Override the configured cluster count for k-means
        #[arg(long)]
        k: Option<usize>,
    },
    /// Print the silhouette and inertia curve over a range of K
    OptimalK {
        /// Smallest K to try
        #[arg(long, default_value_t = 2)]
        min: usize,

        /// Largest K to try
        #[arg(long, default_value_t = 10)]
        max: usize,
    },
    /// List samples flagged by the last anomaly fit, most anomalous first
    Anomalies {
        /// Maximum number of samples to print
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Score how well the embeddings separate genres
    ///
    /// Holds out a seeded, stratified share of every genre, fits a k-nearest
    /// neighbour classifier on the rest and prints accuracy plus per-genre
    /// precision, recall and F1. The report is also written to the artifacts
    /// directory. Nothing in the store changes.
    Evaluate {
        /// Share of each genre held out for testing (default from config)
        #[arg(long)]
        test_fraction: Option<f64>,

        /// Neighbours consulted per prediction (default from config)
        #[arg(long)]
        neighbors: Option<usize>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show corpus statistics
    Status,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, clap::Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Print one value (dotted key, e.g. `clustering.method`) or the whole file
    Get {
        key: Option<String>,
    },
    /// Set a value in the config file, keeping its comments
    Set {
        key: String,
        value: String,
    },
    /// Print the config file path
    Path,
    /// Print an example config file
    Example,
    /// Create the config file with defaults
    Init,
}

fn init_logging(logging: &LoggingSection, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let level = match level.to_ascii_lowercase().as_str() {
        "trace" => twyg::LogLevel::Trace,
        "debug" => twyg::LogLevel::Debug,
        "info" => twyg::LogLevel::Info,
        "warn" | "warning" => twyg::LogLevel::Warn,
        "error" => twyg::LogLevel::Error,
        other => bail!("Unknown log level: {}", other),
    };

    let opts = twyg::OptsBuilder::new()
        .coloured(logging.coloured)
        .level(level)
        .build()
        .map_err(|e| anyhow!("Invalid logging options: {}", e))?;
    twyg::setup(opts).map_err(|e| anyhow!("Failed to set up logging: {}", e))?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let config_path = cli.config.unwrap_or_else(config::config_file_path);
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    init_logging(&config.logging, cli.verbose)?;

    // Ensure database directory exists
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    match cli.command {
        Commands::Build { data_dir } => commands::run_build(&config, &data_dir)?,
        Commands::Ingest { file, genre } => commands::run_ingest(&config, &file, &genre)?,
        Commands::Search { file, n, json } => commands::run_search(&config, &file, n, json)?,
        Commands::Analyze { k } => commands::run_analyze(&config, k)?,
        Commands::OptimalK { min, max } => commands::run_optimal_k(&config, min, max)?,
        Commands::Anomalies { limit, json } => commands::show_anomalies(&config, limit, json)?,
        Commands::Evaluate {
            test_fraction,
            neighbors,
            json,
        } => commands::run_evaluate(&config, test_fraction, neighbors, json)?,
        Commands::Status => commands::show_status(&config)?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => commands::config::show_config(&config_path)?,
            ConfigCommands::Get { key } => commands::config::get_config(&config_path, key)?,
            ConfigCommands::Set { key, value } => {
                commands::config::set_config(&config_path, &key, &value)?;
            }
            ConfigCommands::Path => commands::config::show_path(&config_path),
            ConfigCommands::Example => commands::config::show_example(),
            ConfigCommands::Init => commands::config::init_config(&config_path)?,
        },
    }

    Ok(())
}
