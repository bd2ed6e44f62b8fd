use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use toml_edit::{DocumentMut, Item, TableLike, Value};

use timbre_etl::{config, Config};

/// Every key `get` and `set` accept, as dotted paths.
const KEYS: &[&str] = &[
    "database_path",
    "artifacts_dir",
    "distance_metric",
    "extraction.sample_rate",
    "extraction.n_mfcc",
    "extraction.timeout_secs",
    "clustering.method",
    "clustering.k",
    "clustering.eps",
    "clustering.min_points",
    "clustering.seed",
    "clustering.n_init",
    "clustering.max_iterations",
    "anomaly.contamination",
    "anomaly.n_estimators",
    "anomaly.max_samples",
    "anomaly.seed",
    "projection.method",
    "projection.perplexity",
    "projection.iterations",
    "projection.neighbors",
    "projection.min_dist",
    "projection.seed",
    "projection.timeout_secs",
    "classifier.neighbors",
    "classifier.test_fraction",
    "classifier.seed",
    "logging.level",
    "logging.coloured",
];

fn check_key(key: &str) -> Result<()> {
    if !KEYS.contains(&key) {
        bail!("Unknown config key: {}\n\nValid keys: {}", key, KEYS.join(", "));
    }
    Ok(())
}

/// Show the current effective configuration.
pub fn show_config(config_path: &Path) -> Result<()> {
    let config = Config::load_from(config_path)?;

    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config_path.display());
    let exists = config_path.exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    println!("Settings:");
    print!("{}", toml::to_string_pretty(&config).context("Failed to render config")?);

    println!("\nPriority: CLI args > ENV vars (TIMBRE_*) > Config file > Defaults");

    Ok(())
}

/// Look up a dotted key in the effective configuration.
///
/// `Ok(None)` means the key is valid but unset.
fn lookup(config: &Config, key: &str) -> Result<Option<String>> {
    check_key(key)?;
    let table = toml::Value::try_from(config).context("Failed to render config")?;
    let found = key
        .split('.')
        .try_fold(&table, |value, part| value.get(part));
    Ok(found.map(|value| match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }))
}

/// Get a specific config value.
pub fn get_config(config_path: &Path, key: Option<String>) -> Result<()> {
    if let Some(key) = key {
        let config = Config::load_from(config_path)?;
        match lookup(&config, &key)? {
            Some(value) => println!("{}", value),
            None => println!("<not set>"),
        }
    } else {
        // No key provided, show entire config file contents
        if config_path.exists() {
            let contents =
                std::fs::read_to_string(config_path).context("Failed to read config file")?;
            print!("{}", contents);
        } else {
            println!("Config file does not exist: {}", config_path.display());
            println!("\nRun 'timbre config init' to create it.");
        }
    }

    Ok(())
}

/// Write `raw` under the dotted `key` of a TOML document.
///
/// `raw` is read as a TOML value when it parses as one (`10`, `0.5`, `true`)
/// and as a plain string otherwise (`cosine`, `/data/timbre.db`).
fn apply(contents: &str, key: &str, raw: &str) -> Result<String> {
    check_key(key)?;
    let mut doc: DocumentMut = contents.parse().context("Failed to parse config file")?;

    let value = raw.parse::<Value>().unwrap_or_else(|_| Value::from(raw));
    match key.split_once('.') {
        Some((section, name)) => {
            let table = doc
                .entry(section)
                .or_insert_with(toml_edit::table)
                .as_table_like_mut()
                .ok_or_else(|| anyhow!("[{}] in the config file is not a table", section))?;
            set_value(table, name, value);
        }
        None => set_value(doc.as_table_mut(), key, value),
    }

    let updated = doc.to_string();
    toml::from_str::<Config>(&updated)
        .with_context(|| format!("Invalid value for {}: {}", key, raw))?;
    Ok(updated)
}

/// Store `value` under `name`, updating an existing entry in place so the
/// comments attached to its key and value stay where they were.
fn set_value(table: &mut dyn TableLike, name: &str, mut value: Value) {
    match table.get_mut(name) {
        Some(Item::Value(existing)) => {
            *value.decor_mut() = existing.decor().clone();
            *existing = value;
        }
        Some(item) => *item = Item::Value(value),
        None => {
            table.insert(name, Item::Value(value));
        }
    }
}

/// Set a config value, keeping the rest of the file (comments included) intact.
pub fn set_config(config_path: &Path, key: &str, value: &str) -> Result<()> {
    config::ensure_config_file_at(config_path)?;

    let contents = std::fs::read_to_string(config_path).context("Failed to read config file")?;
    let updated = apply(&contents, key, value)?;
    std::fs::write(config_path, updated).context("Failed to write config file")?;

    println!("✓ Updated {} = {}", key, value);
    println!("  in {}", config_path.display());

    Ok(())
}

/// Show the config file path.
pub fn show_path(config_path: &Path) {
    println!("{}", config_path.display());
}

/// Show example configuration.
pub fn show_example() {
    print!("{}", config::example_config());
}

/// Initialize config file with defaults.
pub fn init_config(config_path: &Path) -> Result<()> {
    let created = config::ensure_config_file_at(config_path)?;

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to configure timbre.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_apply_keeps_comments() {
        let contents = "# my corpus\n[clustering]\n# how many\nk = 6\n";
        let updated = apply(contents, "clustering.k", "8").unwrap();
        assert!(updated.contains("# my corpus"));
        assert!(updated.contains("# how many"));
        assert!(updated.contains("k = 8"));
    }

    #[test]
    fn test_apply_updates_existing_key_in_place() {
        let contents = "[clustering]\n# how many\nk = 6 # tuned by hand\nseed = 1\n";
        let updated = apply(contents, "clustering.k", "8").unwrap();
        assert_eq!(
            updated,
            "[clustering]\n# how many\nk = 8 # tuned by hand\nseed = 1\n"
        );
    }

    #[test]
    fn test_apply_keeps_top_level_comments() {
        let contents = "# where the corpus lives\ndatabase_path = \"/a.db\"\n";
        let updated = apply(contents, "database_path", "/b.db").unwrap();
        assert_eq!(updated, "# where the corpus lives\ndatabase_path = \"/b.db\"\n");
    }

    #[test]
    fn test_apply_reads_bare_words_as_strings() {
        let updated = apply("", "distance_metric", "cosine").unwrap();
        let config: Config = toml::from_str(&updated).unwrap();
        assert_eq!(config.distance_metric, timbre_core::DistanceMetric::Cosine);
    }

    #[test]
    fn test_apply_creates_missing_section() {
        let updated = apply("", "projection.method", "umap").unwrap();
        let config: Config = toml::from_str(&updated).unwrap();
        assert_eq!(config.projection.method, "umap");
    }

    #[test]
    fn test_apply_rejects_unknown_key_and_bad_type() {
        assert!(apply("", "clustering.colour", "red").is_err());
        assert!(apply("", "clustering.k", "many").is_err());
    }

    #[test]
    fn test_lookup() {
        let config = Config::default();
        assert_eq!(lookup(&config, "clustering.method").unwrap().as_deref(), Some("kmeans"));
        assert_eq!(lookup(&config, "anomaly.n_estimators").unwrap().as_deref(), Some("100"));
        assert_eq!(lookup(&config, "extraction.timeout_secs").unwrap(), None);
        assert_eq!(lookup(&config, "classifier.neighbors").unwrap().as_deref(), Some("5"));
        assert!(lookup(&config, "nope").is_err());
    }

    #[test]
    fn test_set_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        set_config(&path, "clustering.method", "dbscan").unwrap();
        set_config(&path, "clustering.eps", "1.5").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("# Timbre Configuration File"));
        let config: Config = toml::from_str(&contents).unwrap();
        assert_eq!(config.clustering.method, "dbscan");
        assert!((config.clustering.eps - 1.5).abs() < f64::EPSILON);
    }
}
