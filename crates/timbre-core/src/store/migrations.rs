/// A schema migration.
#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATION_001: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Corpus-wide settings fixed for the store's lifetime (metric, dimension)
CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Samples: one embedding plus metadata per row; seq preserves insertion order
CREATE TABLE IF NOT EXISTS samples (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    embedding BLOB NOT NULL,
    filename TEXT NOT NULL,
    genre TEXT NOT NULL,
    duration_secs REAL NOT NULL,
    source_path TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_samples_genre ON samples(genre);
"#;

const MIGRATION_002: &str = r#"
-- Derived fields written back by corpus analysis.
-- cluster_id: NULL = unassigned, -1 = density noise, n >= 0 = cluster index
ALTER TABLE samples ADD COLUMN cluster_id INTEGER;
ALTER TABLE samples ADD COLUMN is_anomaly INTEGER;
ALTER TABLE samples ADD COLUMN anomaly_score REAL;

CREATE INDEX IF NOT EXISTS idx_samples_cluster_id ON samples(cluster_id);
"#;

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: MIGRATION_001,
    },
    Migration {
        version: 2,
        name: "derived_fields",
        sql: MIGRATION_002,
    },
];
