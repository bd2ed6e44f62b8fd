use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::model::{
    AnomalyVerdict, ClusterLabel, CorpusSnapshot, Embedding, NewSample, SampleId,
    SampleMetadata, SampleRecord, SearchHit,
};

use super::metric::DistanceMetric;
use super::migrations::MIGRATIONS;

const META_METRIC: &str = "metric";
const META_DIMENSION: &str = "dimension";

const RECORD_COLUMNS: &str = "id, embedding, filename, genre, duration_secs, source_path,
     cluster_id, is_anomaly, anomaly_score, created_at";

/// Append-only embedding store backed by SQLite.
///
/// All access goes through one connection behind a mutex: writes are
/// serialized, and every write is a single transaction, so a reader only
/// ever sees fully committed records.
#[derive(Debug)]
pub struct VectorStore {
    conn: Mutex<Connection>,
    metric: DistanceMetric,
}

/// How many samples carry derived analysis fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DerivedCounts {
    pub clustered: usize,
    pub noise: usize,
    pub anomalies: usize,
}

impl VectorStore {
    /// Open (or create) a store at the given path and apply migrations.
    ///
    /// The metric is recorded on first open; reopening with a different
    /// metric fails rather than silently changing distances.
    pub fn open(path: impl AsRef<Path>, metric: DistanceMetric) -> Result<Self> {
        let conn = Connection::open(path)?;
        let journal: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("Store journal mode: {}", journal);
        Self::init(conn, metric)
    }

    /// Open an in-memory store (for tests).
    pub fn open_in_memory(metric: DistanceMetric) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, metric)
    }

    fn init(conn: Connection, metric: DistanceMetric) -> Result<Self> {
        apply_migrations(&conn)?;
        ensure_metric(&conn, metric)?;
        Ok(Self {
            conn: Mutex::new(conn),
            metric,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-call can only have abandoned an uncommitted
        // transaction, which SQLite rolls back, so the connection is usable.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub const fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Embedding dimension established by the first add, if any.
    pub fn dimension(&self) -> Result<Option<usize>> {
        let conn = self.lock();
        read_dimension(&conn)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM samples", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

// Writes
impl VectorStore {
    /// Add samples with caller-supplied ids in one transaction.
    ///
    /// Nothing is written if any id already exists (in the store or twice in
    /// the batch) or any embedding has the wrong length. Returns the new
    /// corpus count.
    pub fn add(&self, samples: &[NewSample]) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let mut expected = read_dimension(&tx)?;
        let mut seen = HashSet::with_capacity(samples.len());

        for sample in samples {
            let actual = sample.embedding.len();
            if actual == 0 {
                return Err(Error::invalid(format!(
                    "empty embedding for sample {}",
                    sample.id
                )));
            }
            match expected {
                Some(dim) if dim != actual => {
                    return Err(Error::DimensionMismatch {
                        expected: dim,
                        actual,
                    });
                }
                Some(_) => {}
                None => {
                    write_meta(&tx, META_DIMENSION, &actual.to_string())?;
                    expected = Some(actual);
                }
            }

            if !seen.insert(sample.id) || id_exists(&tx, &sample.id)? {
                return Err(Error::StoreConflict {
                    id: sample.id.to_string(),
                });
            }

            let meta = &sample.metadata;
            tx.execute(
                "INSERT INTO samples (
                    id, embedding, filename, genre, duration_secs, source_path,
                    cluster_id, is_anomaly, anomaly_score, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    sample.id.to_string(),
                    sample.embedding.to_le_bytes(),
                    meta.filename,
                    meta.genre,
                    meta.duration_secs,
                    meta.source_path.to_string_lossy().as_ref(),
                    meta.cluster.to_column(),
                    meta.is_anomaly,
                    meta.anomaly_score,
                    Utc::now().to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM samples", [], |row| row.get(0))?;
        log::debug!("Committed {} samples (corpus now {})", samples.len(), count);
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Rewrite cluster assignments in one transaction.
    pub fn patch_clusters(&self, labels: &[(SampleId, ClusterLabel)]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        write_clusters(&tx, labels)?;
        tx.commit()?;
        log::info!("Patched cluster labels for {} samples", labels.len());
        Ok(())
    }

    /// Rewrite anomaly flags and scores in one transaction.
    pub fn patch_anomalies(&self, verdicts: &[(SampleId, AnomalyVerdict)]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        write_anomalies(&tx, verdicts)?;
        tx.commit()?;
        log::info!("Patched anomaly verdicts for {} samples", verdicts.len());
        Ok(())
    }

    /// Replace every derived field with the result of a full refit.
    ///
    /// Clearing, cluster labels and anomaly verdicts share one transaction:
    /// a reader sees either the previous fit or the new one, and an unknown
    /// id leaves the previous fit untouched.
    pub fn apply_refit(
        &self,
        labels: &[(SampleId, ClusterLabel)],
        verdicts: &[(SampleId, AnomalyVerdict)],
    ) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(CLEAR_DERIVED, [])?;
        write_clusters(&tx, labels)?;
        write_anomalies(&tx, verdicts)?;
        tx.commit()?;
        log::info!(
            "Applied refit: {} cluster labels, {} anomaly verdicts",
            labels.len(),
            verdicts.len()
        );
        Ok(())
    }

    /// Reset every derived field.
    pub fn clear_derived(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute(CLEAR_DERIVED, [])?;
        Ok(())
    }
}

const CLEAR_DERIVED: &str =
    "UPDATE samples SET cluster_id = NULL, is_anomaly = NULL, anomaly_score = NULL";

fn write_clusters(tx: &Transaction<'_>, labels: &[(SampleId, ClusterLabel)]) -> Result<()> {
    for (id, label) in labels {
        let changed = tx.execute(
            "UPDATE samples SET cluster_id = ?2 WHERE id = ?1",
            rusqlite::params![id.to_string(), label.to_column()],
        )?;
        if changed == 0 {
            return Err(Error::NotFound {
                entity: "sample",
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

fn write_anomalies(tx: &Transaction<'_>, verdicts: &[(SampleId, AnomalyVerdict)]) -> Result<()> {
    for (id, verdict) in verdicts {
        let changed = tx.execute(
            "UPDATE samples SET is_anomaly = ?2, anomaly_score = ?3 WHERE id = ?1",
            rusqlite::params![id.to_string(), verdict.is_anomaly, verdict.score],
        )?;
        if changed == 0 {
            return Err(Error::NotFound {
                entity: "sample",
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

// Reads
impl VectorStore {
    /// The `n` nearest samples to `query`, closest first.
    ///
    /// Equal distances keep insertion order.
    pub fn search(&self, query: &[f32], n: usize) -> Result<Vec<SearchHit>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        if let Some(dim) = self.dimension()? {
            if dim != query.len() {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    actual: query.len(),
                });
            }
        }

        let records = self.list_records()?;
        let mut ranked: Vec<(f64, SampleRecord)> = records
            .into_iter()
            .map(|record| {
                let distance = self.metric.distance(query, record.embedding.as_slice());
                (distance, record)
            })
            .collect();
        // `sort_by` is stable, so ties stay in insertion order.
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        ranked.truncate(n);

        Ok(ranked
            .into_iter()
            .map(|(distance, record)| SearchHit {
                id: record.id,
                filename: record.metadata.filename.clone(),
                genre: record.metadata.genre.clone(),
                distance,
                metadata: record.metadata,
            })
            .collect())
    }

    /// Capture every embedding and its metadata in insertion order.
    pub fn get_all(&self) -> Result<CorpusSnapshot> {
        let mut snapshot = CorpusSnapshot::default();
        for record in self.list_records()? {
            snapshot.push(record.id, record.embedding.into_inner(), record.metadata);
        }
        Ok(snapshot)
    }

    /// Get one sample by id.
    pub fn get(&self, id: &SampleId) -> Result<Option<SampleRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM samples WHERE id = ?1"),
                [id.to_string()],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Number of samples per genre.
    pub fn genre_counts(&self) -> Result<BTreeMap<String, usize>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT genre, COUNT(*) FROM samples GROUP BY genre")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .map(|(genre, count)| (genre, usize::try_from(count).unwrap_or(0)))
            .collect())
    }

    /// How many samples carry cluster or anomaly results.
    pub fn derived_counts(&self) -> Result<DerivedCounts> {
        let conn = self.lock();
        let (clustered, noise, anomalies): (i64, i64, i64) = conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN cluster_id >= 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN cluster_id = -1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN is_anomaly = 1 THEN 1 ELSE 0 END), 0)
             FROM samples",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(DerivedCounts {
            clustered: usize::try_from(clustered).unwrap_or(0),
            noise: usize::try_from(noise).unwrap_or(0),
            anomalies: usize::try_from(anomalies).unwrap_or(0),
        })
    }

    fn list_records(&self) -> Result<Vec<SampleRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM samples ORDER BY seq"
        ))?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let applied: Vec<u32> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for migration in MIGRATIONS {
        if !applied.contains(&migration.version) {
            log::info!(
                "Applying migration {} ({})",
                migration.version,
                migration.name
            );
            conn.execute_batch(migration.sql)?;
            conn.execute(
                "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                rusqlite::params![migration.version, migration.name],
            )?;
        }
    }

    Ok(())
}

fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

fn write_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key, value],
    )?;
    Ok(())
}

fn ensure_metric(conn: &Connection, metric: DistanceMetric) -> Result<()> {
    match read_meta(conn, META_METRIC)? {
        None => write_meta(conn, META_METRIC, metric.as_str()),
        Some(stored) => {
            let stored: DistanceMetric = stored.parse()?;
            if stored == metric {
                Ok(())
            } else {
                Err(Error::invalid(format!(
                    "store was created with the {stored} metric; refusing to open it with {metric}"
                )))
            }
        }
    }
}

fn read_dimension(conn: &Connection) -> Result<Option<usize>> {
    read_meta(conn, META_DIMENSION)?
        .map(|value| {
            value
                .parse::<usize>()
                .map_err(|e| Error::invalid(format!("corrupt stored dimension '{value}': {e}")))
        })
        .transpose()
}

fn id_exists(conn: &Connection, id: &SampleId) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM samples WHERE id = ?1",
            [id.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<SampleRecord> {
    let id_str: String = row.get(0)?;
    let id: SampleId = id_str.parse().map_err(|e| conversion_error(0, e))?;

    let blob: Vec<u8> = row.get(1)?;
    let embedding = Embedding::from_le_bytes(&blob).ok_or_else(|| {
        conversion_error(
            1,
            Error::invalid(format!("embedding blob of {} bytes", blob.len())),
        )
    })?;

    let source_path: String = row.get(5)?;
    let created_at_str: String = row.get(9)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map_err(|e| conversion_error(9, e))?
        .into();

    Ok(SampleRecord {
        id,
        embedding,
        metadata: SampleMetadata {
            filename: row.get(2)?,
            genre: row.get(3)?,
            duration_secs: row.get(4)?,
            source_path: PathBuf::from(source_path),
            cluster: ClusterLabel::from_column(row.get(6)?),
            is_anomaly: row.get(7)?,
            anomaly_score: row.get(8)?,
        },
        created_at,
    })
}
