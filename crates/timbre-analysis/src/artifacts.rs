//! Persisted analysis outputs.
//!
//! Projections are written as NPY v1.0 arrays (`<f4`, C order, one row per
//! sample in snapshot order). Summaries for the serving layer are flat JSON
//! documents. Fitted models are written through their own `save`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use timbre_core::model::{AnomalyVerdict, ClusterLabel, CorpusSnapshot, SampleId};
use timbre_core::{Error, Result};

use crate::classifier::EvaluationReport;
use crate::clustering::{ClusterSummary, KSweep, ProjectedCentroid};
use crate::projection::Projection;

pub const CLUSTERS_ANALYSIS: &str = "clusters_analysis.json";
pub const SAMPLES_ANNOTATED: &str = "samples_annotated.json";
pub const K_ANALYSIS: &str = "k_analysis.json";
pub const CENTROIDS_INFO: &str = "centroids_info.json";
pub const CLUSTER_MODEL: &str = "clusterer.json";
pub const ANOMALY_MODEL: &str = "anomaly.json";
pub const EVALUATION: &str = "evaluation.json";

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// File layout of one artifacts directory.
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    root: PathBuf,
}

impl ArtifactDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn create(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// `<method>_<dim>d.npy`, e.g. `tsne_2d.npy`.
    pub fn projection_path(&self, method: &str, dimension: usize) -> PathBuf {
        self.root.join(format!("{method}_{dimension}d.npy"))
    }

    pub fn cluster_model_path(&self) -> PathBuf {
        self.path(CLUSTER_MODEL)
    }

    pub fn anomaly_model_path(&self) -> PathBuf {
        self.path(ANOMALY_MODEL)
    }
}

/// Per-sample record for the serving layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleAnnotation {
    pub id: SampleId,
    pub filename: String,
    pub genre: String,
    /// Cluster index, or `-1` for noise and unassigned.
    pub cluster: i64,
    pub is_anomaly: Option<bool>,
    pub anomaly_score: Option<f64>,
    pub projection_2d: Option<Vec<f32>>,
    pub projection_3d: Option<Vec<f32>>,
}

/// Join the snapshot with the derived per-sample results.
///
/// Every supplied slice must have one entry per snapshot row.
pub fn annotate_samples(
    snapshot: &CorpusSnapshot,
    labels: &[ClusterLabel],
    verdicts: Option<&[AnomalyVerdict]>,
    projection_2d: Option<&Projection>,
    projection_3d: Option<&Projection>,
) -> Result<Vec<SampleAnnotation>> {
    let n = snapshot.len();
    let lengths = [
        Some(labels.len()),
        verdicts.map(<[AnomalyVerdict]>::len),
        projection_2d.map(Projection::len),
        projection_3d.map(Projection::len),
    ];
    if let Some(bad) = lengths.into_iter().flatten().find(|&len| len != n) {
        return Err(Error::invalid(format!(
            "derived results cover {bad} samples, snapshot has {n}"
        )));
    }

    Ok((0..n)
        .map(|i| {
            let verdict = verdicts.map(|v| v[i]);
            SampleAnnotation {
                id: snapshot.ids[i],
                filename: snapshot.metadata[i].filename.clone(),
                genre: snapshot.metadata[i].genre.clone(),
                cluster: labels[i].wire_id(),
                is_anomaly: verdict.map(|v| v.is_anomaly),
                anomaly_score: verdict.map(|v| v.score),
                projection_2d: projection_2d.and_then(|p| p.row(i)).map(<[f32]>::to_vec),
                projection_3d: projection_3d.and_then(|p| p.row(i)).map(<[f32]>::to_vec),
            }
        })
        .collect())
}

/// Pretty-printed JSON document.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = std::fs::File::open(path)?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}

pub fn write_cluster_summaries(
    dir: &ArtifactDir,
    summaries: &BTreeMap<i64, ClusterSummary>,
) -> Result<PathBuf> {
    let path = dir.path(CLUSTERS_ANALYSIS);
    write_json(&path, summaries)?;
    Ok(path)
}

pub fn write_k_sweep(dir: &ArtifactDir, sweep: &KSweep) -> Result<PathBuf> {
    let path = dir.path(K_ANALYSIS);
    write_json(&path, sweep)?;
    Ok(path)
}

pub fn write_centroids(
    dir: &ArtifactDir,
    centroids: &BTreeMap<u32, ProjectedCentroid>,
) -> Result<PathBuf> {
    let path = dir.path(CENTROIDS_INFO);
    write_json(&path, centroids)?;
    Ok(path)
}

pub fn write_annotations(dir: &ArtifactDir, annotations: &[SampleAnnotation]) -> Result<PathBuf> {
    let path = dir.path(SAMPLES_ANNOTATED);
    write_json(&path, annotations)?;
    Ok(path)
}

pub fn write_evaluation(dir: &ArtifactDir, report: &EvaluationReport) -> Result<PathBuf> {
    let path = dir.path(EVALUATION);
    write_json(&path, report)?;
    Ok(path)
}

/// Write a projection as a `(rows, dimension)` little-endian f32 NPY array.
pub fn write_npy(path: &Path, projection: &Projection) -> Result<()> {
    let mut header = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        projection.len(),
        projection.dimension()
    );
    // Magic (6) + version (2) + header length (2) + header, padded to 64 bytes.
    let unpadded = NPY_MAGIC.len() + 2 + 2 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');
    let header_len = u16::try_from(header.len())
        .map_err(|_| Error::invalid("NPY header too long"))?;

    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    writer.write_all(NPY_MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&header_len.to_le_bytes())?;
    writer.write_all(header.as_bytes())?;
    for row in projection.rows() {
        for value in row {
            writer.write_all(&value.to_le_bytes())?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Read an array written by [`write_npy`].
pub fn read_npy(path: &Path) -> Result<Projection> {
    let mut bytes = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut bytes)?;

    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(Error::invalid(format!("{} is not an NPY file", path.display())));
    }
    if bytes[6] != 1 {
        return Err(Error::invalid(format!("unsupported NPY version {}", bytes[6])));
    }
    let header_len = usize::from(u16::from_le_bytes([bytes[8], bytes[9]]));
    let data_start = 10 + header_len;
    let header = bytes
        .get(10..data_start)
        .and_then(|h| std::str::from_utf8(h).ok())
        .ok_or_else(|| Error::invalid("truncated NPY header"))?;

    if !header.contains("'descr': '<f4'") || !header.contains("'fortran_order': False") {
        return Err(Error::invalid(format!("unsupported NPY layout: {}", header.trim())));
    }
    let (rows, cols) = parse_shape(header)?;

    let data = &bytes[data_start..];
    if data.len() != rows * cols * 4 {
        return Err(Error::invalid(format!(
            "NPY payload is {} bytes, expected {}",
            data.len(),
            rows * cols * 4
        )));
    }
    let values: Vec<f32> = data
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let rows = if cols == 0 {
        vec![Vec::new(); rows]
    } else {
        values.chunks(cols).map(<[f32]>::to_vec).collect()
    };
    Projection::new(cols, rows)
}

fn parse_shape(header: &str) -> Result<(usize, usize)> {
    let bad = || Error::invalid(format!("cannot read NPY shape from {}", header.trim()));
    let start = header.find("'shape': (").ok_or_else(bad)? + "'shape': (".len();
    let end = start + header[start..].find(')').ok_or_else(bad)?;
    let dims: Vec<usize> = header[start..end]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| bad()))
        .collect::<Result<_>>()?;
    match dims.as_slice() {
        [rows, cols] => Ok((*rows, *cols)),
        _ => Err(bad()),
    }
}
