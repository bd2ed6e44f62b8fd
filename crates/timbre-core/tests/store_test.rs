//! Integration tests for the on-disk vector store.

use std::sync::Arc;
use std::thread;

use tempfile::TempDir;
use timbre_core::model::{
    ClusterLabel, Embedding, NewSample, SampleId, SampleMetadata, FEATURE_DIM,
};
use timbre_core::{DistanceMetric, Error, VectorStore};

fn new_sample(value: f32, genre: &str) -> NewSample {
    NewSample::new(
        SampleId::new(),
        Embedding::new(vec![value; FEATURE_DIM]),
        SampleMetadata::new(format!("{value}.wav"), genre, 2.0, format!("/lib/{genre}")),
    )
}

/// Records survive closing and reopening the store
#[test]
fn test_store_persists_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("timbre.db");

    let id = {
        let store = VectorStore::open(&db_path, DistanceMetric::Euclidean).unwrap();
        let sample = new_sample(0.25, "techno");
        let id = sample.id;
        store.add(&[sample]).unwrap();
        store
            .patch_clusters(&[(id, ClusterLabel::Cluster(4))])
            .unwrap();
        id
    };

    let store = VectorStore::open(&db_path, DistanceMetric::Euclidean).unwrap();
    assert_eq!(store.count().unwrap(), 1);
    assert_eq!(store.dimension().unwrap(), Some(FEATURE_DIM));

    let record = store.get(&id).unwrap().expect("record should persist");
    assert_eq!(record.metadata.cluster, ClusterLabel::Cluster(4));
    assert_eq!(record.embedding.len(), FEATURE_DIM);
}

/// The metric recorded at creation cannot be changed by a later open
#[test]
fn test_store_rejects_metric_change() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("timbre.db");

    drop(VectorStore::open(&db_path, DistanceMetric::Cosine).unwrap());

    let err = VectorStore::open(&db_path, DistanceMetric::Euclidean).unwrap_err();
    assert!(matches!(err, Error::InvalidData(_)));
    assert!(VectorStore::open(&db_path, DistanceMetric::Cosine).is_ok());
}

/// Two back-to-back adds with fresh ids never collide
#[test]
fn test_consecutive_adds_increase_count_by_two() {
    let temp_dir = TempDir::new().unwrap();
    let store =
        VectorStore::open(temp_dir.path().join("timbre.db"), DistanceMetric::Euclidean).unwrap();

    let before = store.count().unwrap();
    store.add(&[new_sample(1.0, "house")]).unwrap();
    let after = store.add(&[new_sample(2.0, "house")]).unwrap();
    assert_eq!(after, before + 2);
}

/// Nearest-neighbor query against identical vectors
#[test]
fn test_search_identical_corpus() {
    let temp_dir = TempDir::new().unwrap();
    let store =
        VectorStore::open(temp_dir.path().join("timbre.db"), DistanceMetric::Euclidean).unwrap();

    let batch: Vec<_> = (0..10).map(|_| new_sample(0.5, "ambient")).collect();
    store.add(&batch).unwrap();

    let hits = store.search(&[0.5; FEATURE_DIM], 5).unwrap();
    assert_eq!(hits.len(), 5);
    assert!(hits.iter().all(|hit| hit.distance.abs() < 1e-6));
}

/// Concurrent readers and a writer never see a partial batch
#[test]
fn test_concurrent_reads_see_whole_batches() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(
        VectorStore::open(temp_dir.path().join("timbre.db"), DistanceMetric::Euclidean).unwrap(),
    );

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..20 {
                let batch: Vec<_> = (0..5).map(|_| new_sample(i as f32, "idm")).collect();
                store.add(&batch).unwrap();
            }
        })
    };

    let reader = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for _ in 0..50 {
                let snapshot = store.get_all().unwrap();
                assert_eq!(snapshot.len() % 5, 0);
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
    assert_eq!(store.count().unwrap(), 100);
}
