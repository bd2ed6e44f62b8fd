//! Genre classification over stored embeddings.
//!
//! [`GenreClassifier`] fits a k-nearest-neighbour model to embeddings
//! labelled with their genre folder. [`GenreClassifier::evaluate`] holds out
//! a seeded, stratified share of the corpus, fits on the rest and scores the
//! held-out predictions per genre. The classifier is an evaluation tool for
//! the feature pipeline: nothing it produces is written to the store.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use timbre_core::model::CorpusSnapshot;
use timbre_core::{Error, Result};

use crate::matrix::{check_dimension, squared_distance, to_f64_rows};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Training samples consulted per prediction.
    pub neighbors: usize,
    /// Share of every genre held out for evaluation, in `(0, 1)`.
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            neighbors: 5,
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenreClassifier {
    config: ClassifierConfig,
}

impl GenreClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        if config.neighbors == 0 {
            return Err(Error::invalid("neighbors must be positive"));
        }
        if !(config.test_fraction > 0.0 && config.test_fraction < 1.0) {
            return Err(Error::invalid(format!(
                "test_fraction must be in (0, 1), got {}",
                config.test_fraction
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Fit on `embeddings` labelled row by row with `genres`.
    pub fn fit(&self, embeddings: &[Vec<f32>], genres: &[String]) -> Result<GenreModel> {
        if embeddings.len() != genres.len() {
            return Err(Error::invalid(format!(
                "{} embeddings but {} genre labels",
                embeddings.len(),
                genres.len()
            )));
        }
        let (points, dimension) = to_f64_rows(embeddings)?;

        let mut classes: Vec<String> = genres.to_vec();
        classes.sort();
        classes.dedup();
        let labels = genres
            .iter()
            .map(|g| classes.binary_search(g).unwrap_or_default())
            .collect();

        log::info!(
            "Fitted {}-NN genre classifier on {} samples over {} genres",
            self.config.neighbors,
            points.len(),
            classes.len()
        );
        Ok(GenreModel {
            dimension,
            neighbors: self.config.neighbors,
            classes,
            points,
            labels,
        })
    }

    /// Split the corpus, fit on the training share and score the held-out share.
    pub fn evaluate(&self, snapshot: &CorpusSnapshot) -> Result<EvaluationReport> {
        snapshot.require_non_empty()?;
        let genres: Vec<String> = snapshot.metadata.iter().map(|m| m.genre.clone()).collect();
        let split = stratified_split(&genres, self.config.test_fraction, self.config.seed)?;

        let pick = |indices: &[usize]| -> (Vec<Vec<f32>>, Vec<String>) {
            indices
                .iter()
                .map(|&i| (snapshot.embeddings[i].clone(), genres[i].clone()))
                .unzip()
        };
        let (train_x, train_y) = pick(&split.train);
        let (test_x, test_y) = pick(&split.test);

        let model = self.fit(&train_x, &train_y)?;
        let predicted = model.predict(&test_x)?;
        let report = EvaluationReport::score(model.classes(), &test_y, &predicted, split.train.len());
        log::info!(
            "Evaluated on {} held-out samples: accuracy {:.4}",
            report.test_size,
            report.accuracy
        );
        Ok(report)
    }
}

/// A fitted k-NN model: the training rows and their class indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreModel {
    dimension: usize,
    neighbors: usize,
    classes: Vec<String>,
    points: Vec<Vec<f64>>,
    labels: Vec<usize>,
}

impl GenreModel {
    /// Known genres, sorted; the column order of [`predict_proba`](Self::predict_proba).
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Most voted genre per row. A tied vote goes to the tied genre whose
    /// member is nearest.
    pub fn predict(&self, embeddings: &[Vec<f32>]) -> Result<Vec<String>> {
        embeddings
            .iter()
            .map(|row| {
                let nearest = self.nearest(row)?;
                let votes = self.votes(&nearest);
                let top = votes.iter().copied().max().unwrap_or(0);
                let winner = nearest
                    .iter()
                    .map(|&i| self.labels[i])
                    .find(|&class| votes[class] == top)
                    .unwrap_or(0);
                Ok(self.classes[winner].clone())
            })
            .collect()
    }

    /// Per row, the share of the nearest neighbours in each genre.
    pub fn predict_proba(&self, embeddings: &[Vec<f32>]) -> Result<Vec<Vec<f64>>> {
        embeddings
            .iter()
            .map(|row| {
                let nearest = self.nearest(row)?;
                #[allow(clippy::cast_precision_loss)]
                let k = nearest.len() as f64;
                Ok(self
                    .votes(&nearest)
                    .into_iter()
                    .map(|count| {
                        #[allow(clippy::cast_precision_loss)]
                        let share = count as f64 / k;
                        share
                    })
                    .collect())
            })
            .collect()
    }

    /// Training indices of the `neighbors` closest rows; equal distances keep
    /// training order.
    fn nearest(&self, row: &[f32]) -> Result<Vec<usize>> {
        check_dimension(self.dimension, row.len())?;
        let query: Vec<f64> = row.iter().map(|&v| f64::from(v)).collect();
        let mut ranked: Vec<(f64, usize)> = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (squared_distance(&query, p), i))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        ranked.truncate(self.neighbors);
        Ok(ranked.into_iter().map(|(_, i)| i).collect())
    }

    fn votes(&self, nearest: &[usize]) -> Vec<usize> {
        let mut votes = vec![0; self.classes.len()];
        for &i in nearest {
            votes[self.labels[i]] += 1;
        }
        votes
    }
}

/// Row indices of a train/test split, each in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Hold out `test_fraction` of every genre, chosen by a seeded shuffle.
///
/// Each genre keeps at least one training sample, so a genre seen once is
/// never tested. Fails when either side of the split would be empty.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn stratified_split(genres: &[String], test_fraction: f64, seed: u64) -> Result<Split> {
    let mut by_genre: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, genre) in genres.iter().enumerate() {
        by_genre.entry(genre.as_str()).or_default().push(i);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(genres.len());
    let mut test = Vec::new();
    for members in by_genre.values_mut() {
        members.shuffle(&mut rng);
        let held = ((members.len() as f64 * test_fraction).round() as usize)
            .min(members.len() - 1);
        test.extend_from_slice(&members[..held]);
        train.extend_from_slice(&members[held..]);
    }

    if train.is_empty() || test.is_empty() {
        return Err(Error::invalid(format!(
            "{} samples leave nothing to hold out at test_fraction {}",
            genres.len(),
            test_fraction
        )));
    }
    train.sort_unstable();
    test.sort_unstable();
    Ok(Split { train, test })
}

/// Precision, recall and F1 for one genre over the held-out samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Held-out samples of this genre.
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    /// Unweighted mean F1 over genres with support.
    pub macro_f1: f64,
    pub train_size: usize,
    pub test_size: usize,
    pub per_genre: BTreeMap<String, GenreScores>,
    /// `confusion[actual][predicted]`, rows and columns in `classes` order.
    pub classes: Vec<String>,
    pub confusion: Vec<Vec<usize>>,
}

impl EvaluationReport {
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn score(
        classes: &[String],
        actual: &[String],
        predicted: &[String],
        train_size: usize,
    ) -> Self {
        let index = |genre: &str| classes.iter().position(|c| c == genre);
        let mut confusion = vec![vec![0_usize; classes.len()]; classes.len()];
        let mut correct = 0_usize;
        for (a, p) in actual.iter().zip(predicted) {
            if a == p {
                correct += 1;
            }
            if let (Some(ai), Some(pi)) = (index(a), index(p)) {
                confusion[ai][pi] += 1;
            }
        }

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let mut per_genre = BTreeMap::new();
        for (c, genre) in classes.iter().enumerate() {
            let tp = confusion[c][c];
            let support: usize = confusion[c].iter().sum();
            let predicted_as: usize = confusion.iter().map(|row| row[c]).sum();
            let precision = ratio(tp, predicted_as);
            let recall = ratio(tp, support);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            per_genre.insert(
                genre.clone(),
                GenreScores {
                    precision,
                    recall,
                    f1,
                    support,
                },
            );
        }

        let supported: Vec<f64> = per_genre
            .values()
            .filter(|s| s.support > 0)
            .map(|s| s.f1)
            .collect();
        let macro_f1 = if supported.is_empty() {
            0.0
        } else {
            supported.iter().sum::<f64>() / supported.len() as f64
        };

        Self {
            accuracy: ratio(correct, actual.len()),
            macro_f1,
            train_size,
            test_size: actual.len(),
            per_genre,
            classes: classes.to_vec(),
            confusion,
        }
    }
}
