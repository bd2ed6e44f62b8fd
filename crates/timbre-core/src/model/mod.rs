pub mod audio;
pub mod ids;
pub mod label;
pub mod record;
pub mod vector;

pub use audio::{AudioFormat, AudioSample};
pub use ids::SampleId;
pub use label::{AnomalyVerdict, ClusterLabel};
pub use record::{CorpusSnapshot, NewSample, SampleMetadata, SampleRecord, SearchHit};
pub use vector::{Embedding, FeatureVector, FEATURE_DIM};
