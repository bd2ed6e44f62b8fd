use serde::{Deserialize, Serialize};
use std::fmt;

/// Cluster membership of a sample.
///
/// `Noise` comes from density partitioning; `Unassigned` means no usable
/// model existed when the sample was stored. Both serialize to `-1` on the
/// wire but stay distinct in memory and in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClusterLabel {
    Cluster(u32),
    Noise,
    Unassigned,
}

impl ClusterLabel {
    /// The serving-layer integer: the cluster index, or `-1`.
    #[must_use]
    pub fn wire_id(self) -> i64 {
        match self {
            Self::Cluster(id) => i64::from(id),
            Self::Noise | Self::Unassigned => -1,
        }
    }

    /// Encode for the `cluster_id` column (`NULL` for unassigned).
    #[must_use]
    pub fn to_column(self) -> Option<i64> {
        match self {
            Self::Cluster(id) => Some(i64::from(id)),
            Self::Noise => Some(-1),
            Self::Unassigned => None,
        }
    }

    /// Decode the `cluster_id` column.
    #[must_use]
    pub fn from_column(value: Option<i64>) -> Self {
        match value {
            None => Self::Unassigned,
            Some(v) => u32::try_from(v).map_or(Self::Noise, Self::Cluster),
        }
    }

    #[must_use]
    pub const fn cluster_index(self) -> Option<u32> {
        match self {
            Self::Cluster(id) => Some(id),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_cluster(self) -> bool {
        matches!(self, Self::Cluster(_))
    }
}

impl fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster(id) => write!(f, "{id}"),
            Self::Noise => write!(f, "noise"),
            Self::Unassigned => write!(f, "unassigned"),
        }
    }
}

/// Outcome of anomaly scoring for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub is_anomaly: bool,
    /// Lower (more negative) is more anomalous.
    pub score: f64,
}
