//! Diagnostic notes for absorbed edge cases.
//!
//! Stages never swallow a fallback silently: every branch that departs from the
//! normal path records a [`Diagnostic`] so callers can tell the two apart.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage that produced a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Network,
    Mapping,
    Spatial,
    Hotspots,
    Scoring,
}

/// What kind of departure from the normal path occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Tracks removed by filtering (degenerate, too short, outside study area)
    DroppedTracks,
    /// Chain merge failed; unmerged pieces were used instead
    MergeFallback,
    /// A segment's ride_count disagreed with its contribution list
    MembershipRepaired,
    /// Total ride_count vs track count is suspicious
    UsageRatio,
    /// A statistic could not be computed meaningfully
    DegenerateStatistic,
    /// Local Moran weights were unusable for a weighted centroid
    WeightedCentroidFallback,
    /// No significant hotspots: no candidates were generated
    NoHotspots,
    /// Raw vs unique catchment trail length indicates over-fragmentation
    OverlapFactor,
}

/// One diagnostic note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {:?}: {}", self.stage, self.kind, self.message)
    }
}
