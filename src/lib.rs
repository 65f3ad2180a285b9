//! # Trailnet
//!
//! Turns a large collection of overlapping GPS tracks into a deduplicated trail
//! network, tests the network's usage for spatial clustering with Moran's I, and
//! ranks candidate facility sites derived from the usage hotspots.
//!
//! This library provides:
//! - Track ingestion: local metric projection, Douglas-Peucker simplification, length filtering
//! - Network construction with size-dependent strategies (direct, density clustering,
//!   geometric merge, grid-partitioned merge)
//! - Ride-to-segment mapping (exact buffer intersection or approximate midpoint snapping)
//! - Distance-band spatial weights, Global and Local Moran's I with permutation inference
//! - Hotspot grouping, catchment accessibility metrics, exclusion zones and composite scoring
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel processing with rayon (grid cells, LISA, candidate metrics)
//!
//! ## Quick Start
//!
//! ```rust
//! use trailnet::{AnalysisConfig, GpsPoint, PipelineInput, RawTrack, TrackCollection, run_pipeline};
//!
//! let tracks: Vec<RawTrack> = (0..3)
//!     .map(|i| {
//!         let points = (0..20)
//!             .map(|k| GpsPoint::new(49.0 + k as f64 * 0.001, 13.5 + i as f64 * 0.05))
//!             .collect();
//!         RawTrack::geographic(&format!("ride-{i}"), points)
//!     })
//!     .collect();
//!
//! let input = PipelineInput::new(TrackCollection::geographic(tracks));
//! let report = run_pipeline(&input, &AnalysisConfig::default()).unwrap();
//! assert_eq!(report.segments.len(), 3);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrailNetError};

// Explicit per-stage configuration
pub mod config;
pub use config::{
    AnalysisConfig, HotspotConfig, IngestConfig, MappingConfig, MappingMode, NetworkConfig,
    ScoreWeights, ScoringConfig, SpatialConfig, TrafficThresholds,
};

// Fallback/degeneracy notes shared by all stages
pub mod diagnostics;
pub use diagnostics::{Diagnostic, DiagnosticKind, Stage};

// Geographic and planar geometry utilities
pub mod geo_utils;
pub use geo_utils::LocalProjection;

// R-tree indexed points and line pieces
pub mod spatial_index;

// Disjoint sets for connected components
pub mod union_find;
pub use union_find::UnionFind;

// Density-based clustering
pub mod clustering;
pub use clustering::{dbscan, ClusterLabels};

// Track ingestion and normalization
pub mod ingest;
pub use ingest::{
    ingest_tracks, CoordinateSystem, IngestResult, LengthClass, RawTrack, Track, TrackCollection,
    TrackShape,
};

// Network construction strategies
pub mod network;
pub use network::{
    build_network, select_strategy, BuildStrategy, Contribution, Membership, NetworkBuild,
    NetworkSegment,
};

// Ride-to-segment attribution
pub mod mapping;
pub use mapping::{map_rides, AppliedMapping, MappingReport};

// Spatial weights and Moran's I
pub mod stats;
pub use stats::{
    annotate_segments, global_morans_i, local_morans_i, Degeneracy, GlobalMoranResult,
    Interpretation, LisaOutcome, LocalMoranResult, Quadrant, SpatialWeights,
};

// Hotspot grouping and candidate scoring
pub mod sites;
pub use sites::{
    find_candidates, score_candidates, Accessibility, Candidate, ExclusionZone, HotspotOutcome,
    RankedCandidate, ScoreBreakdown, ZoneStatus,
};

// End-to-end batch run
pub mod pipeline;
pub use pipeline::{run_pipeline, PipelineInput, PipelineReport, ZoneInput};

// Feature-collection export for rendering collaborators
pub mod export;
pub use export::{
    candidates_to_features, sample_segments, segments_to_features, Feature, FeatureCollection,
    NetworkSummary, RenderSampling, TrafficLevel,
};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use trailnet::GpsPoint;
/// let point = GpsPoint::new(48.9, 13.6); // Šumava
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points. Invalid points are ignored.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a GpsPoint>,
    {
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;
        let mut any = false;

        for p in points.into_iter().filter(|p| p.is_valid()) {
            any = true;
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        if !any {
            return None;
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}
