//! Explicit configuration value objects.
//!
//! Every stage receives its own config struct; [`AnalysisConfig`] bundles
//! them for a full pipeline run. All structs deserialize with `#[serde(default)]`
//! so a partial JSON document only overrides the options it names.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrailNetError};
use crate::network::BuildStrategy;

fn ensure_positive(parameter: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(TrailNetError::invalid_config(parameter, value, "must be a positive finite number"));
    }
    Ok(())
}

fn ensure_non_negative(parameter: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(TrailNetError::invalid_config(parameter, value, "must be a non-negative finite number"));
    }
    Ok(())
}

/// Geometry ingestion and normalization settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Douglas-Peucker tolerance in meters (0 disables simplification)
    pub simplify_tolerance_m: f64,
    /// Tracks shorter than this after projection are dropped (meters)
    pub min_track_length_m: f64,
    /// Start/end distance under which a track is classified as a loop (meters)
    pub loop_threshold_m: f64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            simplify_tolerance_m: 10.0,
            min_track_length_m: 500.0,
            loop_threshold_m: 200.0,
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("ingest.simplify_tolerance_m", self.simplify_tolerance_m)?;
        ensure_non_negative("ingest.min_track_length_m", self.min_track_length_m)?;
        ensure_positive("ingest.loop_threshold_m", self.loop_threshold_m)
    }
}

/// Network construction settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Deduplication radius: tracks/vertices closer than this collapse (meters)
    pub snap_tolerance_m: f64,
    /// Merged segments shorter than this are discarded (meters)
    pub min_segment_length_m: f64,
    /// Track counts up to this use the direct strategy
    pub direct_max_tracks: usize,
    /// Track counts up to this use density clustering, above it geometric merge
    pub cluster_max_tracks: usize,
    /// Track counts at or above this run the geometric merge grid-partitioned
    pub grid_min_tracks: usize,
    /// Grid cell edge length for the partitioned merge (meters)
    pub grid_cell_size_m: f64,
    /// Bypass the selection policy
    pub forced_strategy: Option<BuildStrategy>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            snap_tolerance_m: 50.0,
            min_segment_length_m: 500.0,
            direct_max_tracks: 50,
            cluster_max_tracks: 2000,
            grid_min_tracks: 10_000,
            grid_cell_size_m: 5000.0,
            forced_strategy: None,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("network.snap_tolerance_m", self.snap_tolerance_m)?;
        ensure_non_negative("network.min_segment_length_m", self.min_segment_length_m)?;
        ensure_positive("network.grid_cell_size_m", self.grid_cell_size_m)?;
        if self.grid_cell_size_m < self.snap_tolerance_m * 4.0 {
            return Err(TrailNetError::invalid_config(
                "network.grid_cell_size_m",
                self.grid_cell_size_m,
                "must be at least four times the snap tolerance",
            ));
        }
        if self.direct_max_tracks > self.cluster_max_tracks {
            return Err(TrailNetError::invalid_config(
                "network.direct_max_tracks",
                self.direct_max_tracks,
                "must not exceed network.cluster_max_tracks",
            ));
        }
        if self.grid_min_tracks <= self.cluster_max_tracks {
            return Err(TrailNetError::invalid_config(
                "network.grid_min_tracks",
                self.grid_min_tracks,
                "must exceed network.cluster_max_tracks",
            ));
        }
        Ok(())
    }
}

/// How tracks are attributed to merged segments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MappingMode {
    /// Exact below `approximate_above_tracks`, approximate above it
    Auto,
    /// Buffer-intersection test of every track against every segment
    Exact,
    /// Track midpoint snapped to its nearest segment
    Approximate,
}

/// Ride-to-segment mapping settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MappingConfig {
    pub mode: MappingMode,
    /// Segment buffer for exact mapping (meters)
    pub intersection_buffer_m: f64,
    /// Maximum midpoint-to-segment distance for approximate mapping (meters)
    pub max_snap_distance_m: f64,
    /// `Auto` switches to approximate mapping above this many tracks
    pub approximate_above_tracks: usize,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            mode: MappingMode::Auto,
            intersection_buffer_m: 30.0,
            max_snap_distance_m: 500.0,
            approximate_above_tracks: 5000,
        }
    }
}

impl MappingConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("mapping.intersection_buffer_m", self.intersection_buffer_m)?;
        ensure_positive("mapping.max_snap_distance_m", self.max_snap_distance_m)
    }
}

/// Spatial weights and Moran's I settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpatialConfig {
    /// Centroid distance band for neighbors (meters)
    pub distance_threshold_m: f64,
    /// Monte Carlo permutations for p-values
    pub permutations: u32,
    /// Significance level
    pub significance: f64,
    /// Fewer neighbor links than this makes the statistic degenerate
    pub min_neighbor_links: usize,
    /// Seed for permutation tests
    pub seed: u64,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            distance_threshold_m: 2000.0,
            permutations: 999,
            significance: 0.05,
            min_neighbor_links: 1,
            seed: 12345,
        }
    }
}

impl SpatialConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("spatial.distance_threshold_m", self.distance_threshold_m)?;
        if self.permutations == 0 {
            return Err(TrailNetError::invalid_config("spatial.permutations", 0, "at least one permutation is required"));
        }
        if !(self.significance > 0.0 && self.significance < 1.0) {
            return Err(TrailNetError::invalid_config(
                "spatial.significance",
                self.significance,
                "must lie strictly between 0 and 1",
            ));
        }
        Ok(())
    }
}

/// Hotspot grouping settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HotspotConfig {
    /// Minimum ride_count for a High-High segment to be eligible
    pub min_traffic: u32,
    /// Grouping radius between hotspot segment centroids (meters)
    pub cluster_radius_m: f64,
    /// Minimum members for a group to become a candidate
    pub min_group_size: usize,
}

impl Default for HotspotConfig {
    fn default() -> Self {
        Self {
            min_traffic: 5,
            cluster_radius_m: 2000.0,
            min_group_size: 2,
        }
    }
}

impl HotspotConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("hotspots.cluster_radius_m", self.cluster_radius_m)?;
        if self.min_group_size < 2 {
            return Err(TrailNetError::invalid_config(
                "hotspots.min_group_size",
                self.min_group_size,
                "groups need at least two segments",
            ));
        }
        Ok(())
    }
}

/// Composite score weights. Policy values, not invariants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoreWeights {
    pub accessibility: f64,
    pub usage: f64,
    pub clustering: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            accessibility: 0.30,
            usage: 0.30,
            clustering: 0.40,
        }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.accessibility + self.usage + self.clustering
    }

    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("scoring.weights.accessibility", self.accessibility)?;
        ensure_non_negative("scoring.weights.usage", self.usage)?;
        ensure_non_negative("scoring.weights.clustering", self.clustering)?;
        if self.total() <= 0.0 {
            return Err(TrailNetError::invalid_config("scoring.weights", self.total(), "weights must not all be zero"));
        }
        Ok(())
    }
}

/// Candidate scoring and constraint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    /// Accessibility catchment around each candidate (meters)
    pub catchment_radius_m: f64,
    pub weights: ScoreWeights,
    /// Zone-type values that disqualify a candidate
    pub prohibited_zone_types: Vec<String>,
    /// Sampling step used when measuring deduplicated trail length (meters)
    pub overlap_resolution_m: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            catchment_radius_m: 5000.0,
            weights: ScoreWeights::default(),
            prohibited_zone_types: vec!["A".to_string()],
            overlap_resolution_m: 5.0,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("scoring.catchment_radius_m", self.catchment_radius_m)?;
        ensure_positive("scoring.overlap_resolution_m", self.overlap_resolution_m)?;
        self.weights.validate()
    }

    pub fn is_prohibited(&self, zone_type: &str) -> bool {
        self.prohibited_zone_types.iter().any(|z| z == zone_type)
    }
}

/// Ride-count thresholds for traffic levels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrafficThresholds {
    pub low: u32,
    pub medium: u32,
}

impl Default for TrafficThresholds {
    fn default() -> Self {
        Self { low: 2, medium: 5 }
    }
}

impl TrafficThresholds {
    pub fn validate(&self) -> Result<()> {
        if self.low >= self.medium {
            return Err(TrailNetError::invalid_config("traffic.low", self.low, "must be below traffic.medium"));
        }
        Ok(())
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub ingest: IngestConfig,
    pub network: NetworkConfig,
    pub mapping: MappingConfig,
    pub spatial: SpatialConfig,
    pub hotspots: HotspotConfig,
    pub scoring: ScoringConfig,
    pub traffic: TrafficThresholds,
}

impl AnalysisConfig {
    /// Parse a (possibly partial) JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.ingest.validate()?;
        self.network.validate()?;
        self.mapping.validate()?;
        self.spatial.validate()?;
        self.hotspots.validate()?;
        self.scoring.validate()?;
        self.traffic.validate()
    }
}
