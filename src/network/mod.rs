//! # Trail Network Construction
//!
//! Collapses overlapping tracks into a deduplicated network of segments.
//!
//! ## Strategies
//! The strategy is chosen by input size (or forced via config):
//! 1. **Direct** (small inputs): every track becomes its own segment
//! 2. **Density cluster** (medium): tracks whose centroids lie within the snap
//!    tolerance are grouped; the longest member represents the group
//! 3. **Geometric merge** (large): densified tracks are snapped onto a shared
//!    node graph, edges are merged into maximal chains, short chains dropped
//! 4. **Grid merge** (very large): geometric merge per grid cell, then a
//!    second merge over all cell outputs to stitch across cell boundaries
//!
//! Direct and density-cluster outputs carry exact membership. Merged outputs
//! carry provisional counts and must go through ride mapping.

mod cluster;
mod direct;
mod grid;
mod merge;

use std::time::Instant;

use geo::{Centroid, Coord, LineString};
use log::info;
use serde::{Deserialize, Serialize};

use crate::config::NetworkConfig;
use crate::diagnostics::Diagnostic;
use crate::error::Result;
use crate::geo_utils::line_length;
use crate::ingest::Track;
use crate::stats::LocalMoranResult;

pub use merge::{merge_lines, MergedChain};

/// How the network was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStrategy {
    Direct,
    DensityCluster,
    GeometricMerge,
    GridMerge,
}

impl BuildStrategy {
    /// Build segments from normalized tracks with this strategy.
    pub fn build(self, tracks: &[Track], config: &NetworkConfig) -> NetworkBuild {
        let (segments, diagnostics) = match self {
            BuildStrategy::Direct => (direct::build(tracks), Vec::new()),
            BuildStrategy::DensityCluster => (cluster::build(tracks, config), Vec::new()),
            BuildStrategy::GeometricMerge => merge::build(tracks, config),
            BuildStrategy::GridMerge => grid::build(tracks, config),
        };
        NetworkBuild {
            strategy: self,
            membership: self.membership(),
            input_tracks: tracks.len(),
            segments,
            diagnostics,
        }
    }

    /// Whether this strategy's ride counts are final.
    pub fn membership(self) -> Membership {
        match self {
            BuildStrategy::Direct | BuildStrategy::DensityCluster => Membership::Exact,
            BuildStrategy::GeometricMerge | BuildStrategy::GridMerge => Membership::Provisional,
        }
    }
}

/// Whether segment ride counts are final or need ride mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    /// Contributions list exactly the tracks each segment represents
    Exact,
    /// Counts come from geometric overlap during merging only
    Provisional,
}

/// One track's share of a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub track_id: String,
    pub length_m: f64,
}

/// A deduplicated trail segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSegment {
    /// Position in the network, stable for the life of a run
    pub id: usize,
    pub geometry: LineString<f64>,
    pub length_m: f64,
    /// Number of distinct tracks attributed to this segment
    pub ride_count: u32,
    pub contributions: Vec<Contribution>,
    /// Local Moran attributes, added by the spatial statistics stage
    pub lisa: Option<LocalMoranResult>,
}

impl NetworkSegment {
    pub fn new(id: usize, geometry: LineString<f64>, contributions: Vec<Contribution>) -> Self {
        let length_m = line_length(&geometry);
        Self {
            id,
            geometry,
            length_m,
            ride_count: contributions.len() as u32,
            contributions,
            lisa: None,
        }
    }

    /// Length-weighted centroid of the segment geometry.
    pub fn centroid(&self) -> Coord<f64> {
        self.geometry
            .centroid()
            .map(|p| p.0)
            .or_else(|| self.geometry.0.first().copied())
            .unwrap_or(Coord { x: 0.0, y: 0.0 })
    }
}

/// Output of [`build_network`].
#[derive(Debug, Clone)]
pub struct NetworkBuild {
    pub strategy: BuildStrategy,
    pub membership: Membership,
    pub input_tracks: usize,
    pub segments: Vec<NetworkSegment>,
    pub diagnostics: Vec<Diagnostic>,
}

impl NetworkBuild {
    /// Whether ride mapping has to recompute counts.
    pub fn requires_mapping(&self) -> bool {
        self.membership == Membership::Provisional
    }
}

/// Pick a build strategy from the number of input tracks.
pub fn select_strategy(track_count: usize, config: &NetworkConfig) -> BuildStrategy {
    if let Some(forced) = config.forced_strategy {
        return forced;
    }
    if track_count <= config.direct_max_tracks {
        BuildStrategy::Direct
    } else if track_count <= config.cluster_max_tracks {
        BuildStrategy::DensityCluster
    } else if track_count >= config.grid_min_tracks {
        BuildStrategy::GridMerge
    } else {
        BuildStrategy::GeometricMerge
    }
}

/// Build the trail network for a set of normalized tracks.
///
/// Empty input yields an empty network, not an error.
pub fn build_network(tracks: &[Track], config: &NetworkConfig) -> Result<NetworkBuild> {
    config.validate()?;
    let start = Instant::now();
    let strategy = select_strategy(tracks.len(), config);

    if tracks.is_empty() {
        info!("[Network] No tracks, returning empty network");
        return Ok(NetworkBuild {
            strategy,
            membership: strategy.membership(),
            input_tracks: 0,
            segments: Vec::new(),
            diagnostics: Vec::new(),
        });
    }

    info!(
        "[Network] Building from {} tracks with {:?} (snap={}m, min_len={}m)",
        tracks.len(),
        strategy,
        config.snap_tolerance_m,
        config.min_segment_length_m
    );

    let build = strategy.build(tracks, config);

    info!(
        "[Network] {} segments ({:?} membership) in {}ms",
        build.segments.len(),
        build.membership,
        start.elapsed().as_millis()
    );

    Ok(build)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_selection_thresholds() {
        let config = NetworkConfig::default();
        assert_eq!(select_strategy(0, &config), BuildStrategy::Direct);
        assert_eq!(select_strategy(50, &config), BuildStrategy::Direct);
        assert_eq!(select_strategy(51, &config), BuildStrategy::DensityCluster);
        assert_eq!(select_strategy(2000, &config), BuildStrategy::DensityCluster);
        assert_eq!(select_strategy(2001, &config), BuildStrategy::GeometricMerge);
        assert_eq!(select_strategy(10_000, &config), BuildStrategy::GridMerge);
    }

    #[test]
    fn test_forced_strategy_wins() {
        let config = NetworkConfig {
            forced_strategy: Some(BuildStrategy::GeometricMerge),
            ..NetworkConfig::default()
        };
        assert_eq!(select_strategy(3, &config), BuildStrategy::GeometricMerge);
    }

    #[test]
    fn test_empty_input_builds_empty_network() {
        let build = build_network(&[], &NetworkConfig::default()).unwrap();
        assert!(build.segments.is_empty());
        assert_eq!(build.input_tracks, 0);
    }

    #[test]
    fn test_segment_counts_contributions() {
        let geometry = LineString::from(vec![(0.0, 0.0), (30.0, 40.0)]);
        let seg = NetworkSegment::new(
            7,
            geometry,
            vec![Contribution {
                track_id: "t".into(),
                length_m: 50.0,
            }],
        );
        assert_eq!(seg.ride_count, 1);
        assert!((seg.length_m - 50.0).abs() < 1e-9);
        let c = seg.centroid();
        assert!((c.x - 15.0).abs() < 1e-9 && (c.y - 20.0).abs() < 1e-9);
    }
}
