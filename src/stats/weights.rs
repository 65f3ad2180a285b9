//! Distance-band spatial weights.
//!
//! Two segments are neighbors when their centroids lie within the distance
//! threshold (inclusive). Weights are binary then row-standardized: every
//! neighbor of `i` gets `1 / k_i`. A segment is never its own neighbor and
//! segments without neighbors keep an all-zero row.

use geo::Coord;

use crate::config::SpatialConfig;
use crate::error::Result;
use crate::network::NetworkSegment;
use crate::spatial_index::{build_point_tree, points_within};

/// Row-standardized distance-band weights in neighbor-list form.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialWeights {
    neighbors: Vec<Vec<usize>>,
    pub threshold_m: f64,
}

impl SpatialWeights {
    /// Build weights over planar points.
    pub fn distance_band(points: &[Coord<f64>], threshold_m: f64) -> Self {
        let tree = build_point_tree(points);
        let neighbors = points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                points_within(&tree, *p, threshold_m)
                    .into_iter()
                    .filter(|&j| j != i)
                    .collect()
            })
            .collect();
        Self {
            neighbors,
            threshold_m,
        }
    }

    /// Build weights over segment centroids.
    pub fn for_segments(segments: &[NetworkSegment], config: &SpatialConfig) -> Result<Self> {
        config.validate()?;
        let centroids: Vec<Coord<f64>> = segments.iter().map(|s| s.centroid()).collect();
        Ok(Self::distance_band(&centroids, config.distance_threshold_m))
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.neighbors[i]
    }

    pub fn cardinality(&self, i: usize) -> usize {
        self.neighbors[i].len()
    }

    /// Row-standardized weight of each neighbor of `i` (0 when isolated).
    pub fn row_weight(&self, i: usize) -> f64 {
        match self.cardinality(i) {
            0 => 0.0,
            k => 1.0 / k as f64,
        }
    }

    /// Number of directed neighbor links.
    pub fn link_count(&self) -> usize {
        self.neighbors.iter().map(Vec::len).sum()
    }

    pub fn isolated_count(&self) -> usize {
        self.neighbors.iter().filter(|n| n.is_empty()).count()
    }

    /// Sum of all weights: one per non-isolated row.
    pub fn s0(&self) -> f64 {
        (self.len() - self.isolated_count()) as f64
    }

    /// Spatial lag: row-standardized neighbor mean of `values`.
    pub fn lag(&self, values: &[f64]) -> Vec<f64> {
        (0..self.len())
            .map(|i| self.lag_at(i, values))
            .collect()
    }

    pub fn lag_at(&self, i: usize, values: &[f64]) -> f64 {
        let w = self.row_weight(i);
        self.neighbors[i].iter().map(|&j| values[j]).sum::<f64>() * w
    }
}
