//! Feature-collection export for rendering and storage collaborators.
//!
//! Segments and ranked candidates are written as GeoJSON-shaped features
//! (geometry + flat property table). When the run was projected from
//! geographic input, coordinates are converted back to longitude/latitude.

use std::collections::BTreeMap;

use geo::{Coord, LineString};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::config::TrafficThresholds;
use crate::error::TrailNetError;
use crate::geo_utils::LocalProjection;
use crate::network::NetworkSegment;
use crate::sites::{RankedCandidate, ZoneStatus};
use crate::stats::Quadrant;

/// Usage bucket of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficLevel {
    None,
    Low,
    Medium,
    High,
}

impl TrafficLevel {
    pub fn classify(ride_count: u32, thresholds: &TrafficThresholds) -> Self {
        if ride_count == 0 {
            TrafficLevel::None
        } else if ride_count >= thresholds.medium {
            TrafficLevel::High
        } else if ride_count > thresholds.low {
            TrafficLevel::Medium
        } else {
            TrafficLevel::Low
        }
    }
}

/// Aggregate figures for a segment collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub segment_count: usize,
    pub total_length_km: f64,
    pub total_rides: u64,
    pub mean_rides: f64,
    pub max_rides: u32,
    pub traffic_levels: BTreeMap<TrafficLevel, usize>,
    /// Quadrant label -> segment count, for annotated segments only
    pub quadrants: BTreeMap<String, usize>,
}

impl NetworkSummary {
    pub fn from_segments(segments: &[NetworkSegment], thresholds: &TrafficThresholds) -> Self {
        let total_rides: u64 = segments.iter().map(|s| s.ride_count as u64).sum();
        let mut traffic_levels = BTreeMap::new();
        let mut quadrants = BTreeMap::new();
        for seg in segments {
            *traffic_levels
                .entry(TrafficLevel::classify(seg.ride_count, thresholds))
                .or_insert(0) += 1;
            if let Some(lisa) = &seg.lisa {
                *quadrants.entry(lisa.quadrant.to_string()).or_insert(0) += 1;
            }
        }

        Self {
            segment_count: segments.len(),
            total_length_km: segments.iter().map(|s| s.length_m).sum::<f64>() / 1000.0,
            total_rides,
            mean_rides: if segments.is_empty() {
                0.0
            } else {
                total_rides as f64 / segments.len() as f64
            },
            max_rides: segments.iter().map(|s| s.ride_count).max().unwrap_or(0),
            traffic_levels,
            quadrants,
        }
    }
}

/// How to thin a large network before handing it to a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "method")]
pub enum RenderSampling {
    All,
    /// The `limit` busiest segments
    TopTraffic { limit: usize },
    /// Random without replacement, busier segments more likely
    TrafficWeighted { limit: usize, seed: u64 },
    Random { limit: usize, seed: u64 },
}

/// Indices of the segments to render, ascending.
pub fn sample_segments(segments: &[NetworkSegment], sampling: RenderSampling) -> Vec<usize> {
    let mut picked: Vec<usize> = match sampling {
        RenderSampling::All => (0..segments.len()).collect(),
        RenderSampling::TopTraffic { limit } => {
            let mut order: Vec<usize> = (0..segments.len()).collect();
            order.sort_by(|&a, &b| segments[b].ride_count.cmp(&segments[a].ride_count));
            order.truncate(limit);
            order
        }
        RenderSampling::TrafficWeighted { limit, seed } => {
            // Efraimidis-Spirakis keys: u^(1/w), keep the largest
            let mut rng = StdRng::seed_from_u64(seed);
            let mut keyed: Vec<(f64, usize)> = segments
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    let weight = s.ride_count.max(1) as f64;
                    (rng.gen::<f64>().powf(1.0 / weight), i)
                })
                .collect();
            keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
            keyed.into_iter().take(limit).map(|(_, i)| i).collect()
        }
        RenderSampling::Random { limit, seed } => {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut order: Vec<usize> = (0..segments.len()).collect();
            order.shuffle(&mut rng);
            order.truncate(limit);
            order
        }
    };
    picked.sort_unstable();
    picked
}

/// A vector feature: geometry plus an attribute table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Value,
    pub properties: Map<String, Value>,
}

/// A collection of [`Feature`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: "FeatureCollection".to_string(),
            features,
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(export_error)
    }
}

/// Serialization failures at export are not configuration problems.
fn export_error(err: serde_json::Error) -> TrailNetError {
    TrailNetError::Internal {
        message: format!("feature export failed: {err}"),
    }
}

fn position(coord: Coord<f64>, projection: Option<&LocalProjection>) -> Value {
    match projection {
        Some(p) => {
            let gps = p.unproject(coord);
            json!([gps.longitude, gps.latitude])
        }
        None => json!([coord.x, coord.y]),
    }
}

fn line_geometry(line: &LineString<f64>, projection: Option<&LocalProjection>) -> Value {
    let coords: Vec<Value> = line.0.iter().map(|c| position(*c, projection)).collect();
    json!({ "type": "LineString", "coordinates": coords })
}

fn feature(geometry: Value, properties: Value) -> Feature {
    let properties = match properties {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    Feature {
        kind: "Feature".to_string(),
        geometry,
        properties,
    }
}

/// Export segments with usage and LISA attributes.
pub fn segments_to_features(
    segments: &[NetworkSegment],
    projection: Option<&LocalProjection>,
    thresholds: &TrafficThresholds,
) -> FeatureCollection {
    let features = segments
        .iter()
        .map(|seg| {
            let lisa = seg.lisa;
            feature(
                line_geometry(&seg.geometry, projection),
                json!({
                    "segment_id": seg.id,
                    "length_m": seg.length_m,
                    "ride_count": seg.ride_count,
                    "traffic": TrafficLevel::classify(seg.ride_count, thresholds),
                    "contributing_tracks": seg.contributions.iter().map(|c| c.track_id.as_str()).collect::<Vec<_>>(),
                    "local_i": lisa.map(|l| l.local_i),
                    "p_value": lisa.map(|l| l.p_value),
                    "significant": lisa.map(|l| l.significant),
                    "quadrant": lisa.map(|l| l.quadrant).unwrap_or(Quadrant::NotSignificant),
                }),
            )
        })
        .collect();
    FeatureCollection::new(features)
}

/// Export ranked candidates as point features.
pub fn candidates_to_features(
    ranked: &[RankedCandidate],
    projection: Option<&LocalProjection>,
) -> FeatureCollection {
    let features = ranked
        .iter()
        .map(|r| {
            let zone_type = match &r.zone {
                ZoneStatus::Inside { zone_type } => Some(zone_type.as_str()),
                ZoneStatus::Outside | ZoneStatus::Unknown => None,
            };
            feature(
                json!({
                    "type": "Point",
                    "coordinates": position(r.candidate.location, projection),
                }),
                json!({
                    "candidate_id": r.candidate.id,
                    "rank": r.rank,
                    "suitability_score": r.suitability_score,
                    "hotspot_segments": r.candidate.hotspot_segments(),
                    "mean_local_i": r.candidate.mean_local_i,
                    "clustering_strength": r.candidate.clustering_strength,
                    "trail_count": r.accessibility.trail_count,
                    "trail_length_km": r.accessibility.trail_length_km,
                    "unique_trail_length_km": r.accessibility.unique_trail_length_km,
                    "total_rides": r.accessibility.total_rides,
                    "overlap_factor": r.accessibility.overlap_factor,
                    "score_accessibility": r.scores.accessibility,
                    "score_usage": r.scores.usage,
                    "score_clustering": r.scores.clustering,
                    "zone_known": r.zone != ZoneStatus::Unknown,
                    "zone_type": zone_type,
                    "prohibited": r.prohibited,
                }),
            )
        })
        .collect();
    FeatureCollection::new(features)
}
