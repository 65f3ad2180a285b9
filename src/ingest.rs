//! Track ingestion and normalization.
//!
//! Raw tracks arrive either as geographic coordinates (longitude/latitude) or
//! already in a projected metric frame. Ingestion projects them into one local
//! metric frame, splits multi-part tracks, drops degenerate parts, simplifies
//! with Douglas-Peucker and recomputes every length in meters.

use std::time::Instant;

use geo::{Coord, LineString, Simplify};
use log::{debug, info};
use rstar::PointDistance;
use serde::{Deserialize, Serialize};

use crate::config::IngestConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Stage};
use crate::error::{Result, TrailNetError};
use crate::geo_utils::{coord_distance, dedup_coords, densify, line_length, LocalProjection};
use crate::spatial_index::build_point_tree;
use crate::{Bounds, GpsPoint};

/// Tracks at least this long (km) are [`LengthClass::Long`].
pub const LONG_TRACK_KM: f64 = 50.0;
/// Tracks at least this long (km) are [`LengthClass::Medium`].
pub const MEDIUM_TRACK_KM: f64 = 25.0;

/// Fraction of a track's tail retracing its head that makes it out-and-back.
const OUT_AND_BACK_FOLD_RATIO: f64 = 0.5;

/// Coordinate reference of a [`TrackCollection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSystem {
    /// `x` = longitude, `y` = latitude in degrees
    Geographic,
    /// Planar meters; used as-is
    Projected,
}

/// A track as supplied by the caller. May hold several disjoint parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrack {
    pub id: String,
    pub parts: Vec<Vec<Coord<f64>>>,
    pub category: Option<String>,
}

impl RawTrack {
    /// Single-part track from GPS points.
    pub fn geographic(id: &str, points: Vec<GpsPoint>) -> Self {
        let coords = points
            .into_iter()
            .map(|p| Coord {
                x: p.longitude,
                y: p.latitude,
            })
            .collect();
        Self {
            id: id.to_string(),
            parts: vec![coords],
            category: None,
        }
    }

    /// Single-part track from planar coordinates.
    pub fn projected(id: &str, coords: Vec<Coord<f64>>) -> Self {
        Self {
            id: id.to_string(),
            parts: vec![coords],
            category: None,
        }
    }

    /// Append another disjoint part in the same coordinate system.
    pub fn with_part(mut self, coords: Vec<Coord<f64>>) -> Self {
        self.parts.push(coords);
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    /// Strict check for callers that want rejection instead of filtering.
    ///
    /// Every part needs two distinct usable coordinates.
    pub fn validate(&self, crs: CoordinateSystem) -> Result<()> {
        if self.parts.is_empty() {
            return Err(TrailNetError::InvalidGeometry {
                id: self.id.clone(),
                message: "track has no parts".to_string(),
            });
        }
        for (i, part) in self.parts.iter().enumerate() {
            let usable: Vec<Coord<f64>> = part
                .iter()
                .filter(|c| match crs {
                    CoordinateSystem::Geographic => GpsPoint::new(c.y, c.x).is_valid(),
                    CoordinateSystem::Projected => c.x.is_finite() && c.y.is_finite(),
                })
                .copied()
                .collect();
            if dedup_coords(&usable).len() < 2 {
                return Err(TrailNetError::InvalidGeometry {
                    id: self.id.clone(),
                    message: format!("part {i} has fewer than two distinct valid coordinates"),
                });
            }
        }
        Ok(())
    }
}

/// Raw tracks sharing one coordinate system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackCollection {
    pub crs: CoordinateSystem,
    pub tracks: Vec<RawTrack>,
}

impl TrackCollection {
    pub fn geographic(tracks: Vec<RawTrack>) -> Self {
        Self {
            crs: CoordinateSystem::Geographic,
            tracks,
        }
    }

    pub fn projected(tracks: Vec<RawTrack>) -> Self {
        Self {
            crs: CoordinateSystem::Projected,
            tracks,
        }
    }

    /// Fail on the first track [`RawTrack::validate`] rejects.
    pub fn validate(&self) -> Result<()> {
        self.tracks.iter().try_for_each(|t| t.validate(self.crs))
    }
}

/// Coarse track shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackShape {
    /// Ends near where it started
    Loop,
    /// Returns along its own outbound path
    OutAndBack,
    PointToPoint,
}

/// Track length bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthClass {
    Short,
    Medium,
    Long,
}

impl LengthClass {
    pub fn from_length_m(length_m: f64) -> Self {
        let km = length_m / 1000.0;
        if km >= LONG_TRACK_KM {
            LengthClass::Long
        } else if km >= MEDIUM_TRACK_KM {
            LengthClass::Medium
        } else {
            LengthClass::Short
        }
    }
}

/// A normalized single-part track in the local metric frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Unique id; `"{source}#{part}"` for parts of multi-part input
    pub id: String,
    pub source_id: String,
    pub category: Option<String>,
    pub geometry: LineString<f64>,
    /// Recomputed planar length in meters
    pub length_m: f64,
    pub shape: TrackShape,
    pub length_class: LengthClass,
}

/// Output of [`ingest_tracks`].
#[derive(Debug, Clone)]
pub struct IngestResult {
    pub tracks: Vec<Track>,
    /// Set when the input was geographic
    pub projection: Option<LocalProjection>,
    pub dropped_degenerate: usize,
    pub dropped_short: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Project, split, clean and simplify a track collection.
///
/// Never fails on geometry: empty or degenerate input simply yields fewer
/// tracks. Errors only on invalid configuration.
pub fn ingest_tracks(collection: &TrackCollection, config: &IngestConfig) -> Result<IngestResult> {
    config.validate()?;
    let start = Instant::now();

    let projection = match collection.crs {
        CoordinateSystem::Geographic => geographic_projection(&collection.tracks),
        CoordinateSystem::Projected => None,
    };

    let mut tracks = Vec::new();
    let mut dropped_degenerate = 0;
    let mut dropped_short = 0;

    for raw in &collection.tracks {
        let multi = raw.parts.len() > 1;
        for (part_idx, part) in raw.parts.iter().enumerate() {
            let coords = match collection.crs {
                CoordinateSystem::Geographic => match &projection {
                    Some(proj) => part
                        .iter()
                        .filter(|c| GpsPoint::new(c.y, c.x).is_valid())
                        .map(|c| proj.project_lng_lat(*c))
                        .collect(),
                    None => Vec::new(),
                },
                CoordinateSystem::Projected => part
                    .iter()
                    .filter(|c| c.x.is_finite() && c.y.is_finite())
                    .copied()
                    .collect(),
            };

            let coords = dedup_coords(&coords);
            if coords.len() < 2 {
                dropped_degenerate += 1;
                continue;
            }

            let mut geometry = LineString::new(coords);
            if config.simplify_tolerance_m > 0.0 {
                geometry = geometry.simplify(&config.simplify_tolerance_m);
            }

            let length_m = line_length(&geometry);
            if length_m <= 0.0 {
                dropped_degenerate += 1;
                continue;
            }
            if length_m < config.min_track_length_m {
                dropped_short += 1;
                continue;
            }

            let id = if multi {
                format!("{}#{}", raw.id, part_idx)
            } else {
                raw.id.clone()
            };
            let shape = classify_shape(&geometry, config.loop_threshold_m);
            debug!("[Ingest] {} length={:.0}m shape={:?}", id, length_m, shape);

            tracks.push(Track {
                id,
                source_id: raw.id.clone(),
                category: raw.category.clone(),
                geometry,
                length_m,
                shape,
                length_class: LengthClass::from_length_m(length_m),
            });
        }
    }

    let mut diagnostics = Vec::new();
    if dropped_degenerate + dropped_short > 0 {
        diagnostics.push(Diagnostic::new(
            Stage::Ingest,
            DiagnosticKind::DroppedTracks,
            format!(
                "dropped {} degenerate and {} short (<{}m) track parts",
                dropped_degenerate, dropped_short, config.min_track_length_m
            ),
        ));
    }

    info!(
        "[Ingest] {} raw tracks -> {} tracks ({} degenerate, {} short) in {}ms",
        collection.tracks.len(),
        tracks.len(),
        dropped_degenerate,
        dropped_short,
        start.elapsed().as_millis()
    );

    Ok(IngestResult {
        tracks,
        projection,
        dropped_degenerate,
        dropped_short,
        diagnostics,
    })
}

fn geographic_projection(tracks: &[RawTrack]) -> Option<LocalProjection> {
    let points: Vec<GpsPoint> = tracks
        .iter()
        .flat_map(|t| t.parts.iter().flatten())
        .map(|c| GpsPoint::new(c.y, c.x))
        .collect();
    Bounds::from_points(&points).map(|b| LocalProjection::from_bounds(&b))
}

/// Classify a track as loop, out-and-back or point-to-point.
pub fn classify_shape(geometry: &LineString<f64>, loop_threshold_m: f64) -> TrackShape {
    let coords = densify(&geometry.0, loop_threshold_m / 4.0);
    if compute_fold_ratio(&coords, loop_threshold_m / 2.0) > OUT_AND_BACK_FOLD_RATIO {
        return TrackShape::OutAndBack;
    }
    match (coords.first(), coords.last()) {
        (Some(a), Some(b)) if coord_distance(*a, *b) <= loop_threshold_m => TrackShape::Loop,
        _ => TrackShape::PointToPoint,
    }
}

/// Share of the last third (walked backwards) lying within `threshold`
/// of the first third. 0.0 = no fold, 1.0 = perfect retrace.
fn compute_fold_ratio(coords: &[Coord<f64>], threshold: f64) -> f64 {
    if coords.len() < 6 {
        return 0.0;
    }

    let third = coords.len() / 3;
    let first_tree = build_point_tree(&coords[..third]);
    let threshold_sq = threshold * threshold;

    let close_count = coords[coords.len() - third..]
        .iter()
        .rev()
        .filter(|c| {
            let query = [c.x, c.y];
            first_tree
                .nearest_neighbor(&query)
                .is_some_and(|nearest| nearest.distance_2(&query) <= threshold_sq)
        })
        .count();

    close_count as f64 / third as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(points: &[(f64, f64)]) -> Vec<Coord<f64>> {
        points.iter().map(|&(x, y)| Coord { x, y }).collect()
    }

    fn config(min_len: f64) -> IngestConfig {
        IngestConfig {
            simplify_tolerance_m: 1.0,
            min_track_length_m: min_len,
            loop_threshold_m: 50.0,
        }
    }

    #[test]
    fn test_projected_lengths_and_filter() {
        let collection = TrackCollection::projected(vec![
            RawTrack::projected("a", line(&[(0.0, 0.0), (100.0, 0.0)])),
            RawTrack::projected("b", line(&[(0.0, 500.0), (150.0, 500.0)])),
            RawTrack::projected("c", line(&[(0.0, 900.0), (50.0, 900.0)])),
        ]);
        let result = ingest_tracks(&collection, &config(80.0)).unwrap();
        let ids: Vec<&str> = result.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!((result.tracks[1].length_m - 150.0).abs() < 1e-9);
        assert_eq!(result.dropped_short, 1);
        assert!(result.projection.is_none());
    }

    #[test]
    fn test_multi_part_and_degenerate() {
        let raw = RawTrack::projected("m", line(&[(0.0, 0.0), (200.0, 0.0)]))
            .with_part(line(&[(5.0, 5.0), (5.0, 5.0)]))
            .with_part(line(&[(0.0, 300.0), (0.0, 600.0)]))
            .with_category("gravel");
        let result = ingest_tracks(&TrackCollection::projected(vec![raw]), &config(10.0)).unwrap();
        let ids: Vec<&str> = result.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["m#0", "m#2"]);
        assert_eq!(result.dropped_degenerate, 1);
        assert_eq!(result.tracks[0].category.as_deref(), Some("gravel"));
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn test_geographic_projection_meters() {
        // ~1.1 km due north
        let points = (0..=10)
            .map(|k| GpsPoint::new(49.0 + k as f64 * 0.001, 13.5))
            .collect();
        let collection = TrackCollection::geographic(vec![RawTrack::geographic("g", points)]);
        let result = ingest_tracks(&collection, &config(100.0)).unwrap();
        assert_eq!(result.tracks.len(), 1);
        assert!((result.tracks[0].length_m - 1113.2).abs() < 1.0);
        assert!(result.projection.is_some());
    }

    #[test]
    fn test_strict_validation() {
        let good = RawTrack::projected("ok", line(&[(0.0, 0.0), (10.0, 0.0)]));
        assert!(good.validate(CoordinateSystem::Projected).is_ok());

        let bad = RawTrack::projected("dup", line(&[(1.0, 1.0), (1.0, 1.0)]));
        let collection = TrackCollection::projected(vec![good, bad]);
        match collection.validate() {
            Err(TrailNetError::InvalidGeometry { id, .. }) => assert_eq!(id, "dup"),
            other => panic!("unexpected {other:?}"),
        }

        let off_globe = RawTrack::projected("far", line(&[(200.0, 0.0), (201.0, 0.0)]));
        assert!(off_globe.validate(CoordinateSystem::Geographic).is_err());
        assert!(off_globe.validate(CoordinateSystem::Projected).is_ok());
    }

    #[test]
    fn test_empty_collection() {
        let result = ingest_tracks(&TrackCollection::geographic(vec![]), &IngestConfig::default()).unwrap();
        assert!(result.tracks.is_empty());
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_shape_classification() {
        let loop_line = LineString::new(line(&[
            (0.0, 0.0),
            (1000.0, 0.0),
            (1000.0, 1000.0),
            (0.0, 1000.0),
            (0.0, 10.0),
        ]));
        assert_eq!(classify_shape(&loop_line, 50.0), TrackShape::Loop);

        let out_back = LineString::new(line(&[(0.0, 0.0), (1000.0, 0.0), (0.0, 3.0)]));
        assert_eq!(classify_shape(&out_back, 50.0), TrackShape::OutAndBack);

        let p2p = LineString::new(line(&[(0.0, 0.0), (1000.0, 0.0), (2000.0, 400.0)]));
        assert_eq!(classify_shape(&p2p, 50.0), TrackShape::PointToPoint);
    }

    #[test]
    fn test_length_class() {
        assert_eq!(LengthClass::from_length_m(10_000.0), LengthClass::Short);
        assert_eq!(LengthClass::from_length_m(25_000.0), LengthClass::Medium);
        assert_eq!(LengthClass::from_length_m(80_000.0), LengthClass::Long);
    }
}
