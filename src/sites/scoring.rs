//! Candidate scoring, exclusion zones and ranking.
//!
//! For each candidate the catchment is every segment within
//! `catchment_radius_m` of the site. Raw trail length sums the catchment
//! segments; unique length measures their union by walking every segment in
//! `overlap_resolution_m` steps and only counting steps that do not lie on
//! geometry already measured. Accessibility (unique length), usage (rides) and
//! clustering (mean local I) are dense-rank scaled to 0-100 across the
//! candidate set and combined with the configured weights.

use std::time::Instant;

use geo::{Contains, Coord, MultiPolygon, Point};
use log::{info, warn};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use rstar::RTree;
use serde::{Deserialize, Serialize};

use super::hotspots::Candidate;
use crate::config::ScoringConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Stage};
use crate::error::Result;
use crate::geo_utils::coord_distance;
use crate::network::NetworkSegment;
use crate::spatial_index::{build_line_tree, owners_within, IndexedLine};

/// Raw/unique ratio above which the catchment looks over-fragmented.
pub const OVERLAP_WARNING_FACTOR: f64 = 1.5;

/// A polygon zone with a category label, in the analysis frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionZone {
    pub zone_type: String,
    pub geometry: MultiPolygon<f64>,
}

/// Where a candidate lies relative to the exclusion zones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ZoneStatus {
    /// No zone data was supplied
    Unknown,
    Outside,
    Inside { zone_type: String },
}

/// Trail metrics within a candidate's catchment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accessibility {
    pub trail_count: usize,
    /// Sum of catchment segment lengths
    pub trail_length_km: f64,
    /// Length of the union of catchment segments
    pub unique_trail_length_km: f64,
    pub total_rides: u64,
    /// Raw over unique length; None when nothing is in reach
    pub overlap_factor: Option<f64>,
}

/// Per-metric scaled scores (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub accessibility: f64,
    pub usage: f64,
    pub clustering: f64,
}

/// A scored, ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub accessibility: Accessibility,
    pub scores: ScoreBreakdown,
    pub zone: ZoneStatus,
    pub prohibited: bool,
    /// Composite score 0-100; 0 when prohibited
    pub suitability_score: f64,
    /// Dense rank by descending score, starting at 1
    pub rank: u32,
}

/// Output of [`score_candidates`], sorted by rank.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringOutcome {
    pub ranked: Vec<RankedCandidate>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Dense ascending rank of each value scaled so the largest maps to 100.
pub fn dense_rank_scale(values: &[f64]) -> Vec<f64> {
    let mut distinct: Vec<f64> = values.to_vec();
    distinct.sort_by(|a, b| a.total_cmp(b));
    distinct.dedup();
    let levels = distinct.len() as f64;
    values
        .iter()
        .map(|v| {
            let rank = distinct.partition_point(|d| d.total_cmp(v).is_lt()) + 1;
            rank as f64 / levels * 100.0
        })
        .collect()
}

/// Length of the union of `lines`, resolved to `resolution` meters.
///
/// A step is skipped when its midpoint lies within a quarter resolution of
/// already measured geometry. Pieces of the same line only count once they
/// end more than one resolution back along that line, so dense vertices on a
/// non-overlapping line are not mistaken for overlap.
pub fn unique_trail_length<'a, I>(lines: I, resolution: f64) -> f64
where
    I: IntoIterator<Item = &'a geo::LineString<f64>>,
{
    let tolerance = resolution * 0.25;
    let mut measured: RTree<IndexedLine> = RTree::new();
    // piece index -> (line index, arc position of the piece end)
    let mut pieces: Vec<(usize, f64)> = Vec::new();
    let mut total = 0.0;

    for (line_idx, geometry) in lines.into_iter().enumerate() {
        let mut arc = 0.0;
        for piece in geometry.lines() {
            let length = coord_distance(piece.start, piece.end);
            if length <= 0.0 {
                continue;
            }
            let steps = (length / resolution).ceil().max(1.0) as usize;
            let step_len = length / steps as f64;
            for k in 0..steps {
                let t = (k as f64 + 0.5) / steps as f64;
                let mid = [
                    piece.start.x + (piece.end.x - piece.start.x) * t,
                    piece.start.y + (piece.end.y - piece.start.y) * t,
                ];
                let mid_arc = arc + length * t;
                let covered = measured
                    .locate_within_distance(mid, tolerance * tolerance)
                    .any(|hit| {
                        let (owner, end_arc) = pieces[hit.owner];
                        owner != line_idx || mid_arc - end_arc > resolution
                    });
                if !covered {
                    total += step_len;
                }
            }
            arc += length;
            measured.insert(IndexedLine {
                owner: pieces.len(),
                line: piece,
            });
            pieces.push((line_idx, arc));
        }
    }
    total
}

/// Zone status of a point. A point on a zone boundary is outside that zone.
pub fn check_zone(location: Coord<f64>, zones: Option<&[ExclusionZone]>, config: &ScoringConfig) -> (ZoneStatus, bool) {
    let Some(zones) = zones.filter(|z| !z.is_empty()) else {
        return (ZoneStatus::Unknown, false);
    };
    let point = Point::from(location);
    let containing: Vec<&ExclusionZone> = zones.iter().filter(|z| z.geometry.0.iter().any(|poly| poly.contains(&point))).collect();

    match containing
        .iter()
        .find(|z| config.is_prohibited(&z.zone_type))
        .or_else(|| containing.first())
    {
        Some(zone) => (
            ZoneStatus::Inside {
                zone_type: zone.zone_type.clone(),
            },
            config.is_prohibited(&zone.zone_type),
        ),
        None => (ZoneStatus::Outside, false),
    }
}

fn catchment(
    candidate: &Candidate,
    segments: &[NetworkSegment],
    tree: &RTree<IndexedLine>,
    config: &ScoringConfig,
) -> Accessibility {
    let in_reach = owners_within(tree, candidate.location, config.catchment_radius_m);
    let raw_m: f64 = in_reach.iter().map(|&i| segments[i].length_m).sum();
    let unique_m = unique_trail_length(in_reach.iter().map(|&i| &segments[i].geometry), config.overlap_resolution_m)
        .min(raw_m);

    Accessibility {
        trail_count: in_reach.len(),
        trail_length_km: raw_m / 1000.0,
        unique_trail_length_km: unique_m / 1000.0,
        total_rides: in_reach.iter().map(|&i| segments[i].ride_count as u64).sum(),
        overlap_factor: (unique_m > 0.0).then(|| raw_m / unique_m),
    }
}

/// Score, constrain and rank candidates.
pub fn score_candidates(
    candidates: &[Candidate],
    segments: &[NetworkSegment],
    zones: Option<&[ExclusionZone]>,
    config: &ScoringConfig,
) -> Result<ScoringOutcome> {
    config.validate()?;
    let start = Instant::now();
    if candidates.is_empty() {
        return Ok(ScoringOutcome {
            ranked: Vec::new(),
            diagnostics: Vec::new(),
        });
    }

    let tree = build_line_tree(segments.iter().enumerate().map(|(i, s)| (i, &s.geometry)));

    #[cfg(feature = "parallel")]
    let access: Vec<Accessibility> = candidates
        .par_iter()
        .map(|c| catchment(c, segments, &tree, config))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let access: Vec<Accessibility> = candidates
        .iter()
        .map(|c| catchment(c, segments, &tree, config))
        .collect();

    let mut diagnostics = Vec::new();
    for (c, a) in candidates.iter().zip(&access) {
        if let Some(factor) = a.overlap_factor.filter(|f| *f > OVERLAP_WARNING_FACTOR) {
            warn!(
                "[Scoring] Candidate {} overlap factor {:.2} suggests a fragmented network",
                c.id, factor
            );
            diagnostics.push(Diagnostic::new(
                Stage::Scoring,
                DiagnosticKind::OverlapFactor,
                format!("candidate {} raw/unique trail length = {:.2}", c.id, factor),
            ));
        }
    }

    let accessibility = dense_rank_scale(&access.iter().map(|a| a.unique_trail_length_km).collect::<Vec<_>>());
    let usage = dense_rank_scale(&access.iter().map(|a| a.total_rides as f64).collect::<Vec<_>>());
    let clustering = dense_rank_scale(&candidates.iter().map(|c| c.mean_local_i).collect::<Vec<_>>());

    let weights = config.weights;
    let mut scored: Vec<RankedCandidate> = candidates
        .iter()
        .zip(access)
        .enumerate()
        .map(|(i, (candidate, accessibility_metrics))| {
            let scores = ScoreBreakdown {
                accessibility: accessibility[i],
                usage: usage[i],
                clustering: clustering[i],
            };
            let composite = (weights.accessibility * scores.accessibility
                + weights.usage * scores.usage
                + weights.clustering * scores.clustering)
                / weights.total();
            let (zone, prohibited) = check_zone(candidate.location, zones, config);
            RankedCandidate {
                candidate: candidate.clone(),
                accessibility: accessibility_metrics,
                scores,
                zone,
                prohibited,
                suitability_score: if prohibited { 0.0 } else { composite },
                rank: 0,
            }
        })
        .collect();

    // Stable: equal scores keep group order
    scored.sort_by(|a, b| b.suitability_score.total_cmp(&a.suitability_score));
    let mut rank = 0;
    let mut previous: Option<f64> = None;
    for entry in &mut scored {
        if previous != Some(entry.suitability_score) {
            rank += 1;
            previous = Some(entry.suitability_score);
        }
        entry.rank = rank;
    }

    let prohibited = scored.iter().filter(|c| c.prohibited).count();
    info!(
        "[Scoring] Ranked {} candidates ({} prohibited) in {}ms",
        scored.len(),
        prohibited,
        start.elapsed().as_millis()
    );

    Ok(ScoringOutcome {
        ranked: scored,
        diagnostics,
    })
}
