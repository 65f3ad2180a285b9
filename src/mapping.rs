//! Ride-to-segment mapping.
//!
//! Merged networks only know which tracks touched each edge during snapping.
//! Mapping recomputes `ride_count` and `contributions` from the final segment
//! geometry. Both modes replace the attribution instead of adding to it, so
//! mapping the same network twice gives the same counts.
//!
//! - **Exact**: a track rides a segment when any piece of it comes within the
//!   intersection buffer of the segment. A track can ride many segments.
//! - **Approximate**: the track's midpoint is snapped to its nearest segment
//!   and the whole track is attributed there. Long tracks spanning several
//!   segments are under-counted on all but one of them.

use std::collections::BTreeSet;
use std::time::Instant;

use geo::{Coord, LineInterpolatePoint, LineString};
use log::{info, warn};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};

use crate::config::{MappingConfig, MappingMode};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Stage};
use crate::error::Result;
use crate::geo_utils::line_to_line_distance;
use crate::ingest::Track;
use crate::network::{Contribution, NetworkBuild, NetworkSegment};
use crate::spatial_index::{build_line_tree, nearest_owner, IndexedLine};

/// Which attribution was actually applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliedMapping {
    /// Membership was already exact; counts were only checked
    Validated,
    Exact,
    Approximate,
}

/// Summary of a mapping run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingReport {
    pub applied: AppliedMapping,
    pub track_count: usize,
    pub total_ride_count: u64,
    /// Total ride_count divided by track count; None without tracks
    pub usage_ratio: Option<f64>,
    /// Tracks attributed to no segment
    pub unmapped_tracks: usize,
    pub segments_without_rides: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Attribute tracks to the segments of a built network.
///
/// Returns new segments; the input build is left untouched.
pub fn map_rides(
    build: &NetworkBuild,
    tracks: &[Track],
    config: &MappingConfig,
) -> Result<(Vec<NetworkSegment>, MappingReport)> {
    config.validate()?;
    let start = Instant::now();

    let applied = if !build.requires_mapping() {
        AppliedMapping::Validated
    } else {
        match config.mode {
            MappingMode::Exact => AppliedMapping::Exact,
            MappingMode::Approximate => AppliedMapping::Approximate,
            MappingMode::Auto if tracks.len() > config.approximate_above_tracks => {
                AppliedMapping::Approximate
            }
            MappingMode::Auto => AppliedMapping::Exact,
        }
    };

    let mut diagnostics = Vec::new();
    let (segments, unmapped_tracks) = match applied {
        AppliedMapping::Validated => (validate_membership(&build.segments, &mut diagnostics), 0),
        AppliedMapping::Exact | AppliedMapping::Approximate => {
            let tree = build_line_tree(build.segments.iter().enumerate().map(|(i, s)| (i, &s.geometry)));
            let per_track: Vec<BTreeSet<usize>> = if applied == AppliedMapping::Exact {
                exact_membership(&tree, tracks, config.intersection_buffer_m)
            } else {
                approximate_membership(&tree, tracks, config.max_snap_distance_m)
            };
            let unmapped = per_track.iter().filter(|s| s.is_empty()).count();
            (attribute(&build.segments, tracks, &per_track), unmapped)
        }
    };

    let total_ride_count: u64 = segments.iter().map(|s| s.ride_count as u64).sum();
    let usage_ratio = (!tracks.is_empty()).then(|| total_ride_count as f64 / tracks.len() as f64);
    let segments_without_rides = segments.iter().filter(|s| s.ride_count == 0).count();

    if unmapped_tracks > 0 {
        warn!(
            "[Mapping] {} of {} tracks matched no segment",
            unmapped_tracks,
            tracks.len()
        );
        diagnostics.push(Diagnostic::new(
            Stage::Mapping,
            DiagnosticKind::UsageRatio,
            format!(
                "{unmapped_tracks} of {} tracks matched no segment (usage ratio {:.2})",
                tracks.len(),
                usage_ratio.unwrap_or(0.0)
            ),
        ));
    }

    info!(
        "[Mapping] {:?}: {} rides over {} segments from {} tracks in {}ms",
        applied,
        total_ride_count,
        segments.len(),
        tracks.len(),
        start.elapsed().as_millis()
    );

    Ok((
        segments,
        MappingReport {
            applied,
            track_count: tracks.len(),
            total_ride_count,
            usage_ratio,
            unmapped_tracks,
            segments_without_rides,
            diagnostics,
        },
    ))
}

fn validate_membership(segments: &[NetworkSegment], diagnostics: &mut Vec<Diagnostic>) -> Vec<NetworkSegment> {
    segments
        .iter()
        .map(|seg| {
            let mut seg = seg.clone();
            let expected = seg.contributions.len() as u32;
            if seg.ride_count != expected {
                diagnostics.push(Diagnostic::new(
                    Stage::Mapping,
                    DiagnosticKind::MembershipRepaired,
                    format!(
                        "segment {} had ride_count {} but {} contributions",
                        seg.id, seg.ride_count, expected
                    ),
                ));
                seg.ride_count = expected;
            }
            seg
        })
        .collect()
}

fn padded_envelope(line: &geo::Line<f64>, pad: f64) -> AABB<[f64; 2]> {
    AABB::from_corners(
        [line.start.x.min(line.end.x) - pad, line.start.y.min(line.end.y) - pad],
        [line.start.x.max(line.end.x) + pad, line.start.y.max(line.end.y) + pad],
    )
}

fn segments_touching(tree: &RTree<IndexedLine>, track: &LineString<f64>, buffer: f64) -> BTreeSet<usize> {
    let mut hits = BTreeSet::new();
    for piece in track.lines() {
        for candidate in tree.locate_in_envelope_intersecting(&padded_envelope(&piece, buffer)) {
            if hits.contains(&candidate.owner) {
                continue;
            }
            if line_to_line_distance(&piece, &candidate.line) <= buffer {
                hits.insert(candidate.owner);
            }
        }
    }
    hits
}

fn exact_membership(tree: &RTree<IndexedLine>, tracks: &[Track], buffer: f64) -> Vec<BTreeSet<usize>> {
    #[cfg(feature = "parallel")]
    let iter = tracks.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iter = tracks.iter();

    iter.map(|t| segments_touching(tree, &t.geometry, buffer))
        .collect()
}

fn approximate_membership(tree: &RTree<IndexedLine>, tracks: &[Track], max_distance: f64) -> Vec<BTreeSet<usize>> {
    tracks
        .iter()
        .map(|t| {
            let midpoint: Option<Coord<f64>> = t.geometry.line_interpolate_point(0.5).map(|p| p.0);
            midpoint
                .and_then(|m| nearest_owner(tree, m, max_distance))
                .map(|(owner, _)| BTreeSet::from([owner]))
                .unwrap_or_default()
        })
        .collect()
}

fn attribute(segments: &[NetworkSegment], tracks: &[Track], per_track: &[BTreeSet<usize>]) -> Vec<NetworkSegment> {
    let mut contributions: Vec<Vec<Contribution>> = vec![Vec::new(); segments.len()];
    for (track, hits) in tracks.iter().zip(per_track) {
        for &seg in hits {
            contributions[seg].push(Contribution {
                track_id: track.id.clone(),
                length_m: track.length_m,
            });
        }
    }

    segments
        .iter()
        .zip(contributions)
        .map(|(seg, contributions)| NetworkSegment {
            id: seg.id,
            geometry: seg.geometry.clone(),
            length_m: seg.length_m,
            ride_count: contributions.len() as u32,
            contributions,
            lisa: None,
        })
        .collect()
}
