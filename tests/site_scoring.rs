//! Tests for hotspot grouping and candidate scoring

mod common;

use common::*;
use geo::{polygon, Coord, MultiPolygon};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trailnet::{
    find_candidates, score_candidates, Candidate, DiagnosticKind, ExclusionZone, HotspotConfig,
    NetworkSegment, ScoringConfig, ZoneStatus,
};

fn candidate(id: usize, x: f64, y: f64, mean_local_i: f64) -> Candidate {
    Candidate {
        id,
        location: Coord { x, y },
        segment_ids: vec![],
        hotspot_rides: 0,
        mean_local_i,
        clustering_strength: mean_local_i,
        centroid_fallback: false,
    }
}

fn square(cx: f64, cy: f64, half: f64) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon![
        (x: cx - half, y: cy - half),
        (x: cx + half, y: cy - half),
        (x: cx + half, y: cy + half),
        (x: cx - half, y: cy + half),
    ]])
}

/// Trails around two sites 20 km apart; the western site is busier.
fn two_site_network() -> Vec<NetworkSegment> {
    let mut segments = Vec::new();
    for k in 0..6 {
        segments.push(segment_at(segments.len(), -500.0 + k as f64 * 150.0, 100.0, 12));
    }
    for k in 0..3 {
        segments.push(segment_at(segments.len(), 20_000.0 + k as f64 * 150.0, 100.0, 3));
    }
    segments
}

#[test]
fn test_prohibited_zone_scores_zero_and_ranks_last() {
    init_logging();
    let segments = two_site_network();
    // The busier site sits inside a zone-A polygon
    let candidates = vec![candidate(0, 0.0, 0.0, 3.0), candidate(1, 20_000.0, 0.0, 1.0)];
    let zones = vec![ExclusionZone {
        zone_type: "A".to_string(),
        geometry: square(0.0, 0.0, 1000.0),
    }];
    let config = ScoringConfig::default();

    let outcome = score_candidates(&candidates, &segments, Some(&zones), &config).unwrap();
    assert_eq!(outcome.ranked.len(), 2);

    let first = &outcome.ranked[0];
    let last = &outcome.ranked[1];
    assert_eq!(first.candidate.id, 1);
    assert_eq!(first.rank, 1);
    assert_eq!(first.zone, ZoneStatus::Outside);
    assert!(first.suitability_score > 0.0);

    assert_eq!(last.candidate.id, 0);
    assert!(last.prohibited);
    assert_eq!(last.suitability_score, 0.0);
    assert_eq!(
        last.zone,
        ZoneStatus::Inside {
            zone_type: "A".to_string()
        }
    );
    assert!(last.rank > first.rank);

    // The outside candidate is scored exactly as without zone data
    let unconstrained = score_candidates(&candidates, &segments, None, &config).unwrap();
    let same = unconstrained
        .ranked
        .iter()
        .find(|r| r.candidate.id == 1)
        .unwrap();
    assert_eq!(same.suitability_score, first.suitability_score);
    assert_eq!(same.zone, ZoneStatus::Unknown);
}

#[test]
fn test_permitted_zone_keeps_score() {
    let segments = two_site_network();
    let candidates = vec![candidate(0, 0.0, 0.0, 3.0), candidate(1, 20_000.0, 0.0, 1.0)];
    let zones = vec![ExclusionZone {
        zone_type: "C".to_string(),
        geometry: square(0.0, 0.0, 1000.0),
    }];
    let outcome = score_candidates(&candidates, &segments, Some(&zones), &ScoringConfig::default()).unwrap();
    let inside = outcome.ranked.iter().find(|r| r.candidate.id == 0).unwrap();
    assert!(!inside.prohibited);
    assert!(inside.suitability_score > 0.0);
    assert_eq!(inside.rank, 1);
}

#[test]
fn test_rank_consistency() {
    let mut rng = StdRng::seed_from_u64(3);
    let segments: Vec<NetworkSegment> = (0..60)
        .map(|i| {
            segment_at(
                i,
                rng.gen_range(0.0..30_000.0),
                rng.gen_range(0.0..30_000.0),
                rng.gen_range(1..20),
            )
        })
        .collect();
    let candidates: Vec<Candidate> = (0..12)
        .map(|i| {
            candidate(
                i,
                rng.gen_range(0.0..30_000.0),
                rng.gen_range(0.0..30_000.0),
                rng.gen_range(0.1..5.0),
            )
        })
        .collect();

    let outcome = score_candidates(&candidates, &segments, None, &ScoringConfig::default()).unwrap();
    assert_eq!(outcome.ranked.len(), candidates.len());
    assert_eq!(outcome.ranked[0].rank, 1);
    for pair in outcome.ranked.windows(2) {
        assert!(pair[0].rank <= pair[1].rank);
        assert!(pair[0].suitability_score >= pair[1].suitability_score);
        if pair[0].suitability_score == pair[1].suitability_score {
            assert_eq!(pair[0].rank, pair[1].rank);
        }
    }
    for r in &outcome.ranked {
        assert!((0.0..=100.0).contains(&r.suitability_score));
    }
}

#[test]
fn test_overlap_bound() {
    // Three copies of one trail plus a distinct trail
    let segments = vec![
        segment_at(0, 0.0, 0.0, 4),
        segment_at(1, 0.0, 0.0, 4),
        segment_at(2, 0.0, 0.0, 4),
        segment_at(3, 0.0, 400.0, 4),
        segment_at(4, 50_000.0, 0.0, 1),
    ];
    let candidates = vec![candidate(0, 25.0, 200.0, 1.0), candidate(1, 50_025.0, 0.0, 1.0)];

    let outcome = score_candidates(&candidates, &segments, None, &ScoringConfig::default()).unwrap();
    for r in &outcome.ranked {
        let a = &r.accessibility;
        assert!(a.unique_trail_length_km <= a.trail_length_km);
    }

    let overlapping = outcome.ranked.iter().find(|r| r.candidate.id == 0).unwrap();
    assert_eq!(overlapping.accessibility.trail_count, 4);
    assert!((overlapping.accessibility.trail_length_km - 0.2).abs() < 1e-9);
    assert!((overlapping.accessibility.unique_trail_length_km - 0.10).abs() < 1e-6);

    let distinct = outcome.ranked.iter().find(|r| r.candidate.id == 1).unwrap();
    assert!((distinct.accessibility.unique_trail_length_km - distinct.accessibility.trail_length_km).abs() < 1e-9);
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::OverlapFactor));
}

#[test]
fn test_raising_min_traffic_never_adds_candidates() {
    let mut rng = StdRng::seed_from_u64(21);
    let segments: Vec<NetworkSegment> = (0..80)
        .map(|i| {
            hotspot_segment(
                i,
                rng.gen_range(0.0..10_000.0),
                rng.gen_range(0.0..10_000.0),
                rng.gen_range(0..15),
                rng.gen_range(0.2..3.0),
            )
        })
        .collect();

    let mut previous = usize::MAX;
    for min_traffic in 0..=15 {
        let config = HotspotConfig {
            min_traffic,
            cluster_radius_m: 800.0,
            min_group_size: 2,
        };
        let count = find_candidates(&segments, &config).unwrap().candidates().len();
        assert!(count <= previous, "min_traffic={min_traffic}: {count} > {previous}");
        previous = count;
    }
    assert_eq!(previous, 0);
}

#[test]
fn test_no_candidates_scores_nothing() {
    let outcome = score_candidates(&[], &two_site_network(), None, &ScoringConfig::default()).unwrap();
    assert!(outcome.ranked.is_empty());
    assert!(outcome.diagnostics.is_empty());
}
