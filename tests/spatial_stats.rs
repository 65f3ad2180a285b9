//! Tests for spatial weights, Global and Local Moran's I

mod common;

use common::*;
use trailnet::{
    annotate_segments, global_morans_i, local_morans_i, Degeneracy, Interpretation,
    NetworkSegment, Quadrant, SpatialConfig, SpatialWeights, TrailNetError,
};

fn config(threshold: f64) -> SpatialConfig {
    SpatialConfig {
        distance_threshold_m: threshold,
        ..SpatialConfig::default()
    }
}

fn values(segments: &[NetworkSegment]) -> Vec<f64> {
    segments.iter().map(|s| s.ride_count as f64).collect()
}

/// 20 segments 100 m apart: the first ten busy, the last ten quiet.
fn step_network() -> Vec<NetworkSegment> {
    (0..20)
        .map(|i| segment_at(i, i as f64 * 100.0, 0.0, if i < 10 { 20 } else { 1 }))
        .collect()
}

#[test]
fn test_constant_usage_is_not_significant() {
    let segments: Vec<NetworkSegment> = (0..12)
        .map(|i| segment_at(i, (i % 4) as f64 * 300.0, (i / 4) as f64 * 300.0, 3))
        .collect();
    let config = config(500.0);
    let weights = SpatialWeights::for_segments(&segments, &config).unwrap();

    let result = global_morans_i("ride_count", &values(&segments), &weights, &config).unwrap();
    assert!(!result.significant);
    assert_eq!(result.interpretation, Interpretation::NotSignificant);
    assert_eq!(result.degeneracy, Some(Degeneracy::ZeroVariance));
    assert!(result.observed_i.is_none());
}

#[test]
fn test_clustered_usage_is_positive() {
    init_logging();
    let segments = step_network();
    let config = config(450.0);
    let weights = SpatialWeights::for_segments(&segments, &config).unwrap();

    let result = global_morans_i("ride_count", &values(&segments), &weights, &config).unwrap();
    assert!(result.degeneracy.is_none());
    assert!(result.significant, "p = {}", result.p_value);
    assert_eq!(result.interpretation, Interpretation::PositiveAutocorrelation);
    assert!(result.observed_i.unwrap() > result.expected_i);
    assert!((result.expected_i + 1.0 / 19.0).abs() < 1e-12);
}

#[test]
fn test_permutation_results_are_reproducible() {
    let segments = step_network();
    let config = config(450.0);
    let weights = SpatialWeights::for_segments(&segments, &config).unwrap();
    let v = values(&segments);

    let a = global_morans_i("ride_count", &v, &weights, &config).unwrap();
    let b = global_morans_i("ride_count", &v, &weights, &config).unwrap();
    assert_eq!(a, b);

    let la = local_morans_i("ride_count", &v, &weights, &config).unwrap();
    let lb = local_morans_i("ride_count", &v, &weights, &config).unwrap();
    assert_eq!(la, lb);
}

#[test]
fn test_lisa_finds_both_clusters() {
    let segments = step_network();
    let config = config(450.0);
    let weights = SpatialWeights::for_segments(&segments, &config).unwrap();

    let outcome = local_morans_i("ride_count", &values(&segments), &weights, &config).unwrap();
    assert!(outcome.degeneracy.is_none());
    assert_eq!(outcome.results[3].quadrant, Quadrant::HighHigh);
    assert_eq!(outcome.results[16].quadrant, Quadrant::LowLow);
    assert!(outcome.count(Quadrant::HighHigh) > 0);
    assert!(outcome.count(Quadrant::LowLow) > 0);

    let annotated = annotate_segments(&segments, &outcome).unwrap();
    assert!(annotated.iter().all(|s| s.lisa.is_some()));
    assert!(annotated[3].lisa.unwrap().is_high_high());
    // Input segments are untouched
    assert!(segments.iter().all(|s| s.lisa.is_none()));
}

#[test]
fn test_isolated_segments_are_degenerate() {
    let segments: Vec<NetworkSegment> = (0..5)
        .map(|i| segment_at(i, i as f64 * 10_000.0, 0.0, i as u32))
        .collect();
    let config = config(500.0);
    let weights = SpatialWeights::for_segments(&segments, &config).unwrap();
    assert_eq!(weights.isolated_count(), 5);

    let result = global_morans_i("ride_count", &values(&segments), &weights, &config).unwrap();
    assert!(matches!(
        result.degeneracy,
        Some(Degeneracy::InsufficientNeighbors { links: 0, .. })
    ));
    assert!(!result.significant);

    let lisa = local_morans_i("ride_count", &values(&segments), &weights, &config).unwrap();
    assert_eq!(lisa.count(Quadrant::NotSignificant), 5);
}

#[test]
fn test_non_finite_values_are_errors() {
    let segments = step_network();
    let config = config(450.0);
    let weights = SpatialWeights::for_segments(&segments, &config).unwrap();
    let mut v = values(&segments);
    v[4] = f64::INFINITY;

    let err = global_morans_i("ride_count", &v, &weights, &config).unwrap_err();
    assert!(matches!(err, TrailNetError::InvalidAttribute { index: 4, .. }));
}

#[test]
fn test_weights_are_symmetric_and_row_standardized() {
    let segments = step_network();
    let weights = SpatialWeights::for_segments(&segments, &config(450.0)).unwrap();
    for i in 0..weights.len() {
        assert!(!weights.neighbors(i).contains(&i));
        for &j in weights.neighbors(i) {
            assert!(weights.neighbors(j).contains(&i));
        }
        let row: f64 = weights.neighbors(i).iter().map(|_| weights.row_weight(i)).sum();
        assert!((row - 1.0).abs() < 1e-12);
    }
}
