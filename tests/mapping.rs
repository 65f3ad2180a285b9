//! Tests for ride-to-segment mapping

mod common;

use common::*;
use trailnet::{
    build_network, map_rides, AppliedMapping, BuildStrategy, MappingConfig, MappingMode,
    NetworkBuild, NetworkConfig,
};

fn merged_network(tracks: &[trailnet::Track]) -> NetworkBuild {
    let config = NetworkConfig {
        forced_strategy: Some(BuildStrategy::GeometricMerge),
        ..NetworkConfig::default()
    };
    build_network(tracks, &config).unwrap()
}

fn mapping(mode: MappingMode) -> MappingConfig {
    MappingConfig {
        mode,
        ..MappingConfig::default()
    }
}

fn ride_counts(segments: &[trailnet::NetworkSegment]) -> Vec<u32> {
    segments.iter().map(|s| s.ride_count).collect()
}

#[test]
fn test_exact_mapping_is_idempotent() {
    init_logging();
    let tracks = ingest(random_tracks(25, 3000.0, 11), 500.0);
    let build = merged_network(&tracks);

    let (first, first_report) = map_rides(&build, &tracks, &mapping(MappingMode::Exact)).unwrap();
    let (second, _) = map_rides(&build, &tracks, &mapping(MappingMode::Exact)).unwrap();
    assert_eq!(first_report.applied, AppliedMapping::Exact);
    assert_eq!(ride_counts(&first), ride_counts(&second));

    // Mapping an already mapped network must not add to the counts
    let remapped_build = NetworkBuild {
        segments: first.clone(),
        ..build.clone()
    };
    let (third, _) = map_rides(&remapped_build, &tracks, &mapping(MappingMode::Exact)).unwrap();
    assert_eq!(ride_counts(&first), ride_counts(&third));
}

#[test]
fn test_approximate_mapping_is_idempotent() {
    let tracks = ingest(random_tracks(25, 3000.0, 12), 500.0);
    let build = merged_network(&tracks);

    let (first, report) = map_rides(&build, &tracks, &mapping(MappingMode::Approximate)).unwrap();
    let (second, _) = map_rides(&build, &tracks, &mapping(MappingMode::Approximate)).unwrap();
    assert_eq!(report.applied, AppliedMapping::Approximate);
    assert_eq!(ride_counts(&first), ride_counts(&second));

    // Each mapped track lands on exactly one segment
    assert_eq!(
        report.total_ride_count as usize + report.unmapped_tracks,
        tracks.len()
    );
}

#[test]
fn test_ride_count_matches_contributions() {
    let tracks = crossing_corridors();
    let build = merged_network(&tracks);
    let (segments, report) = map_rides(&build, &tracks, &mapping(MappingMode::Exact)).unwrap();

    for seg in &segments {
        assert_eq!(seg.ride_count as usize, seg.contributions.len());
    }
    let ratio = report.usage_ratio.unwrap();
    assert!(ratio >= 1.0, "usage ratio {ratio}");
}

#[test]
fn test_exact_membership_is_only_validated() {
    let tracks = crossing_corridors();
    let build = build_network(&tracks, &NetworkConfig::default()).unwrap();
    assert_eq!(build.strategy, BuildStrategy::Direct);

    let (segments, report) = map_rides(&build, &tracks, &mapping(MappingMode::Exact)).unwrap();
    assert_eq!(report.applied, AppliedMapping::Validated);
    assert_eq!(ride_counts(&segments), ride_counts(&build.segments));
}

#[test]
fn test_auto_mode_switches_on_track_count() {
    let tracks = crossing_corridors();
    let build = merged_network(&tracks);
    let config = MappingConfig {
        approximate_above_tracks: 3,
        ..MappingConfig::default()
    };
    let (_, report) = map_rides(&build, &tracks, &config).unwrap();
    assert_eq!(report.applied, AppliedMapping::Approximate);

    let (_, report) = map_rides(&build, &tracks, &MappingConfig::default()).unwrap();
    assert_eq!(report.applied, AppliedMapping::Exact);
}

#[test]
fn test_no_tracks_has_no_usage_ratio() {
    let tracks = crossing_corridors();
    let build = merged_network(&tracks);
    let (segments, report) = map_rides(&build, &[], &mapping(MappingMode::Exact)).unwrap();
    assert!(report.usage_ratio.is_none());
    assert_eq!(report.segments_without_rides, segments.len());
}
