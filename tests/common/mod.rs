//! Synthetic track and segment builders shared by the integration tests.

#![allow(dead_code)]

use geo::{Coord, LineString};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trailnet::{
    ingest_tracks, IngestConfig, LocalMoranResult, NetworkSegment, Quadrant, RawTrack, Track,
    TrackCollection,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Straight projected track from `from` to `to`.
pub fn straight(id: &str, from: (f64, f64), to: (f64, f64)) -> RawTrack {
    RawTrack::projected(
        id,
        vec![Coord { x: from.0, y: from.1 }, Coord { x: to.0, y: to.1 }],
    )
}

/// Ingest projected raw tracks with simplification off.
pub fn ingest(raw: Vec<RawTrack>, min_track_length_m: f64) -> Vec<Track> {
    let config = IngestConfig {
        simplify_tolerance_m: 0.0,
        min_track_length_m,
        ..IngestConfig::default()
    };
    ingest_tracks(&TrackCollection::projected(raw), &config)
        .unwrap()
        .tracks
}

/// Two overlapping east-west routes plus a north-south route crossing them.
///
/// Five tracks: `a` and `c` identical, `b` shifted 500 m east, `v1`/`v2`
/// identical verticals crossing at x=1200.
pub fn crossing_corridors() -> Vec<Track> {
    ingest(
        vec![
            straight("a", (0.0, 0.0), (2000.0, 0.0)),
            straight("b", (500.0, 0.0), (2500.0, 0.0)),
            straight("c", (0.0, 0.0), (2000.0, 0.0)),
            straight("v1", (1200.0, -1000.0), (1200.0, 1000.0)),
            straight("v2", (1200.0, -1000.0), (1200.0, 1000.0)),
        ],
        500.0,
    )
}

/// Busy corridors next to quiet ones.
///
/// Vertical 1 km corridors every 300 m along x. The first `hot` corridors are
/// ridden `copies` times each (offset by 2 m per copy), the next `cold`
/// corridors once.
pub fn hot_and_cold_corridors(hot: usize, cold: usize, copies: usize) -> Vec<RawTrack> {
    let mut raw = Vec::new();
    for i in 0..hot {
        for k in 0..copies {
            let x = i as f64 * 300.0 + k as f64 * 2.0;
            raw.push(straight(&format!("hot-{i}-{k}"), (x, 0.0), (x, 1000.0)));
        }
    }
    for i in hot..hot + cold {
        let x = i as f64 * 300.0;
        raw.push(straight(&format!("cold-{i}"), (x, 0.0), (x, 1000.0)));
    }
    raw
}

/// Random wandering tracks inside a square, reproducible from `seed`.
pub fn random_tracks(count: usize, extent_m: f64, seed: u64) -> Vec<RawTrack> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let mut x = rng.gen_range(0.0..extent_m);
            let mut y = rng.gen_range(0.0..extent_m);
            let heading: f64 = rng.gen_range(0.0..std::f64::consts::TAU);
            let coords = (0..30)
                .map(|_| {
                    let turn: f64 = rng.gen_range(-0.3..0.3);
                    x += 100.0 * (heading + turn).cos();
                    y += 100.0 * (heading + turn).sin();
                    Coord { x, y }
                })
                .collect();
            RawTrack::projected(&format!("random-{i}"), coords)
        })
        .collect()
}

/// Horizontal 50 m segment starting at `x` with the given usage.
pub fn segment_at(id: usize, x: f64, y: f64, rides: u32) -> NetworkSegment {
    let mut seg = NetworkSegment::new(id, LineString::from(vec![(x, y), (x + 50.0, y)]), vec![]);
    seg.ride_count = rides;
    seg
}

/// Segment already annotated as a significant High-High hotspot.
pub fn hotspot_segment(id: usize, x: f64, y: f64, rides: u32, local_i: f64) -> NetworkSegment {
    let mut seg = segment_at(id, x, y, rides);
    seg.lisa = Some(LocalMoranResult {
        local_i,
        p_value: 0.01,
        spatial_lag: 1.0,
        significant: true,
        quadrant: Quadrant::HighHigh,
    });
    seg
}
