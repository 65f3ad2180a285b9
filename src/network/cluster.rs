//! Density-cluster strategy.
//!
//! Tracks whose centroids are chained within the snap tolerance form a group.
//! The longest member becomes the segment geometry; every member contributes.

use geo::{Centroid, Coord};
use log::debug;

use super::{Contribution, NetworkSegment};
use crate::clustering::dbscan;
use crate::config::NetworkConfig;
use crate::ingest::Track;

pub(super) fn build(tracks: &[Track], config: &NetworkConfig) -> Vec<NetworkSegment> {
    let centroids: Vec<Coord<f64>> = tracks
        .iter()
        .map(|t| {
            t.geometry
                .centroid()
                .map(|p| p.0)
                .or_else(|| t.geometry.0.first().copied())
                .unwrap_or(Coord { x: 0.0, y: 0.0 })
        })
        .collect();

    let labels = dbscan(&centroids, config.snap_tolerance_m, 1);
    debug!(
        "[Network] {} tracks -> {} centroid clusters",
        tracks.len(),
        labels.cluster_count
    );

    labels
        .members()
        .into_iter()
        .enumerate()
        .filter_map(|(id, members)| {
            // First longest member wins ties
            let representative = members.iter().copied().reduce(|best, i| {
                if tracks[i].length_m > tracks[best].length_m {
                    i
                } else {
                    best
                }
            })?;
            let contributions = members
                .iter()
                .map(|&i| Contribution {
                    track_id: tracks[i].id.clone(),
                    length_m: tracks[i].length_m,
                })
                .collect();
            Some(NetworkSegment::new(
                id,
                tracks[representative].geometry.clone(),
                contributions,
            ))
        })
        .collect()
}
