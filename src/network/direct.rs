//! Direct strategy: one segment per track.

use super::{Contribution, NetworkSegment};
use crate::ingest::Track;

pub(super) fn build(tracks: &[Track]) -> Vec<NetworkSegment> {
    tracks
        .iter()
        .enumerate()
        .map(|(i, track)| {
            NetworkSegment::new(
                i,
                track.geometry.clone(),
                vec![Contribution {
                    track_id: track.id.clone(),
                    length_m: track.length_m,
                }],
            )
        })
        .collect()
}
