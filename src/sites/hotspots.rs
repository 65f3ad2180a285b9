//! Hotspot grouping into candidate sites.
//!
//! Significant High-High segments are grouped by centroid proximity first;
//! the traffic floor is applied to each group afterwards. Grouping before
//! filtering keeps the number of candidates non-increasing as the floor rises,
//! since removing a low-traffic member can never split a group in two.

use std::time::Instant;

use geo::Coord;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::clustering::dbscan;
use crate::config::HotspotConfig;
use crate::error::{OptionExt, Result, TrailNetError};
use crate::geo_utils::mean_coord;
use crate::network::NetworkSegment;

/// A candidate facility site derived from one hotspot group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: usize,
    /// Local-I weighted centroid of the member segment centroids
    pub location: Coord<f64>,
    pub segment_ids: Vec<usize>,
    pub hotspot_rides: u64,
    /// Mean local Moran's I of the members
    pub mean_local_i: f64,
    /// Sum of the members' local Moran's I
    pub clustering_strength: f64,
    /// True when the weights were unusable and a plain mean was used
    pub centroid_fallback: bool,
}

impl Candidate {
    pub fn hotspot_segments(&self) -> usize {
        self.segment_ids.len()
    }
}

/// Result of hotspot grouping. An empty result is a normal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum HotspotOutcome {
    NoHotspots {
        high_high_segments: usize,
        eligible_segments: usize,
    },
    Candidates { candidates: Vec<Candidate> },
}

impl HotspotOutcome {
    pub fn candidates(&self) -> &[Candidate] {
        match self {
            HotspotOutcome::NoHotspots { .. } => &[],
            HotspotOutcome::Candidates { candidates } => candidates,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates().is_empty()
    }
}

/// Group significant High-High segments into candidate sites.
///
/// Every segment must carry LISA attributes. Groups form over all High-High
/// segments, so two busy clusters linked by a chain of High-High segments
/// below `min_traffic` yield a single candidate. Its location is the centroid
/// of the busy members and can fall on the bridge between the clusters.
pub fn find_candidates(segments: &[NetworkSegment], config: &HotspotConfig) -> Result<HotspotOutcome> {
    config.validate()?;
    let start = Instant::now();

    let mut high_high = Vec::new();
    for seg in segments {
        let lisa = seg.lisa.ok_or_else(|| TrailNetError::MissingAttribute {
            attribute: "local_moran".to_string(),
            segment: seg.id,
        })?;
        if lisa.is_high_high() {
            high_high.push(seg);
        }
    }

    let eligible_segments = high_high
        .iter()
        .filter(|s| s.ride_count >= config.min_traffic)
        .count();

    let centroids: Vec<Coord<f64>> = high_high.iter().map(|s| s.centroid()).collect();
    let groups = dbscan(&centroids, config.cluster_radius_m, 1).members();
    debug!(
        "[Hotspots] {} High-High segments in {} spatial groups",
        high_high.len(),
        groups.len()
    );

    let mut candidates = Vec::new();
    for group in groups {
        let members: Vec<&NetworkSegment> = group
            .iter()
            .map(|&i| high_high[i])
            .filter(|s| s.ride_count >= config.min_traffic)
            .collect();
        if members.len() < config.min_group_size {
            continue;
        }
        candidates.push(build_candidate(candidates.len(), &members)?);
    }

    info!(
        "[Hotspots] {} High-High ({} above {} rides) -> {} candidates in {}ms",
        high_high.len(),
        eligible_segments,
        config.min_traffic,
        candidates.len(),
        start.elapsed().as_millis()
    );

    if candidates.is_empty() {
        return Ok(HotspotOutcome::NoHotspots {
            high_high_segments: high_high.len(),
            eligible_segments,
        });
    }
    Ok(HotspotOutcome::Candidates { candidates })
}

fn build_candidate(id: usize, members: &[&NetworkSegment]) -> Result<Candidate> {
    let centroids: Vec<Coord<f64>> = members.iter().map(|s| s.centroid()).collect();
    let local_i: Vec<f64> = members
        .iter()
        .map(|s| s.lisa.map_or(0.0, |l| l.local_i))
        .collect();

    let weight_sum: f64 = local_i.iter().sum();
    let weighted = (weight_sum > 0.0 && weight_sum.is_finite()).then(|| Coord {
        x: centroids.iter().zip(&local_i).map(|(c, w)| c.x * w).sum::<f64>() / weight_sum,
        y: centroids.iter().zip(&local_i).map(|(c, w)| c.y * w).sum::<f64>() / weight_sum,
    });

    let centroid_fallback = weighted.is_none();
    let location = weighted
        .or_else(|| mean_coord(&centroids))
        .ok_or_internal("hotspot group without members")?;

    Ok(Candidate {
        id,
        location,
        segment_ids: members.iter().map(|s| s.id).collect(),
        hotspot_rides: members.iter().map(|s| s.ride_count as u64).sum(),
        mean_local_i: weight_sum / members.len() as f64,
        clustering_strength: weight_sum,
        centroid_fallback,
    })
}
