//! # Facility Site Selection
//!
//! Candidate sites come from groups of significant High-High segments; each
//! candidate is then scored on trail accessibility, usage and clustering
//! strength within a catchment, constrained by exclusion zones, and ranked.

mod hotspots;
mod scoring;

pub use hotspots::{find_candidates, Candidate, HotspotOutcome};
pub use scoring::{
    check_zone, dense_rank_scale, score_candidates, unique_trail_length, Accessibility,
    ExclusionZone, RankedCandidate, ScoreBreakdown, ScoringOutcome, ZoneStatus,
};
