//! Local Moran's I (LISA) with conditional permutation inference.
//!
//! For each segment `i` with neighbors, `I_i = (n-1) * z_i * lag_i / sum(z^2)`.
//! Significance comes from re-drawing `k_i` neighbor values from the other
//! `n-1` observations while holding `z_i` fixed. Every segment draws from its
//! own generator seeded with `seed + i`, so results do not depend on
//! evaluation order.

use std::fmt;
use std::time::Instant;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{folded_p_value, prepare, Degeneracy, SpatialWeights};
use crate::config::SpatialConfig;
use crate::error::{Result, TrailNetError};
use crate::network::NetworkSegment;

/// LISA cluster classification of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quadrant {
    /// Above-mean value among above-mean neighbors
    #[serde(rename = "High-High")]
    HighHigh,
    #[serde(rename = "Low-Low")]
    LowLow,
    /// Above-mean value among below-mean neighbors
    #[serde(rename = "High-Low")]
    HighLow,
    /// Below-mean value among above-mean neighbors
    #[serde(rename = "Low-High")]
    LowHigh,
    #[serde(rename = "Not Significant")]
    NotSignificant,
}

impl Quadrant {
    fn classify(significant: bool, z: f64, lag: f64) -> Self {
        if !significant {
            return Quadrant::NotSignificant;
        }
        match (z > 0.0, z < 0.0, lag > 0.0, lag < 0.0) {
            (true, _, true, _) => Quadrant::HighHigh,
            (_, true, _, true) => Quadrant::LowLow,
            (true, _, _, true) => Quadrant::HighLow,
            (_, true, true, _) => Quadrant::LowHigh,
            _ => Quadrant::NotSignificant,
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Quadrant::HighHigh => "High-High",
            Quadrant::LowLow => "Low-Low",
            Quadrant::HighLow => "High-Low",
            Quadrant::LowHigh => "Low-High",
            Quadrant::NotSignificant => "Not Significant",
        };
        f.write_str(label)
    }
}

/// Local statistic of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalMoranResult {
    pub local_i: f64,
    pub p_value: f64,
    /// Neighbor mean of the attribute deviations
    pub spatial_lag: f64,
    pub significant: bool,
    pub quadrant: Quadrant,
}

impl LocalMoranResult {
    fn not_significant(spatial_lag: f64) -> Self {
        Self {
            local_i: 0.0,
            p_value: 1.0,
            spatial_lag,
            significant: false,
            quadrant: Quadrant::NotSignificant,
        }
    }

    pub fn is_high_high(&self) -> bool {
        self.significant && self.quadrant == Quadrant::HighHigh
    }
}

/// Outcome of [`local_morans_i`], aligned with the input values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LisaOutcome {
    pub attribute: String,
    pub results: Vec<LocalMoranResult>,
    pub degeneracy: Option<Degeneracy>,
    pub significant_count: usize,
}

impl LisaOutcome {
    pub fn count(&self, quadrant: Quadrant) -> usize {
        self.results.iter().filter(|r| r.quadrant == quadrant).count()
    }
}

fn local_at(
    i: usize,
    z: &[f64],
    sum_sq: f64,
    weights: &SpatialWeights,
    config: &SpatialConfig,
) -> LocalMoranResult {
    let k = weights.cardinality(i);
    if k == 0 {
        return LocalMoranResult::not_significant(0.0);
    }

    let n = z.len();
    let scale = (n as f64 - 1.0) / sum_sq;
    let lag = weights.lag_at(i, z);
    let local_i = scale * z[i] * lag;

    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(i as u64));
    let perms = config.permutations as usize;
    let mut larger = 0;
    for _ in 0..perms {
        // Draw k of the other n-1 observations; skip over i itself
        let drawn: f64 = sample(&mut rng, n - 1, k)
            .iter()
            .map(|j| if j >= i { z[j + 1] } else { z[j] })
            .sum();
        let simulated = scale * z[i] * (drawn / k as f64);
        if simulated >= local_i {
            larger += 1;
        }
    }

    let p_value = folded_p_value(larger, perms);
    let significant = p_value < config.significance;
    LocalMoranResult {
        local_i,
        p_value,
        spatial_lag: lag,
        significant,
        quadrant: Quadrant::classify(significant, z[i], lag),
    }
}

/// Local Moran's I of `values` (aligned with `weights`).
pub fn local_morans_i(
    attribute: &str,
    values: &[f64],
    weights: &SpatialWeights,
    config: &SpatialConfig,
) -> Result<LisaOutcome> {
    let start = Instant::now();
    let (dev, degeneracy) = prepare(attribute, values, weights, config)?;

    if let Some(reason) = degeneracy {
        warn!("[LISA] {} is degenerate: {:?}; all segments not significant", attribute, reason);
        return Ok(LisaOutcome {
            attribute: attribute.to_string(),
            results: vec![LocalMoranResult::not_significant(0.0); values.len()],
            degeneracy: Some(reason),
            significant_count: 0,
        });
    }

    let z = &dev.z;
    #[cfg(feature = "parallel")]
    let results: Vec<LocalMoranResult> = (0..z.len())
        .into_par_iter()
        .map(|i| local_at(i, z, dev.sum_sq, weights, config))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let results: Vec<LocalMoranResult> = (0..z.len())
        .map(|i| local_at(i, z, dev.sum_sq, weights, config))
        .collect();

    let significant_count = results.iter().filter(|r| r.significant).count();
    let outcome = LisaOutcome {
        attribute: attribute.to_string(),
        results,
        degeneracy: None,
        significant_count,
    };

    info!(
        "[LISA] {}: {} significant (HH={} LL={} HL={} LH={}) of {} in {}ms",
        attribute,
        significant_count,
        outcome.count(Quadrant::HighHigh),
        outcome.count(Quadrant::LowLow),
        outcome.count(Quadrant::HighLow),
        outcome.count(Quadrant::LowHigh),
        outcome.results.len(),
        start.elapsed().as_millis()
    );

    Ok(outcome)
}

/// Copy of `segments` with LISA attributes attached.
pub fn annotate_segments(segments: &[NetworkSegment], outcome: &LisaOutcome) -> Result<Vec<NetworkSegment>> {
    if segments.len() != outcome.results.len() {
        return Err(TrailNetError::LengthMismatch {
            context: "segments vs local Moran results".to_string(),
            expected: segments.len(),
            actual: outcome.results.len(),
        });
    }
    Ok(segments
        .iter()
        .zip(&outcome.results)
        .map(|(seg, lisa)| NetworkSegment {
            lisa: Some(*lisa),
            ..seg.clone()
        })
        .collect())
}
