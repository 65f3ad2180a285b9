//! Global Moran's I with permutation inference.

use std::time::Instant;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{folded_p_value, prepare, Degeneracy, SpatialWeights};
use crate::config::SpatialConfig;
use crate::error::Result;

/// Reading of a global Moran result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpretation {
    /// Similar values cluster together
    PositiveAutocorrelation,
    /// Dissimilar values are adjacent
    NegativeAutocorrelation,
    NotSignificant,
}

/// Outcome of [`global_morans_i`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalMoranResult {
    pub attribute: String,
    pub n: usize,
    /// Observed statistic; None when degenerate
    pub observed_i: Option<f64>,
    /// Expected value under no autocorrelation, -1/(n-1)
    pub expected_i: f64,
    pub p_value: f64,
    /// Standardized against the permutation distribution
    pub z_score: Option<f64>,
    pub significant: bool,
    pub interpretation: Interpretation,
    pub degeneracy: Option<Degeneracy>,
    pub permutations: u32,
}

/// Moran's I for deviations `z` under row-standardized weights.
fn statistic(z: &[f64], weights: &SpatialWeights, sum_sq: f64) -> f64 {
    let n = z.len() as f64;
    let cross: f64 = (0..z.len()).map(|i| z[i] * weights.lag_at(i, z)).sum();
    (n / weights.s0()) * cross / sum_sq
}

/// Global Moran's I of `values` (aligned with `weights`).
pub fn global_morans_i(
    attribute: &str,
    values: &[f64],
    weights: &SpatialWeights,
    config: &SpatialConfig,
) -> Result<GlobalMoranResult> {
    let start = Instant::now();
    let (dev, degeneracy) = prepare(attribute, values, weights, config)?;
    let n = values.len();
    let expected_i = if n > 1 { -1.0 / (n as f64 - 1.0) } else { 0.0 };

    if let Some(reason) = degeneracy {
        warn!("[Moran] {} is degenerate: {:?}", attribute, reason);
        return Ok(GlobalMoranResult {
            attribute: attribute.to_string(),
            n,
            observed_i: None,
            expected_i,
            p_value: 1.0,
            z_score: None,
            significant: false,
            interpretation: Interpretation::NotSignificant,
            degeneracy: Some(reason),
            permutations: config.permutations,
        });
    }

    let observed = statistic(&dev.z, weights, dev.sum_sq);

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut shuffled = dev.z.clone();
    let simulated: Vec<f64> = (0..config.permutations)
        .map(|_| {
            shuffled.shuffle(&mut rng);
            statistic(&shuffled, weights, dev.sum_sq)
        })
        .collect();

    let perms = simulated.len();
    let larger = simulated.iter().filter(|&&s| s >= observed).count();
    let p_value = folded_p_value(larger, perms);

    let mean_sim = simulated.iter().sum::<f64>() / perms as f64;
    let var_sim = simulated.iter().map(|s| (s - mean_sim).powi(2)).sum::<f64>() / perms as f64;
    let sd_sim = var_sim.sqrt();
    let z_score = (sd_sim > 0.0).then(|| (observed - mean_sim) / sd_sim);

    let significant = p_value < config.significance;
    let interpretation = if !significant {
        Interpretation::NotSignificant
    } else if observed > expected_i {
        Interpretation::PositiveAutocorrelation
    } else {
        Interpretation::NegativeAutocorrelation
    };

    info!(
        "[Moran] {}: I={:.4} E[I]={:.4} p={:.4} ({:?}) over {} segments in {}ms",
        attribute,
        observed,
        expected_i,
        p_value,
        interpretation,
        n,
        start.elapsed().as_millis()
    );

    Ok(GlobalMoranResult {
        attribute: attribute.to_string(),
        n,
        observed_i: Some(observed),
        expected_i,
        p_value,
        z_score,
        significant,
        interpretation,
        degeneracy: None,
        permutations: config.permutations,
    })
}
