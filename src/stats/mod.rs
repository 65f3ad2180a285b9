//! # Spatial Autocorrelation
//!
//! Global Moran's I tests whether an attribute (normally `ride_count`) is
//! spatially clustered over the whole network; Local Moran's I (LISA) finds
//! where. Inference is by Monte Carlo permutation with a configured seed, so
//! identical input and configuration reproduce identical p-values.
//!
//! Statistically degenerate input (too few segments, zero variance, too few
//! neighbor links) is not an error: the result is flagged through
//! [`Degeneracy`] and reported as not significant. Non-finite attribute
//! values and misaligned inputs are errors.

mod lisa;
mod moran;
mod weights;

use serde::{Deserialize, Serialize};

use crate::config::SpatialConfig;
use crate::error::{Result, TrailNetError};

pub use lisa::{annotate_segments, local_morans_i, LisaOutcome, LocalMoranResult, Quadrant};
pub use moran::{global_morans_i, GlobalMoranResult, Interpretation};
pub use weights::SpatialWeights;

/// Fewest observations for which Moran's I is computed.
pub const MIN_OBSERVATIONS: usize = 3;

/// Why a statistic could not be computed meaningfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum Degeneracy {
    TooFewObservations { n: usize, required: usize },
    /// Every observation has the same value
    ZeroVariance,
    /// The distance band links too few segment pairs
    InsufficientNeighbors {
        links: usize,
        required: usize,
        threshold_m: f64,
    },
}

/// Attribute values as deviations from their mean, plus the sum of squares.
struct Deviations {
    z: Vec<f64>,
    sum_sq: f64,
}

/// Validate values against the weights and classify degenerate input.
fn prepare(
    attribute: &str,
    values: &[f64],
    weights: &SpatialWeights,
    config: &SpatialConfig,
) -> Result<(Deviations, Option<Degeneracy>)> {
    config.validate()?;
    if values.len() != weights.len() {
        return Err(TrailNetError::LengthMismatch {
            context: format!("{attribute} values vs spatial weights"),
            expected: weights.len(),
            actual: values.len(),
        });
    }
    if let Some((index, &value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(TrailNetError::InvalidAttribute {
            attribute: attribute.to_string(),
            index,
            value,
        });
    }

    let n = values.len();
    let mean = if n == 0 {
        0.0
    } else {
        values.iter().sum::<f64>() / n as f64
    };
    let z: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let sum_sq: f64 = z.iter().map(|d| d * d).sum();

    let degeneracy = if n < MIN_OBSERVATIONS {
        Some(Degeneracy::TooFewObservations {
            n,
            required: MIN_OBSERVATIONS,
        })
    } else if sum_sq <= f64::EPSILON * n as f64 * mean.abs().max(1.0) {
        Some(Degeneracy::ZeroVariance)
    } else if weights.link_count() < config.min_neighbor_links.max(1) {
        Some(Degeneracy::InsufficientNeighbors {
            links: weights.link_count(),
            required: config.min_neighbor_links.max(1),
            threshold_m: weights.threshold_m,
        })
    } else {
        None
    };

    Ok((Deviations { z, sum_sq }, degeneracy))
}

/// Two-sided folded pseudo p-value from a permutation count.
fn folded_p_value(larger: usize, permutations: usize) -> f64 {
    let extreme = larger.min(permutations - larger);
    (extreme + 1) as f64 / (permutations + 1) as f64
}
