//! Weight quality measures and simple contrasts.
//!
//! Reweighting trades sample size for balance: a few dominant weights mean
//! the resample is effectively much smaller than its row count. The measures
//! here quantify that, and `mean_difference` provides the naive
//! observational contrast the causal estimate is compared against.

use dosample_frame::Table;

use crate::EngineError;

/// Effective sample size of a weighted sample: ESS = (Σwᵢ)² / Σwᵢ².
///
/// Equal weights give ESS = n; a single dominant weight drives ESS toward 1.
/// Returns 0.0 for empty or all-zero weights.
pub fn effective_sample_size(weights: &[f64]) -> f64 {
    let sum: f64 = weights.iter().sum();
    let sum_sq: f64 = weights.iter().map(|w| w * w).sum();
    if sum_sq > 0.0 {
        (sum * sum) / sum_sq
    } else {
        0.0
    }
}

/// Population variance of the weights. Returns 0.0 when empty.
pub fn weight_variance(weights: &[f64]) -> f64 {
    if weights.is_empty() {
        return 0.0;
    }
    let n = weights.len() as f64;
    let mean = weights.iter().sum::<f64>() / n;
    weights.iter().map(|w| (w - mean) * (w - mean)).sum::<f64>() / n
}

/// Difference in mean outcome between two treatment groups:
/// `E[outcome | treatment == treated] − E[outcome | treatment == control]`.
///
/// On observational data this is the naive (confounded) contrast; on a
/// do-sampled output it estimates the causal effect.
pub fn mean_difference(
    table: &Table,
    outcome: &str,
    treatment: &str,
    treated: f64,
    control: f64,
) -> Result<f64, EngineError> {
    let treated_mean = table.mean_where(outcome, treatment, treated)?;
    let control_mean = table.mean_where(outcome, treatment, control)?;
    Ok(treated_mean - control_mean)
}
