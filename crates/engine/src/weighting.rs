//! The inverse-probability-weighting backend.
//!
//! The back-door recipe in three moves. Stage 1 fits a treatment-assignment
//! model per treatment variable and scores every unit's propensity at its
//! observed treatment, clipping scores out of the stable band. Stage 2 keeps
//! the units compatible with the requested assignment (exact match for
//! discrete treatments, Gaussian-kernel closeness for continuous ones) and
//! weights each by inverse propensity. Stage 3 draws a weighted resample
//! with replacement; its empirical distribution approximates the
//! interventional distribution under the adjustment set.
//!
//! Key insight: reweighting by `1/p̂(T | Z)` manufactures a pseudo-population
//! in which treatment is independent of the adjustment set, so a plain
//! difference in means on the output estimates the causal contrast.

use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, warn};

use dosample_frame::Table;

use crate::backend::{Assignment, SamplerBackend, SamplerState, StageContext};
use crate::config::ClipPolicy;
use crate::diagnostics::effective_sample_size;
use crate::propensity::{feature_rows, PropensityModel};
use crate::EngineError;

/// Units beyond this many bandwidths of a continuous target are dropped.
const KERNEL_CUTOFF: f64 = 3.0;

/// Stage-1 output retained across stages: fitted models plus per-unit
/// quantities aligned with the working copy's rows.
#[derive(Debug, Clone)]
pub struct WeightingFit {
    models: Vec<PropensityModel>,
    propensity: Vec<f64>,
    weights: Vec<f64>,
    n_clipped: usize,
    ess: f64,
}

impl WeightingFit {
    /// Clipped per-unit propensities at the observed treatment, aligned with
    /// the working copy (filtered along with it in stage 2).
    pub fn propensity_scores(&self) -> &[f64] {
        &self.propensity
    }

    /// Normalized sampling weights; empty until stage 2 has run.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Units whose score was clamped into the stable band.
    pub fn n_clipped(&self) -> usize {
        self.n_clipped
    }

    /// Effective sample size of the stage-2 weights; 0.0 until stage 2.
    pub fn effective_sample_size(&self) -> f64 {
        self.ess
    }

    /// The fitted model for each treatment variable, in estimand order.
    pub fn models(&self) -> &[PropensityModel] {
        &self.models
    }
}

/// Weighting strategy for [`DoSampler`](crate::DoSampler).
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightingSampler;

impl SamplerBackend for WeightingSampler {
    type Fit = WeightingFit;

    fn name(&self) -> &'static str {
        "weighting"
    }

    fn disrupt_causes(
        &self,
        ctx: &StageContext<'_>,
        state: &mut SamplerState<WeightingFit>,
    ) -> Result<(), EngineError> {
        match state.fitted.take() {
            // Stateful reuse: keep the models, rescore the fresh working copy.
            Some(mut fit) => match score_units(ctx, &state.working, &fit.models) {
                Ok((propensity, n_clipped)) => {
                    fit.propensity = propensity;
                    fit.weights = Vec::new();
                    fit.n_clipped = n_clipped;
                    fit.ess = 0.0;
                    log_clipping(n_clipped, ctx);
                    debug!(reused = true, "disrupted causes");
                    state.fitted = Some(fit);
                    Ok(())
                }
                Err(e) => {
                    state.fitted = Some(fit);
                    Err(e)
                }
            },
            None => {
                let models = ctx
                    .estimand
                    .treatments()
                    .iter()
                    .map(|treatment| {
                        PropensityModel::fit(
                            &state.working,
                            treatment,
                            ctx.estimand.adjustment_set(),
                            ctx.schema,
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let (propensity, n_clipped) = score_units(ctx, &state.working, &models)?;
                log_clipping(n_clipped, ctx);
                for (treatment, model) in ctx.estimand.treatments().iter().zip(&models) {
                    debug!(treatment = %treatment, model = model.kind(), "fitted propensity model");
                }
                state.fitted = Some(WeightingFit {
                    models,
                    propensity,
                    weights: Vec::new(),
                    n_clipped,
                    ess: 0.0,
                });
                Ok(())
            }
        }
    }

    fn make_effective(
        &self,
        ctx: &StageContext<'_>,
        state: &mut SamplerState<WeightingFit>,
        assignment: Assignment<'_>,
    ) -> Result<(), EngineError> {
        let treatments = ctx.estimand.treatments();
        let Some(fit) = state.fitted.as_mut() else {
            return Err(no_fit_error(treatments, "make_effective"));
        };
        let n_rows = state.working.n_rows();

        match assignment {
            Assignment::KeepObserved => {
                // All units retained, weighted by observed-treatment inverse
                // propensity.
                let raw: Vec<f64> = fit.propensity.iter().map(|p| 1.0 / p).collect();
                let weights = normalize(raw, treatments, n_rows)?;
                fit.ess = effective_sample_size(&weights);
                fit.weights = weights;
                debug!(retained = n_rows, ess = fit.ess, "kept observed treatment");
                Ok(())
            }
            Assignment::Set(intervention) => {
                let series = intervention.resolve(treatments, n_rows)?;

                // Eligibility mask and closeness factors, per treatment.
                let mut mask = vec![true; n_rows];
                let mut kernel = vec![1.0; n_rows];
                for (k, treatment) in treatments.iter().enumerate() {
                    let observed = state.working.column(treatment)?;
                    if ctx.schema.require(treatment)?.is_discrete() {
                        for (i, keep) in mask.iter_mut().enumerate() {
                            *keep = *keep && observed[i] == series[k].at(i);
                        }
                    } else {
                        let bandwidth = match ctx.config.bandwidth {
                            Some(bw) => bw,
                            None => silverman_bandwidth(observed),
                        };
                        for (i, keep) in mask.iter_mut().enumerate() {
                            let u = (observed[i] - series[k].at(i)) / bandwidth;
                            if u.abs() > KERNEL_CUTOFF {
                                *keep = false;
                            } else {
                                kernel[i] *= (-0.5 * u * u).exp();
                            }
                        }
                    }
                }

                let retained: Vec<usize> =
                    (0..n_rows).filter(|&i| mask[i]).collect();
                if retained.is_empty() {
                    return Err(EngineError::Estimation {
                        variable: treatments.join(", "),
                        stage: "make_effective",
                        reason: "empty eligible subset for the requested intervention"
                            .to_string(),
                    });
                }

                let raw: Vec<f64> = retained
                    .iter()
                    .map(|&i| kernel[i] / fit.propensity[i])
                    .collect();
                let weights = normalize(raw, treatments, retained.len())?;

                // All checks passed; commit the filter and the overwrite.
                state.working = state.working.filter(&mask)?;
                fit.propensity = retained.iter().map(|&i| fit.propensity[i]).collect();
                for (k, treatment) in treatments.iter().enumerate() {
                    let column = state.working.column_mut(treatment)?;
                    for (j, &i) in retained.iter().enumerate() {
                        column[j] = series[k].at(i);
                    }
                }
                fit.ess = effective_sample_size(&weights);
                fit.weights = weights;
                debug!(
                    retained = retained.len(),
                    ess = fit.ess,
                    "made treatment effective"
                );
                Ok(())
            }
        }
    }

    fn propagate(
        &self,
        ctx: &StageContext<'_>,
        state: &mut SamplerState<WeightingFit>,
        rng: &mut StdRng,
    ) -> Result<Table, EngineError> {
        let treatments = ctx.estimand.treatments();
        let Some(fit) = state.fitted.as_ref() else {
            return Err(no_fit_error(treatments, "propagate"));
        };
        if fit.weights.is_empty() {
            return Err(EngineError::Estimation {
                variable: treatments.join(", "),
                stage: "propagate",
                reason: "weights not computed (run make_effective first)".to_string(),
            });
        }

        let n_out = ctx.config.sample_size.unwrap_or(state.working.n_rows());

        // Inverse-CDF draw over the cumulative weights.
        let mut cumulative = Vec::with_capacity(fit.weights.len());
        let mut total = 0.0;
        for &w in &fit.weights {
            total += w;
            cumulative.push(total);
        }
        let last = cumulative.len() - 1;
        let indices: Vec<usize> = (0..n_out)
            .map(|_| {
                let u = rng.gen::<f64>() * total;
                cumulative.partition_point(|&c| c <= u).min(last)
            })
            .collect();

        let output = state.working.take(&indices)?;
        debug!(drawn = n_out, "propagated interventional sample");
        Ok(output)
    }
}

fn no_fit_error(treatments: &[String], stage: &'static str) -> EngineError {
    EngineError::Estimation {
        variable: treatments.join(", "),
        stage,
        reason: "no fitted balancing model (run disrupt_causes first)".to_string(),
    }
}

fn log_clipping(n_clipped: usize, ctx: &StageContext<'_>) {
    if n_clipped > 0 {
        warn!(
            n_clipped,
            clip = ctx.config.propensity_clip,
            "propensity scores clamped into the stable band"
        );
    }
}

/// Score every working row at its observed treatment, clipping per policy.
/// Returns the joint (product over treatments) clipped scores and the number
/// of units touched by clipping.
fn score_units(
    ctx: &StageContext<'_>,
    working: &Table,
    models: &[PropensityModel],
) -> Result<(Vec<f64>, usize), EngineError> {
    let treatments = ctx.estimand.treatments();
    let features = feature_rows(working, ctx.estimand.adjustment_set())?;
    let observed: Vec<&[f64]> = treatments
        .iter()
        .map(|name| working.column(name))
        .collect::<Result<_, _>>()?;

    let clip = ctx.config.propensity_clip;
    let policy = ctx.config.clip_policy;
    let mut propensity = Vec::with_capacity(working.n_rows());
    let mut n_clipped = 0usize;

    for (i, row) in features.iter().enumerate() {
        let mut joint = 1.0;
        let mut touched = false;
        for (k, model) in models.iter().enumerate() {
            let raw = model.score(row, observed[k][i]);
            if !raw.is_finite() {
                return Err(EngineError::Estimation {
                    variable: treatments[k].clone(),
                    stage: "disrupt_causes",
                    reason: format!("non-finite propensity for unit {i}"),
                });
            }
            let clipped = clip_score(raw, clip, policy, model.is_density(), &treatments[k])?;
            if clipped != raw {
                touched = true;
            }
            joint *= clipped;
        }
        if touched {
            n_clipped += 1;
        }
        propensity.push(joint);
    }
    Ok((propensity, n_clipped))
}

/// Clamp a score into the stable band `[clip, 1 − clip]` (probabilities) or
/// `[clip, ∞)` (densities), or fail under the strict policy.
fn clip_score(
    raw: f64,
    clip: f64,
    policy: ClipPolicy,
    is_density: bool,
    variable: &str,
) -> Result<f64, EngineError> {
    let high = if is_density { f64::INFINITY } else { 1.0 - clip };
    if raw >= clip && raw <= high {
        return Ok(raw);
    }
    match policy {
        ClipPolicy::Clip => Ok(raw.clamp(clip, high)),
        ClipPolicy::Fail => Err(EngineError::NumericalInstability {
            variable: variable.to_string(),
            value: raw,
            clip,
        }),
    }
}

/// Normalize raw weights to sum to one.
fn normalize(
    mut raw: Vec<f64>,
    treatments: &[String],
    n_retained: usize,
) -> Result<Vec<f64>, EngineError> {
    let sum: f64 = raw.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        return Err(EngineError::Estimation {
            variable: treatments.join(", "),
            stage: "make_effective",
            reason: format!("weight normalization failed over {n_retained} units (sum = {sum})"),
        });
    }
    for w in &mut raw {
        *w /= sum;
    }
    Ok(raw)
}

/// Silverman's rule-of-thumb bandwidth: 1.06 · σ̂ · n^(−1/5).
fn silverman_bandwidth(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    1.06 * var.sqrt() * n.powf(-0.2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdentifiedEstimand, SamplerConfig};
    use dosample_frame::{Schema, VariableType};
    use rand::SeedableRng;

    #[test]
    fn test_clip_score_band() {
        let inside = clip_score(0.5, 1e-3, ClipPolicy::Clip, false, "d").unwrap();
        assert_eq!(inside, 0.5);

        let low = clip_score(1e-6, 1e-3, ClipPolicy::Clip, false, "d").unwrap();
        assert_eq!(low, 1e-3);

        let high = clip_score(0.9999, 1e-3, ClipPolicy::Clip, false, "d").unwrap();
        assert_eq!(high, 1.0 - 1e-3);
    }

    #[test]
    fn test_clip_score_density_upper_open() {
        // Densities may exceed 1; only the lower bound applies.
        let big = clip_score(7.3, 1e-3, ClipPolicy::Clip, true, "t").unwrap();
        assert_eq!(big, 7.3);
        let tiny = clip_score(1e-9, 1e-3, ClipPolicy::Clip, true, "t").unwrap();
        assert_eq!(tiny, 1e-3);
    }

    #[test]
    fn test_clip_score_strict_policy_fails() {
        let err = clip_score(1e-6, 1e-3, ClipPolicy::Fail, false, "d").unwrap_err();
        assert!(matches!(
            err,
            EngineError::NumericalInstability { value, .. } if value == 1e-6
        ));
    }

    #[test]
    fn test_silverman_bandwidth_positive() {
        let bw = silverman_bandwidth(&[0.0, 0.5, 1.0, 1.5, 2.0]);
        assert!(bw > 0.0 && bw.is_finite());
    }

    // Shared fixture: two covariate levels with treatment rates 0.1 and 0.9.
    fn confounded_table() -> (Table, Schema, IdentifiedEstimand) {
        let mut z = Vec::new();
        let mut d = Vec::new();
        let mut y = Vec::new();
        for i in 0..10 {
            z.push(-1.0);
            d.push(if i == 0 { 1.0 } else { 0.0 });
            y.push(z[i as usize] + d[i as usize]);
        }
        for i in 0..10 {
            z.push(1.0);
            d.push(if i == 0 { 0.0 } else { 1.0 });
            y.push(z[10 + i as usize] + d[10 + i as usize]);
        }
        let table = Table::new()
            .with_column("z", z)
            .unwrap()
            .with_column("d", d)
            .unwrap()
            .with_column("y", y)
            .unwrap();
        let schema = Schema::new()
            .with_variable("z", VariableType::Continuous)
            .with_variable("d", VariableType::Binary)
            .with_variable("y", VariableType::Continuous);
        let estimand = IdentifiedEstimand::backdoor(&["d"], &["y"], &["z"]);
        (table, schema, estimand)
    }

    fn run_stage1(
        config: &SamplerConfig,
    ) -> (Table, SamplerState<WeightingFit>, Result<(), EngineError>) {
        let (table, schema, estimand) = confounded_table();
        let ctx = StageContext {
            original: &table,
            estimand: &estimand,
            schema: &schema,
            config,
        };
        let mut state = SamplerState::new(&table);
        let result = WeightingSampler.disrupt_causes(&ctx, &mut state);
        (table, state, result)
    }

    #[test]
    fn test_disrupt_scores_every_unit() {
        let config = SamplerConfig::default();
        let (_, state, result) = run_stage1(&config);
        result.unwrap();

        let fit = state.fitted.as_ref().unwrap();
        assert_eq!(fit.propensity_scores().len(), 20);
        assert!(fit.weights().is_empty());
        for &p in fit.propensity_scores() {
            assert!(p > 0.0 && p < 1.0);
        }
    }

    #[test]
    fn test_wide_band_clips_all_scores() {
        let config = SamplerConfig::default().with_propensity_clip(0.4);
        let (_, state, result) = run_stage1(&config);
        result.unwrap();

        let fit = state.fitted.as_ref().unwrap();
        // Group rates are 0.1/0.9, so every score lands outside [0.4, 0.6].
        assert_eq!(fit.n_clipped(), 20);
        for &p in fit.propensity_scores() {
            assert!(p >= 0.4 && p <= 0.6, "score {p} escaped the band");
        }
    }

    #[test]
    fn test_wide_band_strict_policy_errors() {
        let config = SamplerConfig::default()
            .with_propensity_clip(0.4)
            .with_clip_policy(ClipPolicy::Fail);
        let (_, state, result) = run_stage1(&config);
        assert!(matches!(
            result.unwrap_err(),
            EngineError::NumericalInstability { .. }
        ));
        // The failed stage left no fit behind.
        assert!(state.fitted.is_none());
    }

    #[test]
    fn test_keep_observed_weights_sum_to_one() {
        let config = SamplerConfig::default();
        let (table, mut state, result) = run_stage1(&config);
        result.unwrap();

        let (_, schema, estimand) = confounded_table();
        let ctx = StageContext {
            original: &table,
            estimand: &estimand,
            schema: &schema,
            config: &config,
        };
        WeightingSampler
            .make_effective(&ctx, &mut state, Assignment::KeepObserved)
            .unwrap();

        let fit = state.fitted.as_ref().unwrap();
        assert_eq!(fit.weights().len(), 20);
        let sum: f64 = fit.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(fit.effective_sample_size() > 0.0);
        // Pass-through keeps every row.
        assert_eq!(state.working.n_rows(), 20);
    }

    #[test]
    fn test_set_filters_and_overwrites() {
        let config = SamplerConfig::default();
        let (table, mut state, result) = run_stage1(&config);
        result.unwrap();

        let (_, schema, estimand) = confounded_table();
        let ctx = StageContext {
            original: &table,
            estimand: &estimand,
            schema: &schema,
            config: &config,
        };
        let intervention = crate::Intervention::Scalar(1.0);
        WeightingSampler
            .make_effective(&ctx, &mut state, Assignment::Set(&intervention))
            .unwrap();

        // Ten treated units: one at z = −1, nine at z = +1.
        assert_eq!(state.working.n_rows(), 10);
        for &v in state.working.column("d").unwrap() {
            assert_eq!(v, 1.0);
        }
        let fit = state.fitted.as_ref().unwrap();
        assert_eq!(fit.weights().len(), 10);
        assert_eq!(fit.propensity_scores().len(), 10);
        let sum: f64 = fit.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_set_with_absent_value_errors() {
        let config = SamplerConfig::default();
        let (table, mut state, result) = run_stage1(&config);
        result.unwrap();

        let (_, schema, estimand) = confounded_table();
        let ctx = StageContext {
            original: &table,
            estimand: &estimand,
            schema: &schema,
            config: &config,
        };
        let rows_before = state.working.n_rows();
        let intervention = crate::Intervention::Scalar(5.0);
        let err = WeightingSampler
            .make_effective(&ctx, &mut state, Assignment::Set(&intervention))
            .unwrap_err();
        assert!(matches!(err, EngineError::Estimation { stage: "make_effective", .. }));
        // Failure left the working copy untouched.
        assert_eq!(state.working.n_rows(), rows_before);
    }

    #[test]
    fn test_propagate_draws_requested_size() {
        let config = SamplerConfig::default().with_sample_size(50);
        let (table, mut state, result) = run_stage1(&config);
        result.unwrap();

        let (_, schema, estimand) = confounded_table();
        let ctx = StageContext {
            original: &table,
            estimand: &estimand,
            schema: &schema,
            config: &config,
        };
        WeightingSampler
            .make_effective(&ctx, &mut state, Assignment::KeepObserved)
            .unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let output = WeightingSampler
            .propagate(&ctx, &mut state, &mut rng)
            .unwrap();
        assert_eq!(output.n_rows(), 50);
        assert_eq!(output.column_names(), table.column_names());
        // Stage 3 leaves the working copy alone.
        assert_eq!(state.working.n_rows(), 20);
    }

    #[test]
    fn test_continuous_target_kernel_closeness() {
        // Treatment t tracks z with spread; intervene at t = 0.
        let n = 40;
        let mut z = Vec::new();
        let mut t = Vec::new();
        let mut y = Vec::new();
        for i in 0..n {
            let zi = (i as f64 / n as f64) * 2.0 - 1.0;
            let ti = zi + if i % 2 == 0 { 0.3 } else { -0.3 };
            z.push(zi);
            t.push(ti);
            y.push(ti + zi);
        }
        let table = Table::new()
            .with_column("z", z)
            .unwrap()
            .with_column("t", t)
            .unwrap()
            .with_column("y", y)
            .unwrap();
        let schema = Schema::new()
            .with_variable("z", VariableType::Continuous)
            .with_variable("t", VariableType::Continuous)
            .with_variable("y", VariableType::Continuous);
        let estimand = IdentifiedEstimand::backdoor(&["t"], &["y"], &["z"]);
        let config = SamplerConfig::default().with_bandwidth(0.25);
        let ctx = StageContext {
            original: &table,
            estimand: &estimand,
            schema: &schema,
            config: &config,
        };

        let mut state = SamplerState::new(&table);
        WeightingSampler.disrupt_causes(&ctx, &mut state).unwrap();
        let intervention = crate::Intervention::Scalar(0.0);
        WeightingSampler
            .make_effective(&ctx, &mut state, Assignment::Set(&intervention))
            .unwrap();

        // Only units within 3 bandwidths of the target survive, and their
        // treatment column now holds the target exactly.
        assert!(state.working.n_rows() > 0);
        assert!(state.working.n_rows() < n);
        for &v in state.working.column("t").unwrap() {
            assert_eq!(v, 0.0);
        }
        let fit = state.fitted.as_ref().unwrap();
        let sum: f64 = fit.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
}
