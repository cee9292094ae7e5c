//! Treatment-assignment models (balancing scores).
//!
//! Stage 1 of the weighting pipeline needs `p̂(T = t | Z = z)`: how likely a
//! unit with covariates `z` was to receive treatment `t`. The model family
//! follows the treatment's declared [`VariableType`]:
//!
//! - **Binary** → logistic regression, fitted by gradient descent
//! - **Categorical** → one-vs-rest logistic per class, renormalized
//! - **Continuous** → linear-Gaussian conditional density `N(w·z + b, σ̂²)`
//!
//! All fits standardize covariates internally (the stored model carries the
//! centering so prediction accepts raw rows). Scores for discrete treatments
//! are probabilities in (0, 1); for continuous treatments they are densities
//! and may exceed 1.

use dosample_frame::{Schema, Table, VariableType};

use crate::EngineError;

/// Gradient-descent step size (standardized covariates).
const LEARNING_RATE: f64 = 0.5;

/// Iteration cap for gradient descent.
const MAX_ITERATIONS: usize = 2000;

/// Early-exit threshold on the largest gradient component.
const GRAD_TOLERANCE: f64 = 1e-10;

/// Floor on the fitted noise scale so conditional densities stay finite.
const MIN_NOISE_STD: f64 = 1e-9;

/// Logistic function σ(x) = 1 / (1 + e^(−x)).
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Gaussian density at x for N(mean, std_dev²).
///
/// pdf(x) = (1/√(2πσ²)) exp(−(x−μ)²/(2σ²))
pub fn normal_pdf(x: f64, mean: f64, std_dev: f64) -> f64 {
    let z = (x - mean) / std_dev;
    let normalization = 1.0 / (std_dev * (2.0 * std::f64::consts::PI).sqrt());
    normalization * (-0.5 * z * z).exp()
}

// =============================================================================
// Covariate standardization
// =============================================================================

/// Per-covariate centering and scaling, stored with every fitted model so
/// prediction accepts raw feature rows.
#[derive(Debug, Clone)]
struct Standardizer {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Standardizer {
    fn fit(rows: &[Vec<f64>], n_features: usize) -> Self {
        let n = rows.len().max(1) as f64;
        let mut means = vec![0.0; n_features];
        for row in rows {
            for (m, &v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut scales = vec![0.0; n_features];
        for row in rows {
            for ((s, &v), &m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (v - m) * (v - m);
            }
        }
        for s in &mut scales {
            *s = (*s / n).sqrt();
            // Constant columns contribute zero after centering.
            if *s < 1e-12 {
                *s = 1.0;
            }
        }
        Self { means, scales }
    }

    fn apply(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.means)
            .zip(&self.scales)
            .map(|((&v, &m), &s)| (v - m) / s)
            .collect()
    }
}

/// Gather the covariate columns into raw feature rows (n × k).
pub(crate) fn feature_rows(
    table: &Table,
    covariates: &[String],
) -> Result<Vec<Vec<f64>>, EngineError> {
    let columns: Vec<&[f64]> = covariates
        .iter()
        .map(|name| table.column(name))
        .collect::<Result<_, _>>()?;
    let n = table.n_rows();
    Ok((0..n)
        .map(|i| columns.iter().map(|col| col[i]).collect())
        .collect())
}

fn all_equal(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

fn estimation_error(variable: &str, reason: impl Into<String>) -> EngineError {
    EngineError::Estimation {
        variable: variable.to_string(),
        stage: "disrupt_causes",
        reason: reason.into(),
    }
}

// =============================================================================
// Logistic regression (binary treatment)
// =============================================================================

/// Logistic regression P(T=1 | Z) fitted by gradient descent on the
/// cross-entropy loss.
#[derive(Debug, Clone)]
pub struct LogisticModel {
    weights: Vec<f64>,
    bias: f64,
    standardizer: Standardizer,
}

impl LogisticModel {
    /// Fit on raw feature rows and 0/1 labels.
    ///
    /// # Errors
    /// [`EngineError::Estimation`] when the labels are constant (nothing to
    /// separate) or the fit produces non-finite parameters.
    pub fn fit(rows: &[Vec<f64>], labels: &[f64], label_name: &str) -> Result<Self, EngineError> {
        if labels.is_empty() || all_equal(labels) {
            return Err(estimation_error(
                label_name,
                "treatment is constant, a propensity model cannot be fitted",
            ));
        }
        let n_features = rows.first().map_or(0, Vec::len);
        let standardizer = Standardizer::fit(rows, n_features);
        let x: Vec<Vec<f64>> = rows.iter().map(|r| standardizer.apply(r)).collect();

        let n = labels.len() as f64;
        let mut weights = vec![0.0; n_features];
        let mut bias = 0.0;

        for _ in 0..MAX_ITERATIONS {
            let mut grad_w = vec![0.0; n_features];
            let mut grad_b = 0.0;
            for (xi, &yi) in x.iter().zip(labels) {
                let logit = bias + dot(&weights, xi);
                let residual = sigmoid(logit) - yi;
                grad_b += residual;
                for (g, &xij) in grad_w.iter_mut().zip(xi) {
                    *g += residual * xij;
                }
            }
            grad_b /= n;
            for g in &mut grad_w {
                *g /= n;
            }

            bias -= LEARNING_RATE * grad_b;
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= LEARNING_RATE * g;
            }

            let max_grad = grad_w
                .iter()
                .chain(std::iter::once(&grad_b))
                .fold(0.0f64, |acc, g| acc.max(g.abs()));
            if max_grad < GRAD_TOLERANCE {
                break;
            }
        }

        if !bias.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(estimation_error(
                label_name,
                "logistic fit produced non-finite parameters",
            ));
        }
        Ok(Self {
            weights,
            bias,
            standardizer,
        })
    }

    /// P(T=1 | Z = row) for a raw feature row.
    pub fn predict(&self, row: &[f64]) -> f64 {
        let x = self.standardizer.apply(row);
        sigmoid(self.bias + dot(&self.weights, &x))
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// =============================================================================
// One-vs-rest logistic (categorical treatment)
// =============================================================================

/// Per-class one-vs-rest logistic models with renormalized probabilities.
#[derive(Debug, Clone)]
pub struct MultinomialModel {
    classes: Vec<f64>,
    models: Vec<LogisticModel>,
}

impl MultinomialModel {
    /// Fit one logistic model per observed class.
    ///
    /// # Errors
    /// [`EngineError::Estimation`] when fewer than two classes are observed.
    pub fn fit(rows: &[Vec<f64>], labels: &[f64], label_name: &str) -> Result<Self, EngineError> {
        let mut classes: Vec<f64> = Vec::new();
        for &v in labels {
            if !classes.contains(&v) {
                classes.push(v);
            }
        }
        classes.sort_by(|a, b| a.total_cmp(b));
        if classes.len() < 2 {
            return Err(estimation_error(
                label_name,
                "treatment is constant, a propensity model cannot be fitted",
            ));
        }

        let models = classes
            .iter()
            .map(|&class| {
                let indicator: Vec<f64> = labels
                    .iter()
                    .map(|&v| if v == class { 1.0 } else { 0.0 })
                    .collect();
                LogisticModel::fit(rows, &indicator, label_name)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { classes, models })
    }

    /// Observed class codes, ascending.
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Class probabilities for a raw feature row, summing to 1.
    pub fn predict(&self, row: &[f64]) -> Vec<f64> {
        let mut probs: Vec<f64> = self.models.iter().map(|m| m.predict(row)).collect();
        let total: f64 = probs.iter().sum();
        if total > 0.0 {
            for p in &mut probs {
                *p /= total;
            }
        }
        probs
    }

    /// P(T = value | Z = row); 0.0 for a value never observed in training.
    pub fn prob_of(&self, row: &[f64], value: f64) -> f64 {
        match self.classes.iter().position(|&c| c == value) {
            Some(idx) => self.predict(row)[idx],
            None => 0.0,
        }
    }
}

// =============================================================================
// Linear-Gaussian conditional density (continuous treatment)
// =============================================================================

/// Conditional density model T | Z ~ N(w·z + b, σ̂²), fitted by gradient
/// descent on the squared loss with σ̂ from the residuals.
#[derive(Debug, Clone)]
pub struct LinearGaussianModel {
    weights: Vec<f64>,
    bias: f64,
    noise_std: f64,
    standardizer: Standardizer,
}

impl LinearGaussianModel {
    /// Fit on raw feature rows and continuous targets.
    ///
    /// # Errors
    /// [`EngineError::Estimation`] when the targets are constant or the fit
    /// produces non-finite parameters.
    pub fn fit(rows: &[Vec<f64>], targets: &[f64], target_name: &str) -> Result<Self, EngineError> {
        if targets.is_empty() || all_equal(targets) {
            return Err(estimation_error(
                target_name,
                "treatment has zero variance, a conditional density cannot be fitted",
            ));
        }
        let n_features = rows.first().map_or(0, Vec::len);
        let standardizer = Standardizer::fit(rows, n_features);
        let x: Vec<Vec<f64>> = rows.iter().map(|r| standardizer.apply(r)).collect();

        let n = targets.len() as f64;
        let mut weights = vec![0.0; n_features];
        let mut bias = targets.iter().sum::<f64>() / n;

        for _ in 0..MAX_ITERATIONS {
            let mut grad_w = vec![0.0; n_features];
            let mut grad_b = 0.0;
            for (xi, &ti) in x.iter().zip(targets) {
                let residual = bias + dot(&weights, xi) - ti;
                grad_b += residual;
                for (g, &xij) in grad_w.iter_mut().zip(xi) {
                    *g += residual * xij;
                }
            }
            grad_b /= n;
            for g in &mut grad_w {
                *g /= n;
            }

            bias -= LEARNING_RATE * grad_b;
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= LEARNING_RATE * g;
            }

            let max_grad = grad_w
                .iter()
                .chain(std::iter::once(&grad_b))
                .fold(0.0f64, |acc, g| acc.max(g.abs()));
            if max_grad < GRAD_TOLERANCE {
                break;
            }
        }

        if !bias.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(estimation_error(
                target_name,
                "linear fit produced non-finite parameters",
            ));
        }

        // Residual spread, with k + 1 fitted parameters removed from the
        // degrees of freedom.
        let ss: f64 = x
            .iter()
            .zip(targets)
            .map(|(xi, &ti)| {
                let r = bias + dot(&weights, xi) - ti;
                r * r
            })
            .sum();
        let dof = targets.len().saturating_sub(n_features + 1).max(1) as f64;
        let noise_std = (ss / dof).sqrt().max(MIN_NOISE_STD);

        Ok(Self {
            weights,
            bias,
            noise_std,
            standardizer,
        })
    }

    /// Fitted conditional mean E[T | Z = row].
    pub fn predict_mean(&self, row: &[f64]) -> f64 {
        let x = self.standardizer.apply(row);
        self.bias + dot(&self.weights, &x)
    }

    /// Fitted residual scale σ̂.
    pub fn noise_std(&self) -> f64 {
        self.noise_std
    }

    /// Conditional density p̂(T = t | Z = row).
    pub fn density(&self, row: &[f64], t: f64) -> f64 {
        normal_pdf(t, self.predict_mean(row), self.noise_std)
    }
}

// =============================================================================
// Type-driven dispatch
// =============================================================================

/// A fitted treatment-assignment model for one treatment variable.
#[derive(Debug, Clone)]
pub enum PropensityModel {
    /// Binary treatment.
    Logistic(LogisticModel),
    /// Categorical treatment.
    Multinomial(MultinomialModel),
    /// Continuous treatment (density scores).
    LinearGaussian(LinearGaussianModel),
}

impl PropensityModel {
    /// Fit the model family matching the treatment's declared type, using the
    /// adjustment set as covariates. An empty adjustment set fits an
    /// intercept-only model (the marginal treatment distribution).
    pub fn fit(
        table: &Table,
        treatment: &str,
        adjustment: &[String],
        schema: &Schema,
    ) -> Result<Self, EngineError> {
        let ty = schema.require(treatment)?;
        let labels = table.column(treatment)?;
        let rows = feature_rows(table, adjustment)?;
        match ty {
            VariableType::Binary => Ok(PropensityModel::Logistic(LogisticModel::fit(
                &rows, labels, treatment,
            )?)),
            VariableType::Categorical => Ok(PropensityModel::Multinomial(MultinomialModel::fit(
                &rows, labels, treatment,
            )?)),
            VariableType::Continuous => Ok(PropensityModel::LinearGaussian(
                LinearGaussianModel::fit(&rows, labels, treatment)?,
            )),
        }
    }

    /// Score `p̂(T = value | Z = row)`: a probability for discrete
    /// treatments, a density for continuous ones.
    pub fn score(&self, row: &[f64], value: f64) -> f64 {
        match self {
            PropensityModel::Logistic(m) => {
                let p1 = m.predict(row);
                if value == 1.0 {
                    p1
                } else {
                    1.0 - p1
                }
            }
            PropensityModel::Multinomial(m) => m.prob_of(row, value),
            PropensityModel::LinearGaussian(m) => m.density(row, value),
        }
    }

    /// Whether scores are densities (continuous treatment) rather than
    /// probabilities.
    pub fn is_density(&self) -> bool {
        matches!(self, PropensityModel::LinearGaussian(_))
    }

    /// Short name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            PropensityModel::Logistic(_) => "logistic",
            PropensityModel::Multinomial(_) => "one-vs-rest",
            PropensityModel::LinearGaussian(_) => "linear-gaussian",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_shape() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(10.0) > 0.9999);
        assert!(sigmoid(-10.0) < 0.0001);
    }

    #[test]
    fn test_normal_pdf_peak_at_mean() {
        let at_mean = normal_pdf(2.0, 2.0, 1.0);
        assert!((at_mean - 0.398_942_280_401).abs() < 1e-9);
        assert!(normal_pdf(3.0, 2.0, 1.0) < at_mean);
    }

    fn signed_rows() -> (Vec<Vec<f64>>, Vec<f64>) {
        // x = −1 (ten units, one treated) and x = +1 (ten units, nine
        // treated): group rates 0.1 and 0.9.
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..10 {
            rows.push(vec![-1.0]);
            labels.push(if i == 0 { 1.0 } else { 0.0 });
        }
        for i in 0..10 {
            rows.push(vec![1.0]);
            labels.push(if i == 0 { 0.0 } else { 1.0 });
        }
        (rows, labels)
    }

    #[test]
    fn test_logistic_recovers_group_rates() {
        let (rows, labels) = signed_rows();
        let model = LogisticModel::fit(&rows, &labels, "d").unwrap();

        let p_hi = model.predict(&[1.0]);
        let p_lo = model.predict(&[-1.0]);
        assert!((p_hi - 0.9).abs() < 0.05, "p(+1) = {p_hi}");
        assert!((p_lo - 0.1).abs() < 0.05, "p(-1) = {p_lo}");
    }

    #[test]
    fn test_logistic_rejects_constant_labels() {
        let rows = vec![vec![0.0], vec![1.0], vec![2.0]];
        let err = LogisticModel::fit(&rows, &[1.0, 1.0, 1.0], "d").unwrap_err();
        assert!(matches!(err, EngineError::Estimation { .. }));
    }

    #[test]
    fn test_logistic_handles_constant_covariate() {
        let rows = vec![vec![3.0]; 8];
        let labels = vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let model = LogisticModel::fit(&rows, &labels, "d").unwrap();
        let p = model.predict(&[3.0]);
        assert!(p.is_finite());
        assert!((p - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_intercept_only_model_fits_marginal_rate() {
        // No covariates at all: the model reduces to the marginal rate.
        let rows: Vec<Vec<f64>> = vec![vec![]; 10];
        let labels = vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let model = LogisticModel::fit(&rows, &labels, "d").unwrap();
        assert!((model.predict(&[]) - 0.3).abs() < 0.02);
    }

    #[test]
    fn test_multinomial_separated_classes() {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for _ in 0..10 {
            rows.push(vec![-2.0]);
            labels.push(0.0);
        }
        for _ in 0..10 {
            rows.push(vec![0.0]);
            labels.push(1.0);
        }
        for _ in 0..10 {
            rows.push(vec![2.0]);
            labels.push(2.0);
        }
        let model = MultinomialModel::fit(&rows, &labels, "group").unwrap();
        assert_eq!(model.classes(), &[0.0, 1.0, 2.0]);

        for (x, expected) in [(-2.0, 0.0), (0.0, 1.0), (2.0, 2.0)] {
            let probs = model.predict(&[x]);
            let total: f64 = probs.iter().sum();
            assert!((total - 1.0).abs() < 1e-9);
            let best = probs
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap();
            assert_eq!(model.classes()[best], expected, "at x = {x}");
        }
    }

    #[test]
    fn test_multinomial_unseen_class_scores_zero() {
        let rows = vec![vec![0.0], vec![1.0], vec![0.0], vec![1.0]];
        let labels = vec![0.0, 1.0, 0.0, 1.0];
        let model = MultinomialModel::fit(&rows, &labels, "group").unwrap();
        assert_eq!(model.prob_of(&[0.5], 7.0), 0.0);
    }

    #[test]
    fn test_linear_gaussian_peaks_at_fitted_mean() {
        // t = 2x + 1 with alternating ±0.1 noise.
        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for i in 0..20 {
            let x = i as f64 * 0.5;
            let noise = if i % 2 == 0 { 0.1 } else { -0.1 };
            rows.push(vec![x]);
            targets.push(2.0 * x + 1.0 + noise);
        }
        let model = LinearGaussianModel::fit(&rows, &targets, "t").unwrap();

        let mean = model.predict_mean(&[5.0]);
        assert!((mean - 11.0).abs() < 0.1, "mean at x=5 is {mean}");

        let at_peak = model.density(&[5.0], 11.0);
        assert!(at_peak > model.density(&[5.0], 10.0));
        assert!(at_peak > model.density(&[5.0], 12.0));
        assert!(model.noise_std() > 0.05 && model.noise_std() < 0.2);
    }

    #[test]
    fn test_linear_gaussian_rejects_constant_targets() {
        let rows = vec![vec![0.0], vec![1.0]];
        let err = LinearGaussianModel::fit(&rows, &[4.0, 4.0], "t").unwrap_err();
        assert!(matches!(err, EngineError::Estimation { .. }));
    }

    #[test]
    fn test_dispatch_follows_declared_type() {
        use dosample_frame::{Schema, Table, VariableType};

        let table = Table::new()
            .with_column("z", vec![0.0, 1.0, 2.0, 3.0])
            .unwrap()
            .with_column("d", vec![0.0, 0.0, 1.0, 1.0])
            .unwrap();
        let schema = Schema::new()
            .with_variable("z", VariableType::Continuous)
            .with_variable("d", VariableType::Binary);

        let adjustment = vec!["z".to_string()];
        let model = PropensityModel::fit(&table, "d", &adjustment, &schema).unwrap();
        assert_eq!(model.kind(), "logistic");
        assert!(!model.is_density());

        // Binary score at value 0 is the complement of the score at 1.
        let p1 = model.score(&[1.5], 1.0);
        let p0 = model.score(&[1.5], 0.0);
        assert!((p1 + p0 - 1.0).abs() < 1e-12);
    }
}
