//! Sampler configuration.
//!
//! Every knob is an explicit field on one structure, validated up front so a
//! bad combination fails before any fitting starts.

use serde::{Deserialize, Serialize};

use crate::{EngineError, DEFAULT_PROPENSITY_CLIP};

/// What to do when an estimated propensity falls inside the instability band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipPolicy {
    /// Clamp the score into `[clip, 1 - clip]`, preserving the unit.
    #[default]
    Clip,
    /// Raise [`EngineError::NumericalInstability`] instead of clamping.
    Fail,
}

/// Options recognized by [`DoSampler`](crate::DoSampler).
///
/// # Example
///
/// ```rust
/// use dosample_engine::SamplerConfig;
///
/// let config = SamplerConfig::default()
///     .with_keep_original_treatment(true)
///     .with_seed(7);
///
/// assert!(config.keep_original_treatment);
/// assert_eq!(config.seed, Some(7));
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Stage 2 is a pass-through; any intervention argument is ignored.
    pub keep_original_treatment: bool,
    /// Working state persists across `do_sample` calls; otherwise each call
    /// ends with an implicit reset.
    pub stateful: bool,
    /// Proceed past an unidentified estimand, recording a caveat.
    pub proceed_when_unidentifiable: bool,
    /// Output row count. `None` draws as many rows as the eligible subset.
    pub sample_size: Option<usize>,
    /// Half-width of the propensity instability band around 0 and 1.
    pub propensity_clip: f64,
    /// Clip or fail on scores inside the band.
    pub clip_policy: ClipPolicy,
    /// Closeness kernel bandwidth for continuous treatments. `None` uses
    /// Silverman's rule of thumb on the observed treatment column.
    pub bandwidth: Option<f64>,
    /// Seed for the resampling source. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            keep_original_treatment: false,
            stateful: false,
            proceed_when_unidentifiable: false,
            sample_size: None,
            propensity_clip: DEFAULT_PROPENSITY_CLIP,
            clip_policy: ClipPolicy::Clip,
            bandwidth: None,
            seed: None,
        }
    }
}

impl SamplerConfig {
    /// Set `keep_original_treatment`, builder-style.
    pub fn with_keep_original_treatment(mut self, keep: bool) -> Self {
        self.keep_original_treatment = keep;
        self
    }

    /// Set `stateful`, builder-style.
    pub fn with_stateful(mut self, stateful: bool) -> Self {
        self.stateful = stateful;
        self
    }

    /// Set `proceed_when_unidentifiable`, builder-style.
    pub fn with_proceed_when_unidentifiable(mut self, proceed: bool) -> Self {
        self.proceed_when_unidentifiable = proceed;
        self
    }

    /// Set the output row count, builder-style.
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = Some(size);
        self
    }

    /// Set the propensity clip tolerance, builder-style.
    pub fn with_propensity_clip(mut self, clip: f64) -> Self {
        self.propensity_clip = clip;
        self
    }

    /// Set the clip policy, builder-style.
    pub fn with_clip_policy(mut self, policy: ClipPolicy) -> Self {
        self.clip_policy = policy;
        self
    }

    /// Set the continuous-treatment kernel bandwidth, builder-style.
    pub fn with_bandwidth(mut self, bandwidth: f64) -> Self {
        self.bandwidth = Some(bandwidth);
        self
    }

    /// Set the resampling seed, builder-style.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check option values and combinations.
    ///
    /// # Errors
    /// Returns [`EngineError::Configuration`] when a value is out of range:
    /// the clip tolerance must lie in (0, 0.5), a requested sample size must
    /// be positive, and a bandwidth must be positive and finite.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.propensity_clip.is_finite()
            || self.propensity_clip <= 0.0
            || self.propensity_clip >= 0.5
        {
            return Err(EngineError::Configuration {
                reason: format!(
                    "propensity_clip must lie in (0, 0.5), got {}",
                    self.propensity_clip
                ),
            });
        }
        if self.sample_size == Some(0) {
            return Err(EngineError::Configuration {
                reason: "sample_size must be positive".to_string(),
            });
        }
        if let Some(bw) = self.bandwidth {
            if !bw.is_finite() || bw <= 0.0 {
                return Err(EngineError::Configuration {
                    reason: format!("bandwidth must be positive and finite, got {bw}"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SamplerConfig::default();
        assert!(!config.keep_original_treatment);
        assert!(!config.stateful);
        assert!(!config.proceed_when_unidentifiable);
        assert_eq!(config.sample_size, None);
        assert_eq!(config.propensity_clip, DEFAULT_PROPENSITY_CLIP);
        assert_eq!(config.clip_policy, ClipPolicy::Clip);
        assert_eq!(config.bandwidth, None);
        assert_eq!(config.seed, None);
        config.validate().unwrap();
    }

    #[test]
    fn test_builders_chain() {
        let config = SamplerConfig::default()
            .with_stateful(true)
            .with_sample_size(100)
            .with_propensity_clip(0.01)
            .with_clip_policy(ClipPolicy::Fail)
            .with_bandwidth(0.25)
            .with_seed(42);
        assert!(config.stateful);
        assert_eq!(config.sample_size, Some(100));
        assert_eq!(config.propensity_clip, 0.01);
        assert_eq!(config.clip_policy, ClipPolicy::Fail);
        assert_eq!(config.bandwidth, Some(0.25));
        assert_eq!(config.seed, Some(42));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_clip() {
        for clip in [0.0, -0.1, 0.5, 0.9, f64::NAN] {
            let config = SamplerConfig::default().with_propensity_clip(clip);
            assert!(matches!(
                config.validate().unwrap_err(),
                EngineError::Configuration { .. }
            ));
        }
    }

    #[test]
    fn test_validate_rejects_zero_sample_size() {
        let config = SamplerConfig::default().with_sample_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_bandwidth() {
        for bw in [0.0, -1.0, f64::INFINITY] {
            let config = SamplerConfig::default().with_bandwidth(bw);
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_serde_round_trip() {
        let config = SamplerConfig::default()
            .with_keep_original_treatment(true)
            .with_seed(7);
        let json = serde_json::to_string(&config).unwrap();
        let back: SamplerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
