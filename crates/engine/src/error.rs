//! Error types for the sampling engine.

use thiserror::Error;

use dosample_frame::FrameError;

use crate::sampler::Stage;

/// Errors raised by sampler construction, the stage protocol, and estimation.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Missing variable declarations or invalid option combinations.
    /// Fatal at construction.
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// Identification is imperfect and the caller has not opted to proceed.
    #[error("Effect is not identified: {reason} (set proceed_when_unidentifiable to continue)")]
    UnidentifiableEffect { reason: String },

    /// A stage was invoked out of the required order.
    #[error("`{operation}` called in the {stage} state (expected {expected})")]
    InvalidState {
        operation: &'static str,
        stage: Stage,
        expected: &'static str,
    },

    /// A model fit degenerated or failed.
    #[error("Estimation failed for `{variable}` during {stage}: {reason}")]
    Estimation {
        variable: String,
        stage: &'static str,
        reason: String,
    },

    /// A propensity fell inside the instability band under the strict policy.
    #[error("Propensity for `{variable}` is {value} (outside the stable band for clip tolerance {clip})")]
    NumericalInstability {
        variable: String,
        value: f64,
        clip: f64,
    },

    /// The intervention is missing when required, or its shape does not fit
    /// the treatment cardinality.
    #[error("Intervention error: {reason}")]
    InterventionSpec { reason: String },

    /// A table operation failed.
    #[error(transparent)]
    Frame(#[from] FrameError),
}
