//! The backend seam: pluggable implementations of the three stages.
//!
//! The engine fixes the protocol (order, lifecycle, reset); a backend fixes
//! the statistics. The weighting backend in this crate reweights observed
//! units by inverse propensity. A model-based backend would fit structural
//! parameters in stage 1, clamp the treatment node with incoming edges
//! removed in stage 2, and forward-sample in stage 3; a density-based backend
//! would estimate conditional outcome densities, condition on the
//! intervention, and sample from the conditioned density. All of them share
//! the same three capability methods and the same [`SamplerState`] contract.

use rand::rngs::StdRng;

use dosample_frame::{Schema, Table};

use crate::{EngineError, IdentifiedEstimand, Intervention, SamplerConfig};

/// Mutable working state owned by one sampler instance.
///
/// `working` starts as a true copy of the original table, never an alias, so
/// stage mutation cannot corrupt the caller's data. `fitted` is the stage-1
/// auxiliary model; it is the only thing that survives across stateful calls.
#[derive(Debug, Clone)]
pub struct SamplerState<F> {
    /// Working copy of the original table, mutated by stages 2 and 3.
    pub working: Table,
    /// Auxiliary model fitted in stage 1, if any.
    pub fitted: Option<F>,
}

impl<F> SamplerState<F> {
    pub(crate) fn new(original: &Table) -> Self {
        Self {
            working: original.clone(),
            fitted: None,
        }
    }

    /// Restore the working copy and drop the fitted model.
    pub(crate) fn restore(&mut self, original: &Table) {
        self.working.clone_from(original);
        self.fitted = None;
    }

    /// Restore the working copy only, keeping the fitted model for reuse.
    pub(crate) fn refresh_working(&mut self, original: &Table) {
        self.working.clone_from(original);
    }
}

/// Read-only inputs shared by every stage invocation.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    /// The caller-supplied table, never mutated.
    pub original: &'a Table,
    /// The identification contract in force.
    pub estimand: &'a IdentifiedEstimand,
    /// Variable types for every referenced column.
    pub schema: &'a Schema,
    /// Validated sampler options.
    pub config: &'a SamplerConfig,
}

/// Treatment assignment for stage 2, resolved by the engine from the
/// configuration and the caller's request.
#[derive(Debug, Clone, Copy)]
pub enum Assignment<'a> {
    /// Units keep their observed treatment values (pass-through mode).
    KeepObserved,
    /// Treatment is forced to the requested target(s).
    Set(&'a Intervention),
}

/// A do-sampling strategy: the three capability stages dispatched by
/// [`DoSampler`](crate::DoSampler).
///
/// Implementations must uphold two contracts beyond their own statistics:
///
/// - A failed stage leaves `state` as it found it, so the engine can report
///   the error without the machine having advanced.
/// - `disrupt_causes` reuses an existing `state.fitted` instead of refitting
///   when one is present; the engine clears it whenever a refit is required.
pub trait SamplerBackend {
    /// Auxiliary model produced by stage 1 and consumed by stages 2 and 3.
    type Fit;

    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// Stage 1: sever the causal influence of the adjustment set on the
    /// treatment, typically by fitting a balancing model on the working copy.
    fn disrupt_causes(
        &self,
        ctx: &StageContext<'_>,
        state: &mut SamplerState<Self::Fit>,
    ) -> Result<(), EngineError>;

    /// Stage 2: enforce the assignment on the working copy (filter and/or
    /// overwrite treatment columns, compute per-unit weights).
    fn make_effective(
        &self,
        ctx: &StageContext<'_>,
        state: &mut SamplerState<Self::Fit>,
        assignment: Assignment<'_>,
    ) -> Result<(), EngineError>;

    /// Stage 3: produce the output table from the working copy and the
    /// fitted model. Must not mutate `state` observably.
    fn propagate(
        &self,
        ctx: &StageContext<'_>,
        state: &mut SamplerState<Self::Fit>,
        rng: &mut StdRng,
    ) -> Result<Table, EngineError>;
}
