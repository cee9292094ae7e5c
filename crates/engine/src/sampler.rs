//! The reified intervention pipeline.
//!
//! [`DoSampler`] owns the observational table, an identification contract,
//! and a backend strategy, and walks the three capability stages in order:
//!
//! ```text
//! Uninitialized ──disrupt_causes──▶ Disrupted ──make_effective──▶ Effective
//!       ▲                                                             │
//!       └────────────────── reset ◀──────── Propagated ◀──propagate──┘
//! ```
//!
//! Callers step the stages explicitly or run [`DoSampler::do_sample`], which
//! validates the request, runs the full pipeline, and applies the configured
//! lifecycle: stateless samplers end every call back at `Uninitialized`,
//! stateful samplers keep their fitted models for reuse on the next call.

use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use dosample_frame::{Schema, Table, VariableType};

use crate::backend::{Assignment, SamplerBackend, SamplerState, StageContext};
use crate::{EngineError, IdentifiedEstimand, Intervention, SamplerConfig};

// =============================================================================
// Pipeline position
// =============================================================================

/// Pipeline position, advanced one stage at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// No stage has run since construction or the last reset.
    Uninitialized,
    /// Stage 1 complete: the adjustment set no longer drives treatment.
    Disrupted,
    /// Stage 2 complete: the requested assignment is in force.
    Effective,
    /// Stage 3 complete: an interventional sample has been drawn.
    Propagated,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Uninitialized => "uninitialized",
            Stage::Disrupted => "disrupted",
            Stage::Effective => "effective",
            Stage::Propagated => "propagated",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Caveats
// =============================================================================

/// Advisory recorded at construction when sampling proceeds on weakened
/// assumptions rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Caveat {
    /// The causal effect was not identified; output may be biased.
    UnidentifiedEstimand,
    /// The adjustment set is empty; treatment is assumed unconfounded.
    EmptyAdjustmentSet,
}

impl fmt::Display for Caveat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Caveat::UnidentifiedEstimand => {
                "the causal effect was not identified; output may be biased"
            }
            Caveat::EmptyAdjustmentSet => {
                "the adjustment set is empty; treatment is assumed unconfounded"
            }
        };
        f.write_str(text)
    }
}

// =============================================================================
// The sampler
// =============================================================================

/// A do-sampler: draws from the interventional distribution implied by an
/// identified estimand, using a pluggable backend strategy.
///
/// # Example
///
/// ```
/// use dosample_engine::{
///     DoSampler, IdentifiedEstimand, Intervention, SamplerConfig, WeightingSampler,
/// };
/// use dosample_engine::synthetic;
///
/// let (table, schema) = synthetic::confounded_binary(500, 11);
/// let estimand = IdentifiedEstimand::backdoor(&["d"], &["y"], &["z"]);
/// let config = SamplerConfig::default().with_seed(7);
///
/// let mut sampler = DoSampler::new(WeightingSampler, table, estimand, schema, config)?;
/// let forced = sampler.do_sample(Some(&Intervention::Scalar(1.0)))?;
/// assert_eq!(forced.column_names(), sampler.original().column_names());
/// # Ok::<(), dosample_engine::EngineError>(())
/// ```
pub struct DoSampler<B: SamplerBackend> {
    backend: B,
    original: Table,
    estimand: IdentifiedEstimand,
    schema: Schema,
    config: SamplerConfig,
    state: SamplerState<B::Fit>,
    stage: Stage,
    rng: StdRng,
    caveats: Vec<Caveat>,
}

impl<B: SamplerBackend> DoSampler<B> {
    /// Validate the inputs and build a sampler in the `Uninitialized` stage.
    ///
    /// Fails with [`EngineError::Configuration`] on structural problems
    /// (missing columns, undeclared types, out-of-domain binary data) and
    /// with [`EngineError::UnidentifiableEffect`] when the estimand is not
    /// identified and the configuration does not opt into proceeding.
    pub fn new(
        backend: B,
        table: Table,
        estimand: IdentifiedEstimand,
        schema: Schema,
        config: SamplerConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        if table.n_cols() == 0 || table.n_rows() == 0 {
            return Err(EngineError::Configuration {
                reason: "data table is empty".to_string(),
            });
        }
        if estimand.treatments().is_empty() {
            return Err(EngineError::Configuration {
                reason: "at least one treatment variable is required".to_string(),
            });
        }
        if estimand.outcomes().is_empty() {
            return Err(EngineError::Configuration {
                reason: "at least one outcome variable is required".to_string(),
            });
        }
        for name in estimand.variables() {
            if !table.has_column(name) {
                return Err(EngineError::Configuration {
                    reason: format!("variable `{name}` is not a column of the data table"),
                });
            }
        }

        // Estimator selection keys off declared types; treatments, outcomes,
        // and the adjustment set must all carry one.
        for name in estimand
            .treatments()
            .iter()
            .chain(estimand.outcomes())
            .chain(estimand.adjustment_set())
        {
            if !schema.contains(name) {
                return Err(EngineError::Configuration {
                    reason: format!("variable `{name}` has no declared type"),
                });
            }
        }
        for name in estimand.treatments() {
            if schema.get(name) == Some(VariableType::Binary) {
                let column = table.column(name)?;
                if let Some(&bad) = column.iter().find(|&&v| v != 0.0 && v != 1.0) {
                    return Err(EngineError::Configuration {
                        reason: format!(
                            "binary variable `{name}` contains value {bad} outside {{0, 1}}"
                        ),
                    });
                }
            }
        }

        let mut caveats = Vec::new();
        if !estimand.is_identified() {
            if !config.proceed_when_unidentifiable {
                return Err(EngineError::UnidentifiableEffect {
                    reason: "no adjustment set identifies the effect of the requested treatments"
                        .to_string(),
                });
            }
            warn!("{}", Caveat::UnidentifiedEstimand);
            caveats.push(Caveat::UnidentifiedEstimand);
        } else if estimand.adjustment_set().is_empty() {
            warn!("{}", Caveat::EmptyAdjustmentSet);
            caveats.push(Caveat::EmptyAdjustmentSet);
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = SamplerState::new(&table);
        debug!(
            backend = backend.name(),
            rows = table.n_rows(),
            treatments = estimand.treatments().len(),
            "constructed do-sampler"
        );

        Ok(Self {
            backend,
            original: table,
            estimand,
            schema,
            config,
            state,
            stage: Stage::Uninitialized,
            rng,
            caveats,
        })
    }

    // -------------------------------------------------------------------------
    // Explicit stage stepping
    // -------------------------------------------------------------------------

    /// Stage 1: fit the balancing model and sever the adjustment set's
    /// influence on treatment. Valid from `Uninitialized`, or from
    /// `Disrupted` as a refit; once stage 2 has run, only `reset` reopens
    /// the pipeline.
    pub fn disrupt_causes(&mut self) -> Result<(), EngineError> {
        if !matches!(self.stage, Stage::Uninitialized | Stage::Disrupted) {
            return Err(EngineError::InvalidState {
                operation: "disrupt_causes",
                stage: self.stage,
                expected: "uninitialized or disrupted",
            });
        }
        let ctx = StageContext {
            original: &self.original,
            estimand: &self.estimand,
            schema: &self.schema,
            config: &self.config,
        };
        self.backend.disrupt_causes(&ctx, &mut self.state)?;
        self.stage = Stage::Disrupted;
        Ok(())
    }

    /// Stage 2: put the requested assignment in force on the working copy.
    /// Valid only in the `Disrupted` stage.
    ///
    /// `intervention` is required unless the configuration sets
    /// `keep_original_treatment`, in which case the stage keeps each unit's
    /// observed treatment and a supplied value is ignored.
    pub fn make_effective(
        &mut self,
        intervention: Option<&Intervention>,
    ) -> Result<(), EngineError> {
        self.expect_stage("make_effective", Stage::Disrupted, "disrupted")?;
        let assignment = self.assignment_for(intervention)?;
        let ctx = StageContext {
            original: &self.original,
            estimand: &self.estimand,
            schema: &self.schema,
            config: &self.config,
        };
        self.backend.make_effective(&ctx, &mut self.state, assignment)?;
        self.stage = Stage::Effective;
        Ok(())
    }

    /// Stage 3: draw the interventional sample. Valid only in the
    /// `Effective` stage.
    pub fn propagate(&mut self) -> Result<Table, EngineError> {
        self.expect_stage("propagate", Stage::Effective, "effective")?;
        let ctx = StageContext {
            original: &self.original,
            estimand: &self.estimand,
            schema: &self.schema,
            config: &self.config,
        };
        let output = self.backend.propagate(&ctx, &mut self.state, &mut self.rng)?;
        self.stage = Stage::Propagated;
        Ok(output)
    }

    /// Discard all fitted and working state, return to `Uninitialized`, and
    /// re-seed the random source from the configuration. With a fixed seed
    /// this replays the exact draw sequence.
    pub fn reset(&mut self) {
        self.state.restore(&self.original);
        self.stage = Stage::Uninitialized;
        self.rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        debug!("sampler reset");
    }

    // -------------------------------------------------------------------------
    // One-call pipeline
    // -------------------------------------------------------------------------

    /// Run the full pipeline and return the interventional sample.
    ///
    /// The request is validated before any state changes, so a rejected
    /// intervention leaves the sampler exactly as it was. A stage failure
    /// mid-pipeline rolls the sampler back to `Uninitialized` with a pristine
    /// working copy; models fitted during the failed call are dropped.
    ///
    /// Stateless samplers (the default) end every call reset, so consecutive
    /// calls are independent draws. Stateful samplers remain `Propagated` and
    /// reuse their fitted models on the next call; `reset` discards them.
    pub fn do_sample(&mut self, intervention: Option<&Intervention>) -> Result<Table, EngineError> {
        let assignment = self.assignment_for(intervention)?;
        if let Assignment::Set(requested) = assignment {
            requested.resolve(self.estimand.treatments(), self.original.n_rows())?;
        }

        // A pristine sampler already has a fresh working copy; anything else
        // is a leftover from a previous call or partial stepping.
        if self.stage != Stage::Uninitialized {
            if self.config.stateful {
                self.state.refresh_working(&self.original);
            } else {
                self.state.restore(&self.original);
            }
            self.stage = Stage::Uninitialized;
        }

        let had_fit = self.state.fitted.is_some();
        match self.run_pipeline(assignment) {
            Ok(output) => {
                if !self.config.stateful {
                    self.state.restore(&self.original);
                    self.stage = Stage::Uninitialized;
                }
                Ok(output)
            }
            Err(e) => {
                if had_fit {
                    self.state.refresh_working(&self.original);
                } else {
                    self.state.restore(&self.original);
                }
                self.stage = Stage::Uninitialized;
                Err(e)
            }
        }
    }

    fn run_pipeline(&mut self, assignment: Assignment<'_>) -> Result<Table, EngineError> {
        let ctx = StageContext {
            original: &self.original,
            estimand: &self.estimand,
            schema: &self.schema,
            config: &self.config,
        };
        self.backend.disrupt_causes(&ctx, &mut self.state)?;
        self.stage = Stage::Disrupted;
        self.backend.make_effective(&ctx, &mut self.state, assignment)?;
        self.stage = Stage::Effective;
        let output = self.backend.propagate(&ctx, &mut self.state, &mut self.rng)?;
        self.stage = Stage::Propagated;
        Ok(output)
    }

    fn assignment_for<'a>(
        &self,
        intervention: Option<&'a Intervention>,
    ) -> Result<Assignment<'a>, EngineError> {
        if self.config.keep_original_treatment {
            if intervention.is_some() {
                debug!("keep_original_treatment is set; supplied intervention ignored");
            }
            Ok(Assignment::KeepObserved)
        } else {
            match intervention {
                Some(requested) => Ok(Assignment::Set(requested)),
                None => Err(EngineError::InterventionSpec {
                    reason: "an intervention is required unless keep_original_treatment is set"
                        .to_string(),
                }),
            }
        }
    }

    fn expect_stage(
        &self,
        operation: &'static str,
        want: Stage,
        expected: &'static str,
    ) -> Result<(), EngineError> {
        if self.stage == want {
            Ok(())
        } else {
            Err(EngineError::InvalidState {
                operation,
                stage: self.stage,
                expected,
            })
        }
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Current pipeline position.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The configuration in force.
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// The identification contract in force.
    pub fn estimand(&self) -> &IdentifiedEstimand {
        &self.estimand
    }

    /// The caller-supplied table, never mutated.
    pub fn original(&self) -> &Table {
        &self.original
    }

    /// The working copy in its current stage of transformation.
    pub fn working(&self) -> &Table {
        &self.state.working
    }

    /// The backend's stage-1 fit, if one is currently held.
    pub fn fitted(&self) -> Option<&B::Fit> {
        self.state.fitted.as_ref()
    }

    /// Advisories recorded at construction.
    pub fn caveats(&self) -> &[Caveat] {
        &self.caveats
    }

    /// The backend strategy.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: SamplerBackend> fmt::Debug for DoSampler<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoSampler")
            .field("backend", &self.backend.name())
            .field("stage", &self.stage)
            .field("rows", &self.original.n_rows())
            .field("stateful", &self.config.stateful)
            .field("fitted", &self.state.fitted.is_some())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
