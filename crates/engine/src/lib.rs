//! # Do-Sampling Engine
//!
//! Draws samples from interventional distributions (Pearl's do-operator)
//! using observational data and an identified causal estimand. Where a
//! conditional sample answers "what do outcomes look like among units
//! observed at treatment t", a do-sample answers "what would outcomes look
//! like if every unit were assigned treatment t".
//!
//! The engine runs three capability stages over a working copy of the data,
//! tracked by an explicit state machine:
//!
//! ```text
//! Uninitialized ──disrupt_causes──▶ Disrupted ──make_effective──▶ Effective
//!       ▲                                                             │
//!       └────────────────── reset ◀──────── Propagated ◀──propagate──┘
//! ```
//!
//! ## Core Concepts
//!
//! - **Identified estimand**: the contract handed to the sampler by
//!   identification, naming treatments, outcomes, and a back-door
//!   adjustment set ([`IdentifiedEstimand`]).
//! - **Capability stages**: `disrupt_causes` severs the adjustment set's
//!   influence on treatment, `make_effective` puts the requested assignment
//!   in force, and `propagate` draws the output sample ([`DoSampler`]).
//! - **Backends**: [`SamplerBackend`] implementations realize the stages.
//!   [`WeightingSampler`] fits propensity models and resamples by inverse
//!   probability of treatment.
//! - **Lifecycle**: stateless samplers end every draw reset; stateful
//!   samplers keep their fitted models across draws until [`DoSampler::reset`].
//!
//! ## Example
//!
//! ```
//! use dosample_engine::{
//!     DoSampler, IdentifiedEstimand, Intervention, SamplerConfig, WeightingSampler,
//! };
//! use dosample_engine::synthetic;
//!
//! // Observational data in which `z` confounds the effect of `d` on `y`;
//! // the true effect of treatment is 1.0.
//! let (table, schema) = synthetic::confounded_binary(2_000, 17);
//! let estimand = IdentifiedEstimand::backdoor(&["d"], &["y"], &["z"]);
//!
//! let mut sampler = DoSampler::new(
//!     WeightingSampler,
//!     table,
//!     estimand,
//!     schema,
//!     SamplerConfig::default().with_seed(7),
//! )?;
//!
//! // Everyone treated versus everyone untreated.
//! let treated = sampler.do_sample(Some(&Intervention::Scalar(1.0)))?;
//! let control = sampler.do_sample(Some(&Intervention::Scalar(0.0)))?;
//!
//! let effect = treated.mean("y")? - control.mean("y")?;
//! assert!((effect - 1.0).abs() < 0.3);
//! # Ok::<(), dosample_engine::EngineError>(())
//! ```

pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod estimand;
pub mod intervention;
pub mod propensity;
pub mod sampler;
pub mod synthetic;
pub mod weighting;

pub use backend::{Assignment, SamplerBackend, SamplerState, StageContext};
pub use config::{ClipPolicy, SamplerConfig};
pub use error::EngineError;
pub use estimand::IdentifiedEstimand;
pub use intervention::Intervention;
pub use sampler::{Caveat, DoSampler, Stage};
pub use weighting::{WeightingFit, WeightingSampler};

/// Default half-width of the propensity instability band around 0 and 1.
pub const DEFAULT_PROPENSITY_CLIP: f64 = 1e-3;
