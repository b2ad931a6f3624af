//! # Control sequence optimizers
//!
//! An optimizer searches the control space for a low-cost sequence, warm
//! started from the previous cycle's result shifted into the current frame.
//! Two implementations are provided, selected at startup by
//! [`OptimizerKind`]:
//!
//! - [`AnnealingOptimizer`] - stochastic simulated annealing,
//! - [`HillClimbOptimizer`] - deterministic coordinate descent.
//!
//! Both only ever evaluate candidates inside the control limits, and both
//! return a result no worse than the (clamped) warm start.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod annealing;
mod hill_climb;

pub use annealing::{AnnealingOptimizer, AnnealingParams};
pub use hill_climb::{HillClimbOptimizer, HillClimbParams};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use super::types::{Controls, CtrlLimits};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters selecting and configuring the optimizer.
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerParams {
    /// Which implementation to construct.
    pub kind: OptimizerKind,

    pub annealing: AnnealingParams,
    pub hill_climbing: HillClimbParams,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The closed set of optimizer implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Annealing,
    HillClimbing,
}

/// The constructed optimizer, tagged by implementation.
///
/// The cost function is borrowed per cycle as a generic closure, so dispatch
/// is over this closed enum rather than a trait object.
pub enum PlanOptimizer {
    Annealing(AnnealingOptimizer),
    HillClimbing(HillClimbOptimizer),
}

/// Errors raised while constructing an optimizer.
#[derive(Debug, thiserror::Error)]
pub enum OptimizerError {
    #[error("num_iterations must be greater than 0")]
    NoIterations,

    #[error(
        "temperature schedule must satisfy start ({0}) >= end ({1}) > 0"
    )]
    InvalidTemperatureSchedule(f64, f64),

    #[error("perturbation_scale must be positive, got {0}")]
    InvalidPerturbationScale(f64),

    #[error("step sizes must satisfy initial ({0}) >= min ({1}) > 0")]
    InvalidStepSizes(f64, f64),

    #[error("step_decay must lie in (0, 1), got {0}")]
    InvalidStepDecay(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PlanOptimizer {
    /// Construct the configured optimizer implementation.
    pub fn from_params(params: &OptimizerParams) -> Result<Self, OptimizerError> {
        match params.kind {
            OptimizerKind::Annealing => Ok(PlanOptimizer::Annealing(AnnealingOptimizer::new(
                params.annealing.clone(),
            )?)),
            OptimizerKind::HillClimbing => Ok(PlanOptimizer::HillClimbing(
                HillClimbOptimizer::new(params.hill_climbing.clone())?,
            )),
        }
    }

    /// Search for a low-cost control sequence.
    ///
    /// Returns the best sequence found and its cost. The warm start is
    /// clamped into `limits` before use, and the result is never worse than
    /// that clamped warm start.
    pub fn optimize<F>(
        &mut self,
        warm_start: &Controls,
        limits: &CtrlLimits,
        cost_fn: F,
    ) -> (Controls, f64)
    where
        F: Fn(&Controls) -> f64,
    {
        match self {
            PlanOptimizer::Annealing(opt) => opt.optimize(warm_start, limits, cost_fn),
            PlanOptimizer::HillClimbing(opt) => opt.optimize(warm_start, limits, cost_fn),
        }
    }
}
