//! Deterministic coordinate-descent optimizer.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use ordered_float::OrderedFloat;
use serde::Deserialize;

// Internal
use super::OptimizerError;
use crate::plan::types::{Controls, CtrlLimits};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for [`HillClimbOptimizer`].
#[derive(Debug, Clone, Deserialize)]
pub struct HillClimbParams {
    /// Hard cap on descent iterations per cycle.
    pub max_iterations: usize,

    /// Initial per-entry step size, in the entry's own units.
    pub step_initial: f64,

    /// Multiplier applied to the step size when no neighbour improves.
    /// Must lie in (0, 1).
    pub step_decay: f64,

    /// The search stops once the step size falls below this.
    pub step_min: f64,
}

/// Deterministic steepest-descent search over the control entries.
///
/// Each iteration evaluates every single-entry neighbour at +/- the current
/// step, moves to the best one if it improves on the current sequence, and
/// shrinks the step otherwise. Identical inputs always produce identical
/// output, which makes this the implementation of choice for replaying
/// recorded runs.
pub struct HillClimbOptimizer {
    params: HillClimbParams,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl HillClimbOptimizer {
    pub fn new(params: HillClimbParams) -> Result<Self, OptimizerError> {
        if params.max_iterations == 0 {
            return Err(OptimizerError::NoIterations);
        }
        if params.step_min <= 0.0 || params.step_initial < params.step_min {
            return Err(OptimizerError::InvalidStepSizes(
                params.step_initial,
                params.step_min,
            ));
        }
        if params.step_decay <= 0.0 || params.step_decay >= 1.0 {
            return Err(OptimizerError::InvalidStepDecay(params.step_decay));
        }

        Ok(Self { params })
    }

    pub fn optimize<F>(
        &mut self,
        warm_start: &Controls,
        limits: &CtrlLimits,
        cost_fn: F,
    ) -> (Controls, f64)
    where
        F: Fn(&Controls) -> f64,
    {
        let mut current = warm_start.clone();
        limits.clamp(&mut current);
        let mut current_cost = cost_fn(&current);

        let mut step = self.params.step_initial;

        for _ in 0..self.params.max_iterations {
            let best_neighbour = self
                .neighbours(&current, limits, step)
                .into_iter()
                .map(|n| {
                    let cost = cost_fn(&n);
                    (n, cost)
                })
                .min_by_key(|(_, cost)| OrderedFloat(*cost));

            match best_neighbour {
                Some((neighbour, cost)) if cost < current_cost => {
                    current = neighbour;
                    current_cost = cost;
                }
                _ => {
                    // Local minimum at this resolution, refine the step
                    step *= self.params.step_decay;
                    if step < self.params.step_min {
                        break;
                    }
                }
            }
        }

        (current, current_cost)
    }

    /// All single-entry neighbours of `controls` at +/- `step`, clamped into
    /// the limits.
    fn neighbours(&self, controls: &Controls, limits: &CtrlLimits, step: f64) -> Vec<Controls> {
        let mut neighbours = Vec::with_capacity(2 * controls.ctrl_dim() * controls.n_segments());

        for dim in 0..controls.ctrl_dim() {
            for seg in 0..controls.n_segments() {
                for delta in [step, -step] {
                    let mut neighbour = controls.clone();
                    neighbour.0[(dim, seg)] += delta;
                    limits.clamp(&mut neighbour);
                    neighbours.push(neighbour);
                }
            }
        }

        neighbours
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
