//! Simulated annealing optimizer.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

// Internal
use super::OptimizerError;
use crate::plan::types::{Controls, CtrlLimits};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for [`AnnealingOptimizer`].
#[derive(Debug, Clone, Deserialize)]
pub struct AnnealingParams {
    /// Number of candidate evaluations per cycle.
    pub num_iterations: usize,

    /// Temperature at the first iteration. Must be >= `temperature_end`.
    pub temperature_start: f64,

    /// Temperature at the last iteration. Must be > 0.
    pub temperature_end: f64,

    /// Maximum perturbation of a single control entry at temperature 1,
    /// in the entry's own units.
    pub perturbation_scale: f64,

    /// RNG seed. `None` seeds from the OS, used in flight; fixed seeds are
    /// for reproducing a run.
    pub seed: Option<u64>,
}

/// Stochastic optimizer using simulated annealing.
///
/// Each iteration perturbs the current sequence by a uniform amount scaled
/// by the temperature, and accepts the candidate with the Metropolis rule.
/// The temperature follows a geometric schedule from `temperature_start` to
/// `temperature_end`. The globally best candidate is tracked separately from
/// the Metropolis walk and is what gets returned, so an accepted uphill move
/// can never degrade the result below the warm start.
pub struct AnnealingOptimizer {
    params: AnnealingParams,

    rng: StdRng,

    /// Per-iteration temperature multiplier of the geometric schedule.
    cooling: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl AnnealingOptimizer {
    pub fn new(params: AnnealingParams) -> Result<Self, OptimizerError> {
        if params.num_iterations == 0 {
            return Err(OptimizerError::NoIterations);
        }
        if params.temperature_end <= 0.0 || params.temperature_start < params.temperature_end {
            return Err(OptimizerError::InvalidTemperatureSchedule(
                params.temperature_start,
                params.temperature_end,
            ));
        }
        if params.perturbation_scale <= 0.0 {
            return Err(OptimizerError::InvalidPerturbationScale(
                params.perturbation_scale,
            ));
        }

        let cooling = if params.num_iterations > 1 {
            (params.temperature_end / params.temperature_start)
                .powf(1.0 / (params.num_iterations - 1) as f64)
        } else {
            1.0
        };

        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            params,
            rng,
            cooling,
        })
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

        let mut best = current.clone();
        let mut best_cost = current_cost;

        let mut temperature = self.params.temperature_start;

        for _ in 0..self.params.num_iterations {
            let mut candidate = current.clone();
            self.perturb(&mut candidate, temperature);
            limits.clamp(&mut candidate);

            let candidate_cost = cost_fn(&candidate);

            if self.accept(current_cost, candidate_cost, temperature) {
                current = candidate;
                current_cost = candidate_cost;

                if current_cost < best_cost {
                    best = current.clone();
                    best_cost = current_cost;
                }
            }

            temperature *= self.cooling;
        }

        (best, best_cost)
    }

    /// Perturb every entry by a uniform amount scaled by the temperature.
    fn perturb(&mut self, controls: &mut Controls, temperature: f64) {
        let scale = self.params.perturbation_scale * temperature;

        for dim in 0..controls.ctrl_dim() {
            for seg in 0..controls.n_segments() {
                controls.0[(dim, seg)] += self.rng.gen_range(-scale..=scale);
            }
        }
    }

    /// Metropolis acceptance: always accept improvements, accept
    /// degradations with probability falling in the cost increase and
    /// rising in the temperature.
    fn accept(&mut self, current_cost: f64, candidate_cost: f64, temperature: f64) -> bool {
        if candidate_cost < current_cost {
            return true;
        }

        let p = ((current_cost - candidate_cost) / temperature).exp();
        self.rng.gen::<f64>() < p
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
