//! Trajectory cost evaluation.
//!
//! Maps a control sequence to a scalar cost: roll the sequence out through
//! the vehicle model, query the map cost source for every pose in one
//! batched call, then integrate per-step terms under an exponential decay
//! which down-weights farther-future steps. A collision terminates the
//! integration with a penalty proportional to the remaining steps, so
//! earlier collisions always cost more than later ones.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use super::map_cost::MapCostSource;
use super::types::Controls;
use super::vehicle_model::BicycleModel;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Fixed cost-term weights, loaded at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct CostWeights {
    /// Weight on the map (obstacle proximity) cost.
    pub k_map_cost: f64,

    /// Weight on the quadratic speed deficit below the reference speed.
    pub k_speed: f64,

    /// Weight on the absolute commanded steering magnitude.
    pub k_steering: f64,

    /// Weight on the absolute heading deviation.
    pub k_angle: f64,

    /// Penalty per remaining step once a collision is found.
    pub collision_penalty: f64,

    /// Per-step decay factor, slightly greater than 1. Higher values
    /// discount the far future more strongly.
    pub gamma: f64,
}

/// Cost function for one control cycle.
///
/// Closes over the cycle's vehicle model (tracker state included) and the
/// current map snapshot; evaluation is deterministic for fixed model and
/// map state.
pub struct CostFunction<'a> {
    weights: &'a CostWeights,
    model: &'a BicycleModel,
    map: &'a dyn MapCostSource,

    /// Reference speed for the speed-deficit term.
    max_speed_ms: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<'a> CostFunction<'a> {
    pub fn new(
        weights: &'a CostWeights,
        model: &'a BicycleModel,
        map: &'a dyn MapCostSource,
    ) -> Self {
        Self {
            weights,
            model,
            map,
            max_speed_ms: model.max_speed(),
        }
    }

    /// Evaluate the scalar cost of the given control sequence.
    pub fn evaluate(&self, controls: &Controls) -> f64 {
        let rollout = self.model.roll_out_path(controls);
        let path = &rollout.path;

        let poses: Vec<_> = path.iter().map(|p| p.pose).collect();
        let map_costs = self.map.distance_cost_batch(&poses);

        let mut cost = 0.0;
        let mut inflator = 1.0;

        for (i, point) in path.iter().enumerate() {
            cost *= self.weights.gamma;
            inflator *= self.weights.gamma;

            if map_costs[i] >= 0.0 {
                cost += self.weights.k_map_cost * map_costs[i];
                cost += self.weights.k_speed * (self.max_speed_ms - point.speed_ms).powi(2);
                cost += self.weights.k_steering * point.steer_rad.abs();
                cost += self.weights.k_angle * point.pose.theta.abs();
            } else {
                // Collision: penalise by the remaining length (including
                // this step) and ignore everything beyond it
                cost += self.weights.collision_penalty * (path.len() - i) as f64;
                break;
            }
        }

        cost / inflator
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
