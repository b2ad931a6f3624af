//! Parameters for the planner, loaded from `plan.toml`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use super::cost_function::CostWeights;
use super::impasse::ImpasseParams;
use super::map_cost::MapSourceParams;
use super::optimizer::OptimizerParams;
use super::tracking_filter::TrackingFilterParams;
use super::vehicle_model::BicycleModelParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Top level planner parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanParams {
    /// Control cycle frequency.
    ///
    /// Units: hertz
    pub rate_hz: f64,

    /// Number of control parameters per trajectory segment.
    pub ctrl_dim: usize,

    /// Number of trajectory segments per plan.
    pub n_segments: usize,

    /// Gain applied to the published steering command.
    pub steering_gain: f64,

    /// If true the chosen rollout of every planned cycle is archived to the
    /// session directory.
    pub save_chosen_rollouts: bool,

    /// Cost function weights.
    pub cost: CostWeights,

    /// Vehicle model parameters.
    pub bicycle_model: BicycleModelParams,

    /// Speed actuator tracking filter parameters.
    pub speed_filter: TrackingFilterParams,

    /// Steering actuator tracking filter parameters.
    pub steer_filter: TrackingFilterParams,

    /// Optimizer selection and tuning.
    pub optimizer: OptimizerParams,

    /// Map cost source selection and thresholds.
    pub map_source: MapSourceParams,

    /// Impasse recovery tuning.
    pub impasse: ImpasseParams,
}
