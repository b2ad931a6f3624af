//! # Trajectory planning module
//!
//! The planner converts the latest map snapshot and actuator feedback into a
//! `(speed, steering)` command once per control cycle:
//!
//! 1. actuator trackers are re-synchronised with measured feedback,
//! 2. the optimizer searches the control space, warm started from the
//!    previous cycle's result, scoring candidates with the cost function
//!    over rollouts of the vehicle model,
//! 3. the winning rollout's collision state drives the impasse state
//!    machine,
//! 4. command arbitration picks between the planned command, holding the
//!    previous command, and the fixed reverse manoeuvre.
//!
//! A command is published every cycle, including cycles with no fresh map
//! (the previous command is republished). All planner state lives in
//! [`Planner`], there are no globals.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod cost_function;
pub mod impasse;
pub mod map_cost;
pub mod optimizer;
mod params;
pub mod tracking_filter;
pub mod types;
pub mod vehicle_model;

pub use params::PlanParams;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::Arc;
use std::time::Instant;

// External
use log::debug;
use serde::Serialize;

// Internal
use cost_function::CostFunction;
use impasse::{ImpasseState, ImpasseStateMachine};
use map_cost::MapCostSource;
use optimizer::PlanOptimizer;
use tracking_filter::TrackingFilter;
use types::{Controls, Pose, TrajectoryPlan, TrajectoryRollout};
use vehicle_model::BicycleModel;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The planner: owns all cross-cycle planning state.
pub struct Planner {
    params: PlanParams,

    model: BicycleModel,

    map: Arc<dyn MapCostSource>,

    optimizer: PlanOptimizer,

    impasse: ImpasseStateMachine,

    /// Warm start for the next cycle's optimization.
    last_controls: Controls,

    /// The command published last cycle, republished when this cycle cannot
    /// produce a better one.
    last_command: Command,
}

/// Input data for one control cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleInput {
    /// Measured vehicle speed, or `None` if no measurement arrived this
    /// cycle.
    ///
    /// Units: meters/second
    pub speed_feedback_ms: Option<f64>,

    /// Measured steering angle, or `None` if no measurement arrived this
    /// cycle.
    ///
    /// Units: radians
    pub steer_feedback_rad: Option<f64>,

    /// Cycle timestamp on the session clock.
    ///
    /// Units: seconds
    pub time_s: f64,
}

/// Output data for one control cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleOutput {
    /// The command to publish to the actuators.
    pub command: Command,

    /// The chosen rollout, for visualization/archiving. `None` on cycles
    /// which did not plan.
    pub rollout: Option<TrajectoryRollout>,
}

/// An actuator command.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Command {
    /// Demanded vehicle speed.
    ///
    /// Units: meters/second
    pub speed_ms: f64,

    /// Demanded steering angle.
    ///
    /// Units: radians
    pub steer_rad: f64,
}

/// Status report for one cycle of planner processing.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatusReport {
    /// True if this cycle ran the optimizer (false when the map was stale).
    pub planned: bool,

    /// Cost of the chosen control sequence, 0 if not planned.
    pub cost: f64,

    /// True if the chosen rollout still collides.
    pub has_collision: bool,

    /// Impasse state acted on by this cycle's arbitration.
    pub impasse_state: ImpasseState,

    /// Wall-clock time spent planning this cycle.
    ///
    /// Units: seconds
    pub planning_time_s: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur during planner initialisation.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("ctrl_dim must be at least 1")]
    NoCtrlDims,

    #[error("n_segments must be at least 1")]
    NoSegments,

    #[error("Failed to build the optimizer: {0}")]
    Optimizer(#[from] optimizer::OptimizerError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Planner {
    /// Initialise the planner.
    ///
    /// `map` is the already-constructed map cost source; ingest into it is
    /// the caller's concern. `now_s` is the current session time, used to
    /// reset the actuator trackers.
    pub fn init(
        params: PlanParams,
        map: Arc<dyn MapCostSource>,
        now_s: f64,
    ) -> Result<Self, PlanError> {
        if params.ctrl_dim == 0 {
            return Err(PlanError::NoCtrlDims);
        }
        if params.n_segments == 0 {
            return Err(PlanError::NoSegments);
        }

        let optimizer = PlanOptimizer::from_params(&params.optimizer)?;

        let speed_filter = TrackingFilter::new(params.speed_filter.clone(), 0.0, now_s);
        let steer_filter = TrackingFilter::new(params.steer_filter.clone(), 0.0, now_s);
        let mut model = BicycleModel::new(params.bicycle_model.clone(), speed_filter, steer_filter);
        model.reset(now_s);

        let impasse = ImpasseStateMachine::new(params.impasse.clone());

        let last_controls = Controls::zeros(params.ctrl_dim, params.n_segments);

        Ok(Self {
            params,
            model,
            map,
            optimizer,
            impasse,
            last_controls,
            last_command: Command::default(),
        })
    }

    /// Run one control cycle.
    ///
    /// Always produces a command; see the module documentation for the cycle
    /// sequence.
    pub fn proc(&mut self, input: &CycleInput) -> (CycleOutput, StatusReport) {
        // Re-synchronise the trackers with whatever feedback arrived. With
        // no measurement the tracker holds its value but its clock still
        // advances to this cycle.
        let speed_fb = input
            .speed_feedback_ms
            .unwrap_or_else(|| self.model.tracked_speed());
        let steer_fb = input
            .steer_feedback_rad
            .unwrap_or_else(|| self.model.tracked_steer());
        self.model.update_feedback(speed_fb, steer_fb, input.time_s);

        // With no fresh map there is nothing to plan against, republish the
        // previous command rather than going silent
        if !self.map.is_updated() {
            debug!("No map update since last cycle, republishing previous command");

            let report = StatusReport {
                planned: false,
                cost: 0.0,
                has_collision: false,
                impasse_state: self.impasse.state(),
                planning_time_s: 0.0,
            };

            return (
                CycleOutput {
                    command: self.last_command,
                    rollout: None,
                },
                report,
            );
        }

        let plan_start = Instant::now();

        // Hold the snapshot steady while the optimizer reads it
        self.map.pause_ingest();

        let limits = self.model.steer_limits(self.params.ctrl_dim);

        let (controls, cost) = {
            let cost_fn = CostFunction::new(&self.params.cost, &self.model, self.map.as_ref());
            self.optimizer
                .optimize(&self.last_controls, &limits, |c| cost_fn.evaluate(c))
        };

        let rollout = self.model.roll_out_path(&controls);

        let poses: Vec<Pose> = rollout.path.iter().map(|p| p.pose).collect();
        let has_collision = self
            .map
            .distance_cost_batch(&poses)
            .iter()
            .any(|&c| c < 0.0);

        // Next cycle warm starts from this result
        self.last_controls = controls;

        self.map.mark_stale();
        self.map.resume_ingest();

        let planning_time_s = plan_start.elapsed().as_secs_f64();

        let plan = TrajectoryPlan {
            rollout,
            cost,
            has_collision,
        };

        let impasse_state = self.impasse.step(plan.has_collision, input.time_s);

        let command = match impasse_state {
            // Back out at the fixed reverse command
            ImpasseState::Reverse => Command {
                speed_ms: self.impasse.reverse_speed_ms(),
                steer_rad: 0.0,
            },
            // Still colliding but not yet reversing: hold the previous
            // command while the impasse machine counts down
            _ if plan.has_collision => self.last_command,
            // The planned command. The rollout's first step speed is
            // already rate-limited from the tracked state
            _ => Command {
                speed_ms: plan.rollout.apply_speed_ms,
                steer_rad: plan.rollout.apply_steer_rad * self.params.steering_gain,
            },
        };

        self.last_command = command;

        let report = StatusReport {
            planned: true,
            cost: plan.cost,
            has_collision: plan.has_collision,
            impasse_state,
            planning_time_s,
        };

        (
            CycleOutput {
                command,
                rollout: Some(plan.rollout),
            },
            report,
        )
    }

    /// The planner parameters.
    pub fn params(&self) -> &PlanParams {
        &self.params
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::cost_function::CostWeights;
    use super::impasse::ImpasseParams;
    use super::map_cost::{
        DistanceMapParams, InflationMap, InflationMapParams, MapSourceKind, MapSourceParams,
        NearestPointCacheParams, OccupancyGrid, Rectangle,
    };
    use super::optimizer::{AnnealingParams, HillClimbParams, OptimizerKind, OptimizerParams};
    use super::tracking_filter::TrackingFilterParams;
    use super::vehicle_model::BicycleModelParams;
    use super::*;
    use nalgebra::{Isometry2, Vector2};
    use ndarray::Array2;

    const CYCLE_DT_S: f64 = 1.0 / 30.0;

    fn test_inflation_params() -> InflationMapParams {
        InflationMapParams {
            lethal_threshold: 90,
            hit_box: Rectangle {
                x_min: -0.2,
                x_max: 0.4,
                y_min: -0.3,
                y_max: 0.3,
            },
        }
    }

    /// Deterministic planner configuration (hill climbing optimizer).
    fn test_params() -> PlanParams {
        PlanParams {
            rate_hz: 30.0,
            ctrl_dim: 1,
            n_segments: 3,
            steering_gain: 1.0,
            save_chosen_rollouts: false,
            cost: CostWeights {
                k_map_cost: 1.0,
                k_speed: 1.0,
                k_steering: 10.0,
                k_angle: 10.0,
                collision_penalty: 1000.0,
                gamma: 1.01,
            },
            bicycle_model: BicycleModelParams {
                wheelbase_m: 0.8,
                dt_s: 0.1,
                segment_size: 5,
            },
            speed_filter: TrackingFilterParams {
                rate: 2.0,
                val_min: -1.0,
                val_max: 2.0,
            },
            steer_filter: TrackingFilterParams {
                rate: 4.0,
                val_min: -0.4,
                val_max: 0.4,
            },
            optimizer: OptimizerParams {
                kind: OptimizerKind::HillClimbing,
                annealing: AnnealingParams {
                    num_iterations: 100,
                    temperature_start: 1.0,
                    temperature_end: 0.01,
                    perturbation_scale: 0.2,
                    seed: Some(0),
                },
                hill_climbing: HillClimbParams {
                    max_iterations: 30,
                    step_initial: 0.1,
                    step_decay: 0.5,
                    step_min: 0.005,
                },
            },
            map_source: MapSourceParams {
                kind: MapSourceKind::InflationMap,
                inflation_map: test_inflation_params(),
                distance_map: DistanceMapParams {
                    collision_radius_m: 0.5,
                    influence_radius_m: 2.5,
                    cost_factor: 10.0,
                },
                obstacle_points: NearestPointCacheParams {
                    collision_dist_m: 0.5,
                    influence_dist_m: 2.5,
                    cost_factor: 10.0,
                    bucket_size_m: 1.0,
                },
            },
            impasse: ImpasseParams {
                caution_duration_s: 0.1,
                reverse_duration_s: 1.0,
                reverse_speed_ms: -0.8,
            },
        }
    }

    /// 20 x 20 m free-space grid centred on the vehicle.
    fn flat_grid() -> OccupancyGrid {
        OccupancyGrid {
            data: Array2::zeros((40, 40)),
            origin_m: Vector2::new(-10.0, -10.0),
            resolution_m: 0.5,
        }
    }

    /// A grid that is lethal everywhere: every pose outside the hit box
    /// collides, so no rollout can escape.
    fn boxed_in_grid() -> OccupancyGrid {
        OccupancyGrid {
            data: Array2::from_elem((40, 40), 100u8),
            origin_m: Vector2::new(-10.0, -10.0),
            resolution_m: 0.5,
        }
    }

    fn test_planner(map: Arc<InflationMap>) -> Planner {
        Planner::init(test_params(), map, 0.0).unwrap()
    }

    /// Run one cycle: ingest the given grid, echo the previous command as
    /// feedback, proc.
    fn run_cycle(
        planner: &mut Planner,
        map: &InflationMap,
        grid: OccupancyGrid,
        previous: Command,
        time_s: f64,
    ) -> (CycleOutput, StatusReport) {
        map.ingest_grid(grid, Some(Isometry2::identity()));

        planner.proc(&CycleInput {
            speed_feedback_ms: Some(previous.speed_ms),
            steer_feedback_rad: Some(previous.steer_rad),
            time_s,
        })
    }

    #[test]
    fn test_invalid_shape_rejected() {
        let map = Arc::new(InflationMap::new(test_inflation_params()).unwrap());

        let mut params = test_params();
        params.ctrl_dim = 0;
        assert!(Planner::init(params, map.clone(), 0.0).is_err());

        let mut params = test_params();
        params.n_segments = 0;
        assert!(Planner::init(params, map, 0.0).is_err());
    }

    #[test]
    fn test_free_space_converges_to_straight_run() {
        let map = Arc::new(InflationMap::new(test_inflation_params()).unwrap());
        let mut planner = test_planner(map.clone());

        let mut command = Command::default();
        let mut time_s = 0.0;

        for _ in 0..60 {
            time_s += CYCLE_DT_S;
            let (output, report) = run_cycle(&mut planner, &map, flat_grid(), command, time_s);

            assert!(report.planned);
            assert!(!report.has_collision);
            assert_eq!(report.impasse_state, ImpasseState::Normal);
            assert!(output.rollout.is_some());

            command = output.command;
        }

        // Free space: full speed ahead, negligible steering
        assert!(command.speed_ms > 1.5);
        assert!(command.steer_rad.abs() < 0.05);
    }

    #[test]
    fn test_boxed_in_escalates_to_reverse() {
        let map = Arc::new(InflationMap::new(test_inflation_params()).unwrap());
        let mut planner = test_planner(map.clone());

        let mut command = Command::default();
        let mut time_s = 0.0;
        let mut saw_caution_hold = false;
        let mut saw_reverse = false;

        for _ in 0..20 {
            time_s += CYCLE_DT_S;
            let previous = command;
            let (output, report) =
                run_cycle(&mut planner, &map, boxed_in_grid(), previous, time_s);
            command = output.command;

            assert!(report.planned);
            assert!(report.has_collision);

            match report.impasse_state {
                ImpasseState::Normal => panic!("collision must never leave the machine Normal"),
                ImpasseState::Caution => {
                    // Holding the previous command while the caution timer
                    // runs
                    assert_eq!(command.speed_ms, previous.speed_ms);
                    assert_eq!(command.steer_rad, previous.steer_rad);
                    saw_caution_hold = true;
                }
                ImpasseState::Reverse => {
                    assert_eq!(command.speed_ms, -0.8);
                    assert_eq!(command.steer_rad, 0.0);
                    saw_reverse = true;
                }
            }
        }

        assert!(saw_caution_hold);
        assert!(saw_reverse);

        // Never moved forward at any point
        assert!(command.speed_ms <= 0.0);
    }

    #[test]
    fn test_stale_map_republishes_previous_command() {
        let map = Arc::new(InflationMap::new(test_inflation_params()).unwrap());
        let mut planner = test_planner(map.clone());

        // No map ever ingested: not planned, default (zero) command
        let (output, report) = planner.proc(&CycleInput {
            speed_feedback_ms: None,
            steer_feedback_rad: None,
            time_s: CYCLE_DT_S,
        });
        assert!(!report.planned);
        assert!(output.rollout.is_none());
        assert_eq!(output.command.speed_ms, 0.0);
        assert_eq!(output.command.steer_rad, 0.0);

        // Plan once against a fresh map
        let (planned_output, report) = run_cycle(
            &mut planner,
            &map,
            flat_grid(),
            Command::default(),
            2.0 * CYCLE_DT_S,
        );
        assert!(report.planned);
        assert!(planned_output.command.speed_ms > 0.0);

        // Map now stale (consumed by the cycle above): the previous command
        // is republished unchanged
        let (output, report) = planner.proc(&CycleInput {
            speed_feedback_ms: Some(planned_output.command.speed_ms),
            steer_feedback_rad: Some(planned_output.command.steer_rad),
            time_s: 3.0 * CYCLE_DT_S,
        });
        assert!(!report.planned);
        assert_eq!(output.command.speed_ms, planned_output.command.speed_ms);
        assert_eq!(output.command.steer_rad, planned_output.command.steer_rad);
    }

    #[test]
    fn test_warm_start_carried_between_cycles() {
        let map = Arc::new(InflationMap::new(test_inflation_params()).unwrap());
        let mut planner = test_planner(map.clone());

        let (_, _) = run_cycle(&mut planner, &map, flat_grid(), Command::default(), CYCLE_DT_S);
        let first = planner.last_controls.clone();

        let (_, _) = run_cycle(&mut planner, &map, flat_grid(), Command::default(), 2.0 * CYCLE_DT_S);
        let second = planner.last_controls.clone();

        // Free space and a deterministic optimizer: once settled the warm
        // start is a fixed point
        assert_eq!(first, second);
    }
}
