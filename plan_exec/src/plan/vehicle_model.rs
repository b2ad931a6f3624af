//! Kinematic bicycle vehicle model.
//!
//! Rolls a control sequence out into a discretised trajectory. The rollout
//! is driven by the *tracked* speed and steering, simulated forward through
//! clones of the actuator tracking filters, so it reflects realistic
//! actuator lag rather than instantaneous response.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use super::tracking_filter::TrackingFilter;
use super::types::{Controls, CtrlLimits, PathPoint, Pose, TrajectoryRollout};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the [`BicycleModel`].
#[derive(Debug, Clone, Deserialize)]
pub struct BicycleModelParams {
    /// Distance between front and rear axles in meters.
    pub wheelbase_m: f64,

    /// Duration of one discretisation step in seconds.
    pub dt_s: f64,

    /// Number of discretisation steps per control segment.
    pub segment_size: usize,
}

/// Vehicle model owning the live actuator tracker state.
///
/// The trackers are mutated only by measured feedback (once per control
/// cycle); rollouts operate on clones and never touch the live state, so
/// repeated rollouts with identical inputs produce identical output.
pub struct BicycleModel {
    params: BicycleModelParams,

    speed_filter: TrackingFilter,
    steer_filter: TrackingFilter,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl BicycleModel {
    pub fn new(
        params: BicycleModelParams,
        speed_filter: TrackingFilter,
        steer_filter: TrackingFilter,
    ) -> Self {
        Self {
            params,
            speed_filter,
            steer_filter,
        }
    }

    /// Re-synchronise the trackers with measured actuator feedback.
    pub fn update_feedback(&mut self, speed_ms: f64, steer_rad: f64, time_s: f64) {
        self.speed_filter.update(speed_ms, time_s);
        self.steer_filter.update(steer_rad, time_s);
    }

    /// Hard-reset both trackers, used at startup.
    pub fn reset(&mut self, time_s: f64) {
        self.speed_filter.reset(0.0, time_s);
        self.steer_filter.reset(0.0, time_s);
    }

    /// The current tracked speed in m/s.
    pub fn tracked_speed(&self) -> f64 {
        self.speed_filter.value()
    }

    /// The current tracked steering angle in radians.
    pub fn tracked_steer(&self) -> f64 {
        self.steer_filter.value()
    }

    /// The maximum reference speed, taken from the speed tracker bounds.
    pub fn max_speed(&self) -> f64 {
        self.speed_filter.val_max()
    }

    /// The optimizer's control bounds: every control dimension is bounded by
    /// the steering tracker's output limits.
    pub fn steer_limits(&self, ctrl_dim: usize) -> CtrlLimits {
        CtrlLimits::uniform(
            ctrl_dim,
            self.steer_filter.val_min(),
            self.steer_filter.val_max(),
        )
    }

    /// Roll the given control sequence out into a trajectory.
    ///
    /// Deterministic forward simulation in the vehicle frame: the pose
    /// starts at the origin, and each step advances it with the kinematic
    /// bicycle update driven by the simulated (lagged) speed and steering.
    /// Pure with respect to `controls` and the current tracker state.
    pub fn roll_out_path(&self, controls: &Controls) -> TrajectoryRollout {
        let dt_s = self.params.dt_s;
        let n_steps = controls.n_segments() * self.params.segment_size;

        // Simulated copies of the live trackers
        let mut speed_filter = self.speed_filter.clone();
        let mut steer_filter = self.steer_filter.clone();

        // Both filters are updated with the same cycle timestamp, but start
        // the simulation clock from the later of the two to be safe
        let mut sim_time_s = speed_filter
            .last_update_s()
            .max(steer_filter.last_update_s());

        let mut pose = Pose::default();
        let mut path = Vec::with_capacity(n_steps);

        for step in 0..n_steps {
            let segment = step / self.params.segment_size;
            sim_time_s += dt_s;

            // Command the segment's steering and the reference speed through
            // the simulated actuators
            steer_filter.update(controls.steer(segment), sim_time_s);
            speed_filter.update(speed_filter.val_max(), sim_time_s);

            let speed_ms = speed_filter.value();
            let steer_rad = steer_filter.value();

            // Kinematic bicycle update. Theta accumulates unwrapped so the
            // heading deviation cost sees the total turn
            pose.x += speed_ms * pose.theta.cos() * dt_s;
            pose.y += speed_ms * pose.theta.sin() * dt_s;
            pose.theta += speed_ms / self.params.wheelbase_m * steer_rad.tan() * dt_s;

            path.push(PathPoint {
                pose,
                speed_ms,
                steer_rad,
            });
        }

        // The command to execute now is the rollout's first actionable step
        let apply_speed_ms = path.first().map(|p| p.speed_ms).unwrap_or(0.0);
        let apply_steer_rad = if controls.n_segments() > 0 {
            controls.steer(0)
        } else {
            0.0
        };

        TrajectoryRollout {
            path,
            apply_speed_ms,
            apply_steer_rad,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
