//! Common types used throughout the planning modules.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::ops::{Deref, DerefMut};

// External
use nalgebra::{DMatrix, DVector, Isometry2, Point2, Vector2};
use serde::{Deserialize, Serialize};
use util::maths::{clamp, wrap_to_pi};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Reserved cost value signalling "collision/untraversable" at a queried
/// pose.
///
/// All valid traversal costs are non-negative, so any negative value from a
/// map cost source is a collision. This is the value implementations should
/// return.
pub const COLLISION_COST: f64 = -1.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A planar pose in an explicit 2D frame (vehicle or map, stated per use).
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,

    /// Heading in radians. Normalised to (-pi, pi] at construction, never
    /// re-wrapped internally.
    pub theta: f64,
}

/// One discretisation step of a rolled-out trajectory.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize)]
pub struct PathPoint {
    /// Pose in the vehicle frame at the start of the rollout.
    pub pose: Pose,

    /// Simulated (tracked) speed at this step in m/s.
    pub speed_ms: f64,

    /// Simulated (tracked) steering angle at this step in radians.
    pub steer_rad: f64,
}

/// A control sequence: `ctrl_dim` parameters for each of `n_segments`
/// trajectory segments.
///
/// Stored as a `ctrl_dim x n_segments` matrix. Row 0 is the steering
/// command for each segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Controls(pub DMatrix<f64>);

/// Per-dimension bounds on the control parameters.
#[derive(Debug, Clone)]
pub struct CtrlLimits {
    pub min: DVector<f64>,
    pub max: DVector<f64>,
}

/// The trajectory produced by rolling a control sequence through the vehicle
/// model. Produced fresh for every optimizer evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrajectoryRollout {
    /// One point per discretisation step, in the vehicle frame.
    pub path: Vec<PathPoint>,

    /// The speed command to execute now (the first actionable step of the
    /// rollout, not its last).
    pub apply_speed_ms: f64,

    /// The steering command to execute now.
    pub apply_steer_rad: f64,
}

/// The optimizer's chosen result for one control cycle.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryPlan {
    pub rollout: TrajectoryRollout,

    /// Scalar cost of the chosen control sequence.
    pub cost: f64,

    /// True if any step of the chosen rollout hit the collision sentinel.
    pub has_collision: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    /// Create a new pose, wrapping `theta` into the canonical range.
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self {
            x,
            y,
            theta: wrap_to_pi(theta),
        }
    }

    /// The position of the pose as a point.
    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    /// The pose as an isometry mapping pose-local coordinates into the
    /// pose's parent frame.
    pub fn to_isometry(&self) -> Isometry2<f64> {
        Isometry2::new(Vector2::new(self.x, self.y), self.theta)
    }
}

impl Controls {
    /// Create a zeroed control sequence of the given shape.
    pub fn zeros(ctrl_dim: usize, n_segments: usize) -> Self {
        Self(DMatrix::zeros(ctrl_dim, n_segments))
    }

    /// Number of control parameters per segment.
    pub fn ctrl_dim(&self) -> usize {
        self.0.nrows()
    }

    /// Number of trajectory segments.
    pub fn n_segments(&self) -> usize {
        self.0.ncols()
    }

    /// The steering command (row 0) for the given segment.
    pub fn steer(&self, segment: usize) -> f64 {
        self.0[(0, segment)]
    }
}

impl Deref for Controls {
    type Target = DMatrix<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Controls {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl CtrlLimits {
    /// Build limits which apply the same bound to every control dimension.
    pub fn uniform(ctrl_dim: usize, min: f64, max: f64) -> Self {
        Self {
            min: DVector::from_element(ctrl_dim, min),
            max: DVector::from_element(ctrl_dim, max),
        }
    }

    /// Clamp every entry of the given controls into these limits, in place.
    pub fn clamp(&self, controls: &mut Controls) {
        for dim in 0..controls.ctrl_dim() {
            for seg in 0..controls.n_segments() {
                controls.0[(dim, seg)] =
                    clamp(&controls.0[(dim, seg)], &self.min[dim], &self.max[dim]);
            }
        }
    }

    /// True if every entry of the given controls lies within these limits.
    pub fn contains(&self, controls: &Controls) -> bool {
        for dim in 0..controls.ctrl_dim() {
            for seg in 0..controls.n_segments() {
                let v = controls.0[(dim, seg)];
                if v < self.min[dim] || v > self.max[dim] {
                    return false;
                }
            }
        }

        true
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pose_theta_wrapped_at_construction() {
        let pose = Pose::new(1.0, 2.0, 3.0 * std::f64::consts::PI);
        assert!((pose.theta - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn test_ctrl_limits_clamp() {
        let limits = CtrlLimits::uniform(1, -0.5, 0.5);

        let mut controls = Controls::zeros(1, 3);
        controls.0[(0, 0)] = 1.0;
        controls.0[(0, 1)] = -2.0;
        controls.0[(0, 2)] = 0.25;

        assert!(!limits.contains(&controls));

        limits.clamp(&mut controls);

        assert_eq!(controls.steer(0), 0.5);
        assert_eq!(controls.steer(1), -0.5);
        assert_eq!(controls.steer(2), 0.25);
        assert!(limits.contains(&controls));
    }
}
