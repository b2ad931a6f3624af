//! First-order actuator tracking filter.
//!
//! The filter models an actuator which moves its output toward a target at a
//! bounded rate. It is used in two places:
//!
//! - inside the vehicle model, where simulated copies of the filters give
//!   the rollout realistic actuator lag instead of instantaneous response;
//! - in the simulation rig, where a pair of filters stands in for the real
//!   actuators responding to published commands.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use util::maths::clamp;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for a [`TrackingFilter`].
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingFilterParams {
    /// Maximum rate of change of the tracked value, in units per second.
    pub rate: f64,

    /// Minimum output value.
    pub val_min: f64,

    /// Maximum output value.
    pub val_max: f64,
}

/// First-order tracker state.
///
/// `Clone` is intentional: the vehicle model clones the filters at the start
/// of each rollout so the simulation can advance them without disturbing the
/// live state.
#[derive(Debug, Clone)]
pub struct TrackingFilter {
    params: TrackingFilterParams,

    /// Current tracked value.
    value: f64,

    /// Most recent commanded/measured target.
    target: f64,

    /// Timestamp of the last update, seconds on the process monotonic clock.
    last_update_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrackingFilter {
    /// Create a new filter at the given initial value and time.
    pub fn new(params: TrackingFilterParams, value: f64, time_s: f64) -> Self {
        let value = clamp(&value, &params.val_min, &params.val_max);

        Self {
            params,
            value,
            target: value,
            last_update_s: time_s,
        }
    }

    /// Hard-set the filter state, used at startup.
    pub fn reset(&mut self, value: f64, time_s: f64) {
        self.value = clamp(&value, &self.params.val_min, &self.params.val_max);
        self.target = self.value;
        self.last_update_s = time_s;
    }

    /// Track toward the given target value.
    ///
    /// The tracked value moves toward the target by at most `rate * dt`,
    /// where `dt` is the time since the previous update. Updates with a
    /// non-positive `dt` adopt the target but leave the value unchanged.
    pub fn update(&mut self, target: f64, time_s: f64) {
        self.target = clamp(&target, &self.params.val_min, &self.params.val_max);

        let dt_s = time_s - self.last_update_s;
        if dt_s <= 0.0 {
            return;
        }

        let max_step = self.params.rate * dt_s;
        let error = self.target - self.value;

        self.value += clamp(&error, &-max_step, &max_step);
        self.last_update_s = time_s;
    }

    /// The current tracked value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// The most recent target.
    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn val_min(&self) -> f64 {
        self.params.val_min
    }

    pub fn val_max(&self) -> f64 {
        self.params.val_max
    }

    pub fn last_update_s(&self) -> f64 {
        self.last_update_s
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn test_params() -> TrackingFilterParams {
        TrackingFilterParams {
            rate: 1.0,
            val_min: -2.0,
            val_max: 2.0,
        }
    }

    #[test]
    fn test_converges_without_overshoot() {
        let mut filter = TrackingFilter::new(test_params(), 0.0, 0.0);

        // Constant measured input, many updates at 10 Hz. The tracked value
        // must converge to the input and never exceed it.
        let mut time_s = 0.0;
        for _ in 0..100 {
            time_s += 0.1;
            filter.update(1.5, time_s);
            assert!(filter.value() <= 1.5);
        }

        assert!((filter.value() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_rate_limited_step() {
        let mut filter = TrackingFilter::new(test_params(), 0.0, 0.0);

        // One update 0.5 s later can move the value by at most rate * dt
        filter.update(2.0, 0.5);
        assert!((filter.value() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_target_clamped_to_bounds() {
        let mut filter = TrackingFilter::new(test_params(), 0.0, 0.0);

        // Target beyond val_max is clamped, so the value settles on the
        // bound rather than overshooting it
        for i in 1..100 {
            filter.update(10.0, i as f64);
        }

        assert!((filter.value() - 2.0).abs() < 1e-9);
        assert_eq!(filter.target(), 2.0);
    }

    #[test]
    fn test_non_positive_dt_is_noop_for_value() {
        let mut filter = TrackingFilter::new(test_params(), 1.0, 5.0);

        filter.update(2.0, 5.0);
        assert_eq!(filter.value(), 1.0);

        filter.update(2.0, 4.0);
        assert_eq!(filter.value(), 1.0);
    }

    #[test]
    fn test_reset() {
        let mut filter = TrackingFilter::new(test_params(), 0.0, 0.0);
        filter.update(1.0, 1.0);

        filter.reset(0.25, 10.0);
        assert_eq!(filter.value(), 0.25);
        assert_eq!(filter.target(), 0.25);
        assert_eq!(filter.last_update_s(), 10.0);
    }
}
