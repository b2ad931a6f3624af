//! Impasse detection and recovery state machine.
//!
//! When every plan the optimizer can find still collides, the vehicle is
//! boxed in and forward planning alone will not free it. This module tracks
//! that condition across cycles and drives a timed recovery: hold position
//! for a caution period in case the obstacle clears on its own, then back
//! out for a fixed reverse period, then re-assess.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::info;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for [`ImpasseStateMachine`].
#[derive(Debug, Clone, Deserialize)]
pub struct ImpasseParams {
    /// Time in caution before giving up and reversing. A value of zero (or
    /// below) skips caution and reverses immediately on collision.
    pub caution_duration_s: f64,

    /// Time spent reversing before re-assessing.
    pub reverse_duration_s: f64,

    /// Fixed speed commanded while reversing, in m/s (negative).
    pub reverse_speed_ms: f64,
}

/// Tracks impasse recovery across control cycles.
pub struct ImpasseStateMachine {
    params: ImpasseParams,

    state: ImpasseState,

    /// Time the current state was entered, invalid in `Normal`.
    entered_s: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Impasse recovery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImpasseState {
    /// Collision-free planning, commands pass through unmodified.
    Normal,

    /// Plans are colliding: hold position and wait for the obstacle to
    /// clear.
    Caution,

    /// The obstacle did not clear: back out at the fixed reverse speed.
    Reverse,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ImpasseStateMachine {
    pub fn new(params: ImpasseParams) -> Self {
        Self {
            params,
            state: ImpasseState::Normal,
            entered_s: 0.0,
        }
    }

    pub fn state(&self) -> ImpasseState {
        self.state
    }

    pub fn reverse_speed_ms(&self) -> f64 {
        self.params.reverse_speed_ms
    }

    /// Advance the state machine by one control cycle.
    ///
    /// `has_collision` is true when the cycle's best plan still collides.
    /// Returns the state the arbitration step of this cycle should act on.
    pub fn step(&mut self, has_collision: bool, now_s: f64) -> ImpasseState {
        let next = match self.state {
            ImpasseState::Normal => {
                if !has_collision {
                    ImpasseState::Normal
                } else if self.params.caution_duration_s <= 0.0 {
                    ImpasseState::Reverse
                } else {
                    ImpasseState::Caution
                }
            }

            ImpasseState::Caution => {
                if !has_collision {
                    ImpasseState::Normal
                } else if now_s - self.entered_s >= self.params.caution_duration_s {
                    ImpasseState::Reverse
                } else {
                    ImpasseState::Caution
                }
            }

            // Reversing always runs its full duration, then drops back to
            // caution to re-assess rather than straight to normal
            ImpasseState::Reverse => {
                if now_s - self.entered_s >= self.params.reverse_duration_s {
                    ImpasseState::Caution
                } else {
                    ImpasseState::Reverse
                }
            }
        };

        if next != self.state {
            info!("Impasse state: {:?} -> {:?}", self.state, next);
            self.entered_s = now_s;
            self.state = next;
        }

        self.state
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
