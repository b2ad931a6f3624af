//! Library of the AGV planner executable.
//!
//! The planner evaluates candidate control sequences against a map-derived
//! cost source, picks the best sequence with a numerical optimizer, and
//! emits speed/steering commands at a fixed cadence. See the [`plan`] module
//! for the decision core and [`sim`] for the synthetic sensor rig used by
//! the executable and the end-to-end tests.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod plan;
pub mod sim;
pub mod store;
