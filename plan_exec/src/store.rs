//! # Planner store
//!
//! Executable-side cycle bookkeeping, consolidating what would otherwise be
//! globals in `main`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
use crate::plan::{Command, StatusReport};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Store for the planner executable.
#[derive(Default)]
pub struct PlannerStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u128,

    /// True if this cycle falls on a 1Hz boundary
    pub is_1_hz_cycle: bool,

    /// Number of consecutive cycle overruns
    pub num_consec_cycle_overruns: u64,

    // Planning telemetry
    /// Number of cycles which actually planned (fresh map available)
    pub num_planned_cycles: u64,

    /// Total wall-clock time spent planning, over all planned cycles
    pub cum_planning_time_s: f64,

    /// The command published on the last cycle
    pub last_command: Command,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PlannerStore {
    /// Perform actions required at the start of a cycle.
    pub fn cycle_start(&mut self, cycle_frequency_hz: f64) {
        self.is_1_hz_cycle = self.num_cycles % (cycle_frequency_hz as u128) == 0;
    }

    /// Record the result of a cycle.
    pub fn record_cycle(&mut self, command: Command, report: &StatusReport) {
        self.last_command = command;

        if report.planned {
            self.num_planned_cycles += 1;
            self.cum_planning_time_s += report.planning_time_s;
        }
    }

    /// Mean wall-clock planning time over all planned cycles so far.
    pub fn mean_planning_time_s(&self) -> f64 {
        if self.num_planned_cycles == 0 {
            0.0
        } else {
            self.cum_planning_time_s / self.num_planned_cycles as f64
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::plan::impasse::ImpasseState;

    fn report(planned: bool, planning_time_s: f64) -> StatusReport {
        StatusReport {
            planned,
            cost: 0.0,
            has_collision: false,
            impasse_state: ImpasseState::Normal,
            planning_time_s,
        }
    }

    #[test]
    fn test_mean_planning_time_over_planned_cycles_only() {
        let mut store = PlannerStore::default();

        assert_eq!(store.mean_planning_time_s(), 0.0);

        store.record_cycle(Command::default(), &report(true, 0.01));
        store.record_cycle(Command::default(), &report(false, 0.0));
        store.record_cycle(Command::default(), &report(true, 0.03));

        assert!((store.mean_planning_time_s() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_1_hz_cycle_flag() {
        let mut store = PlannerStore::default();

        store.cycle_start(30.0);
        assert!(store.is_1_hz_cycle);

        store.num_cycles = 15;
        store.cycle_start(30.0);
        assert!(!store.is_1_hz_cycle);

        store.num_cycles = 30;
        store.cycle_start(30.0);
        assert!(store.is_1_hz_cycle);
    }
}
