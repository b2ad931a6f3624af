//! Main planner executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logger and all modules
//!     - Main loop (fixed cadence):
//!         - Actuator feedback acquisition
//!         - Planner processing (one control cycle)
//!         - Command execution
//!         - Telemetry and archiving
//!
//! Map data arrives asynchronously on the simulation rig's publisher thread;
//! the planner's staleness protocol keeps the two sides consistent.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use std::thread;
use std::time::{Duration, Instant};

// Internal
use plan_lib::plan::map_cost::MapSource;
use plan_lib::plan::tracking_filter::TrackingFilter;
use plan_lib::plan::{CycleInput, PlanParams, Planner};
use plan_lib::sim::{SimParams, SimRig};
use plan_lib::store::PlannerStore;
use util::{
    logger::{logger_init, LevelFilter},
    session::{self, Session},
};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("plan_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Info, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution
    info!("AGV Planner Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let plan_params: PlanParams =
        util::params::load("plan.toml").wrap_err("Could not load planner params")?;
    let sim_params: SimParams =
        util::params::load("sim.toml").wrap_err("Could not load sim params")?;

    info!("Parameters loaded");

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let map =
        MapSource::from_params(&plan_params.map_source).wrap_err("Invalid map source params")?;

    let now_s = session::get_elapsed_seconds();

    let rate_hz = plan_params.rate_hz;
    let cycle_period_s = 1.0 / rate_hz;
    let save_rollouts = plan_params.save_chosen_rollouts;

    // The rig's simulated actuators respond the way the planner's trackers
    // expect
    let speed_actuator = TrackingFilter::new(plan_params.speed_filter.clone(), 0.0, now_s);
    let steer_actuator = TrackingFilter::new(plan_params.steer_filter.clone(), 0.0, now_s);

    let mut planner = Planner::init(plan_params, map.as_cost_source(), now_s)
        .wrap_err("Failed to initialise the planner")?;
    info!("Planner init complete");

    let mut rig = SimRig::start(sim_params, map, speed_actuator, steer_actuator);
    info!("Simulation rig started");

    let mut store = PlannerStore::default();

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    loop {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        store.cycle_start(rate_hz);

        // ---- DATA INPUT ----

        let time_s = session::get_elapsed_seconds();
        let (speed_fb_ms, steer_fb_rad) = rig.feedback();

        // ---- PLANNER PROCESSING ----

        let (output, report) = planner.proc(&CycleInput {
            speed_feedback_ms: Some(speed_fb_ms),
            steer_feedback_rad: Some(steer_fb_rad),
            time_s,
        });

        // ---- COMMAND EXECUTION ----

        rig.apply_command(&output.command, time_s);
        store.record_cycle(output.command, &report);

        // ---- ARCHIVING ----

        if save_rollouts {
            if let Some(rollout) = output.rollout {
                session.save(format!("rollouts/cycle_{:06}.json", store.num_cycles), rollout);
            }
        }

        // ---- TELEMETRY ----

        if store.is_1_hz_cycle {
            info!(
                "Cycle {}: cmd ({:.2} m/s, {:.3} rad), cost {:.3}, collision {}, {:?}, \
                plan time {:.2} ms (mean {:.2} ms)",
                store.num_cycles,
                output.command.speed_ms,
                output.command.steer_rad,
                report.cost,
                report.has_collision,
                report.impasse_state,
                report.planning_time_s * 1000.0,
                store.mean_planning_time_s() * 1000.0
            );
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match Duration::from_secs_f64(cycle_period_s).checked_sub(cycle_dur) {
            Some(d) => {
                store.num_consec_cycle_overruns = 0;
                thread::sleep(d);
            }
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - cycle_period_s
                );
                store.num_consec_cycle_overruns += 1;
            }
        }

        // Increment cycle counter
        store.num_cycles += 1;
    }
}
