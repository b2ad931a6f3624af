//! # Simulation rig
//!
//! Stands in for the vehicle's sensing and actuation when running the
//! planner off-vehicle: a background thread publishes synthetic map data
//! into the map cost source at a fixed cadence, and the actuators are
//! modelled as tracking filters driven by the published commands, with
//! their outputs reported back as measured feedback.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// External
use log::info;
use nalgebra::{Isometry2, Point2, Vector2};
use ndarray::Array2;
use noise::{NoiseFn, Perlin, Seedable};
use serde::Deserialize;

// Internal
use crate::plan::map_cost::{DistanceField, MapSource, OccupancyGrid};
use crate::plan::tracking_filter::TrackingFilter;
use crate::plan::Command;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of cells along each edge of the synthetic map.
const GRID_CELLS: usize = 40;

/// Cell edge length of the synthetic map.
///
/// Units: meters
const GRID_RESOLUTION_M: f64 = 0.5;

/// Map-frame position of the synthetic map's corner, centring it on the
/// vehicle.
///
/// Units: meters
const GRID_ORIGIN_M: f64 = -10.0;

/// Obstacles are never generated within this distance of the vehicle start.
///
/// Units: meters
const CLEAR_RADIUS_M: f64 = 1.5;

/// Distance value reported for cells with no obstacle anywhere on the
/// course.
///
/// Units: meters
const FAR_DISTANCE_M: f64 = 1000.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the simulation rig, loaded from `sim.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct SimParams {
    /// Period between map publications.
    ///
    /// Units: seconds
    pub publish_period_s: f64,

    /// The course to generate.
    pub course: SimCourse,
}

/// The simulation rig.
///
/// Owns the publisher thread (stopped and joined on drop) and the simulated
/// actuators.
pub struct SimRig {
    speed_actuator: TrackingFilter,
    steer_actuator: TrackingFilter,

    stop: Arc<AtomicBool>,
    publisher: Option<thread::JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Synthetic courses the rig can generate.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimCourse {
    /// Free space, no obstacles.
    Flat,

    /// A wall across the vehicle's path.
    Wall {
        /// Distance from the vehicle start to the wall.
        ///
        /// Units: meters
        distance_m: f64,
    },

    /// Perlin-noise generated clutter.
    Clutter {
        seed: u32,

        /// Noise values above this become obstacles. Lower values give
        /// denser clutter; sensible range is roughly 0.2 to 0.6.
        threshold: f64,
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimRig {
    /// Start the rig: spawns the publisher thread feeding the given map
    /// source.
    ///
    /// The actuator filters should be configured identically to the
    /// planner's trackers so the simulated vehicle responds the way the
    /// planner expects.
    pub fn start(
        params: SimParams,
        map: MapSource,
        speed_actuator: TrackingFilter,
        steer_actuator: TrackingFilter,
    ) -> Self {
        info!("Starting simulation rig with course {:?}", params.course);

        let stop = Arc::new(AtomicBool::new(false));

        let publisher = {
            let stop = stop.clone();
            thread::spawn(move || publish_loop(params, map, stop))
        };

        Self {
            speed_actuator,
            steer_actuator,
            stop,
            publisher: Some(publisher),
        }
    }

    /// Drive the simulated actuators with a published command.
    pub fn apply_command(&mut self, command: &Command, time_s: f64) {
        self.speed_actuator.update(command.speed_ms, time_s);
        self.steer_actuator.update(command.steer_rad, time_s);
    }

    /// The simulated actuator positions, reported as measured feedback.
    pub fn feedback(&self) -> (f64, f64) {
        (self.speed_actuator.value(), self.steer_actuator.value())
    }
}

impl Drop for SimRig {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);

        if let Some(publisher) = self.publisher.take() {
            let _ = publisher.join();
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Publisher thread body: renders the course into whatever form the map
/// source ingests and publishes it at the configured cadence.
fn publish_loop(params: SimParams, map: MapSource, stop: Arc<AtomicBool>) {
    let obstacles = generate_obstacles(&params.course);
    let transform = Some(Isometry2::identity());

    while !stop.load(Ordering::Relaxed) {
        match &map {
            MapSource::InflationMap(m) => m.ingest_grid(render_grid(&obstacles), transform),
            MapSource::DistanceMap(m) => m.ingest_field(render_field(&obstacles), transform),
            MapSource::ObstaclePoints(m) => m.ingest_points(obstacles.clone(), transform),
        }

        thread::sleep(Duration::from_secs_f64(params.publish_period_s));
    }
}

/// Generate the course's obstacle points in the map frame.
fn generate_obstacles(course: &SimCourse) -> Vec<Point2<f64>> {
    match course {
        SimCourse::Flat => Vec::new(),

        SimCourse::Wall { distance_m } => {
            let mut points = Vec::new();
            let mut y = GRID_ORIGIN_M;
            while y <= -GRID_ORIGIN_M {
                points.push(Point2::new(*distance_m, y));
                y += GRID_RESOLUTION_M / 2.0;
            }
            points
        }

        SimCourse::Clutter { seed, threshold } => {
            let perlin = Perlin::new().set_seed(*seed);
            let mut points = Vec::new();

            for row in 0..GRID_CELLS {
                for col in 0..GRID_CELLS {
                    let (x, y) = cell_centre(row, col);

                    // Keep the vehicle start clear
                    if x.hypot(y) < CLEAR_RADIUS_M {
                        continue;
                    }

                    if perlin.get([x * 0.3, y * 0.3]) > *threshold {
                        points.push(Point2::new(x, y));
                    }
                }
            }

            points
        }
    }
}

/// Render the obstacle points as an occupancy grid with one ring of
/// inflation.
fn render_grid(obstacles: &[Point2<f64>]) -> OccupancyGrid {
    let mut data: Array2<u8> = Array2::zeros((GRID_CELLS, GRID_CELLS));

    for point in obstacles {
        let col = ((point.x - GRID_ORIGIN_M) / GRID_RESOLUTION_M).floor() as i64;
        let row = ((point.y - GRID_ORIGIN_M) / GRID_RESOLUTION_M).floor() as i64;

        for dr in -1..=1i64 {
            for dc in -1..=1i64 {
                let (r, c) = (row + dr, col + dc);
                if r < 0 || c < 0 || r >= GRID_CELLS as i64 || c >= GRID_CELLS as i64 {
                    continue;
                }

                let cell = &mut data[[r as usize, c as usize]];
                let value = if dr == 0 && dc == 0 { 100u8 } else { 60u8 };
                *cell = (*cell).max(value);
            }
        }
    }

    OccupancyGrid {
        data,
        origin_m: Vector2::new(GRID_ORIGIN_M, GRID_ORIGIN_M),
        resolution_m: GRID_RESOLUTION_M,
    }
}

/// Render the obstacle points as a distance field.
///
/// Brute force over all cells, acceptable at this grid size.
fn render_field(obstacles: &[Point2<f64>]) -> DistanceField {
    let data = Array2::from_shape_fn((GRID_CELLS, GRID_CELLS), |(row, col)| {
        let (x, y) = cell_centre(row, col);
        let centre = Point2::new(x, y);

        obstacles
            .iter()
            .map(|p| (p - centre).norm())
            .fold(FAR_DISTANCE_M, f64::min)
    });

    DistanceField {
        data,
        origin_m: Vector2::new(GRID_ORIGIN_M, GRID_ORIGIN_M),
        resolution_m: GRID_RESOLUTION_M,
    }
}

/// Map-frame centre of the given cell.
fn cell_centre(row: usize, col: usize) -> (f64, f64) {
    (
        GRID_ORIGIN_M + (col as f64 + 0.5) * GRID_RESOLUTION_M,
        GRID_ORIGIN_M + (row as f64 + 0.5) * GRID_RESOLUTION_M,
    )
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::plan::map_cost::{InflationMapParams, MapCostSource, Rectangle};
    use crate::plan::tracking_filter::TrackingFilterParams;

    #[test]
    fn test_flat_course_is_empty() {
        assert!(generate_obstacles(&SimCourse::Flat).is_empty());
    }

    #[test]
    fn test_wall_course_sits_at_distance() {
        let points = generate_obstacles(&SimCourse::Wall { distance_m: 3.0 });

        assert!(!points.is_empty());
        for point in &points {
            assert_eq!(point.x, 3.0);
        }
    }

    #[test]
    fn test_clutter_deterministic_and_clear_at_start() {
        let course = SimCourse::Clutter {
            seed: 7,
            threshold: 0.3,
        };

        let a = generate_obstacles(&course);
        let b = generate_obstacles(&course);
        assert_eq!(a.len(), b.len());

        for point in &a {
            assert!(point.coords.norm() >= CLEAR_RADIUS_M);
        }
    }

    #[test]
    fn test_render_grid_marks_lethal_cell() {
        let grid = render_grid(&[Point2::new(0.25, 0.25)]);

        let idx = grid.index_of(&Point2::new(0.25, 0.25)).unwrap();
        assert_eq!(grid.data[idx], 100);

        // Inflation ring
        let idx = grid.index_of(&Point2::new(0.75, 0.25)).unwrap();
        assert_eq!(grid.data[idx], 60);
    }

    #[test]
    fn test_render_field_distances() {
        let field = render_field(&[Point2::new(0.25, 0.25)]);

        let idx = field.index_of(&Point2::new(0.25, 0.25)).unwrap();
        assert_eq!(field.data[idx], 0.0);

        let idx = field.index_of(&Point2::new(2.25, 0.25)).unwrap();
        assert!((field.data[idx] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_rig_publishes_into_map() {
        let map = MapSource::InflationMap(Arc::new(
            crate::plan::map_cost::InflationMap::new(InflationMapParams {
                lethal_threshold: 90,
                hit_box: Rectangle {
                    x_min: -0.2,
                    x_max: 0.4,
                    y_min: -0.3,
                    y_max: 0.3,
                },
            })
            .unwrap(),
        ));

        let actuator = |rate| {
            TrackingFilter::new(
                TrackingFilterParams {
                    rate,
                    val_min: -1.0,
                    val_max: 2.0,
                },
                0.0,
                0.0,
            )
        };

        let rig = SimRig::start(
            SimParams {
                publish_period_s: 0.005,
                course: SimCourse::Flat,
            },
            map.clone(),
            actuator(2.0),
            actuator(4.0),
        );

        // Give the publisher a few cadences
        thread::sleep(Duration::from_millis(50));

        assert!(map.as_cost_source().is_updated());

        drop(rig);
    }

    #[test]
    fn test_actuators_track_commands() {
        let actuator = |rate| {
            TrackingFilter::new(
                TrackingFilterParams {
                    rate,
                    val_min: -1.0,
                    val_max: 2.0,
                },
                0.0,
                0.0,
            )
        };

        let map = MapSource::InflationMap(Arc::new(
            crate::plan::map_cost::InflationMap::new(InflationMapParams {
                lethal_threshold: 90,
                hit_box: Rectangle {
                    x_min: -0.2,
                    x_max: 0.4,
                    y_min: -0.3,
                    y_max: 0.3,
                },
            })
            .unwrap(),
        ));

        let mut rig = SimRig::start(
            SimParams {
                publish_period_s: 1.0,
                course: SimCourse::Flat,
            },
            map,
            actuator(2.0),
            actuator(4.0),
        );

        rig.apply_command(
            &Command {
                speed_ms: 1.0,
                steer_rad: 0.2,
            },
            0.1,
        );

        let (speed, steer) = rig.feedback();

        // Rate limited toward the command
        assert!((speed - 0.2).abs() < 1e-12);
        assert!(steer > 0.0 && steer <= 0.2);
    }
}
