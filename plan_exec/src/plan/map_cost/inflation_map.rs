//! Inflated occupancy grid cost source.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::Mutex;

// External
use log::warn;
use nalgebra::Isometry2;
use serde::Deserialize;

// Internal
use super::{IngestGate, MapCostError, MapCostSource, OccupancyGrid, Rectangle};
use crate::plan::types::{Pose, COLLISION_COST};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for [`InflationMap`].
#[derive(Debug, Clone, Deserialize)]
pub struct InflationMapParams {
    /// Occupancy values strictly above this are lethal. Must be greater
    /// than 0.
    pub lethal_threshold: u8,

    /// Vehicle-frame footprint inside which a pose is never reported as a
    /// collision.
    pub hit_box: Rectangle,
}

/// Cost source over an inflated occupancy grid.
///
/// Queries transform the vehicle-frame pose into the map frame with the
/// snapshot's transform, then read the occupancy value at the pose's cell.
/// A lethal value outside the hit box is a collision; anything else is the
/// raw occupancy value as cost, and anything off-grid costs 0.
pub struct InflationMap {
    params: InflationMapParams,

    gate: IngestGate,

    /// The committed snapshot. Grid and transform are replaced together
    /// under this lock so readers never see a torn pair.
    snapshot: Mutex<Option<Snapshot>>,
}

struct Snapshot {
    grid: OccupancyGrid,
    map_from_vehicle: Isometry2<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl InflationMap {
    pub fn new(params: InflationMapParams) -> Result<Self, MapCostError> {
        if params.lethal_threshold == 0 {
            return Err(MapCostError::InvalidLethalThreshold(
                params.lethal_threshold,
            ));
        }

        Ok(Self {
            params,
            gate: IngestGate::new(),
            snapshot: Mutex::new(None),
        })
    }

    /// Sensor-side ingest of a new occupancy grid.
    ///
    /// A `None` transform means the pose lookup failed upstream; the grid is
    /// still accepted against the previous transform if one exists,
    /// matching the local-recovery policy for transform failures. A grid
    /// with no transform ever received is not committed, queries keep
    /// returning 0 until one arrives.
    pub fn ingest_grid(&self, grid: OccupancyGrid, map_from_vehicle: Option<Isometry2<f64>>) {
        if !self.gate.accepting() {
            return;
        }

        let mut snapshot = self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match (map_from_vehicle, snapshot.as_mut()) {
            (Some(tf), _) => {
                *snapshot = Some(Snapshot {
                    grid,
                    map_from_vehicle: tf,
                });
            }
            (None, Some(snap)) => {
                warn!("InflationMap: no transform with grid, keeping previous transform");
                snap.grid = grid;
            }
            (None, None) => {
                warn!("InflationMap: grid dropped, no transform has been received yet");
                return;
            }
        }

        self.gate.set_updated();
    }

    fn cost_of(&self, snapshot: &Snapshot, pose: &Pose) -> f64 {
        let point_map = snapshot.map_from_vehicle * pose.position();

        let occupancy = match snapshot.grid.index_of(&point_map) {
            Some(idx) => snapshot.grid.data[idx],
            // Outside the known extent: unknown, assume free
            None => return 0.0,
        };

        if !self.params.hit_box.contains(pose.x, pose.y)
            && occupancy > self.params.lethal_threshold
        {
            return COLLISION_COST;
        }

        occupancy as f64
    }
}

impl MapCostSource for InflationMap {
    fn distance_cost(&self, pose: &Pose) -> f64 {
        self.distance_cost_batch(std::slice::from_ref(pose))[0]
    }

    fn distance_cost_batch(&self, poses: &[Pose]) -> Vec<f64> {
        let snapshot = self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match snapshot.as_ref() {
            Some(snap) => poses.iter().map(|p| self.cost_of(snap, p)).collect(),
            None => vec![0.0; poses.len()],
        }
    }

    fn is_updated(&self) -> bool {
        self.gate.is_updated()
    }

    fn mark_stale(&self) {
        self.gate.mark_stale();
    }

    fn pause_ingest(&self) {
        self.gate.pause();
    }

    fn resume_ingest(&self) {
        self.gate.resume();
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Vector2;
    use ndarray::Array2;

    fn test_params() -> InflationMapParams {
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

    /// 10 x 10 m grid at 0.5 m resolution, origin at (0, 0), one lethal cell
    /// covering (5.0..5.5, 5.0..5.5)
    fn test_grid() -> OccupancyGrid {
        let mut data = Array2::zeros((20, 20));
        data[[10, 10]] = 100u8;
        data[[3, 4]] = 50u8;

        OccupancyGrid {
            data,
            origin_m: Vector2::new(0.0, 0.0),
            resolution_m: 0.5,
        }
    }

    fn test_map() -> InflationMap {
        let map = InflationMap::new(test_params()).unwrap();
        map.ingest_grid(test_grid(), Some(Isometry2::identity()));
        map
    }

    #[test]
    fn test_zero_lethal_threshold_rejected() {
        let mut params = test_params();
        params.lethal_threshold = 0;
        assert!(InflationMap::new(params).is_err());
    }

    #[test]
    fn test_out_of_bounds_costs_exactly_zero() {
        let map = test_map();

        assert_eq!(map.distance_cost(&Pose::new(-1.0, 5.0, 0.0)), 0.0);
        assert_eq!(map.distance_cost(&Pose::new(5.0, 100.0, 0.0)), 0.0);
        assert_eq!(map.distance_cost(&Pose::new(-50.0, -50.0, 0.0)), 0.0);
    }

    #[test]
    fn test_lethal_cell_is_collision() {
        let map = test_map();

        assert_eq!(map.distance_cost(&Pose::new(5.25, 5.25, 0.0)), COLLISION_COST);
    }

    #[test]
    fn test_non_lethal_cell_costs_occupancy() {
        let map = test_map();

        // data[[3, 4]] = 50 covers x in 2.0..2.5, y in 1.5..2.0
        assert_eq!(map.distance_cost(&Pose::new(2.25, 1.75, 0.0)), 50.0);
        assert_eq!(map.distance_cost(&Pose::new(1.0, 1.0, 0.0)), 0.0);
    }

    #[test]
    fn test_hit_box_never_collides() {
        let map = InflationMap::new(test_params()).unwrap();

        // Lethal occupancy directly under the vehicle origin
        let mut data = Array2::zeros((20, 20));
        data[[0, 0]] = 100u8;
        map.ingest_grid(
            OccupancyGrid {
                data,
                origin_m: Vector2::new(-0.25, -0.25),
                resolution_m: 0.5,
            },
            Some(Isometry2::identity()),
        );

        // Pose inside the hit box: occupancy returned as plain cost
        let cost = map.distance_cost(&Pose::new(0.0, 0.0, 0.0));
        assert_eq!(cost, 100.0);
    }

    #[test]
    fn test_pose_transformed_into_map_frame() {
        let map = InflationMap::new(test_params()).unwrap();
        map.ingest_grid(
            test_grid(),
            // Vehicle sits at (4.25, 5.25) in the map frame, facing +x
            Some(Isometry2::new(Vector2::new(4.25, 5.25), 0.0)),
        );

        // One meter ahead of the vehicle is the lethal cell at (5.25, 5.25)
        assert_eq!(map.distance_cost(&Pose::new(1.0, 0.0, 0.0)), COLLISION_COST);
    }

    #[test]
    fn test_pause_blocks_ingest() {
        let map = test_map();
        map.mark_stale();
        map.pause_ingest();

        map.ingest_grid(test_grid(), Some(Isometry2::identity()));
        assert!(!map.is_updated());

        map.resume_ingest();
        map.ingest_grid(test_grid(), Some(Isometry2::identity()));
        assert!(map.is_updated());
    }

    #[test]
    fn test_no_snapshot_costs_zero() {
        let map = InflationMap::new(test_params()).unwrap();

        assert_eq!(map.distance_cost(&Pose::new(1.0, 1.0, 0.0)), 0.0);
        assert!(!map.is_updated());
    }

    #[test]
    fn test_missing_transform_keeps_previous() {
        let map = InflationMap::new(test_params()).unwrap();

        // First grid without a transform is dropped entirely
        map.ingest_grid(test_grid(), None);
        assert!(!map.is_updated());

        map.ingest_grid(test_grid(), Some(Isometry2::identity()));
        map.mark_stale();

        // Later grid without a transform reuses the identity transform
        let mut data = Array2::zeros((20, 20));
        data[[2, 2]] = 100u8;
        map.ingest_grid(
            OccupancyGrid {
                data,
                origin_m: Vector2::new(0.0, 0.0),
                resolution_m: 0.5,
            },
            None,
        );

        assert!(map.is_updated());
        assert_eq!(map.distance_cost(&Pose::new(1.25, 1.25, 0.0)), COLLISION_COST);
    }
}
