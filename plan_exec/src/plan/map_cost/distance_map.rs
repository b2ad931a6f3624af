//! Precomputed distance field cost source.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::Mutex;

// External
use log::warn;
use nalgebra::{Isometry2, Point2, Vector2};
use ndarray::Array2;
use serde::Deserialize;

// Internal
use super::{IngestGate, MapCostError, MapCostSource};
use crate::plan::types::{Pose, COLLISION_COST};
use util::maths::lin_map;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for [`DistanceMap`].
#[derive(Debug, Clone, Deserialize)]
pub struct DistanceMapParams {
    /// Poses closer than this to the nearest obstacle are collisions.
    pub collision_radius_m: f64,

    /// Obstacles further away than this contribute no cost. Must be greater
    /// than `collision_radius_m`.
    pub influence_radius_m: f64,

    /// Cost at the collision radius; cost falls linearly to 0 at the
    /// influence radius.
    pub cost_factor: f64,
}

/// A field of distances to the nearest obstacle, as delivered by the
/// mapping pipeline.
///
/// `data[[row, col]]` is the distance in meters from the cell at
/// `origin + (col + 0.5, row + 0.5) * resolution` (map frame) to the
/// nearest obstacle.
#[derive(Debug, Clone)]
pub struct DistanceField {
    pub data: Array2<f64>,

    /// Map-frame position of the field's (0, 0) cell corner, in meters.
    pub origin_m: Vector2<f64>,

    /// Cell edge length in meters.
    pub resolution_m: f64,
}

/// Cost source over a precomputed distance field.
pub struct DistanceMap {
    params: DistanceMapParams,

    gate: IngestGate,

    snapshot: Mutex<Option<Snapshot>>,
}

struct Snapshot {
    field: DistanceField,
    map_from_vehicle: Isometry2<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DistanceField {
    /// Field indices (row, col) of the given map-frame point, or `None` if
    /// it lies outside the field.
    pub fn index_of(&self, point_map: &Point2<f64>) -> Option<(usize, usize)> {
        let col = ((point_map.x - self.origin_m.x) / self.resolution_m).floor();
        let row = ((point_map.y - self.origin_m.y) / self.resolution_m).floor();

        if col < 0.0 || row < 0.0 {
            return None;
        }

        let (rows, cols) = self.data.dim();
        let (row, col) = (row as usize, col as usize);

        if row >= rows || col >= cols {
            None
        } else {
            Some((row, col))
        }
    }
}

impl DistanceMap {
    pub fn new(params: DistanceMapParams) -> Result<Self, MapCostError> {
        if params.influence_radius_m <= params.collision_radius_m {
            return Err(MapCostError::InvalidRadii(
                params.influence_radius_m,
                params.collision_radius_m,
            ));
        }

        Ok(Self {
            params,
            gate: IngestGate::new(),
            snapshot: Mutex::new(None),
        })
    }

    /// Sensor-side ingest of a new distance field.
    pub fn ingest_field(&self, field: DistanceField, map_from_vehicle: Option<Isometry2<f64>>) {
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
                    field,
                    map_from_vehicle: tf,
                });
            }
            (None, Some(snap)) => {
                warn!("DistanceMap: no transform with field, keeping previous transform");
                snap.field = field;
            }
            (None, None) => {
                warn!("DistanceMap: field dropped, no transform has been received yet");
                return;
            }
        }

        self.gate.set_updated();
    }

    fn cost_of(&self, snapshot: &Snapshot, pose: &Pose) -> f64 {
        let point_map = snapshot.map_from_vehicle * pose.position();

        let distance_m = match snapshot.field.index_of(&point_map) {
            Some(idx) => snapshot.field.data[idx],
            None => return 0.0,
        };

        if distance_m <= self.params.collision_radius_m {
            COLLISION_COST
        } else if distance_m >= self.params.influence_radius_m {
            0.0
        } else {
            lin_map(
                (
                    self.params.collision_radius_m,
                    self.params.influence_radius_m,
                ),
                (self.params.cost_factor, 0.0),
                distance_m,
            )
        }
    }
}

impl MapCostSource for DistanceMap {
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

    fn test_params() -> DistanceMapParams {
        DistanceMapParams {
            collision_radius_m: 0.5,
            influence_radius_m: 2.5,
            cost_factor: 10.0,
        }
    }

    /// 10 x 10 m field at 1 m resolution where each cell's distance is its
    /// x coordinate (an obstacle wall along x = 0)
    fn test_field() -> DistanceField {
        let data = Array2::from_shape_fn((10, 10), |(_, col)| col as f64 + 0.5);

        DistanceField {
            data,
            origin_m: Vector2::new(0.0, 0.0),
            resolution_m: 1.0,
        }
    }

    fn test_map() -> DistanceMap {
        let map = DistanceMap::new(test_params()).unwrap();
        map.ingest_field(test_field(), Some(Isometry2::identity()));
        map
    }

    #[test]
    fn test_invalid_radii_rejected() {
        let mut params = test_params();
        params.influence_radius_m = 0.4;
        assert!(DistanceMap::new(params).is_err());
    }

    #[test]
    fn test_inside_collision_radius_is_collision() {
        let map = test_map();

        // First column has distance 0.5 <= collision radius
        assert_eq!(map.distance_cost(&Pose::new(0.5, 5.0, 0.0)), COLLISION_COST);
    }

    #[test]
    fn test_cost_falls_linearly_with_distance() {
        let map = test_map();

        // Column 1 has distance 1.5: halfway between 0.5 and 2.5
        let cost = map.distance_cost(&Pose::new(1.5, 5.0, 0.0));
        assert!((cost - 5.0).abs() < 1e-9);

        // Column 4 has distance 4.5 >= influence radius
        assert_eq!(map.distance_cost(&Pose::new(4.5, 5.0, 0.0)), 0.0);
    }

    #[test]
    fn test_out_of_bounds_costs_exactly_zero() {
        let map = test_map();

        assert_eq!(map.distance_cost(&Pose::new(-1.0, 5.0, 0.0)), 0.0);
        assert_eq!(map.distance_cost(&Pose::new(5.0, 11.0, 0.0)), 0.0);
    }

    #[test]
    fn test_pause_blocks_ingest() {
        let map = test_map();
        map.mark_stale();
        map.pause_ingest();

        map.ingest_field(test_field(), Some(Isometry2::identity()));
        assert!(!map.is_updated());

        map.resume_ingest();
        map.ingest_field(test_field(), Some(Isometry2::identity()));
        assert!(map.is_updated());
    }
}
