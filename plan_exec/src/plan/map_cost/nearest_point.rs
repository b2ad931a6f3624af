//! Nearest-obstacle-point cost source.
//!
//! The obstacle point set is bucketed into a coarse uniform grid on ingest,
//! so per-pose nearest-point queries only examine the buckets around the
//! query instead of the whole set.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::Mutex;

// External
use log::warn;
use nalgebra::{Isometry2, Point2};
use serde::Deserialize;

// Internal
use super::{IngestGate, MapCostError, MapCostSource};
use crate::plan::types::{Pose, COLLISION_COST};
use util::maths::lin_map;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for [`NearestPointCache`].
#[derive(Debug, Clone, Deserialize)]
pub struct NearestPointCacheParams {
    /// Poses closer than this to an obstacle point are collisions.
    pub collision_dist_m: f64,

    /// Points further away than this contribute no cost. Must be greater
    /// than `collision_dist_m`.
    pub influence_dist_m: f64,

    /// Cost at the collision distance; cost falls linearly to 0 at the
    /// influence distance.
    pub cost_factor: f64,

    /// Edge length of the cache buckets in meters.
    pub bucket_size_m: f64,
}

/// Cost source over a bucketed obstacle point set.
pub struct NearestPointCache {
    params: NearestPointCacheParams,

    gate: IngestGate,

    snapshot: Mutex<Option<Snapshot>>,

    /// Rings of buckets to search before concluding no point lies within
    /// the influence distance.
    max_ring: i64,
}

struct Snapshot {
    buckets: HashMap<(i64, i64), Vec<Point2<f64>>>,
    map_from_vehicle: Isometry2<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl NearestPointCache {
    pub fn new(params: NearestPointCacheParams) -> Result<Self, MapCostError> {
        if params.influence_dist_m <= params.collision_dist_m {
            return Err(MapCostError::InvalidRadii(
                params.influence_dist_m,
                params.collision_dist_m,
            ));
        }
        if params.bucket_size_m <= 0.0 {
            return Err(MapCostError::InvalidBucketSize(params.bucket_size_m));
        }

        // Any point beyond the influence distance costs 0, so the search
        // never needs to leave this neighbourhood
        let max_ring = (params.influence_dist_m / params.bucket_size_m).ceil() as i64 + 1;

        Ok(Self {
            params,
            gate: IngestGate::new(),
            snapshot: Mutex::new(None),
            max_ring,
        })
    }

    /// Sensor-side ingest of a new obstacle point set, in the map frame.
    pub fn ingest_points(
        &self,
        points: Vec<Point2<f64>>,
        map_from_vehicle: Option<Isometry2<f64>>,
    ) {
        if !self.gate.accepting() {
            return;
        }

        let buckets = self.build_buckets(points);

        let mut snapshot = self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match (map_from_vehicle, snapshot.as_mut()) {
            (Some(tf), _) => {
                *snapshot = Some(Snapshot {
                    buckets,
                    map_from_vehicle: tf,
                });
            }
            (None, Some(snap)) => {
                warn!("NearestPointCache: no transform with points, keeping previous transform");
                snap.buckets = buckets;
            }
            (None, None) => {
                warn!("NearestPointCache: points dropped, no transform has been received yet");
                return;
            }
        }

        self.gate.set_updated();
    }

    fn build_buckets(&self, points: Vec<Point2<f64>>) -> HashMap<(i64, i64), Vec<Point2<f64>>> {
        let mut buckets: HashMap<(i64, i64), Vec<Point2<f64>>> = HashMap::new();

        for point in points {
            buckets
                .entry(self.bucket_of(&point))
                .or_insert_with(Vec::new)
                .push(point);
        }

        buckets
    }

    fn bucket_of(&self, point: &Point2<f64>) -> (i64, i64) {
        (
            (point.x / self.params.bucket_size_m).floor() as i64,
            (point.y / self.params.bucket_size_m).floor() as i64,
        )
    }

    /// Distance from the given map-frame point to the nearest obstacle
    /// point, or `None` if nothing lies within the influence neighbourhood.
    fn nearest_dist(&self, snapshot: &Snapshot, query: &Point2<f64>) -> Option<f64> {
        let (cx, cy) = self.bucket_of(query);

        let mut best: Option<f64> = None;

        for ring in 0..=self.max_ring {
            // Every point in this ring is at least (ring - 1) buckets away,
            // so once the best found distance beats that bound no further
            // ring can improve on it
            if let Some(b) = best {
                if (ring - 1) as f64 * self.params.bucket_size_m > b {
                    break;
                }
            }

            for (bx, by) in ring_buckets(cx, cy, ring) {
                if let Some(points) = snapshot.buckets.get(&(bx, by)) {
                    for point in points {
                        let dist = (point - query).norm();
                        if best.map(|b| dist < b).unwrap_or(true) {
                            best = Some(dist);
                        }
                    }
                }
            }
        }

        best
    }

    fn cost_of(&self, snapshot: &Snapshot, query: &Point2<f64>) -> f64 {
        let distance_m = match self.nearest_dist(snapshot, query) {
            Some(d) => d,
            // No obstacle within the influence neighbourhood
            None => return 0.0,
        };

        if distance_m <= self.params.collision_dist_m {
            COLLISION_COST
        } else if distance_m >= self.params.influence_dist_m {
            0.0
        } else {
            lin_map(
                (self.params.collision_dist_m, self.params.influence_dist_m),
                (self.params.cost_factor, 0.0),
                distance_m,
            )
        }
    }
}

impl MapCostSource for NearestPointCache {
    fn distance_cost(&self, pose: &Pose) -> f64 {
        self.distance_cost_batch(std::slice::from_ref(pose))[0]
    }

    fn distance_cost_batch(&self, poses: &[Pose]) -> Vec<f64> {
        let snapshot = self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match snapshot.as_ref() {
            Some(snap) => poses
                .iter()
                .map(|p| self.cost_of(snap, &(snap.map_from_vehicle * p.position())))
                .collect(),
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
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// The bucket coordinates forming the square ring at chebyshev distance
/// `ring` around `(cx, cy)`.
fn ring_buckets(cx: i64, cy: i64, ring: i64) -> Vec<(i64, i64)> {
    if ring == 0 {
        return vec![(cx, cy)];
    }

    let mut cells = Vec::with_capacity((8 * ring) as usize);

    for dx in -ring..=ring {
        cells.push((cx + dx, cy - ring));
        cells.push((cx + dx, cy + ring));
    }
    for dy in (-ring + 1)..ring {
        cells.push((cx - ring, cy + dy));
        cells.push((cx + ring, cy + dy));
    }

    cells
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
