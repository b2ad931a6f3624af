//! # Map cost sources
//!
//! A map cost source converts sensor-derived spatial data into a per-pose
//! traversal cost for the cost function. Three implementations are
//! provided, selected at startup by [`MapSourceKind`]:
//!
//! - [`InflationMap`] - an inflated occupancy grid,
//! - [`DistanceMap`] - a precomputed distance field,
//! - [`NearestPointCache`] - a bucketed cache over an obstacle point set.
//!
//! All implementations share the same staleness/update protocol: sensor
//! ingest happens on a different execution context to the control loop, so
//! the control loop brackets its use of a snapshot with
//! [`MapCostSource::pause_ingest`]/[`MapCostSource::resume_ingest`] and the
//! ingest path checks the accepting flag before mutating. A snapshot (data
//! plus the vehicle-to-map transform) is always replaced as a unit, so a
//! paused read can never observe a grid paired with a stale transform.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod distance_map;
mod inflation_map;
mod nearest_point;

pub use distance_map::{DistanceField, DistanceMap, DistanceMapParams};
pub use inflation_map::{InflationMap, InflationMapParams};
pub use nearest_point::{NearestPointCache, NearestPointCacheParams};

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// External
use nalgebra::{Point2, Vector2};
use ndarray::Array2;
use serde::Deserialize;

// Internal
use super::types::Pose;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Polymorphic source of per-pose traversal costs.
///
/// Costs are non-negative, with [`COLLISION_COST`](super::types::COLLISION_COST)
/// (negative) reserved for collision/untraversable poses. Poses outside the
/// source's known extent cost exactly 0 ("unknown, assume free").
pub trait MapCostSource: Send + Sync {
    /// Traversal cost of a single vehicle-frame pose.
    fn distance_cost(&self, pose: &Pose) -> f64;

    /// Batched form of [`MapCostSource::distance_cost`].
    ///
    /// Equivalent to mapping the single-pose form over `poses`;
    /// implementations override this to share the snapshot lock and
    /// transform across the whole rollout.
    fn distance_cost_batch(&self, poses: &[Pose]) -> Vec<f64> {
        poses.iter().map(|p| self.distance_cost(p)).collect()
    }

    /// True if a new snapshot has been committed since the last
    /// [`MapCostSource::mark_stale`].
    fn is_updated(&self) -> bool;

    /// Mark the current snapshot as consumed.
    fn mark_stale(&self);

    /// Stop accepting ingest until [`MapCostSource::resume_ingest`] is
    /// called. While paused no sensor callback may mutate the snapshot.
    fn pause_ingest(&self);

    /// Resume accepting ingest.
    fn resume_ingest(&self);
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Update-staleness gate shared by all map cost sources.
///
/// Two flags: `updated` latches when a snapshot is committed and is cleared
/// by `mark_stale`; `accepting` gates the ingest path while the control loop
/// is reading.
#[derive(Debug)]
pub struct IngestGate {
    updated: AtomicBool,
    accepting: AtomicBool,
}

/// An axis-aligned rectangle in the vehicle frame.
///
/// Used as the exclusion "hit box" covering the vehicle's own footprint, so
/// rollout poses over the vehicle itself are never reported as collisions.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Rectangle {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

/// An occupancy grid as delivered by the mapping pipeline.
///
/// `data[[row, col]]` is the occupancy value of the cell at
/// `origin + (col + 0.5, row + 0.5) * resolution` in the map frame.
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    pub data: Array2<u8>,

    /// Map-frame position of the grid's (0, 0) cell corner, in meters.
    pub origin_m: Vector2<f64>,

    /// Cell edge length in meters.
    pub resolution_m: f64,
}

/// Parameters selecting and configuring the map cost source.
#[derive(Debug, Clone, Deserialize)]
pub struct MapSourceParams {
    /// Which implementation to construct.
    pub kind: MapSourceKind,

    pub inflation_map: InflationMapParams,
    pub distance_map: DistanceMapParams,
    pub obstacle_points: NearestPointCacheParams,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The closed set of map cost source implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapSourceKind {
    InflationMap,
    DistanceMap,
    ObstaclePoints,
}

/// The constructed map source, tagged by implementation.
///
/// The planner only needs the [`MapCostSource`] view, but the ingest methods
/// are implementation specific, so the concrete `Arc` is kept available for
/// whatever feeds the source.
#[derive(Clone)]
pub enum MapSource {
    InflationMap(Arc<InflationMap>),
    DistanceMap(Arc<DistanceMap>),
    ObstaclePoints(Arc<NearestPointCache>),
}

/// Errors raised while constructing a map cost source.
#[derive(Debug, thiserror::Error)]
pub enum MapCostError {
    #[error("lethal_threshold must be greater than 0, got {0}")]
    InvalidLethalThreshold(u8),

    #[error(
        "influence radius ({0} m) must be greater than the collision radius ({1} m)"
    )]
    InvalidRadii(f64, f64),

    #[error("bucket_size_m must be positive, got {0}")]
    InvalidBucketSize(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl IngestGate {
    pub fn new() -> Self {
        Self {
            updated: AtomicBool::new(false),
            accepting: AtomicBool::new(true),
        }
    }

    /// True if the ingest path is currently allowed to mutate the snapshot.
    pub fn accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Latch the updated flag, called by ingest after committing a snapshot.
    pub fn set_updated(&self) {
        self.updated.store(true, Ordering::SeqCst);
    }

    pub fn is_updated(&self) -> bool {
        self.updated.load(Ordering::SeqCst)
    }

    pub fn mark_stale(&self) {
        self.updated.store(false, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.accepting.store(true, Ordering::SeqCst);
    }
}

impl Default for IngestGate {
    fn default() -> Self {
        Self::new()
    }
}

impl Rectangle {
    /// True if the given vehicle-frame point lies inside the rectangle
    /// (inclusive).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }
}

impl OccupancyGrid {
    /// Grid indices (row, col) of the given map-frame point, or `None` if it
    /// lies outside the grid.
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

impl MapSource {
    /// Construct the configured map source implementation.
    ///
    /// An invalid configuration is an error here and fatal at startup, the
    /// planner never runs with an undefined map source.
    pub fn from_params(params: &MapSourceParams) -> Result<Self, MapCostError> {
        match params.kind {
            MapSourceKind::InflationMap => Ok(MapSource::InflationMap(Arc::new(
                InflationMap::new(params.inflation_map.clone())?,
            ))),
            MapSourceKind::DistanceMap => Ok(MapSource::DistanceMap(Arc::new(
                DistanceMap::new(params.distance_map.clone())?,
            ))),
            MapSourceKind::ObstaclePoints => Ok(MapSource::ObstaclePoints(Arc::new(
                NearestPointCache::new(params.obstacle_points.clone())?,
            ))),
        }
    }

    /// The planner-facing view of the source.
    pub fn as_cost_source(&self) -> Arc<dyn MapCostSource> {
        match self {
            MapSource::InflationMap(m) => m.clone(),
            MapSource::DistanceMap(m) => m.clone(),
            MapSource::ObstaclePoints(m) => m.clone(),
        }
    }
}
