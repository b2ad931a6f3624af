//! Benchmark of one cost function evaluation over a cluttered map.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::{Isometry2, Vector2};
use ndarray::Array2;
use noise::{NoiseFn, Perlin, Seedable};

// Internal
use plan_lib::plan::cost_function::{CostFunction, CostWeights};
use plan_lib::plan::map_cost::{InflationMap, InflationMapParams, OccupancyGrid, Rectangle};
use plan_lib::plan::tracking_filter::{TrackingFilter, TrackingFilterParams};
use plan_lib::plan::types::Controls;
use plan_lib::plan::vehicle_model::{BicycleModel, BicycleModelParams};

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// A 20 x 20 m grid of Perlin clutter at 0.5 m resolution.
fn clutter_grid() -> OccupancyGrid {
    let perlin = Perlin::new().set_seed(13);

    let data = Array2::from_shape_fn((40, 40), |(row, col)| {
        let x = -10.0 + (col as f64 + 0.5) * 0.5;
        let y = -10.0 + (row as f64 + 0.5) * 0.5;

        let v = perlin.get([x * 0.3, y * 0.3]);
        if v > 0.4 {
            100u8
        } else {
            (v.max(0.0) * 100.0) as u8
        }
    });

    OccupancyGrid {
        data,
        origin_m: Vector2::new(-10.0, -10.0),
        resolution_m: 0.5,
    }
}

fn bench_model() -> BicycleModel {
    let speed_filter = TrackingFilter::new(
        TrackingFilterParams {
            rate: 2.0,
            val_min: -1.0,
            val_max: 2.0,
        },
        0.5,
        0.0,
    );
    let steer_filter = TrackingFilter::new(
        TrackingFilterParams {
            rate: 4.0,
            val_min: -0.4,
            val_max: 0.4,
        },
        0.0,
        0.0,
    );

    BicycleModel::new(
        BicycleModelParams {
            wheelbase_m: 0.8,
            dt_s: 0.1,
            segment_size: 5,
        },
        speed_filter,
        steer_filter,
    )
}

fn bench_cost_function(c: &mut Criterion) {
    let map = InflationMap::new(InflationMapParams {
        lethal_threshold: 90,
        hit_box: Rectangle {
            x_min: -0.2,
            x_max: 0.4,
            y_min: -0.3,
            y_max: 0.3,
        },
    })
    .unwrap();
    map.ingest_grid(clutter_grid(), Some(Isometry2::identity()));

    let model = bench_model();

    let weights = CostWeights {
        k_map_cost: 1.0,
        k_speed: 1.0,
        k_steering: 10.0,
        k_angle: 10.0,
        collision_penalty: 1000.0,
        gamma: 1.01,
    };

    let cost_fn = CostFunction::new(&weights, &model, &map);

    let mut controls = Controls::zeros(1, 4);
    controls.0[(0, 0)] = 0.1;
    controls.0[(0, 1)] = -0.2;
    controls.0[(0, 2)] = 0.3;
    controls.0[(0, 3)] = 0.0;

    c.bench_function("cost_function_evaluate", |b| {
        b.iter(|| cost_fn.evaluate(black_box(&controls)))
    });
}

criterion_group!(benches, bench_cost_function);
criterion_main!(benches);
