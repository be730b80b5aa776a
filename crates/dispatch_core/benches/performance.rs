//! Performance benchmarks for dispatch_core using Criterion.rs.

use std::sync::Arc;

use chrono::NaiveDateTime;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dispatch_core::clock::{ONE_HOUR_MS, ONE_SEC_MS};
use dispatch_core::demand::{BookingRequest, ReplayDemand};
use dispatch_core::ecs::{BookingId, Vehicle, VehicleId};
use dispatch_core::engine::{Engine, EngineParts};
use dispatch_core::matching::{
    BatchMatcher, GreedyMatcher, IdleVehicle, Matcher, PendingBooking,
};
use dispatch_core::routing::{LinearRouter, Router};
use dispatch_core::test_helpers::test_location_offset;
use h3o::{LatLng, Resolution};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_point(rng: &mut StdRng) -> LatLng {
    test_location_offset(rng.gen_range(-0.03..0.03), rng.gen_range(-0.03..0.03))
}

fn engine(vehicles: usize, bookings: usize, seed: u64) -> Engine {
    let mut rng = StdRng::seed_from_u64(seed);
    let requests: Vec<BookingRequest> = (0..bookings as u64)
        .map(|id| BookingRequest {
            id: BookingId(id),
            origin: random_point(&mut rng),
            destination: random_point(&mut rng),
            request_time: rng.gen_range(0..ONE_HOUR_MS),
        })
        .collect();
    let fleet: Vec<Vehicle> = (0..vehicles as u64)
        .map(|id| Vehicle::new(VehicleId(id), random_point(&mut rng)))
        .collect();
    let router: Arc<dyn Router> = Arc::new(LinearRouter::new(30.0));

    Engine::new(EngineParts {
        starting_time: NaiveDateTime::parse_from_str("2019-02-01 08:00:00", "%Y-%m-%d %H:%M:%S")
            .expect("epoch"),
        duration_ms: ONE_HOUR_MS,
        clock_step_ms: 10 * ONE_SEC_MS,
        max_pending_ms: 10 * 60 * ONE_SEC_MS,
        resolution: Resolution::Nine,
        demand: Box::new(ReplayDemand::new(requests)),
        vehicles: fleet,
        matcher: Box::new(GreedyMatcher::new(router.clone(), 600.0)),
        fleet_router: router,
        map_matcher: None,
        demand_stats: None,
    })
}

fn bench_simulation_run(c: &mut Criterion) {
    let scenarios = vec![("small", 20, 200), ("medium", 100, 1000), ("large", 300, 3000)];

    let mut group = c.benchmark_group("simulation_run");
    group.sample_size(10);
    for (name, vehicles, bookings) in scenarios {
        group.bench_with_input(
            BenchmarkId::from_parameter(name),
            &(vehicles, bookings),
            |b, &(vehicles, bookings)| {
                b.iter(|| {
                    let mut engine = engine(vehicles, bookings, 42);
                    black_box(engine.run().expect("run"));
                });
            },
        );
    }
    group.finish();
}

fn bench_matchers(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let router: Arc<dyn Router> = Arc::new(LinearRouter::new(30.0));

    let mut group = c.benchmark_group("matchers");
    for size in [10usize, 50, 100] {
        let pending: Vec<PendingBooking> = (0..size as u64)
            .map(|id| PendingBooking {
                id: BookingId(id),
                origin: random_point(&mut rng),
                request_time: id,
            })
            .collect();
        let idle: Vec<IdleVehicle> = (0..size as u64)
            .map(|id| IdleVehicle {
                id: VehicleId(id),
                position: random_point(&mut rng),
            })
            .collect();

        let greedy = GreedyMatcher::new(router.clone(), 600.0);
        group.bench_with_input(BenchmarkId::new("greedy", size), &size, |b, _| {
            b.iter(|| black_box(greedy.match_bookings(&pending, &idle)));
        });

        let batch = BatchMatcher::new(router.clone(), 600.0);
        group.bench_with_input(BenchmarkId::new("batch", size), &size, |b, _| {
            b.iter(|| black_box(batch.match_bookings(&pending, &idle)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_simulation_run, bench_matchers);
criterion_main!(benches);
