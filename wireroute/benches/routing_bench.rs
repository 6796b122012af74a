use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::path::PathBuf;
use wireroute::{compute_connections, route_move, AvoidanceMap, LoadedScenario, Scenario};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn load(name: &str) -> LoadedScenario {
    Scenario::from_path(&fixture_path(name))
        .and_then(|s| s.build())
        .expect("benchmark fixture should load")
}

fn bench_route_bus(c: &mut Criterion) {
    let s = load("bus.json");
    c.bench_function("route_bus_move", |b| {
        b.iter(|| {
            route_move(
                black_box(&s.circuit),
                black_box(&s.selection),
                black_box(30),
                black_box(20),
                &s.config,
            )
        });
    });
}

fn bench_route_crossing(c: &mut Criterion) {
    let s = load("crossing.json");
    c.bench_function("route_crossing_move", |b| {
        b.iter(|| route_move(black_box(&s.circuit), black_box(&s.selection), 40, 0, &s.config));
    });
}

fn bench_build_avoidance_map(c: &mut Criterion) {
    let s = load("bus.json");
    c.bench_function("build_fixed_avoidance_map", |b| {
        b.iter(|| {
            AvoidanceMap::from_elements(
                s.circuit
                    .elements()
                    .filter(|(id, _)| !s.selection.contains(*id))
                    .map(|(_, e)| e),
                0,
                0,
            )
        });
    });
}

fn bench_compute_connections(c: &mut Criterion) {
    let s = load("bus.json");
    c.bench_function("compute_connections", |b| {
        b.iter(|| compute_connections(black_box(&s.circuit), black_box(&s.selection)));
    });
}

criterion_group!(
    benches,
    bench_route_bus,
    bench_route_crossing,
    bench_build_avoidance_map,
    bench_compute_connections
);
criterion_main!(benches);
