//! # Host Transform Benchmark
//!
//! Measures one full tick (transform, cohort shift, swap) on the rayon
//! backend at a few particle counts.
//!
//! Run with: `cargo bench --bench advect`

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use driftlines::prelude::*;

fn field() -> FieldImage {
    FieldImage::from_fn(360, 180, |x, y| {
        let lat = (90.0 - y as f32).to_radians();
        let lng = (x as f32 - 180.0).to_radians();
        Vec4::new(10.0 * (3.0 * lat).sin(), 5.0 * (2.0 * lng).cos(), 0.0, 1.0)
    })
    .unwrap()
}

fn bench_tick(c: &mut Criterion) {
    let image = TextureSource::ready(field());
    let view = Viewport::new(GeoBounds::GLOBE, 0.0);
    let interval = Duration::from_millis(1);

    let mut group = c.benchmark_group("cpu_tick");
    for num_particles in [1_000u32, 5_000, 20_000] {
        let props = LayerProps {
            num_particles,
            max_age: 100,
            ..Default::default()
        };
        let mut sim = Simulation::new(CpuBackend::new())
            .with_seed(1)
            .with_clock(TickClock::with_interval(interval));
        sim.update(&props, &image, None).unwrap();

        let mut tick = 0u32;
        group.bench_with_input(
            BenchmarkId::from_parameter(num_particles),
            &num_particles,
            |b, _| {
                b.iter(|| {
                    tick += 1;
                    black_box(sim.tick(interval * tick, &view))
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_tick);
criterion_main!(benches);
