//! Benchmarks for the deformation tick.

use bevy::math::Vec3;
use criterion::{Criterion, criterion_group, criterion_main};
use crumple::deform::commit::RecordingSink;
use crumple::{DeformConfig, DeformableBody, ImpactEvent, Layer, MeshSurface};

/// `n`x`n` flat grid with unit extent, triangulated.
fn grid_surface(n: usize, config: DeformConfig) -> MeshSurface {
    let step = 1.0 / (n - 1) as f32;
    let mut positions = Vec::with_capacity(n * n);
    for z in 0..n {
        for x in 0..n {
            positions.push(Vec3::new(x as f32 * step - 0.5, 0.0, z as f32 * step - 0.5));
        }
    }
    let mut indices = Vec::with_capacity((n - 1) * (n - 1) * 6);
    for z in 0..n - 1 {
        for x in 0..n - 1 {
            let i = (z * n + x) as u32;
            let row = n as u32;
            indices.extend_from_slice(&[i, i + row, i + 1, i + 1, i + row, i + row + 1]);
        }
    }
    MeshSurface::new(&positions, Some(indices), config).unwrap()
}

fn config() -> DeformConfig {
    DeformConfig::new()
        .with_radius(0.3)
        .with_min_impact_speed(0.0)
        .with_cooldown(0.0)
}

fn bench_surface_step(c: &mut Criterion) {
    c.bench_function("surface_64x64_60_steps_with_impacts", |b| {
        b.iter(|| {
            let mut surface = grid_surface(64, config());
            for tick in 0..60 {
                let impacts = if tick % 10 == 0 {
                    vec![ImpactEvent::new(Vec3::ZERO, Vec3::new(0.0, -20.0, 0.0), Layer(0), tick as f64 / 60.0)]
                } else {
                    Vec::new()
                };
                surface.step(1.0 / 60.0, &impacts);
            }
            surface.max_plastic_offset()
        });
    });
}

fn bench_commit(c: &mut Criterion) {
    c.bench_function("surface_64x64_commit", |b| {
        let mut surface = grid_surface(64, config());
        let mut sink = RecordingSink::default();
        b.iter(|| {
            surface.reset();
            surface.commit(&mut sink, None).unwrap()
        });
    });
}

fn bench_body_parallel(c: &mut Criterion) {
    c.bench_function("body_8x_32x32_60_steps", |b| {
        b.iter(|| {
            let mut body = DeformableBody::new((0..8).map(|_| grid_surface(32, config())).collect());
            let hit = [ImpactEvent::new(Vec3::ZERO, Vec3::new(0.0, -20.0, 0.0), Layer(0), 0.0)];
            body.step(1.0 / 60.0, &hit);
            for _ in 1..60 {
                body.step(1.0 / 60.0, &[]);
            }
            body.is_dirty()
        });
    });
}

criterion_group!(benches, bench_surface_step, bench_commit, bench_body_parallel);
criterion_main!(benches);
