use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rigid_reactor::*;

fn pile_world(parallel: bool, count: usize) -> World {
    let mut world = World::builder()
        .gravity(Vec3::new(0.0, -9.81, 0.0))
        .parallel(parallel)
        .build();
    world.create_static_box(
        Vec3::new(50.0, 0.5, 50.0),
        Vec3::new(0.0, -0.5, 0.0),
        Quat::IDENTITY,
    );

    let side = (count as f32).cbrt().ceil() as usize;
    let mut spawned = 0;
    'outer: for y in 0..side {
        for x in 0..side {
            for z in 0..side {
                if spawned == count {
                    break 'outer;
                }
                world.create_dynamic_sphere(
                    0.4,
                    Vec3::new(x as f32, 1.0 + y as f32, z as f32),
                    Quat::IDENTITY,
                    1.0,
                );
                spawned += 1;
            }
        }
    }
    world
}

fn bench_step_sequential(c: &mut Criterion) {
    let mut world = pile_world(false, 256);
    c.bench_function("step_256_spheres_sequential", |b| {
        b.iter(|| world.step(black_box(1.0 / 60.0)))
    });
}

fn bench_step_parallel(c: &mut Criterion) {
    let mut world = pile_world(true, 256);
    c.bench_function("step_256_spheres_parallel", |b| {
        b.iter(|| world.step(black_box(1.0 / 60.0)))
    });
}

fn bench_raycast(c: &mut Criterion) {
    let mut world = pile_world(false, 512);
    world.step(1.0 / 60.0);
    c.bench_function("raycast_512_spheres", |b| {
        b.iter(|| {
            world.raycast(
                black_box(Vec3::new(-10.0, 2.0, 3.0)),
                black_box(Vec3::X),
                200.0,
            )
        })
    });
}

criterion_group!(benches, bench_step_sequential, bench_step_parallel, bench_raycast);
criterion_main!(benches);
