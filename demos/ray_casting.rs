use rigid_reactor::*;

fn main() {
    let mut world = World::new();
    world.create_dynamic_sphere(1.0, Vec3::ZERO, Quat::IDENTITY, 1.0);
    world.create_static_box(
        Vec3::new(1.0, 4.0, 4.0),
        Vec3::new(0.0, 0.0, 8.0),
        Quat::IDENTITY,
    );
    world.step(1.0 / 60.0);

    let hits = world.raycast(Vec3::new(0.0, 0.0, -5.0), Vec3::Z, 20.0);
    println!("Ray hits: {}", hits.len());
    for hit in hits {
        println!("  {:?} at distance {:.2}", hit.body, hit.distance);
    }
}
