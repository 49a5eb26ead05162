use rigid_reactor::*;

fn main() {
    let mut world = World::builder()
        .gravity(Vec3::new(0.0, -9.81, 0.0))
        .build();

    world.create_static_box(
        Vec3::new(10.0, 0.5, 10.0),
        Vec3::new(0.0, -0.5, 0.0),
        Quat::IDENTITY,
    );
    let boxes: Vec<_> = (0..5)
        .map(|i| {
            world.create_dynamic_box(
                Vec3::splat(0.5),
                Vec3::new(0.0, 0.5 + i as f32, 0.0),
                Quat::IDENTITY,
                10.0,
            )
        })
        .collect();

    for _ in 0..120 {
        world.step(1.0 / 60.0);
    }

    println!("Stack after 2 simulated seconds:");
    for (level, handle) in boxes.iter().enumerate() {
        if let Some(body) = world.dynamic_body(*handle) {
            println!("  level {level}: y = {:.3}", body.core.position.y);
        }
    }
}
