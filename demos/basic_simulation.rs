use rigid_reactor::*;

fn main() {
    let mut world = World::builder()
        .gravity(Vec3::new(0.0, -9.81, 0.0))
        .parallel(true)
        .build();

    world.create_static_box(
        Vec3::new(20.0, 0.5, 20.0),
        Vec3::new(0.0, -0.5, 0.0),
        Quat::IDENTITY,
    );
    let ball = world.create_dynamic_sphere(0.5, Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY, 1.0);

    world.step(1.0 / 60.0);
    if let Some(body) = world.dynamic_body(ball) {
        println!("Ball position after one step: {:?}", body.core.position);
    }
}
