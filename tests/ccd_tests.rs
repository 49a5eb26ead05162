use rigid_reactor::*;

const DT: f32 = 1.0 / 60.0;

fn thin_wall_world(bullet_speed: f32) -> (World, DynamicBodyHandle) {
    let mut world = World::builder().gravity(Vec3::ZERO).build();
    world.create_static_box(Vec3::new(0.5, 5.0, 5.0), Vec3::ZERO, Quat::IDENTITY);
    let bullet =
        world.create_dynamic_sphere(0.1, Vec3::new(-5.0, 0.0, 0.0), Quat::IDENTITY, 1.0);
    world.dynamic_body_mut(bullet).unwrap().velocity = Vec3::new(bullet_speed, 0.0, 0.0);
    (world, bullet)
}

#[test]
fn bullet_does_not_pass_the_wall_in_one_step() {
    let (mut world, bullet) = thin_wall_world(100.0);
    world.step(0.016);

    let body = world.dynamic_body(bullet).unwrap();
    assert!(body.core.position.x < 0.5, "bullet at {:?}", body.core.position);
    assert!(body.velocity.x < 100.0);
}

#[test]
fn hypersonic_bullet_is_stopped_by_the_sweep() {
    // Fast enough to cross the whole wall inside a single step; only the
    // swept test can catch this.
    let (mut world, bullet) = thin_wall_world(1000.0);
    world.step(0.016);

    let body = world.dynamic_body(bullet).unwrap();
    assert!(
        body.core.position.x < 0.5,
        "tunnelled to {:?}",
        body.core.position
    );
    assert!(
        body.velocity.x < 0.0,
        "velocity must reflect off the wall, got {:?}",
        body.velocity
    );
    assert!(world.last_ccd_stats.impacts >= 1);
}

#[test]
fn bullet_never_tunnels_across_many_steps() {
    let (mut world, bullet) = thin_wall_world(400.0);

    for _ in 0..30 {
        world.step(DT);
        let body = world.dynamic_body(bullet).unwrap();
        assert!(
            body.core.position.x < 0.5,
            "bullet ended up past the wall at {:?}",
            body.core.position
        );
    }
}

#[test]
fn resolved_body_sits_before_its_impact_point() {
    let (mut world, bullet) = thin_wall_world(1000.0);
    world.step(0.016);

    // Surface of the expanded wall is at x = -0.6 for a 0.1-radius sphere;
    // after advancing to 98% of the TOI the bullet must still be outside.
    let body = world.dynamic_body(bullet).unwrap();
    assert!(
        body.core.position.x <= -0.6 + 1e-3,
        "bullet penetrated to {:?}",
        body.core.position
    );
}

#[test]
fn slow_bodies_are_untouched_by_ccd() {
    let (mut world, bullet) = thin_wall_world(5.0);
    world.step(DT);

    let body = world.dynamic_body(bullet).unwrap();
    assert!(!body.ccd_handled);
    assert_eq!(world.last_ccd_stats.impacts, 0);
}

#[test]
fn dynamic_pair_ccd_prevents_mutual_tunnelling() {
    let mut world = World::builder().gravity(Vec3::ZERO).build();
    let a = world.create_dynamic_sphere(0.2, Vec3::new(-4.0, 0.0, 0.0), Quat::IDENTITY, 1.0);
    let b = world.create_dynamic_sphere(0.2, Vec3::new(4.0, 0.0, 0.0), Quat::IDENTITY, 1.0);
    world.dynamic_body_mut(a).unwrap().velocity = Vec3::new(300.0, 0.0, 0.0);
    world.dynamic_body_mut(b).unwrap().velocity = Vec3::new(-300.0, 0.0, 0.0);

    world.step(DT);

    let pa = world.dynamic_body(a).unwrap().core.position;
    let pb = world.dynamic_body(b).unwrap().core.position;
    assert!(
        pa.x <= pb.x,
        "bodies swapped sides without noticing each other: {pa:?} vs {pb:?}"
    );
}
