use approx::assert_relative_eq;
use rigid_reactor::*;

const DT: f32 = 1.0 / 60.0;

fn zero_gravity_world() -> World {
    World::builder().gravity(Vec3::ZERO).build()
}

#[test]
fn two_sphere_head_on_exchanges_momentum() {
    let mut world = zero_gravity_world();
    let a = world.create_dynamic_sphere(1.0, Vec3::ZERO, Quat::IDENTITY, 1.0);
    let b = world.create_dynamic_sphere(1.0, Vec3::new(1.5, 0.0, 0.0), Quat::IDENTITY, 1.0);
    world.dynamic_body_mut(a).unwrap().velocity = Vec3::new(10.0, 0.0, 0.0);
    world.dynamic_body_mut(b).unwrap().velocity = Vec3::new(-10.0, 0.0, 0.0);

    world.step(0.016);

    assert!(
        !world.dynamic_contacts.is_empty(),
        "overlapping spheres must record a contact"
    );

    let va = world.dynamic_body(a).unwrap().velocity;
    let vb = world.dynamic_body(b).unwrap().velocity;
    assert!(va.x < 10.0, "body A kept its full approach speed");
    assert!(vb.x > -10.0, "body B kept its full approach speed");

    let momentum = va.x + vb.x;
    assert!(momentum.abs() < 1e-3, "x momentum drifted to {momentum}");
}

#[test]
fn sphere_hits_static_box() {
    let mut world = zero_gravity_world();
    world.create_static_box(Vec3::splat(1.0), Vec3::ZERO, Quat::IDENTITY);
    let sphere = world.create_dynamic_sphere(1.0, Vec3::new(1.5, 0.0, 0.0), Quat::IDENTITY, 1.0);
    world.dynamic_body_mut(sphere).unwrap().velocity = Vec3::new(-10.0, 0.0, 0.0);

    world.step(0.016);

    assert!(!world.static_contacts.is_empty());
    assert!(world.dynamic_body(sphere).unwrap().velocity.x > -10.0);
}

#[test]
fn stack_of_three_boxes_settles() {
    let mut world = World::builder()
        .gravity(Vec3::new(0.0, -9.81, 0.0))
        .build();
    world.create_static_box(Vec3::new(10.0, 0.5, 10.0), Vec3::new(0.0, -0.5, 0.0), Quat::IDENTITY);

    let boxes: Vec<_> = (0..3)
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
        world.step(DT);
    }

    let mut last_y = f32::MIN;
    for &handle in &boxes {
        let body = world.dynamic_body(handle).unwrap();
        assert!(
            body.velocity.length() < 0.1,
            "box still moving at {:?}",
            body.velocity
        );
        assert!(
            body.core.position.y > last_y,
            "stack order broke: {} <= {last_y}",
            body.core.position.y
        );
        last_y = body.core.position.y;
    }
}

#[test]
fn body_below_kill_plane_is_marked_killed() {
    let mut world = World::new();
    let handle = world.create_dynamic_sphere(
        1.0,
        Vec3::new(0.0, rigid_reactor::config::KILL_Y - 1.0, 0.0),
        Quat::IDENTITY,
        1.0,
    );

    world.step(DT);

    match world.dynamic_body(handle) {
        Some(body) => assert!(body.is_killed),
        None => {} // slot already reclaimed, equally acceptable
    }
}

#[test]
fn killed_slot_is_reclaimed_on_rebuild_and_handle_goes_stale() {
    let mut world = World::new();
    let doomed = world.create_dynamic_sphere(1.0, Vec3::ZERO, Quat::IDENTITY, 1.0);
    world.step(DT);

    world.destroy_dynamic_body(doomed);
    assert!(world.dynamic_body(doomed).unwrap().is_killed);

    // Inserting a body forces the next maintenance pass to rebuild the
    // dynamic tree, which reclaims killed slots.
    world.create_dynamic_sphere(1.0, Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY, 1.0);
    world.step(DT);

    assert!(
        world.dynamic_body(doomed).is_none(),
        "stale handle resolved after slot reuse"
    );
}

#[test]
fn free_fall_matches_gravity_up_to_damping() {
    let mut world = World::builder()
        .gravity(Vec3::new(0.0, -9.81, 0.0))
        .build();
    let handle = world.create_dynamic_sphere(1.0, Vec3::new(0.0, 100.0, 0.0), Quat::IDENTITY, 1.0);

    world.step(DT);

    let body = world.dynamic_body(handle).unwrap();
    let expected = -9.81 * DT * (1.0f32 - body.linear_damping).powf(DT);
    assert_relative_eq!(body.velocity.y, expected, epsilon = 1e-4);
}

#[test]
fn zero_dt_step_is_a_no_op() {
    let mut world = World::new();
    let handle = world.create_dynamic_sphere(1.0, Vec3::new(0.0, 5.0, 0.0), Quat::IDENTITY, 1.0);
    world.dynamic_body_mut(handle).unwrap().velocity = Vec3::new(3.0, 0.0, 0.0);
    world
        .dynamic_body_mut(handle)
        .unwrap()
        .angular_velocity = Vec3::new(0.0, 1.0, 0.0);

    let before = world.dynamic_body(handle).unwrap().clone();
    world.step(0.0);
    let after = world.dynamic_body(handle).unwrap();

    assert_eq!(before.core.position, after.core.position);
    assert_eq!(before.core.rotation, after.core.rotation);
    assert_eq!(before.velocity, after.velocity);
    assert_eq!(before.angular_velocity, after.angular_velocity);
}

#[test]
fn idle_body_falls_asleep_and_wakes_on_impulse() {
    let mut world = zero_gravity_world();
    let handle = world.create_dynamic_sphere(1.0, Vec3::ZERO, Quat::IDENTITY, 1.0);

    for _ in 0..40 {
        world.step(DT);
    }
    assert!(world.dynamic_body(handle).unwrap().is_sleeping);

    world.apply_impulse(handle, Vec3::new(1.0, 0.0, 0.0));
    assert!(!world.dynamic_body(handle).unwrap().is_sleeping);
}

#[test]
fn trigger_overlaps_are_reported_after_step() {
    let mut world = zero_gravity_world();
    let trigger = world.create_trigger_sphere(2.0, Vec3::ZERO, Quat::IDENTITY);
    let inside = world.create_dynamic_sphere(0.5, Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY, 1.0);
    world.create_dynamic_sphere(0.5, Vec3::new(50.0, 0.0, 0.0), Quat::IDENTITY, 1.0);
    let wall = world.create_static_box(Vec3::splat(1.0), Vec3::new(0.0, 2.0, 0.0), Quat::IDENTITY);

    world.step(DT);

    assert_eq!(world.trigger_overlaps.len(), 1);
    assert_eq!(world.trigger_overlaps[0].trigger, trigger);
    assert_eq!(world.trigger_overlaps[0].body, inside);

    assert_eq!(world.trigger_static_overlaps.len(), 1);
    assert_eq!(world.trigger_static_overlaps[0].body, wall);

    // On-demand variants agree with the per-step lists.
    assert_eq!(world.query_trigger(trigger), vec![inside]);
    assert_eq!(world.query_trigger_static(trigger), vec![wall]);
}

#[test]
fn fan_bodies_sense_but_never_collide() {
    let mut world = zero_gravity_world();
    let fan = world.create_trigger_fan(
        2.0,
        1.0,
        std::f32::consts::FRAC_PI_2,
        Vec3::ZERO,
        Quat::IDENTITY,
    );
    // Inside the sector opening (+X), and behind it.
    let in_front = world.create_dynamic_sphere(0.3, Vec3::new(1.2, 0.0, 0.0), Quat::IDENTITY, 1.0);
    world.create_dynamic_sphere(0.3, Vec3::new(-1.8, 0.0, 0.0), Quat::IDENTITY, 1.0);

    world.step(DT);

    let overlaps: Vec<_> = world
        .trigger_overlaps
        .iter()
        .filter(|o| o.trigger == fan)
        .collect();
    assert_eq!(overlaps.len(), 1);
    assert_eq!(overlaps[0].body, in_front);
    // Sensor geometry must not have produced solver contacts.
    assert!(world.dynamic_contacts.is_empty());
}

#[test]
fn spring_force_registry_pulls_bodies() {
    let mut world = zero_gravity_world();
    let handle = world.create_dynamic_sphere(0.5, Vec3::new(3.0, 0.0, 0.0), Quat::IDENTITY, 1.0);
    world.force_registry.add_force(SpringForce {
        anchor: Vec3::ZERO,
        rest_length: 1.0,
        spring_constant: 50.0,
        damping: 1.0,
    });

    for _ in 0..30 {
        world.step(DT);
    }

    let body = world.dynamic_body(handle).unwrap();
    assert!(
        body.core.position.x < 3.0,
        "spring never moved the body: {:?}",
        body.core.position
    );
}

#[test]
fn air_resistance_slows_fast_bodies() {
    let mut world = World::builder()
        .gravity(Vec3::ZERO)
        .air_resistance(true)
        .build();
    let draggy = world.create_dynamic_sphere(1.0, Vec3::ZERO, Quat::IDENTITY, 1.0);
    world.dynamic_body_mut(draggy).unwrap().velocity = Vec3::new(20.0, 0.0, 0.0);
    world.dynamic_body_mut(draggy).unwrap().linear_damping = 0.0;

    world.step(DT);

    let speed = world.dynamic_body(draggy).unwrap().velocity.x;
    assert!(speed < 20.0, "drag had no effect");
    assert!(speed > 0.0, "drag reversed the motion");
}
