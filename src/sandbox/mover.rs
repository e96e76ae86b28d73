// Movement integration for the sandbox.
// Turns each agent's MovementInput into an acceleration-limited velocity,
// integrates position and resolves penetration against static geometry.

use bevy_ecs::prelude::*;

use crate::engine::components::{MovementInput, Transform, UnitAgent, Velocity};

use super::components::{Climbing, CollisionBody};
use super::physics::PhysicsSnapshot;

/// Velocity change per second (world units/sec²).
pub const ACCELERATION: f32 = 30.0;

/// Update agent positions from their movement input.
/// Velocity is set to the displacement actually achieved this tick.
pub fn movement_system(world: &mut World, physics: &PhysicsSnapshot, delta_time: f32) {
    if delta_time <= 0.0 {
        return;
    }

    let mut finished_climbing = Vec::new();
    let mut query = world.query::<(
        Entity,
        &mut Transform,
        &mut Velocity,
        &UnitAgent,
        &MovementInput,
        Option<&CollisionBody>,
        Option<&mut Climbing>,
    )>();

    for (entity, mut transform, mut velocity, unit, input, body, climbing) in query.iter_mut(world) {
        let desired = if unit.can_move {
            transform.to_world(input.direction.clamp_length_max(1.0)) * unit.max_speed
        } else {
            glam::Vec2::ZERO
        };
        let intent =
            velocity.linear + (desired - velocity.linear).clamp_length_max(ACCELERATION * delta_time);

        let start = transform.position;
        transform.position += intent * delta_time;

        match (climbing, body) {
            (Some(mut climbing), _) => {
                climbing.remaining -= delta_time;
                if climbing.remaining <= 0.0 {
                    finished_climbing.push(entity);
                }
            }
            (None, Some(body)) if body.hard => {
                let radius = body.shape.inscribed_radius();
                let here = transform.position;
                transform.position += physics.push_out(here, radius, body.mask);
            }
            (None, _) => {}
        }

        velocity.linear = (transform.position - start) / delta_time;
    }

    for entity in finished_climbing {
        world.entity_mut(entity).remove::<Climbing>();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::queries::BodyKind;
    use crate::sandbox::physics::{LAYER_MOB, LAYER_STATIC, MASK_MOB, PhysicsBody, Shape};
    use approx::assert_relative_eq;
    use glam::Vec2;

    fn agent(world: &mut World, direction: Vec2) -> Entity {
        world
            .spawn((
                Transform::from_position(Vec2::ZERO),
                Velocity::default(),
                UnitAgent::new(0.4, 2.0),
                MovementInput {
                    direction,
                    last_input_tick: 0,
                },
                CollisionBody {
                    shape: Shape::Circle { radius: 0.4 },
                    layer: LAYER_MOB,
                    mask: MASK_MOB,
                    hard: true,
                    kind: BodyKind::Dynamic,
                },
            ))
            .id()
    }

    #[test]
    fn input_becomes_velocity_and_displacement() {
        let mut world = World::new();
        let physics = PhysicsSnapshot::new(Vec2::splat(-10.0), Vec2::splat(10.0));
        let e = agent(&mut world, Vec2::X);

        movement_system(&mut world, &physics, 0.5);

        let transform = world.get::<Transform>(e).expect("transform");
        assert_relative_eq!(transform.position.x, 1.0, epsilon = 1e-6);
        let velocity = world.get::<Velocity>(e).expect("velocity");
        assert_relative_eq!(velocity.linear.x, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn walls_stop_agents_and_velocity_reflects_it() {
        let mut world = World::new();
        let mut physics = PhysicsSnapshot::new(Vec2::splat(-10.0), Vec2::splat(10.0));
        physics.insert(PhysicsBody {
            entity: Entity::from_raw(900),
            position: Vec2::new(1.0, 0.0),
            velocity: Vec2::ZERO,
            shape: Shape::Box {
                half_extents: Vec2::splat(0.5),
            },
            layer: LAYER_STATIC,
            mask: 0,
            hard: true,
            can_collide: true,
            kind: BodyKind::Static,
            door: None,
            damageable: false,
            climbable: false,
        });
        let e = agent(&mut world, Vec2::X);

        movement_system(&mut world, &physics, 0.1);

        let transform = world.get::<Transform>(e).expect("transform");
        assert_relative_eq!(transform.position.x, 0.1, epsilon = 1e-5);

        movement_system(&mut world, &physics, 0.1);
        let transform = world.get::<Transform>(e).expect("transform");
        assert_relative_eq!(transform.position.x, 0.1, epsilon = 1e-5);
        let velocity = world.get::<Velocity>(e).expect("velocity");
        assert_relative_eq!(velocity.linear.x, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn climbing_ignores_static_geometry_until_it_expires() {
        let mut world = World::new();
        let physics = PhysicsSnapshot::new(Vec2::splat(-10.0), Vec2::splat(10.0));
        let e = agent(&mut world, Vec2::X);
        world.entity_mut(e).insert(Climbing { remaining: 0.15 });

        movement_system(&mut world, &physics, 0.1);
        assert!(world.get::<Climbing>(e).is_some());
        movement_system(&mut world, &physics, 0.1);
        assert!(world.get::<Climbing>(e).is_none());
    }
}
