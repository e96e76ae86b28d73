// Core ECS components read and written by the steering core.
// The host engine owns these; the core only ever writes MovementInput.

use bevy_ecs::prelude::*;
use glam::Vec2;

/// World-space placement of an entity on the 2D simulation plane.
#[derive(Component, Debug, Clone, Copy)]
pub struct Transform {
    pub position: Vec2,
    /// Rotation of the grid the entity stands on (radians).
    /// Movement input is expressed relative to this frame.
    pub grid_rotation: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            grid_rotation: 0.0,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec2) -> Self {
        Self {
            position,
            grid_rotation: 0.0,
        }
    }

    /// Rotate a world-space vector into this entity's grid-local frame.
    #[inline]
    pub fn to_local(&self, world: Vec2) -> Vec2 {
        Vec2::from_angle(-self.grid_rotation).rotate(world)
    }

    /// Rotate a grid-local vector back into world space.
    #[inline]
    pub fn to_world(&self, local: Vec2) -> Vec2 {
        Vec2::from_angle(self.grid_rotation).rotate(local)
    }
}

/// Linear velocity in world units per second.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Velocity {
    pub linear: Vec2,
}

/// Physical properties of a steerable unit.
///
/// `radius`   : collision radius in world units.
/// `max_speed`: current sprint speed in world units/sec; 0 means immobile.
/// `can_move` : false while stunned, buckled, inside a container, etc.
#[derive(Component, Debug, Clone, Copy)]
pub struct UnitAgent {
    pub radius: f32,
    pub max_speed: f32,
    pub can_move: bool,
}

impl UnitAgent {
    pub fn new(radius: f32, max_speed: f32) -> Self {
        Self {
            radius,
            max_speed,
            can_move: true,
        }
    }
}

/// Movement output contract: a normalized intent in grid-local space.
///
/// The core writes this once per agent per tick and never touches position.
/// `last_input_tick` stamps the tick the intent was produced on.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct MovementInput {
    pub direction: Vec2,
    pub last_input_tick: u64,
}

/// Simulation clock. Advanced by the host once per tick.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SimTime {
    pub elapsed: f64,
    pub tick: u64,
}

impl SimTime {
    pub fn advance(&mut self, delta_time: f32) {
        self.elapsed += delta_time as f64;
        self.tick += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn local_and_world_frames_round_trip_through_grid_rotation() {
        let transform = Transform {
            position: Vec2::ZERO,
            grid_rotation: FRAC_PI_2,
        };

        // East in world space is "south" for a grid rotated a quarter turn.
        let local = transform.to_local(Vec2::X);
        assert_relative_eq!(local.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(local.y, -1.0, epsilon = 1e-6);

        let back = transform.to_world(local);
        assert_relative_eq!(back.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(back.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn sim_time_counts_ticks() {
        let mut time = SimTime::default();
        time.advance(0.5);
        time.advance(0.25);
        assert_eq!(time.tick, 2);
        assert_relative_eq!(time.elapsed, 0.75);
    }
}
