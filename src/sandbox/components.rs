// Sandbox-only ECS components: collision shapes, factions and the
// interactive scenery (doors, breakables, tables) the obstacle actions act on.

use bevy_ecs::prelude::*;

use crate::engine::queries::BodyKind;

use super::physics::Shape;

/// Collision shape and filter of an entity.
#[derive(Component, Debug, Clone, Copy)]
pub struct CollisionBody {
    pub shape: Shape,
    pub layer: u32,
    pub mask: u32,
    /// Soft bodies (open doors) are ignored by collision and avoidance.
    pub hard: bool,
    pub kind: BodyKind,
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactionMember(pub u32);

#[derive(Component, Debug, Clone, Copy)]
pub struct Door {
    pub open: bool,
    /// Swings open when walked into.
    pub bump_open: bool,
    /// Locked to agents without access; can only be pried or smashed.
    pub requires_access: bool,
    /// Seconds of prying applied so far.
    pub pry_progress: f32,
}

impl Door {
    pub fn closed(requires_access: bool) -> Self {
        Self {
            open: false,
            bump_open: false,
            requires_access,
            pry_progress: 0.0,
        }
    }
}

/// Destroyed (despawned) once health reaches zero.
#[derive(Component, Debug, Clone, Copy)]
pub struct Destructible {
    pub health: f32,
}

/// Can be climbed over.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Climbable;

/// Mid-climb: collision with static geometry is suspended until it runs out.
#[derive(Component, Debug, Clone, Copy)]
pub struct Climbing {
    pub remaining: f32,
}
