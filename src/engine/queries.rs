// Collaborator contracts consumed by the steering core.
//
// Query traits are `Sync` and take `&self`: the per-agent workers call them
// concurrently. Anything that mutates the world (opening doors, attacking)
// goes through ObstacleActions, which is only invoked from the sequential
// apply phase after the parallel steer.

use bevy_ecs::entity::Entity;
use glam::Vec2;

use super::orca::ObstacleEdge;
use super::path::Aabb;

/// Static bodies (walls, doors, furniture) vs. dynamic ones (mobs, items).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Static,
    Dynamic,
}

/// A physics body as seen by a radius query.
#[derive(Debug, Clone, Copy)]
pub struct BodyInfo {
    pub entity: Entity,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Circle radius, or the inscribed radius of a box.
    pub radius: f32,
    pub layer: u32,
    pub mask: u32,
    pub hard: bool,
    pub can_collide: bool,
}

impl BodyInfo {
    /// Whether this body physically blocks an agent with the given filter.
    #[inline]
    pub fn blocks(&self, layer: u32, mask: u32) -> bool {
        self.hard && self.can_collide && ((mask & self.layer) != 0 || (layer & self.mask) != 0)
    }
}

/// Closest points between an agent's shape and another body's shape.
/// `distance` is 0 when the shapes interpenetrate.
#[derive(Debug, Clone, Copy)]
pub struct NearestPoints {
    pub on_agent: Vec2,
    pub on_other: Vec2,
    pub distance: f32,
}

/// Physics engine adapter.
pub trait PhysicsQuery: Sync {
    /// Hard collision (layer, mask) of an agent.
    fn hard_collision(&self, agent: Entity) -> (u32, u32);

    /// Append bodies of `kind` whose shapes come within `radius` of `point`.
    /// Does not clear `out`.
    fn bodies_in_radius(&self, point: Vec2, radius: f32, kind: BodyKind, out: &mut Vec<BodyInfo>);

    fn nearest_points(&self, agent: Entity, other: Entity) -> Option<NearestPoints>;

    /// Append the polygon edges of hard static obstacles near `point` whose
    /// layer matches `mask`, counter-clockwise per polygon. Does not clear
    /// `out`.
    fn obstacle_edges(&self, point: Vec2, radius: f32, mask: u32, out: &mut Vec<ObstacleEdge>);

    /// True when `to` is within `range` of `from` and no static body
    /// matching `mask` lies on the segment between them.
    fn in_range_unobstructed(&self, from: Vec2, to: Vec2, range: f32, mask: u32) -> bool;
}

/// Faction relationship lookup, used only by separation.
pub trait FactionQuery: Sync {
    fn is_friendly(&self, a: Entity, b: Entity) -> bool;
}

/// Door state of a blocker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorInfo {
    pub open: bool,
    /// Opens by itself when walked into.
    pub bump_open: bool,
}

/// Something currently blocking a corridor node.
#[derive(Debug, Clone, Copy)]
pub struct Blocker {
    pub entity: Entity,
    pub door: Option<DoorInfo>,
    /// Can be destroyed by attacking it.
    pub damageable: bool,
    pub climbable: bool,
}

/// Lookup of the bodies occupying a node.
pub trait BlockerQuery: Sync {
    /// Append the hard, colliding bodies inside `bounds` that block an agent
    /// with the given (layer, mask). Does not clear `out`.
    fn blockers_in(&self, bounds: Aabb, layer: u32, mask: u32, out: &mut Vec<Blocker>);
}

/// Mitigation an agent wants to perform on a blocker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleAction {
    Open { door: Entity },
    Pry { door: Entity },
    Attack { target: Entity },
    Climb { target: Entity },
}

impl ObstacleAction {
    pub fn target(&self) -> Entity {
        match *self {
            ObstacleAction::Open { door } | ObstacleAction::Pry { door } => door,
            ObstacleAction::Attack { target } | ObstacleAction::Climb { target } => target,
        }
    }
}

/// Synchronous result of invoking an obstacle action for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Succeeded,
    InProgress,
    Failed,
}

/// Door, pry and attack collaborators.
pub trait ObstacleActions {
    fn perform(&mut self, agent: Entity, action: ObstacleAction) -> ActionOutcome;
}

/// The read-only collaborators the per-agent workers share.
#[derive(Clone, Copy)]
pub struct SteeringServices<'a> {
    pub physics: &'a dyn PhysicsQuery,
    pub factions: &'a dyn FactionQuery,
    pub blockers: &'a dyn BlockerQuery,
    pub paths: &'a dyn super::path::PathService,
}
