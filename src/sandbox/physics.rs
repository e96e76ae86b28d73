// Physics snapshot for the sandbox.
//
// Rebuilt from the ECS once per tick before steering runs, then shared
// read-only by the steering workers. Agents are circles; static bodies are
// boxes or circles. Implements every read-side collaborator the core needs.

use std::collections::HashMap;

use bevy_ecs::entity::Entity;
use glam::Vec2;

use crate::engine::orca::ObstacleEdge;
use crate::engine::path::Aabb;
use crate::engine::queries::{
    Blocker, BlockerQuery, BodyInfo, BodyKind, DoorInfo, FactionQuery, NearestPoints, PhysicsQuery,
};
use crate::engine::spatial::SpatialGrid;

// ============================================================================
// COLLISION LAYERS
// ============================================================================

pub const LAYER_MOB: u32 = 1 << 0;
pub const LAYER_STATIC: u32 = 1 << 1;
/// Mobs collide with each other and with static geometry.
pub const MASK_MOB: u32 = LAYER_MOB | LAYER_STATIC;

/// Side length of the broad-phase cells.
const BROAD_PHASE_CELL: f32 = 2.0;
/// Static circles are approximated by this many polygon sides for ORCA.
const CIRCLE_SIDES: usize = 8;

// ============================================================================
// BODIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Circle { radius: f32 },
    Box { half_extents: Vec2 },
}

impl Shape {
    /// Circle radius, or the inscribed radius of a box.
    pub fn inscribed_radius(&self) -> f32 {
        match *self {
            Shape::Circle { radius } => radius,
            Shape::Box { half_extents } => half_extents.min_element(),
        }
    }

    fn half_extents(&self) -> Vec2 {
        match *self {
            Shape::Circle { radius } => Vec2::splat(radius),
            Shape::Box { half_extents } => half_extents,
        }
    }
}

/// One body in the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsBody {
    pub entity: Entity,
    pub position: Vec2,
    pub velocity: Vec2,
    pub shape: Shape,
    pub layer: u32,
    pub mask: u32,
    pub hard: bool,
    pub can_collide: bool,
    pub kind: BodyKind,
    pub door: Option<DoorInfo>,
    pub damageable: bool,
    pub climbable: bool,
}

impl PhysicsBody {
    fn info(&self) -> BodyInfo {
        BodyInfo {
            entity: self.entity,
            position: self.position,
            velocity: self.velocity,
            radius: self.shape.inscribed_radius(),
            layer: self.layer,
            mask: self.mask,
            hard: self.hard,
            can_collide: self.can_collide,
        }
    }

    fn bounds(&self) -> Aabb {
        Aabb::from_center(self.position, self.shape.half_extents())
    }

    /// Closest point of this body's shape to `point` (the point itself if
    /// it lies inside).
    fn closest_point(&self, point: Vec2) -> Vec2 {
        match self.shape {
            Shape::Circle { radius } => {
                let delta = point - self.position;
                if delta.length_squared() <= radius * radius {
                    point
                } else {
                    self.position + delta.normalize_or_zero() * radius
                }
            }
            Shape::Box { half_extents } => {
                point.clamp(self.position - half_extents, self.position + half_extents)
            }
        }
    }

    fn distance_to(&self, point: Vec2) -> f32 {
        self.closest_point(point).distance(point)
    }

    fn blocks_mask(&self, mask: u32) -> bool {
        self.hard && self.can_collide && (self.layer & mask) != 0
    }

    /// Whether segment a→b passes through this body.
    fn intersects_segment(&self, a: Vec2, b: Vec2) -> bool {
        match self.shape {
            Shape::Circle { radius } => {
                let ab = b - a;
                let t = if ab.length_squared() > 0.0 {
                    ((self.position - a).dot(ab) / ab.length_squared()).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                (a + ab * t).distance_squared(self.position) < radius * radius
            }
            Shape::Box { half_extents } => {
                segment_hits_box(a, b, self.position - half_extents, self.position + half_extents)
            }
        }
    }

    /// Counter-clockwise outline of a static body.
    fn outline(&self, out: &mut Vec<ObstacleEdge>) {
        match self.shape {
            Shape::Box { half_extents } => {
                let min = self.position - half_extents;
                let max = self.position + half_extents;
                ObstacleEdge::polygon(
                    &[min, Vec2::new(max.x, min.y), max, Vec2::new(min.x, max.y)],
                    out,
                );
            }
            Shape::Circle { radius } => {
                let vertices: Vec<Vec2> = (0..CIRCLE_SIDES)
                    .map(|i| {
                        let angle = i as f32 * std::f32::consts::TAU / CIRCLE_SIDES as f32;
                        self.position + Vec2::from_angle(angle) * radius
                    })
                    .collect();
                ObstacleEdge::polygon(&vertices, out);
            }
        }
    }
}

/// Slab test: does segment a→b touch the open box (min, max)?
fn segment_hits_box(a: Vec2, b: Vec2, min: Vec2, max: Vec2) -> bool {
    let delta = b - a;
    let mut t_min: f32 = 0.0;
    let mut t_max: f32 = 1.0;
    for axis in 0..2 {
        let (origin, d, lo, hi) = (a[axis], delta[axis], min[axis], max[axis]);
        if d.abs() < f32::EPSILON {
            if origin <= lo || origin >= hi {
                return false;
            }
            continue;
        }
        let t1 = (lo - origin) / d;
        let t2 = (hi - origin) / d;
        t_min = t_min.max(t1.min(t2));
        t_max = t_max.min(t1.max(t2));
        if t_min >= t_max {
            return false;
        }
    }
    true
}

// ============================================================================
// SNAPSHOT
// ============================================================================

pub struct PhysicsSnapshot {
    bodies: Vec<PhysicsBody>,
    index: HashMap<Entity, usize>,
    broad_phase: SpatialGrid,
    factions: HashMap<Entity, u32>,
}

impl PhysicsSnapshot {
    pub fn new(world_min: Vec2, world_max: Vec2) -> Self {
        Self {
            bodies: Vec::new(),
            index: HashMap::new(),
            broad_phase: SpatialGrid::new(world_min, world_max, BROAD_PHASE_CELL),
            factions: HashMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.index.clear();
        self.broad_phase.clear();
        self.factions.clear();
    }

    pub fn insert(&mut self, body: PhysicsBody) {
        let idx = self.bodies.len();
        let bounds = body.bounds();
        self.broad_phase.insert_bounds(bounds.min, bounds.max, idx);
        self.index.insert(body.entity, idx);
        self.bodies.push(body);
    }

    pub fn set_faction(&mut self, entity: Entity, faction: u32) {
        self.factions.insert(entity, faction);
    }

    pub fn body(&self, entity: Entity) -> Option<&PhysicsBody> {
        self.index.get(&entity).map(|&idx| &self.bodies[idx])
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Bodies whose bounds come within `radius` of `point`, each once.
    fn candidates(&self, point: Vec2, radius: f32) -> impl Iterator<Item = &PhysicsBody> {
        let mut hits = Vec::new();
        self.broad_phase.query_radius(point, radius, &mut hits);
        hits.sort_unstable();
        hits.dedup();
        hits.into_iter().map(move |idx| &self.bodies[idx])
    }

    /// Displacement that moves a circle at `position` out of every hard
    /// static body matching `mask`.
    pub fn push_out(&self, position: Vec2, radius: f32, mask: u32) -> Vec2 {
        let mut corrected = position;
        for body in self.candidates(position, radius) {
            if body.kind != BodyKind::Static || !body.blocks_mask(mask) {
                continue;
            }
            let closest = body.closest_point(corrected);
            let delta = corrected - closest;
            let distance = delta.length();
            if distance >= radius {
                continue;
            }
            if distance > f32::EPSILON {
                corrected += delta / distance * (radius - distance);
            } else {
                // Centre inside the body: leave along the shallowest axis.
                corrected = escape_box(corrected, body.bounds(), radius);
            }
        }
        corrected - position
    }
}

fn escape_box(point: Vec2, bounds: Aabb, radius: f32) -> Vec2 {
    let exits = [
        (point.x - bounds.min.x, Vec2::new(bounds.min.x - radius, point.y)),
        (bounds.max.x - point.x, Vec2::new(bounds.max.x + radius, point.y)),
        (point.y - bounds.min.y, Vec2::new(point.x, bounds.min.y - radius)),
        (bounds.max.y - point.y, Vec2::new(point.x, bounds.max.y + radius)),
    ];
    exits
        .into_iter()
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map_or(point, |(_, exit)| exit)
}

impl PhysicsQuery for PhysicsSnapshot {
    fn hard_collision(&self, agent: Entity) -> (u32, u32) {
        self.body(agent)
            .filter(|body| body.hard && body.can_collide)
            .map_or((0, 0), |body| (body.layer, body.mask))
    }

    fn bodies_in_radius(&self, point: Vec2, radius: f32, kind: BodyKind, out: &mut Vec<BodyInfo>) {
        out.extend(
            self.candidates(point, radius)
                .filter(|body| body.kind == kind && body.distance_to(point) <= radius)
                .map(PhysicsBody::info),
        );
    }

    fn nearest_points(&self, agent: Entity, other: Entity) -> Option<NearestPoints> {
        let agent = self.body(agent)?;
        let other = self.body(other)?;
        let Shape::Circle { radius } = agent.shape else {
            return None;
        };

        let (on_other, gap) = match other.shape {
            Shape::Circle { radius: other_radius } => {
                let delta = agent.position - other.position;
                let dir = delta.try_normalize().unwrap_or(Vec2::X);
                (
                    other.position + dir * other_radius,
                    delta.length() - other_radius - radius,
                )
            }
            Shape::Box { .. } => {
                let closest = other.closest_point(agent.position);
                if closest == agent.position {
                    return Some(NearestPoints {
                        on_agent: agent.position,
                        on_other: closest,
                        distance: 0.0,
                    });
                }
                (closest, closest.distance(agent.position) - radius)
            }
        };

        let toward = (on_other - agent.position).normalize_or_zero();
        Some(NearestPoints {
            on_agent: agent.position + toward * radius,
            on_other,
            distance: gap.max(0.0),
        })
    }

    fn obstacle_edges(&self, point: Vec2, radius: f32, mask: u32, out: &mut Vec<ObstacleEdge>) {
        for body in self.candidates(point, radius) {
            if body.kind == BodyKind::Static
                && body.blocks_mask(mask)
                && body.distance_to(point) <= radius
            {
                body.outline(out);
            }
        }
    }

    fn in_range_unobstructed(&self, from: Vec2, to: Vec2, range: f32, mask: u32) -> bool {
        let distance = from.distance(to);
        if distance > range {
            return false;
        }
        let mid = (from + to) * 0.5;
        !self.candidates(mid, distance * 0.5).any(|body| {
            body.kind == BodyKind::Static && body.blocks_mask(mask) && body.intersects_segment(from, to)
        })
    }
}

impl FactionQuery for PhysicsSnapshot {
    fn is_friendly(&self, a: Entity, b: Entity) -> bool {
        match (self.factions.get(&a), self.factions.get(&b)) {
            (Some(fa), Some(fb)) => fa == fb,
            _ => false,
        }
    }
}

impl BlockerQuery for PhysicsSnapshot {
    fn blockers_in(&self, bounds: Aabb, layer: u32, mask: u32, out: &mut Vec<Blocker>) {
        let center = bounds.center();
        let reach = (bounds.max - center).length();
        for body in self.candidates(center, reach) {
            if body.kind != BodyKind::Static
                || !body.info().blocks(layer, mask)
                || !body.bounds().intersects(&bounds)
                || !bounds.contains(body.position)
            {
                continue;
            }
            out.push(Blocker {
                entity: body.entity,
                door: body.door,
                damageable: body.damageable,
                climbable: body.climbable,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn snapshot() -> PhysicsSnapshot {
        PhysicsSnapshot::new(Vec2::splat(-10.0), Vec2::splat(10.0))
    }

    fn mob(id: u32, position: Vec2) -> PhysicsBody {
        PhysicsBody {
            entity: Entity::from_raw(id),
            position,
            velocity: Vec2::ZERO,
            shape: Shape::Circle { radius: 0.4 },
            layer: LAYER_MOB,
            mask: MASK_MOB,
            hard: true,
            can_collide: true,
            kind: BodyKind::Dynamic,
            door: None,
            damageable: false,
            climbable: false,
        }
    }

    fn wall(id: u32, center: Vec2) -> PhysicsBody {
        PhysicsBody {
            entity: Entity::from_raw(id),
            position: center,
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
        }
    }

    #[test]
    fn nearest_points_against_a_wall() {
        let mut physics = snapshot();
        physics.insert(mob(1, Vec2::new(0.0, 0.0)));
        physics.insert(wall(2, Vec2::new(1.5, 0.0)));

        let nearest = physics
            .nearest_points(Entity::from_raw(1), Entity::from_raw(2))
            .expect("both bodies exist");
        assert_relative_eq!(nearest.distance, 0.6, epsilon = 1e-5);
        assert_relative_eq!(nearest.on_other.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(nearest.on_agent.x, 0.4, epsilon = 1e-5);
    }

    #[test]
    fn overlapping_circles_report_zero_distance() {
        let mut physics = snapshot();
        physics.insert(mob(1, Vec2::ZERO));
        physics.insert(mob(2, Vec2::new(0.5, 0.0)));

        let nearest = physics
            .nearest_points(Entity::from_raw(1), Entity::from_raw(2))
            .expect("both bodies exist");
        assert_eq!(nearest.distance, 0.0);
    }

    #[test]
    fn radius_query_filters_by_kind_and_shape_distance() {
        let mut physics = snapshot();
        physics.insert(mob(1, Vec2::ZERO));
        physics.insert(wall(2, Vec2::new(1.2, 0.0)));
        physics.insert(wall(3, Vec2::new(4.0, 0.0)));

        let mut out = Vec::new();
        physics.bodies_in_radius(Vec2::ZERO, 1.0, BodyKind::Static, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].entity, Entity::from_raw(2));
    }

    #[test]
    fn walls_block_line_of_sight_for_matching_masks_only() {
        let mut physics = snapshot();
        physics.insert(wall(2, Vec2::new(2.0, 0.0)));

        let from = Vec2::ZERO;
        let to = Vec2::new(4.0, 0.0);
        assert!(!physics.in_range_unobstructed(from, to, 10.0, MASK_MOB));
        assert!(physics.in_range_unobstructed(from, to, 10.0, LAYER_MOB));
        assert!(!physics.in_range_unobstructed(from, to, 3.0, LAYER_MOB));
        assert!(physics.in_range_unobstructed(from, Vec2::new(0.0, 4.0), 10.0, MASK_MOB));
    }

    #[test]
    fn box_outline_is_four_convex_edges() {
        let mut physics = snapshot();
        physics.insert(wall(2, Vec2::new(2.0, 0.0)));

        let mut edges = Vec::new();
        physics.obstacle_edges(Vec2::ZERO, 3.0, MASK_MOB, &mut edges);
        assert_eq!(edges.len(), 4);
        assert!(edges.iter().all(|edge| edge.start_convex && edge.end_convex));
    }

    #[test]
    fn push_out_resolves_penetration() {
        let mut physics = snapshot();
        physics.insert(wall(2, Vec2::new(1.0, 0.0)));

        let correction = physics.push_out(Vec2::new(0.3, 0.0), 0.4, MASK_MOB);
        assert_relative_eq!(correction.x, -0.2, epsilon = 1e-5);
        assert_relative_eq!(correction.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn blockers_report_door_state() {
        let mut physics = snapshot();
        let mut door = wall(5, Vec2::new(3.5, 1.5));
        door.door = Some(DoorInfo {
            open: false,
            bump_open: false,
        });
        physics.insert(door);

        let mut out = Vec::new();
        let tile = Aabb::from_center(Vec2::new(3.5, 1.5), Vec2::splat(0.5));
        physics.blockers_in(tile, LAYER_MOB, MASK_MOB, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].door.map(|d| d.open), Some(false));
    }

    #[test]
    fn factions_compare_membership() {
        let mut physics = snapshot();
        physics.set_faction(Entity::from_raw(1), 7);
        physics.set_faction(Entity::from_raw(2), 7);
        physics.set_faction(Entity::from_raw(3), 8);

        assert!(physics.is_friendly(Entity::from_raw(1), Entity::from_raw(2)));
        assert!(!physics.is_friendly(Entity::from_raw(1), Entity::from_raw(3)));
        assert!(!physics.is_friendly(Entity::from_raw(1), Entity::from_raw(4)));
    }
}
