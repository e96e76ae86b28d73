// Context steering arbiter.
//
// Scores every direction of the shared basis for interest (seek) and danger
// (static avoidance, same-faction separation), blends the scores over time
// and picks the best net direction. All vectors handed to the maps are in
// the agent's grid-local frame.

use bevy_ecs::entity::Entity;
use glam::Vec2;

use super::components::Transform;
use super::directions::{DirectionMap, DirectionalBasis, INTEREST_DIRECTIONS};
use super::queries::{BodyInfo, BodyKind, FactionQuery, PhysicsQuery};

/// Smallest radius within which bodies contribute danger.
pub const MIN_DETECTION_RADIUS: f32 = 0.35;
/// Extra reach of the broad-phase query beyond the agent's own diameter.
const DETECTION_QUERY_PADDING: f32 = 1.0;
/// Weight of the "keep going the way we are going" seek.
const SAME_DIRECTION_WEIGHT: f32 = 0.1;

/// Persistent, blended interest and danger maps of one agent.
#[derive(Debug, Clone, Default)]
pub struct ContextMaps {
    interest: DirectionMap,
    danger: DirectionMap,
}

impl ContextMaps {
    pub fn interest(&self) -> &DirectionMap {
        &self.interest
    }

    pub fn danger(&self) -> &DirectionMap {
        &self.danger
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Move each blended value toward this tick's raw value by
    /// `min(1, dt * rate)`.
    pub fn blend(&mut self, raw_interest: &DirectionMap, raw_danger: &DirectionMap, dt: f32, rate: f32) {
        let alpha = (dt * rate).clamp(0.0, 1.0);
        for i in 0..INTEREST_DIRECTIONS {
            self.interest[i] += (raw_interest[i] - self.interest[i]) * alpha;
            self.danger[i] += (raw_danger[i] - self.danger[i]) * alpha;
        }
    }

    pub fn select(&self) -> Option<usize> {
        select_direction(&self.interest, &self.danger)
    }
}

/// Index of the best `clamp(interest - danger, 0, 1)`. Ties keep the lowest
/// index; `None` when no direction scores above zero.
pub fn select_direction(interest: &DirectionMap, danger: &DirectionMap) -> Option<usize> {
    let mut best = None;
    let mut best_value = 0.0;

    for i in 0..INTEREST_DIRECTIONS {
        let value = (interest[i] - danger[i]).clamp(0.0, 1.0);
        if value > best_value {
            best = Some(i);
            best_value = value;
        }
    }
    best
}

/// Fraction of the way `value` lies between `min` and `max`, clamped.
pub fn map_value(value: f32, min: f32, max: f32) -> f32 {
    if max > min {
        ((value - min) / (max - min)).clamp(0.0, 1.0)
    } else if value >= min {
        1.0
    } else {
        0.0
    }
}

// ============================================================================
// SEEK
// ============================================================================

/// Add a cosine kernel centred on `direction` (grid-local).
pub fn apply_seek(interest: &mut DirectionMap, direction: Vec2, weight: f32) {
    if weight == 0.0 || direction == Vec2::ZERO {
        return;
    }

    let target_angle = direction.to_angle();
    for (i, slot) in interest.iter_mut().enumerate() {
        let kernel = ((target_angle - DirectionalBasis::angle(i)).cos() + 1.0) * 0.5;
        *slot += (kernel * weight).clamp(0.0, 1.0);
    }
}

/// Seek toward a world-space offset.
///
/// The weight ramps from 0 to 1 as the remaining distance grows from half to
/// three quarters of a tick's movement, so a tiny node is not overshot. While
/// the agent is already moving a small bias toward its current heading is
/// added, limited to the headroom left below 1.0.
pub fn seek(
    interest: &mut DirectionMap,
    transform: &Transform,
    offset: Vec2,
    velocity: Vec2,
    move_speed: f32,
    dt: f32,
) {
    let tick_movement = move_speed * dt;
    let weight = map_value(offset.length(), tick_movement * 0.5, tick_movement * 0.75);
    apply_seek(interest, transform.to_local(offset).normalize_or_zero(), weight);

    // The heading bias never lifts a slot past the selection clamp, or the
    // target and its neighbours would tie at 1.0.
    let headroom = 1.0 - interest.iter().copied().fold(0.0, f32::max);
    let bias = SAME_DIRECTION_WEIGHT.min(headroom);
    if weight > 0.0 && bias > 0.0 && velocity.length_squared() > 0.0 {
        apply_seek(interest, transform.to_local(velocity).normalize_or_zero(), bias);
    }
}

// ============================================================================
// AVOIDANCE
// ============================================================================

/// The agent as seen by the avoidance passes.
#[derive(Debug, Clone, Copy)]
pub struct AvoidanceAgent {
    pub entity: Entity,
    pub transform: Transform,
    pub velocity: Vec2,
    pub radius: f32,
    pub layer: u32,
    pub mask: u32,
}

#[inline]
fn detection_radius(agent_radius: f32, other_radius: f32) -> f32 {
    MIN_DETECTION_RADIUS.max(agent_radius + other_radius)
}

#[inline]
fn danger_weight(distance: f32, agent_radius: f32, detection: f32) -> f32 {
    if distance <= agent_radius {
        1.0
    } else {
        (detection - distance) / detection
    }
}

/// Max-combine `dot(direction, basis[i]) * weight` into `danger`.
fn add_danger(danger: &mut DirectionMap, basis: &DirectionalBasis, direction: Vec2, weight: f32) {
    for (slot, dir) in danger.iter_mut().zip(basis.iter()) {
        *slot = slot.max(direction.dot(dir) * weight);
    }
}

/// Danger from hard static bodies near the agent.
///
/// `bodies` is scratch space; flagged contact points are appended to
/// `danger_points` in world space.
pub fn static_avoidance(
    agent: &AvoidanceAgent,
    basis: &DirectionalBasis,
    physics: &dyn PhysicsQuery,
    danger: &mut DirectionMap,
    danger_points: &mut Vec<Vec2>,
    bodies: &mut Vec<BodyInfo>,
) {
    let position = agent.transform.position;
    bodies.clear();
    physics.bodies_in_radius(
        position,
        agent.radius * 2.0 + DETECTION_QUERY_PADDING,
        BodyKind::Static,
        bodies,
    );

    for body in bodies.iter() {
        if body.entity == agent.entity || !body.blocks(agent.layer, agent.mask) {
            continue;
        }
        let Some(nearest) = physics.nearest_points(agent.entity, body.entity) else {
            continue;
        };

        let detection = detection_radius(agent.radius, body.radius);
        let mut bearing = nearest.on_other - nearest.on_agent;
        let mut distance = nearest.distance;

        if distance > detection {
            continue;
        }

        // Already touching: steer away from the contact as seen from our centre.
        if distance == 0.0 {
            bearing = nearest.on_other - position;
            if bearing.length_squared() == 0.0 {
                continue;
            }
            distance = agent.radius;
        }

        danger_points.push(nearest.on_other);
        let weight = danger_weight(distance, agent.radius, detection);
        let local = agent.transform.to_local(bearing).normalize_or_zero();
        add_danger(danger, basis, local, weight);
    }
}

/// Gentle danger from same-faction dynamic bodies that are closing in.
pub fn separation(
    agent: &AvoidanceAgent,
    basis: &DirectionalBasis,
    physics: &dyn PhysicsQuery,
    factions: &dyn FactionQuery,
    damping: f32,
    danger: &mut DirectionMap,
    bodies: &mut Vec<BodyInfo>,
) {
    let position = agent.transform.position;
    bodies.clear();
    physics.bodies_in_radius(
        position,
        agent.radius * 2.0 + DETECTION_QUERY_PADDING,
        BodyKind::Dynamic,
        bodies,
    );

    for body in bodies.iter() {
        if body.entity == agent.entity
            || !body.blocks(agent.layer, agent.mask)
            || !factions.is_friendly(agent.entity, body.entity)
        {
            continue;
        }

        // Gap already opening up: leave them be.
        if (body.position - position).dot(body.velocity - agent.velocity) > 0.0 {
            continue;
        }

        let Some(nearest) = physics.nearest_points(agent.entity, body.entity) else {
            continue;
        };

        let bearing = nearest.on_other - position;
        let distance = bearing.length();
        let detection = detection_radius(agent.radius, body.radius);
        if distance > detection || distance == 0.0 {
            continue;
        }

        let weight = danger_weight(distance, agent.radius, detection) * damping;
        let local = agent.transform.to_local(bearing / distance);
        add_danger(danger, basis, local, weight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::queries::NearestPoints;
    use approx::assert_relative_eq;
    use rstest::rstest;

    struct OneBody {
        body: BodyInfo,
        agent_at: Vec2,
        agent_radius: f32,
    }

    impl PhysicsQuery for OneBody {
        fn hard_collision(&self, _agent: Entity) -> (u32, u32) {
            (1, 1)
        }

        fn bodies_in_radius(&self, _point: Vec2, _radius: f32, kind: BodyKind, out: &mut Vec<BodyInfo>) {
            let is_static = self.body.velocity == Vec2::ZERO;
            if (kind == BodyKind::Static) == is_static {
                out.push(self.body);
            }
        }

        fn nearest_points(&self, _agent: Entity, _other: Entity) -> Option<NearestPoints> {
            let delta = self.body.position - self.agent_at;
            let gap = delta.length() - self.agent_radius - self.body.radius;
            let dir = delta.normalize_or_zero();
            Some(NearestPoints {
                on_agent: self.agent_at + dir * self.agent_radius,
                on_other: self.body.position - dir * self.body.radius,
                distance: gap.max(0.0),
            })
        }

        fn obstacle_edges(
            &self,
            _point: Vec2,
            _radius: f32,
            _mask: u32,
            _out: &mut Vec<crate::engine::orca::ObstacleEdge>,
        ) {
        }

        fn in_range_unobstructed(&self, _from: Vec2, _to: Vec2, _range: f32, _mask: u32) -> bool {
            true
        }
    }

    struct Everyone;

    impl FactionQuery for Everyone {
        fn is_friendly(&self, _a: Entity, _b: Entity) -> bool {
            true
        }
    }

    fn agent() -> AvoidanceAgent {
        AvoidanceAgent {
            entity: Entity::from_raw(0),
            transform: Transform::from_position(Vec2::ZERO),
            velocity: Vec2::ZERO,
            radius: 0.35,
            layer: 1,
            mask: 1,
        }
    }

    fn body(position: Vec2, velocity: Vec2) -> BodyInfo {
        BodyInfo {
            entity: Entity::from_raw(1),
            position,
            velocity,
            radius: 0.35,
            layer: 1,
            mask: 1,
            hard: true,
            can_collide: true,
        }
    }

    #[test]
    fn ties_pick_the_lowest_index() {
        let mut interest = [0.0; INTEREST_DIRECTIONS];
        interest[4] = 0.6;
        interest[7] = 0.6;
        interest[9] = 0.5;

        assert_eq!(select_direction(&interest, &[0.0; INTEREST_DIRECTIONS]), Some(4));
    }

    #[test]
    fn no_positive_score_selects_nothing() {
        let interest = [0.3; INTEREST_DIRECTIONS];
        let danger = [0.5; INTEREST_DIRECTIONS];
        assert_eq!(select_direction(&interest, &danger), None);
    }

    #[test]
    fn seek_peaks_at_target_direction() {
        let mut interest = [0.0; INTEREST_DIRECTIONS];
        apply_seek(&mut interest, Vec2::Y, 1.0);

        assert_relative_eq!(interest[3], 1.0, epsilon = 1e-6);
        assert_relative_eq!(interest[9], 0.0, epsilon = 1e-6);
        assert_eq!(select_direction(&interest, &[0.0; INTEREST_DIRECTIONS]), Some(3));
    }

    #[test]
    fn full_seek_along_heading_keeps_the_target_direction() {
        let mut interest = [0.0; INTEREST_DIRECTIONS];
        let transform = Transform::from_position(Vec2::ZERO);
        // Heading towards index 2 with a full-weight seek.
        let heading = DirectionalBasis::angle(2);
        let offset = Vec2::from_angle(heading) * 5.0;

        seek(&mut interest, &transform, offset, offset.normalize() * 3.0, 3.0, 1.0 / 30.0);

        assert!(interest.iter().all(|&value| value <= 1.0 + 1e-6));
        assert_eq!(select_direction(&interest, &[0.0; INTEREST_DIRECTIONS]), Some(2));
    }

    #[test]
    fn heading_bias_applies_while_seek_is_ramping() {
        let mut interest = [0.0; INTEREST_DIRECTIONS];
        let transform = Transform::from_position(Vec2::ZERO);
        // 0.1 units of movement per tick; 0.0625 is halfway up the ramp.
        seek(&mut interest, &transform, Vec2::X * 0.0625, Vec2::Y, 3.0, 1.0 / 30.0);

        assert_relative_eq!(interest[0], 0.5 + 0.1 * 0.5, epsilon = 1e-5);
        assert_relative_eq!(interest[3], 0.25 + 0.1, epsilon = 1e-5);
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(0.5, 0.0)]
    #[case(0.625, 0.5)]
    #[case(2.0, 1.0)]
    fn seek_weight_ramps_over_tick_movement(#[case] distance: f32, #[case] expected: f32) {
        // 1 unit of movement per tick: ramp spans [0.5, 0.75].
        assert_relative_eq!(map_value(distance, 0.5, 0.75), expected, epsilon = 1e-6);
    }

    #[test]
    fn blended_maps_converge_to_constant_input() {
        let mut maps = ContextMaps::default();
        let mut raw_interest = [0.0; INTEREST_DIRECTIONS];
        raw_interest[2] = 0.8;
        let mut raw_danger = [0.0; INTEREST_DIRECTIONS];
        raw_danger[5] = 0.4;

        let mut previous_gap = f32::MAX;
        for _ in 0..200 {
            maps.blend(&raw_interest, &raw_danger, 1.0 / 30.0, 12.0);
            let gap = (maps.interest()[2] - 0.8).abs();
            assert!(gap <= previous_gap, "blend must approach the raw value monotonically");
            previous_gap = gap;
        }

        assert_relative_eq!(maps.interest()[2], 0.8, epsilon = 1e-4);
        assert_relative_eq!(maps.danger()[5], 0.4, epsilon = 1e-4);
    }

    #[test]
    fn large_tick_snaps_to_raw_values() {
        let mut maps = ContextMaps::default();
        let raw = [0.7; INTEREST_DIRECTIONS];
        maps.blend(&raw, &raw, 1.0, 12.0);
        assert_eq!(maps.interest(), &raw);
    }

    #[test]
    fn nearby_wall_adds_danger_toward_it() {
        let physics = OneBody {
            body: body(Vec2::new(0.9, 0.0), Vec2::ZERO),
            agent_at: Vec2::ZERO,
            agent_radius: 0.35,
        };
        let basis = DirectionalBasis::new();
        let mut danger = [0.0; INTEREST_DIRECTIONS];
        let mut points = Vec::new();
        let mut scratch = Vec::new();

        static_avoidance(&agent(), &basis, &physics, &mut danger, &mut points, &mut scratch);

        assert!(danger[0] > 0.0);
        assert_eq!(danger[6], 0.0);
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn separation_ignores_friends_moving_away() {
        let physics = OneBody {
            body: body(Vec2::new(0.6, 0.0), Vec2::new(1.0, 0.0)),
            agent_at: Vec2::ZERO,
            agent_radius: 0.35,
        };
        let basis = DirectionalBasis::new();
        let mut danger = [0.0; INTEREST_DIRECTIONS];
        let mut scratch = Vec::new();

        separation(&agent(), &basis, &physics, &Everyone, 0.25, &mut danger, &mut scratch);

        assert!(danger.iter().all(|&d| d == 0.0));
    }

    #[test]
    fn separation_is_damped() {
        let physics = OneBody {
            body: body(Vec2::new(0.6, 0.0), Vec2::new(-1.0, 0.0)),
            agent_at: Vec2::ZERO,
            agent_radius: 0.35,
        };
        let basis = DirectionalBasis::new();
        let mut danger = [0.0; INTEREST_DIRECTIONS];
        let mut scratch = Vec::new();

        separation(&agent(), &basis, &physics, &Everyone, 0.25, &mut danger, &mut scratch);

        assert!(danger[0] > 0.0);
        assert!(danger[0] <= 0.25 + 1e-6);
    }
}
