// ORCA: Optimal Reciprocal Collision Avoidance.
//
// Based on: van den Berg, Guy, Lin, Manocha, "Reciprocal n-Body Collision
// Avoidance" (2011). Obstacle and agent half-plane construction and the LP
// solver follow the RVO2 reference implementation (Apache 2.0).
//
// Everything here is a pure per-tick solve: constraints are rebuilt from
// geometry every tick into per-agent scratch buffers and thrown away after
// the velocity is chosen.

use glam::Vec2;

/// Threshold for "nearly parallel" and "nearly zero" branches.
pub const EPSILON: f32 = 1e-5;

// ============================================================================
// ORCA HALFPLANE
// ============================================================================

/// A directed halfplane constraint in velocity space.
///
/// Convention (matches RVO2):
///   feasible region = { v : det(direction, point - v) ≤ 0 }
///   i.e. v must lie on the LEFT of the ray from `point` along `direction`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrcaLine {
    pub point: Vec2,
    pub direction: Vec2,
}

impl OrcaLine {
    /// Signed perpendicular distance of `velocity` from the line.
    /// Positive means the constraint is violated.
    #[inline]
    pub fn signed_distance(&self, velocity: Vec2) -> f32 {
        det(self.direction, self.point - velocity)
    }
}

/// 2D determinant / cross product: det(a, b) = a.x·b.y − a.y·b.x
#[inline]
fn det(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Positive when `c` lies left of the directed line a → b.
#[inline]
fn left_of(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    det(a - c, b - a)
}

// ============================================================================
// STATIC OBSTACLES
// ============================================================================

/// One edge of a static obstacle polygon, with the neighbouring edge
/// directions the velocity-obstacle construction needs.
///
/// Polygons are wound counter-clockwise, so the solid side of an edge is on
/// its left and agents approach from the right.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObstacleEdge {
    pub start: Vec2,
    pub end: Vec2,
    /// Unit direction start → end.
    pub direction: Vec2,
    /// Unit direction of the edge that ends at `start`.
    pub prev_direction: Vec2,
    /// Unit direction of the edge that begins at `end`.
    pub next_direction: Vec2,
    pub start_convex: bool,
    pub end_convex: bool,
}

impl ObstacleEdge {
    /// A free-standing two-sided segment (a thin wall).
    pub fn segment(start: Vec2, end: Vec2) -> Self {
        let direction = (end - start).normalize_or_zero();
        Self {
            start,
            end,
            direction,
            prev_direction: -direction,
            next_direction: -direction,
            start_convex: true,
            end_convex: true,
        }
    }

    /// Append the edges of a counter-clockwise polygon to `out`.
    pub fn polygon(vertices: &[Vec2], out: &mut Vec<ObstacleEdge>) {
        let n = vertices.len();
        if n < 2 {
            return;
        }
        if n == 2 {
            out.push(Self::segment(vertices[0], vertices[1]));
            return;
        }

        let unit_dir = |i: usize| (vertices[(i + 1) % n] - vertices[i]).normalize_or_zero();
        let convex =
            |i: usize| left_of(vertices[(i + n - 1) % n], vertices[i], vertices[(i + 1) % n]) >= 0.0;

        for i in 0..n {
            let next = (i + 1) % n;
            out.push(Self {
                start: vertices[i],
                end: vertices[next],
                direction: unit_dir(i),
                prev_direction: unit_dir((i + n - 1) % n),
                next_direction: unit_dir(next),
                start_convex: convex(i),
                end_convex: convex(next),
            });
        }
    }

    /// Squared distance from `point` to the segment.
    pub fn distance_squared(&self, point: Vec2) -> f32 {
        let edge = self.end - self.start;
        let len_sq = edge.length_squared();
        if len_sq <= EPSILON {
            return (point - self.start).length_squared();
        }
        let t = ((point - self.start).dot(edge) / len_sq).clamp(0.0, 1.0);
        (point - (self.start + t * edge)).length_squared()
    }
}

/// A polygon vertex as seen from one edge. Oblique views collapse both ends
/// of the construction onto the same vertex.
#[derive(Clone, Copy)]
struct Vertex {
    point: Vec2,
    convex: bool,
    /// Direction of the edge leaving this vertex.
    unit_dir: Vec2,
    /// Direction of the edge arriving at this vertex.
    prev_dir: Vec2,
}

impl Vertex {
    fn start_of(edge: &ObstacleEdge) -> Self {
        Self {
            point: edge.start,
            convex: edge.start_convex,
            unit_dir: edge.direction,
            prev_dir: edge.prev_direction,
        }
    }

    fn end_of(edge: &ObstacleEdge) -> Self {
        Self {
            point: edge.end,
            convex: edge.end_convex,
            unit_dir: edge.next_direction,
            prev_dir: edge.direction,
        }
    }
}

#[inline]
fn left_leg(rel: Vec2, leg: f32, radius: f32, dist_sq: f32) -> Vec2 {
    Vec2::new(rel.x * leg - rel.y * radius, rel.x * radius + rel.y * leg) / dist_sq
}

#[inline]
fn right_leg(rel: Vec2, leg: f32, radius: f32, dist_sq: f32) -> Vec2 {
    Vec2::new(rel.x * leg + rel.y * radius, -rel.x * radius + rel.y * leg) / dist_sq
}

/// Push the ORCA line (if any) for one static obstacle edge.
///
/// Obstacles do not move, so the agent takes full responsibility. An edge
/// whose velocity obstacle is already cut away by an earlier line is skipped,
/// which keeps the constraint count bounded in corridors.
fn push_obstacle_line(
    agent: &AgentView,
    edge: &ObstacleEdge,
    inv_time_horizon: f32,
    lines: &mut Vec<OrcaLine>,
) {
    let radius = agent.radius;
    let velocity = agent.velocity;
    let rel1 = edge.start - agent.position;
    let rel2 = edge.end - agent.position;

    let already_covered = lines.iter().any(|line| {
        det(inv_time_horizon * rel1 - line.point, line.direction) - inv_time_horizon * radius
            >= -EPSILON
            && det(inv_time_horizon * rel2 - line.point, line.direction)
                - inv_time_horizon * radius
                >= -EPSILON
    });
    if already_covered {
        return;
    }

    let obstacle_vector = edge.end - edge.start;
    let edge_len_sq = obstacle_vector.length_squared();
    if edge_len_sq <= EPSILON {
        return;
    }

    let dist_sq1 = rel1.length_squared();
    let dist_sq2 = rel2.length_squared();
    let radius_sq = radius * radius;
    let s = (-rel1).dot(obstacle_vector) / edge_len_sq;
    let dist_sq_line = (-rel1 - s * obstacle_vector).length_squared();

    let mut v1 = Vertex::start_of(edge);
    let mut v2 = Vertex::end_of(edge);

    // ── Already colliding ───────────────────────────────────────────────────
    if s < 0.0 && dist_sq1 <= radius_sq {
        // Left vertex. Ignored when non-convex.
        if v1.convex {
            if let Some(direction) = Vec2::new(-rel1.y, rel1.x).try_normalize() {
                lines.push(OrcaLine { point: Vec2::ZERO, direction });
            }
        }
        return;
    }
    if s > 1.0 && dist_sq2 <= radius_sq {
        // Right vertex. The neighbouring edge handles it unless convex and
        // facing us.
        if v2.convex && det(rel2, v2.unit_dir) >= 0.0 {
            if let Some(direction) = Vec2::new(-rel2.y, rel2.x).try_normalize() {
                lines.push(OrcaLine { point: Vec2::ZERO, direction });
            }
        }
        return;
    }
    if (0.0..1.0).contains(&s) && dist_sq_line <= radius_sq {
        lines.push(OrcaLine {
            point: Vec2::ZERO,
            direction: -edge.direction,
        });
        return;
    }

    // ── No collision: compute the legs ──────────────────────────────────────
    let mut same_vertex = false;
    let (mut left_leg_dir, mut right_leg_dir);

    if s < 0.0 && dist_sq_line <= radius_sq {
        // Viewed obliquely; the left vertex alone defines the obstacle.
        if !v1.convex {
            return;
        }
        v2 = v1;
        same_vertex = true;
        let leg = (dist_sq1 - radius_sq).max(0.0).sqrt();
        left_leg_dir = left_leg(rel1, leg, radius, dist_sq1);
        right_leg_dir = right_leg(rel1, leg, radius, dist_sq1);
    } else if s > 1.0 && dist_sq_line <= radius_sq {
        // Viewed obliquely; the right vertex alone defines the obstacle.
        if !v2.convex {
            return;
        }
        v1 = v2;
        same_vertex = true;
        let leg = (dist_sq2 - radius_sq).max(0.0).sqrt();
        left_leg_dir = left_leg(rel2, leg, radius, dist_sq2);
        right_leg_dir = right_leg(rel2, leg, radius, dist_sq2);
    } else {
        left_leg_dir = if v1.convex {
            let leg = (dist_sq1 - radius_sq).max(0.0).sqrt();
            left_leg(rel1, leg, radius, dist_sq1)
        } else {
            // Non-convex left vertex: the left leg extends the cut-off line.
            -v1.unit_dir
        };
        right_leg_dir = if v2.convex {
            let leg = (dist_sq2 - radius_sq).max(0.0).sqrt();
            right_leg(rel2, leg, radius, dist_sq2)
        } else {
            v1.unit_dir
        };
    }

    // A leg pointing into the neighbouring edge is replaced by that edge's
    // cut-off line. Velocities projecting onto such a "foreign" leg add no
    // constraint here; the neighbouring edge covers them.
    let mut left_foreign = false;
    let mut right_foreign = false;
    if v1.convex && det(left_leg_dir, -v1.prev_dir) >= 0.0 {
        left_leg_dir = -v1.prev_dir;
        left_foreign = true;
    }
    if v2.convex && det(right_leg_dir, v2.unit_dir) <= 0.0 {
        right_leg_dir = v2.unit_dir;
        right_foreign = true;
    }

    let left_cutoff = inv_time_horizon * (v1.point - agent.position);
    let right_cutoff = inv_time_horizon * (v2.point - agent.position);
    let cutoff_vec = right_cutoff - left_cutoff;
    let cutoff_len_sq = cutoff_vec.length_squared();

    let t = if same_vertex || cutoff_len_sq <= EPSILON {
        0.5
    } else {
        (velocity - left_cutoff).dot(cutoff_vec) / cutoff_len_sq
    };
    let t_left = (velocity - left_cutoff).dot(left_leg_dir);
    let t_right = (velocity - right_cutoff).dot(right_leg_dir);

    // ── Project onto a cut-off circle ───────────────────────────────────────
    if (t < 0.0 && t_left < 0.0) || (same_vertex && t_left < 0.0 && t_right < 0.0) {
        if let Some(unit_w) = (velocity - left_cutoff).try_normalize() {
            lines.push(OrcaLine {
                point: left_cutoff + radius * inv_time_horizon * unit_w,
                direction: Vec2::new(unit_w.y, -unit_w.x),
            });
        }
        return;
    }
    if t > 1.0 && t_right < 0.0 {
        if let Some(unit_w) = (velocity - right_cutoff).try_normalize() {
            lines.push(OrcaLine {
                point: right_cutoff + radius * inv_time_horizon * unit_w,
                direction: Vec2::new(unit_w.y, -unit_w.x),
            });
        }
        return;
    }

    // ── Project onto the left leg, right leg or cut-off line ────────────────
    let dist_sq_cutoff = if t < 0.0 || t > 1.0 || same_vertex {
        f32::INFINITY
    } else {
        (velocity - (left_cutoff + t * cutoff_vec)).length_squared()
    };
    let dist_sq_left = if t_left < 0.0 {
        f32::INFINITY
    } else {
        (velocity - (left_cutoff + t_left * left_leg_dir)).length_squared()
    };
    let dist_sq_right = if t_right < 0.0 {
        f32::INFINITY
    } else {
        (velocity - (right_cutoff + t_right * right_leg_dir)).length_squared()
    };

    if dist_sq_cutoff <= dist_sq_left && dist_sq_cutoff <= dist_sq_right {
        let direction = -v1.unit_dir;
        lines.push(OrcaLine {
            point: left_cutoff + radius * inv_time_horizon * direction.perp(),
            direction,
        });
    } else if dist_sq_left <= dist_sq_right {
        if left_foreign {
            return;
        }
        let direction = left_leg_dir;
        lines.push(OrcaLine {
            point: left_cutoff + radius * inv_time_horizon * direction.perp(),
            direction,
        });
    } else {
        if right_foreign {
            return;
        }
        let direction = -right_leg_dir;
        lines.push(OrcaLine {
            point: right_cutoff + radius * inv_time_horizon * direction.perp(),
            direction,
        });
    }
}

// ============================================================================
// DYNAMIC NEIGHBOURS
// ============================================================================

/// Compute the ORCA halfplane that the agent must respect to avoid `other`.
///
/// Responsibility is split 50/50: each side assumes the other will take the
/// remaining half of the required velocity change.
/// `inv_dt` is 1 / tick length, used only when the agents already overlap.
fn agent_line(
    agent: &AgentView,
    other: &NeighborView,
    inv_time_horizon: f32,
    inv_dt: f32,
) -> OrcaLine {
    let rel_pos = other.position - agent.position;
    let rel_vel = agent.velocity - other.velocity;
    let dist_sq = rel_pos.length_squared();
    let combined_r = agent.radius + other.radius;
    let combined_rsq = combined_r * combined_r;

    let u: Vec2;
    let direction: Vec2;

    if dist_sq > combined_rsq && !other.overlapping {
        // ── Not overlapping ─────────────────────────────────────────────────
        // w: relative velocity shifted to the truncated-cone tip.
        let w = rel_vel - inv_time_horizon * rel_pos;
        let w_sq = w.length_squared();
        let dot = w.dot(rel_pos);

        if dot < 0.0 && dot * dot > combined_rsq * w_sq {
            // Closest boundary point is on the cut-off circle.
            let w_len = w_sq.sqrt();
            let unit_w = if w_len > EPSILON { w / w_len } else { Vec2::X };
            direction = Vec2::new(unit_w.y, -unit_w.x);
            u = (combined_r * inv_time_horizon - w_len) * unit_w;
        } else {
            // Closest boundary point is on one of the legs; the sign of
            // rel_pos × w picks which one.
            let leg = (dist_sq - combined_rsq).max(0.0).sqrt();
            direction = if det(rel_pos, w) > 0.0 {
                left_leg(rel_pos, leg, combined_r, dist_sq)
            } else {
                -right_leg(rel_pos, leg, combined_r, dist_sq)
            };
            u = rel_vel.dot(direction) * direction - rel_vel;
        }
    } else {
        // ── Already overlapping: resolve within one tick ────────────────────
        let w = rel_vel - rel_pos * inv_dt;
        let w_len = w.length();
        let unit_w = if w_len > EPSILON {
            w / w_len
        } else if let Some(away) = (-rel_pos).try_normalize() {
            away
        } else {
            Vec2::X
        };
        direction = Vec2::new(unit_w.y, -unit_w.x);
        u = (combined_r * inv_dt - w_len) * unit_w;
    }

    OrcaLine {
        point: agent.velocity + 0.5 * u,
        direction,
    }
}

// ============================================================================
// 2-D LINEAR PROGRAMME
// ============================================================================

/// Solve the 1-D sub-problem on constraint `line_no`, given that constraints
/// 0..line_no are already satisfied and |v| ≤ max_speed.
///
/// `direction_opt = true`  → go as far as possible along `opt_velocity`.
/// `direction_opt = false` → closest point to `opt_velocity`.
///
/// Returns `false` if the sub-problem is infeasible.
fn linear_program1(
    lines: &[OrcaLine],
    line_no: usize,
    max_speed: f32,
    opt_velocity: Vec2,
    direction_opt: bool,
    result: &mut Vec2,
) -> bool {
    let line = lines[line_no];
    let dot = line.point.dot(line.direction);
    let discriminant = dot * dot + max_speed * max_speed - line.point.length_squared();
    if discriminant < 0.0 {
        // Speed circle fully invalidates this line.
        return false;
    }

    let sqrt_disc = discriminant.sqrt();
    let mut t_left = -dot - sqrt_disc;
    let mut t_right = -dot + sqrt_disc;

    for other in &lines[..line_no] {
        let denominator = det(line.direction, other.direction);
        let numerator = det(other.direction, line.point - other.point);

        if denominator.abs() <= EPSILON {
            // Parallel. Infeasible only if this line lies outside the other.
            if numerator < 0.0 {
                return false;
            }
            continue;
        }

        let t = numerator / denominator;
        if denominator >= 0.0 {
            // `other` bounds this line on the right.
            t_right = t_right.min(t);
        } else {
            t_left = t_left.max(t);
        }

        if t_left > t_right {
            return false;
        }
    }

    if direction_opt {
        *result = if opt_velocity.dot(line.direction) > 0.0 {
            line.point + t_right * line.direction
        } else {
            line.point + t_left * line.direction
        };
    } else {
        let t = line.direction.dot(opt_velocity - line.point);
        let t = if t < t_left {
            t_left
        } else if t > t_right {
            t_right
        } else {
            t
        };
        *result = line.point + t * line.direction;
    }
    true
}

/// Incrementally intersect the halfplanes.
///
/// Returns the index of the first line that could not be satisfied
/// (= `lines.len()` on success). On failure `result` still satisfies every
/// line before that index.
fn linear_program2(
    lines: &[OrcaLine],
    max_speed: f32,
    opt_velocity: Vec2,
    direction_opt: bool,
    result: &mut Vec2,
) -> usize {
    if direction_opt {
        // opt_velocity is a unit direction in this mode.
        *result = opt_velocity * max_speed;
    } else if opt_velocity.length_squared() > max_speed * max_speed {
        *result = opt_velocity.normalize_or_zero() * max_speed;
    } else {
        *result = opt_velocity;
    }

    for (i, line) in lines.iter().enumerate() {
        if line.signed_distance(*result) > 0.0 {
            let previous = *result;
            if !linear_program1(lines, i, max_speed, opt_velocity, direction_opt, result) {
                *result = previous;
                return i;
            }
        }
    }
    lines.len()
}

/// Fallback when the constraints are mutually infeasible: keep the first
/// `hard_lines` lines hard and minimise the largest violation of the rest.
fn linear_program3(
    lines: &[OrcaLine],
    hard_lines: usize,
    begin_line: usize,
    max_speed: f32,
    result: &mut Vec2,
    projected: &mut Vec<OrcaLine>,
) {
    let mut distance = 0.0f32;

    for i in begin_line..lines.len() {
        let line = lines[i];
        if line.signed_distance(*result) <= distance {
            continue;
        }

        projected.clear();
        projected.extend_from_slice(&lines[..hard_lines]);

        for other in &lines[hard_lines..i] {
            let determinant = det(line.direction, other.direction);
            let point = if determinant.abs() <= EPSILON {
                if line.direction.dot(other.direction) > 0.0 {
                    // Same direction: already subsumed.
                    continue;
                }
                // Opposite direction: midpoint constraint.
                0.5 * (line.point + other.point)
            } else {
                line.point
                    + (det(other.direction, line.point - other.point) / determinant)
                        * line.direction
            };
            let Some(direction) = (other.direction - line.direction).try_normalize() else {
                continue;
            };
            projected.push(OrcaLine { point, direction });
        }

        let previous = *result;
        let opt_direction = Vec2::new(-line.direction.y, line.direction.x);
        if linear_program2(projected, max_speed, opt_direction, true, result) < projected.len() {
            // Only reachable through floating point error; the previous
            // result is already in the feasible region of this programme.
            *result = previous;
        }

        distance = line.signed_distance(*result);
    }
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// The agent being solved for.
#[derive(Clone, Copy, Debug)]
pub struct AgentView {
    pub position: Vec2,
    /// Velocity from the previous tick.
    pub velocity: Vec2,
    /// Velocity the agent would like to take this tick.
    pub preferred_velocity: Vec2,
    pub radius: f32,
    pub max_speed: f32,
}

/// A nearby dynamic body.
#[derive(Clone, Copy, Debug)]
pub struct NeighborView {
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    /// Physics reports the shapes as interpenetrating.
    pub overlapping: bool,
}

/// Per-agent tunables.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AvoidanceParams {
    pub obstacle_time_horizon: f32,
    pub neighbor_time_horizon: f32,
    pub max_neighbors: usize,
    pub neighbor_range: f32,
}

/// Reusable buffers for one agent's solve. Cleared, never shrunk, so a warm
/// agent does not allocate per tick.
#[derive(Debug, Default)]
pub struct OrcaScratch {
    pub(crate) lines: Vec<OrcaLine>,
    projected: Vec<OrcaLine>,
    order: Vec<(f32, usize)>,
}

impl OrcaScratch {
    pub fn with_capacity(max_neighbors: usize) -> Self {
        Self {
            lines: Vec::with_capacity(max_neighbors * 2),
            projected: Vec::with_capacity(max_neighbors * 2),
            order: Vec::with_capacity(max_neighbors * 2),
        }
    }

    /// Constraints built by the most recent solve.
    pub fn lines(&self) -> &[OrcaLine] {
        &self.lines
    }
}

/// Result of one velocity solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Solution {
    /// Collision-free velocity with |velocity| ≤ max_speed.
    pub velocity: Vec2,
    /// First line the strict programme could not satisfy, if any. When set
    /// the velocity came from the least-violation fallback.
    pub failed_line: Option<usize>,
}

/// Solve for the velocity closest to `preferred` inside the speed circle and
/// the halfplanes. The first `num_obstacle_lines` lines are never relaxed, and
/// neither is any line the strict pass satisfied before it failed.
pub fn solve(
    lines: &[OrcaLine],
    num_obstacle_lines: usize,
    preferred: Vec2,
    max_speed: f32,
    projected: &mut Vec<OrcaLine>,
) -> Solution {
    let mut velocity = preferred;
    let fail = linear_program2(lines, max_speed, preferred, false, &mut velocity);
    if fail < lines.len() {
        // Lines before the failure were satisfied by the strict pass and stay hard.
        let hard = fail.max(num_obstacle_lines);
        linear_program3(lines, hard, fail, max_speed, &mut velocity, projected);
        return Solution {
            velocity,
            failed_line: Some(fail),
        };
    }
    Solution {
        velocity,
        failed_line: None,
    }
}

/// Compute the ORCA-adjusted velocity for one agent.
///
/// Obstacle edges are only considered when the agent is on their outer side
/// and within reach of one obstacle horizon; neighbours are capped at
/// `max_neighbors`, nearest first, so the cap keeps the most pressing
/// collisions.
pub fn compute_new_velocity(
    agent: &AgentView,
    params: &AvoidanceParams,
    obstacles: &[ObstacleEdge],
    neighbors: &[NeighborView],
    inv_dt: f32,
    scratch: &mut OrcaScratch,
) -> Solution {
    let OrcaScratch {
        lines,
        projected,
        order,
    } = scratch;
    lines.clear();

    // ── Static obstacles, nearest first ─────────────────────────────────────
    let inv_obstacle_horizon = 1.0 / params.obstacle_time_horizon.max(EPSILON);
    let obstacle_range = params.obstacle_time_horizon * agent.max_speed + agent.radius;
    let obstacle_range_sq = obstacle_range * obstacle_range;

    order.clear();
    for (i, edge) in obstacles.iter().enumerate() {
        if left_of(edge.start, edge.end, agent.position) >= 0.0 {
            // Inside face; the polygon's outer edges take care of it.
            continue;
        }
        let dist_sq = edge.distance_squared(agent.position);
        if dist_sq < obstacle_range_sq {
            order.push((dist_sq, i));
        }
    }
    order.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
    for &(_, i) in order.iter() {
        push_obstacle_line(agent, &obstacles[i], inv_obstacle_horizon, lines);
    }
    let num_obstacle_lines = lines.len();

    // ── Dynamic neighbours, nearest first, capped ───────────────────────────
    let inv_neighbor_horizon = 1.0 / params.neighbor_time_horizon.max(EPSILON);
    let range_sq = params.neighbor_range * params.neighbor_range;

    order.clear();
    for (i, neighbor) in neighbors.iter().enumerate() {
        let dist_sq = (neighbor.position - agent.position).length_squared();
        if dist_sq < range_sq {
            order.push((dist_sq, i));
        }
    }
    order.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
    order.truncate(params.max_neighbors);
    for &(_, i) in order.iter() {
        lines.push(agent_line(agent, &neighbors[i], inv_neighbor_horizon, inv_dt));
    }

    solve(
        lines,
        num_obstacle_lines,
        agent.preferred_velocity,
        agent.max_speed,
        projected,
    )
}
