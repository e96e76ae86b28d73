// Path follower.
//
// Decides each tick where an agent should be heading: the head of its
// corridor, or the destination itself in direct-move mode. Consumes path
// completions, requests new paths, prunes stale nodes, hands blocked nodes
// to the obstacle handler and brakes on arrival.

use std::collections::VecDeque;

use bevy_ecs::entity::Entity;
use glam::Vec2;
use log::debug;

use super::components::Transform;
use super::error::SteeringError;
use super::obstacles::{self, ObstacleStatus};
use super::path::{
    CancelToken, PathRequest, PathRequestHandle, PathResult, PathTicket, PolyRef,
};
use super::queries::{ObstacleAction, SteeringServices};
use super::settings::SteeringSettings;
use super::state::{Destination, SteeringState, SteeringStatus};
use super::stuck::StuckVerdict;

/// Free-space nodes count as reached slightly inside their half-extent.
const NODE_ARRIVAL_MARGIN: f32 = 0.01;
/// Blocked nodes are approached to just inside interaction range.
const INTERACTION_MARGIN: f32 = 0.05;
/// Squared speed above which the agent is still coming to a stop.
const SETTLE_SPEED_SQ: f32 = 0.01;
/// Overshoot allowance for the arrival brake (half a tile).
const HALF_TILE: f32 = 0.5;

/// Ordered corridor of path nodes; the head is the next node to reach.
#[derive(Debug, Default)]
pub struct PathCorridor {
    nodes: VecDeque<PolyRef>,
}

impl PathCorridor {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn head(&self) -> Option<&PolyRef> {
        self.nodes.front()
    }

    pub fn last(&self) -> Option<&PolyRef> {
        self.nodes.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PolyRef> {
        self.nodes.iter()
    }

    pub(crate) fn pop_head(&mut self) -> Option<PolyRef> {
        self.nodes.pop_front()
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
    }

    pub(crate) fn replace(&mut self, nodes: VecDeque<PolyRef>) {
        self.nodes = nodes;
    }
}

/// Everything the follower reads about one agent this tick.
pub(crate) struct SeekContext<'a> {
    pub entity: Entity,
    pub transform: Transform,
    pub velocity: Vec2,
    pub move_speed: f32,
    pub mask: u32,
    pub layer: u32,
    /// Live world position of the destination.
    pub destination: Vec2,
    pub now: f64,
    pub dt: f32,
    pub settings: &'a SteeringSettings,
    pub services: SteeringServices<'a>,
}

impl SeekContext<'_> {
    fn position(&self) -> Vec2 {
        self.transform.position
    }

    fn direct_mode(&self, state: &SteeringState) -> bool {
        !state.pathfind || !self.settings.pathfinding_enabled
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SeekOutcome {
    /// Head along this world-space offset.
    Seek { offset: Vec2, force_steer: bool },
    /// Arrived. Apply this world-space brake input (possibly zero).
    Arrived { brake: Vec2 },
    /// Stand still this tick but keep following.
    Hold,
    /// Stop; the status has been updated and the corridor dropped.
    Abandon,
}

/// Brake input near the goal, world space, unit length or zero.
///
/// Slow enough: just stop. Fast enough to overshoot the goal by more than
/// half a tile: brake against the velocity. Otherwise cancel the sideways
/// component only so the agent does not circle the goal.
pub fn arrival_brake(velocity: Vec2, to_target: Vec2, settings: &SteeringSettings) -> Vec2 {
    let speed = velocity.length();
    if speed <= settings.arrival_speed {
        return Vec2::ZERO;
    }

    let hard_brake = -velocity / speed;
    if speed * settings.circling_tolerance > to_target.length() + HALF_TILE {
        return hard_brake;
    }

    let Some(toward) = to_target.try_normalize() else {
        return hard_brake;
    };
    let tangential = velocity - toward * velocity.dot(toward);
    (-tangential).normalize_or_zero()
}

/// World-space centre of a node.
fn node_center(poly: &PolyRef, ctx: &SeekContext) -> Result<Vec2, SteeringError> {
    ctx.services
        .paths
        .world_bounds(poly)
        .map(|bounds| bounds.center())
        .ok_or(SteeringError::UnresolvedNode(poly.graph))
}

/// Apply a completed request, if one has arrived.
pub(crate) fn poll_path(state: &mut SteeringState, ctx: &SeekContext) {
    let Some(handle) = &state.path_request else {
        return;
    };
    let Some(response) = handle.ticket.try_take() else {
        return;
    };
    state.path_request = None;

    if response.generation != state.generation {
        debug!(
            "{:?}: discarding path for generation {} (now {})",
            ctx.entity, response.generation, state.generation
        );
        return;
    }

    match response.result {
        PathResult::NoPath => {
            state.corridor.clear();
            state.failed_paths += 1;
            debug!(
                "{:?}: no path ({} of {})",
                ctx.entity, state.failed_paths, ctx.settings.failed_path_limit
            );
            if state.failed_paths >= ctx.settings.failed_path_limit {
                state.status = SteeringStatus::NoPath;
            }
        }
        PathResult::Success(mut nodes) => {
            state.failed_paths = 0;
            let to_goal = ctx.destination - ctx.position();
            prune_path(&mut nodes, to_goal, ctx);
            state.corridor.replace(nodes);
        }
    }
}

/// Drop leading free-space nodes that lie behind the agent.
///
/// Only done when the end of the corridor is in unobstructed reach, so a
/// path that deliberately backtracks around an obstacle is left alone. A
/// node that still contains the agent is never dropped, and the last node is
/// always kept.
pub(crate) fn prune_path(nodes: &mut VecDeque<PolyRef>, to_goal: Vec2, ctx: &SeekContext) {
    if nodes.len() <= 1 {
        return;
    }
    let position = ctx.position();
    let Some(goal) = nodes
        .back()
        .and_then(|node| ctx.services.paths.world_bounds(node))
        .map(|bounds| bounds.center())
    else {
        return;
    };

    let reach = position.distance(goal) + 0.1;
    if !ctx
        .services
        .physics
        .in_range_unobstructed(position, goal, reach, ctx.mask)
    {
        return;
    }

    while nodes.len() > 1 {
        let Some(node) = nodes.front() else {
            break;
        };
        if !node.is_free_space() {
            break;
        }
        let Some(bounds) = ctx.services.paths.world_bounds(node) else {
            break;
        };
        if bounds.contains(position) || to_goal.dot(bounds.center() - position) >= 0.0 {
            break;
        }
        nodes.pop_front();
    }
}

/// Ask for a new corridor unless one is already on its way or the goal is
/// close enough to walk straight at. Returns whether the corridor was
/// replaced or a request went out.
fn request_path(state: &mut SteeringState, ctx: &SeekContext, target_distance: f32) -> bool {
    if state.path_request.is_some() || target_distance < state.repath_range {
        return false;
    }

    let paths = ctx.services.paths;

    // An entity in clear view is simply walked at.
    if let Destination::Entity(_) = state.destination() {
        if let Some(poly) = paths.poly_at(ctx.destination) {
            if ctx.services.physics.in_range_unobstructed(
                ctx.position(),
                ctx.destination,
                ctx.settings.direct_los_range,
                ctx.mask,
            ) {
                state.corridor.replace(VecDeque::from([poly]));
                return true;
            }
        }
    }

    let cancel = CancelToken::new();
    let (ticket, completer) = PathTicket::new(state.generation);
    paths.request_path(PathRequest {
        agent: ctx.entity,
        from: ctx.position(),
        to: ctx.destination,
        arrival_range: state.range,
        flags: state.flags,
        cancel: cancel.clone(),
        completer,
    });
    state.path_request = Some(PathRequestHandle {
        generation: state.generation,
        cancel,
        ticket,
    });
    true
}

/// Repath when asked to, or when the corridor's end has drifted from the
/// live destination. Returns whether a new path was started.
fn check_path(
    state: &mut SteeringState,
    ctx: &SeekContext,
    mut needs_path: bool,
    target_distance: f32,
) -> Result<bool, SteeringError> {
    if !ctx.settings.pathfinding_enabled {
        state.corridor.clear();
        state.cancel_request();
        return Ok(false);
    }
    if !state.pathfind {
        return Ok(false);
    }

    if !needs_path {
        if let Some(last) = state.corridor.last() {
            let drift = node_center(last, ctx)?.distance(ctx.destination);
            needs_path = drift > state.repath_range;
        }
    }

    Ok(needs_path && request_path(state, ctx, target_distance))
}

/// Arrived at the destination, honouring the line-of-sight requirement.
fn arrived(state: &mut SteeringState, ctx: &SeekContext, distance: f32) -> bool {
    if distance > state.range {
        state.line_of_sight_timer = 0.0;
        return false;
    }
    if !state.arrive_on_line_of_sight {
        return true;
    }

    if ctx.services.physics.in_range_unobstructed(
        ctx.position(),
        ctx.destination,
        state.range,
        ctx.mask,
    ) {
        state.line_of_sight_timer += ctx.dt;
    } else {
        state.line_of_sight_timer = 0.0;
    }
    state.line_of_sight_timer >= state.line_of_sight_time_required
}

/// Where the agent heads next and how close counts as reached.
fn current_target(state: &SteeringState, ctx: &SeekContext) -> Result<(Vec2, f32), SteeringError> {
    if ctx.direct_mode(state) {
        return Ok((ctx.destination, state.range));
    }
    let Some(head) = state.corridor.head() else {
        return Ok((ctx.destination, state.range));
    };

    let bounds = ctx
        .services
        .paths
        .world_bounds(head)
        .ok_or(SteeringError::UnresolvedNode(head.graph))?;
    let arrival = if head.is_free_space() {
        (bounds.width() / 2.0).min(bounds.height() / 2.0) - NODE_ARRIVAL_MARGIN
    } else {
        ctx.settings.interaction_range - INTERACTION_MARGIN
    };
    Ok((bounds.center(), arrival))
}

/// Advance the follower by one tick.
///
/// `action` receives the obstacle mitigation to dispatch after the parallel
/// phase, if the head node needs one.
pub(crate) fn try_seek(
    state: &mut SteeringState,
    ctx: &SeekContext,
    action: &mut Option<ObstacleAction>,
) -> Result<SeekOutcome, SteeringError> {
    poll_path(state, ctx);
    if state.status == SteeringStatus::NoPath {
        state.abandon();
        return Ok(SeekOutcome::Abandon);
    }

    let position = ctx.position();
    let distance = position.distance(ctx.destination);

    if arrived(state, ctx, distance) {
        state.status = SteeringStatus::InRange;
        state.abandon();
        return Ok(SeekOutcome::Arrived {
            brake: arrival_brake(ctx.velocity, ctx.destination - position, ctx.settings),
        });
    }

    // Stale nodes are dropped silently and replaced.
    let mut needs_path = false;
    if !ctx.direct_mode(state) {
        while let Some(head) = state.corridor.head() {
            if head.is_valid() && ctx.services.paths.world_bounds(head).is_some() {
                break;
            }
            state.corridor.pop_head();
            needs_path = true;
            state.stuck.reset(position, ctx.now);
        }
    }

    let mut force_steer = false;
    let mut stuck_repath = false;
    let (target, arrival_distance) = current_target(state, ctx)?;
    let mut offset = target - position;

    if offset.length() <= arrival_distance {
        let head = if ctx.direct_mode(state) {
            None
        } else {
            state.corridor.head().cloned()
        };

        if let Some(node) = head.as_ref().filter(|node| !node.is_free_space()) {
            // Obstacle handling is not being stuck.
            state.stuck.reset(position, ctx.now);

            if ctx.velocity.length_squared() > SETTLE_SPEED_SQ {
                return Ok(SeekOutcome::Hold);
            }

            let bounds = ctx
                .services
                .paths
                .world_bounds(node)
                .ok_or(SteeringError::UnresolvedNode(node.graph))?;
            let outcome = obstacles::handle(
                node,
                bounds,
                state.flags,
                ctx.layer,
                ctx.mask,
                ctx.services.blockers,
                &mut state.blockers,
            );

            match outcome.status {
                ObstacleStatus::Completed => {
                    state.pending_action = None;
                }
                ObstacleStatus::Failed => {
                    debug!("{:?}: blocked at {:?}, giving up", ctx.entity, bounds.center());
                    state.status = SteeringStatus::NoPath;
                    state.abandon();
                    return Ok(SeekOutcome::Abandon);
                }
                ObstacleStatus::Continuing => {
                    state.status = SteeringStatus::Obstructed;
                    state.pending_action = outcome.action;
                    *action = outcome.action;
                    check_path(state, ctx, needs_path, distance)?;
                    return Ok(SeekOutcome::Hold);
                }
            }
        }

        if state.status == SteeringStatus::Obstructed {
            state.status = SteeringStatus::Moving;
        }

        if head.is_some() {
            // Reached a node: move on to the next one without a stall.
            state.corridor.pop_head();
            force_steer = true;
            let (next_target, _) = current_target(state, ctx)?;
            offset = next_target - position;
            state.stuck.reset(position, ctx.now);
        } else if state.arrive_on_line_of_sight {
            // In range of the goal but still waiting for sight of it.
            return Ok(SeekOutcome::Hold);
        } else {
            state.status = SteeringStatus::NoPath;
            state.abandon();
            return Ok(SeekOutcome::Abandon);
        }
    } else if ctx.settings.anti_stuck {
        match state.stuck.check(
            position,
            ctx.now,
            ctx.move_speed,
            ctx.settings.stuck_distance,
            ctx.settings.stuck_give_up_factor,
        ) {
            StuckVerdict::GiveUp => {
                debug!("{:?}: stuck at {:?}, giving up", ctx.entity, position);
                state.status = SteeringStatus::NoPath;
                state.abandon();
                return Ok(SeekOutcome::Abandon);
            }
            StuckVerdict::Repath => {
                stuck_repath = true;
                needs_path = true;
            }
            StuckVerdict::Progressing | StuckVerdict::Waiting => {}
        }
    } else {
        state.stuck.reset(position, ctx.now);
    }

    if !needs_path {
        needs_path = state.corridor.head().is_none_or(|head| !head.is_valid());
    }
    if check_path(state, ctx, needs_path, distance)? && stuck_repath {
        debug!("{:?}: stuck at {:?}, repathing", ctx.entity, position);
        state.stuck.mark_repathed();
    }

    // Wait for the first corridor rather than stutter toward the goal.
    if state.path_request.is_some() && state.corridor.is_empty() {
        return Ok(SeekOutcome::Hold);
    }

    if ctx.move_speed <= 0.0 || offset == Vec2::ZERO {
        state.status = SteeringStatus::NoPath;
        state.abandon();
        return Ok(SeekOutcome::Abandon);
    }

    Ok(SeekOutcome::Seek {
        offset,
        force_steer,
    })
}
