// Per-agent steering state.
//
// SteeringState is owned by the steering core while the agent is
// registered. Only the path follower touches the corridor and only the
// arbiter touches the context maps; hosts read through the accessors.

use bevy_ecs::prelude::*;
use glam::Vec2;

use super::context::ContextMaps;
use super::directions::DirectionMap;
use super::follower::PathCorridor;
use super::orca::{AvoidanceParams, NeighborView, ObstacleEdge, OrcaLine, OrcaScratch};
use super::path::{PathFlags, PathRequestHandle};
use super::queries::{Blocker, BodyInfo, ObstacleAction};
use super::settings::SteeringSettings;
use super::stuck::StuckTracker;

/// Default arrival range around the destination.
pub const DEFAULT_RANGE: f32 = 0.2;
/// Corridor end drift that triggers a new request.
pub const DEFAULT_REPATH_RANGE: f32 = 1.5;
/// Seconds of sustained line of sight needed when arriving on sight.
pub const DEFAULT_LINE_OF_SIGHT_TIME: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SteeringStatus {
    #[default]
    Moving,
    /// Arrived; terminal until the next registration.
    InRange,
    /// Gave up. Output stays zero until re-registered.
    NoPath,
    /// Waiting on an obstacle action.
    Obstructed,
}

/// Where an agent is headed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Destination {
    Point(Vec2),
    /// Follow an entity's origin.
    Entity(Entity),
}

#[derive(Component, Debug)]
pub struct SteeringState {
    destination: Destination,
    /// Arrival tolerance around the destination.
    pub range: f32,
    pub repath_range: f32,
    pub arrive_on_line_of_sight: bool,
    pub line_of_sight_time_required: f32,
    /// Use the path service. When false the agent heads straight for the
    /// destination.
    pub pathfind: bool,

    pub(crate) line_of_sight_timer: f32,
    pub(crate) flags: PathFlags,
    pub(crate) corridor: PathCorridor,
    pub(crate) maps: ContextMaps,
    pub(crate) status: SteeringStatus,
    pub(crate) stuck: StuckTracker,
    pub(crate) path_request: Option<PathRequestHandle>,
    pub(crate) generation: u64,
    pub(crate) failed_paths: u32,
    pub(crate) next_steer: f64,
    /// Time accumulated since the maps were last blended.
    pub(crate) blend_elapsed: f32,
    pub(crate) last_direction: Vec2,
    pub(crate) danger_points: Vec<Vec2>,
    pub(crate) bodies: Vec<BodyInfo>,
    pub(crate) blockers: Vec<Blocker>,
    pub(crate) pending_action: Option<ObstacleAction>,
}

impl SteeringState {
    pub(crate) fn new(destination: Destination, flags: PathFlags, position: Vec2, now: f64) -> Self {
        Self {
            destination,
            range: DEFAULT_RANGE,
            repath_range: DEFAULT_REPATH_RANGE,
            arrive_on_line_of_sight: false,
            line_of_sight_time_required: DEFAULT_LINE_OF_SIGHT_TIME,
            pathfind: true,
            line_of_sight_timer: 0.0,
            flags,
            corridor: PathCorridor::default(),
            maps: ContextMaps::default(),
            status: SteeringStatus::Moving,
            stuck: StuckTracker::new(position, now),
            path_request: None,
            generation: 0,
            failed_paths: 0,
            next_steer: 0.0,
            blend_elapsed: 0.0,
            last_direction: Vec2::ZERO,
            danger_points: Vec::new(),
            bodies: Vec::new(),
            blockers: Vec::new(),
            pending_action: None,
        }
    }

    /// Point the agent at a new destination. Supersedes any in-flight
    /// request; a completion for the old generation is discarded.
    pub(crate) fn retarget(&mut self, destination: Destination, position: Vec2, now: f64) {
        self.cancel_request();
        self.corridor.clear();
        self.destination = destination;
        self.generation = self.generation.wrapping_add(1);
        self.status = SteeringStatus::Moving;
        self.failed_paths = 0;
        self.stuck.reset(position, now);
        self.line_of_sight_timer = 0.0;
        self.next_steer = 0.0;
        self.last_direction = Vec2::ZERO;
        self.pending_action = None;
    }

    pub(crate) fn cancel_request(&mut self) {
        if let Some(handle) = self.path_request.take() {
            handle.cancel();
        }
    }

    /// Stop following anything: cancel the request and drop the corridor.
    pub(crate) fn abandon(&mut self) {
        self.cancel_request();
        self.corridor.clear();
        self.pending_action = None;
        self.last_direction = Vec2::ZERO;
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }

    pub fn status(&self) -> SteeringStatus {
        self.status
    }

    pub fn flags(&self) -> PathFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: PathFlags) {
        self.flags = flags;
    }

    pub fn corridor(&self) -> &PathCorridor {
        &self.corridor
    }

    pub fn is_path_pending(&self) -> bool {
        self.path_request.is_some()
    }

    /// Bumped on every registration; tags outgoing path requests.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn failed_path_count(&self) -> u32 {
        self.failed_paths
    }

    pub fn interest(&self) -> &DirectionMap {
        self.maps.interest()
    }

    pub fn danger(&self) -> &DirectionMap {
        self.maps.danger()
    }

    /// World-space contact points that contributed danger on the last steer.
    pub fn danger_points(&self) -> &[Vec2] {
        &self.danger_points
    }

    /// Obstacle action requested on the last tick, if any.
    pub fn pending_action(&self) -> Option<ObstacleAction> {
        self.pending_action
    }
}

/// Local avoidance parameters and per-tick scratch for one agent.
#[derive(Component, Debug)]
pub struct AvoidanceState {
    pub params: AvoidanceParams,
    pub(crate) obstacle_neighbors: Vec<ObstacleEdge>,
    pub(crate) agent_neighbors: Vec<NeighborView>,
    pub(crate) bodies: Vec<BodyInfo>,
    pub(crate) scratch: OrcaScratch,
}

impl AvoidanceState {
    pub fn new(params: AvoidanceParams) -> Self {
        Self {
            params,
            obstacle_neighbors: Vec::with_capacity(params.max_neighbors),
            agent_neighbors: Vec::with_capacity(params.max_neighbors),
            bodies: Vec::with_capacity(params.max_neighbors),
            scratch: OrcaScratch::with_capacity(params.max_neighbors),
        }
    }

    pub fn from_settings(settings: &SteeringSettings) -> Self {
        Self::new(AvoidanceParams {
            obstacle_time_horizon: settings.obstacle_time_horizon,
            neighbor_time_horizon: settings.neighbor_time_horizon,
            max_neighbors: settings.max_neighbors,
            neighbor_range: settings.neighbor_range,
        })
    }

    /// Constraints from the most recent solve.
    pub fn lines(&self) -> &[OrcaLine] {
        self.scratch.lines()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::path::{CancelToken, PathTicket};

    #[test]
    fn retarget_cancels_and_bumps_generation() {
        let mut state = SteeringState::new(
            Destination::Point(Vec2::new(5.0, 0.0)),
            PathFlags::empty(),
            Vec2::ZERO,
            0.0,
        );
        let token = CancelToken::new();
        let (ticket, _completer) = PathTicket::new(state.generation);
        state.path_request = Some(PathRequestHandle {
            generation: state.generation,
            cancel: token.clone(),
            ticket,
        });
        state.status = SteeringStatus::NoPath;

        state.retarget(Destination::Point(Vec2::new(0.0, 5.0)), Vec2::ZERO, 1.0);

        assert!(token.is_cancelled());
        assert!(!state.is_path_pending());
        assert_eq!(state.generation(), 1);
        assert_eq!(state.status(), SteeringStatus::Moving);
        assert_eq!(state.destination(), Destination::Point(Vec2::new(0.0, 5.0)));
    }
}
