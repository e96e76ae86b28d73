// Per-agent steering orchestrator and registration API.
//
// One update per tick:
//   1. cancel in-flight requests if pathfinding (or steering) is off,
//   2. steer every registered agent in parallel (follower → arbiter → ORCA),
//   3. write movement inputs and dispatch obstacle actions sequentially,
//   4. publish a debug frame if anyone is listening.

use std::collections::HashMap;

use bevy_ecs::prelude::*;
use glam::Vec2;
use log::{debug, info, warn};
use rayon::prelude::*;

use super::components::{MovementInput, SimTime, Transform, UnitAgent, Velocity};
use super::context::{self, AvoidanceAgent};
use super::debug::{DebugChannel, SteeringDebugData};
use super::directions::{DirectionalBasis, INTEREST_DIRECTIONS};
use super::error::SteeringError;
use super::follower::{self, SeekContext, SeekOutcome};
use super::orca::{self, AgentView, NeighborView};
use super::path::PathService;
use super::queries::{ActionOutcome, BodyKind, ObstacleAction, ObstacleActions, SteeringServices};
use super::settings::SteeringSettings;
use super::state::{AvoidanceState, Destination, SteeringState, SteeringStatus};

/// One registered agent, borrowed out of the world for the tick.
struct AgentRow<'w> {
    entity: Entity,
    transform: Transform,
    velocity: Vec2,
    unit: UnitAgent,
    steering: &'w mut SteeringState,
    avoidance: Option<&'w mut AvoidanceState>,
    input: &'w mut MovementInput,
}

/// Result of steering one agent.
#[derive(Default)]
struct AgentOutput {
    /// Grid-local movement input, |direction| ≤ 1.
    direction: Vec2,
    action: Option<ObstacleAction>,
}

/// Read-only inputs shared by all workers for one tick.
struct TickFrame<'a> {
    settings: &'a SteeringSettings,
    services: SteeringServices<'a>,
    targets: &'a HashMap<Entity, Vec2>,
    now: f64,
    dt: f32,
}

pub struct SteeringSystem {
    basis: DirectionalBasis,
    defaults: SteeringSettings,
    pool: Option<rayon::ThreadPool>,
    debug: DebugChannel,
    /// (enabled, pathfinding_enabled) seen on the previous tick.
    last_toggles: (bool, bool),
}

impl SteeringSystem {
    /// `defaults` seed the avoidance parameters of newly registered agents.
    pub fn new(defaults: SteeringSettings) -> Self {
        let last_toggles = (defaults.enabled, defaults.pathfinding_enabled);
        Self {
            basis: DirectionalBasis::new(),
            defaults,
            pool: None,
            debug: DebugChannel::default(),
            last_toggles,
        }
    }

    /// Run per-agent work on a dedicated pool of `workers` threads instead of
    /// the global rayon pool.
    pub fn with_workers(mut self, workers: usize) -> Result<Self, SteeringError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("steering-{i}"))
            .build()?;
        self.pool = Some(pool);
        Ok(self)
    }

    pub fn debug_channel(&mut self) -> &mut DebugChannel {
        &mut self.debug
    }

    // ========================================================================
    // REGISTRATION
    // ========================================================================

    /// Start steering `agent` toward `destination`, or point an already
    /// registered agent somewhere new. Either way any outstanding path
    /// request is cancelled and the corridor cleared.
    pub fn register<'w>(
        &self,
        world: &'w mut World,
        paths: &dyn PathService,
        agent: Entity,
        destination: Destination,
    ) -> Result<Mut<'w, SteeringState>, SteeringError> {
        let now = world
            .get_resource::<SimTime>()
            .map(|time| time.elapsed)
            .unwrap_or_default();
        let position = world
            .get::<Transform>(agent)
            .map(|transform| transform.position)
            .ok_or(SteeringError::NotFound(agent))?;

        let mut entity = world.entity_mut(agent);
        if let Some(mut state) = entity.get_mut::<SteeringState>() {
            state.retarget(destination, position, now);
        } else {
            let flags = paths.traversal_flags(agent);
            entity.insert(SteeringState::new(destination, flags, position, now));
            if !entity.contains::<MovementInput>() {
                entity.insert(MovementInput::default());
            }
            if !entity.contains::<AvoidanceState>() {
                entity.insert(AvoidanceState::from_settings(&self.defaults));
            }
        }

        entity
            .into_mut::<SteeringState>()
            .ok_or(SteeringError::NotRegistered(agent))
    }

    /// Register unless the agent is already headed to `destination`.
    /// Returns whether anything changed.
    pub fn try_register(
        &self,
        world: &mut World,
        paths: &dyn PathService,
        agent: Entity,
        destination: Destination,
    ) -> Result<bool, SteeringError> {
        if world
            .get::<SteeringState>(agent)
            .is_some_and(|state| state.destination() == destination)
        {
            return Ok(false);
        }
        self.register(world, paths, agent, destination)?;
        Ok(true)
    }

    /// Stop steering `agent`: cancel its request and zero its movement input.
    /// Returns false if it was not registered.
    pub fn unregister(&self, world: &mut World, agent: Entity) -> bool {
        if world.get::<SteeringState>(agent).is_none() {
            return false;
        }
        let tick = world
            .get_resource::<SimTime>()
            .map(|time| time.tick)
            .unwrap_or_default();

        let mut entity = world.entity_mut(agent);
        if let Some(mut state) = entity.take::<SteeringState>() {
            state.cancel_request();
        }
        if let Some(mut input) = entity.get_mut::<MovementInput>() {
            input.direction = Vec2::ZERO;
            input.last_input_tick = tick;
        }
        true
    }

    // ========================================================================
    // UPDATE
    // ========================================================================

    /// Steer every registered agent for one tick of length `dt`.
    pub fn update(
        &mut self,
        world: &mut World,
        settings: &SteeringSettings,
        services: SteeringServices<'_>,
        actions: &mut dyn ObstacleActions,
        dt: f32,
    ) {
        let time = world.get_resource::<SimTime>().copied().unwrap_or_default();
        self.log_toggle_changes(settings);

        let targets = collect_targets(world);
        let mut query = world.query::<(
            Entity,
            &Transform,
            Option<&Velocity>,
            &UnitAgent,
            &mut SteeringState,
            Option<&mut AvoidanceState>,
            &mut MovementInput,
        )>();

        let mut rows: Vec<AgentRow> = query
            .iter_mut(world)
            .map(
                |(entity, transform, velocity, unit, steering, avoidance, input)| AgentRow {
                    entity,
                    transform: *transform,
                    velocity: velocity.map(|v| v.linear).unwrap_or_default(),
                    unit: *unit,
                    steering: steering.into_inner(),
                    avoidance: avoidance.map(Mut::into_inner),
                    input: input.into_inner(),
                },
            )
            .collect();

        if !settings.enabled {
            for row in &mut rows {
                row.steering.abandon();
                row.input.direction = Vec2::ZERO;
                row.input.last_input_tick = time.tick;
            }
            return;
        }

        if !settings.pathfinding_enabled {
            for row in &mut rows {
                row.steering.cancel_request();
                row.steering.corridor.clear();
            }
        }

        let frame = TickFrame {
            settings,
            services,
            targets: &targets,
            now: time.elapsed,
            dt,
        };

        let basis = &self.basis;
        let steer = |row: &mut AgentRow| match steer_agent(row, basis, &frame) {
            Ok(output) => output,
            Err(err) => {
                warn!("steering for {:?} degraded for this tick: {err}", row.entity);
                AgentOutput::default()
            }
        };
        let outputs: Vec<AgentOutput> = match &self.pool {
            Some(pool) => pool.install(|| rows.par_iter_mut().map(steer).collect()),
            None => rows.par_iter_mut().map(steer).collect(),
        };

        for (row, output) in rows.iter_mut().zip(&outputs) {
            row.input.direction = output.direction;
            row.input.last_input_tick = time.tick;

            if let Some(action) = output.action {
                if actions.perform(row.entity, action) == ActionOutcome::Failed {
                    debug!("{:?}: {:?} failed, giving up", row.entity, action);
                    row.steering.status = SteeringStatus::NoPath;
                    row.steering.abandon();
                    row.input.direction = Vec2::ZERO;
                }
            }
        }

        if self.debug.is_active() {
            let snapshots: Vec<SteeringDebugData> = rows
                .iter()
                .map(|row| SteeringDebugData {
                    entity: row.entity,
                    position: row.transform.position,
                    movement: row.input.direction,
                    interest: *row.steering.interest(),
                    danger: *row.steering.danger(),
                    danger_points: row.steering.danger_points.clone(),
                })
                .collect();
            self.debug.publish(time.tick, &snapshots);
        }
    }

    fn log_toggle_changes(&mut self, settings: &SteeringSettings) {
        let toggles = (settings.enabled, settings.pathfinding_enabled);
        if toggles == self.last_toggles {
            return;
        }
        if toggles.0 != self.last_toggles.0 {
            info!("steering {}", if toggles.0 { "enabled" } else { "disabled" });
        }
        if toggles.1 != self.last_toggles.1 {
            info!("pathfinding {}", if toggles.1 { "enabled" } else { "disabled" });
        }
        self.last_toggles = toggles;
    }
}

/// Live positions of every entity some agent is following.
fn collect_targets(world: &mut World) -> HashMap<Entity, Vec2> {
    let mut wanted = Vec::new();
    let mut states = world.query::<&SteeringState>();
    for state in states.iter(world) {
        if let Destination::Entity(target) = state.destination() {
            wanted.push(target);
        }
    }

    wanted
        .into_iter()
        .filter_map(|target| {
            world
                .get::<Transform>(target)
                .map(|transform| (target, transform.position))
        })
        .collect()
}

/// Steer one agent. Runs on a worker thread; touches only this agent's state.
fn steer_agent(
    row: &mut AgentRow,
    basis: &DirectionalBasis,
    frame: &TickFrame,
) -> Result<AgentOutput, SteeringError> {
    let settings = frame.settings;
    let services = frame.services;
    let transform = row.transform;
    let position = transform.position;
    let mut output = AgentOutput::default();

    let destination = match row.steering.destination() {
        Destination::Point(point) => Some(point),
        Destination::Entity(target) => frame.targets.get(&target).copied(),
    };

    let state = &mut *row.steering;
    match state.status {
        SteeringStatus::NoPath => {
            state.abandon();
            return Ok(output);
        }
        SteeringStatus::InRange => {
            let to_target = destination.map_or(Vec2::ZERO, |point| point - position);
            let brake = follower::arrival_brake(row.velocity, to_target, settings);
            output.direction = transform.to_local(brake);
            return Ok(output);
        }
        SteeringStatus::Moving | SteeringStatus::Obstructed => {}
    }

    let Some(destination) = destination else {
        debug!("{:?}: target {:?} is gone", row.entity, state.destination());
        state.status = SteeringStatus::NoPath;
        state.abandon();
        return Ok(output);
    };

    if !row.unit.can_move {
        state.status = SteeringStatus::NoPath;
        state.abandon();
        return Ok(output);
    }

    let (layer, mask) = services.physics.hard_collision(row.entity);
    let ctx = SeekContext {
        entity: row.entity,
        transform,
        velocity: row.velocity,
        move_speed: row.unit.max_speed,
        mask,
        layer,
        destination,
        now: frame.now,
        dt: frame.dt,
        settings,
        services,
    };

    state.blend_elapsed += frame.dt;
    let (offset, force_steer) = match follower::try_seek(state, &ctx, &mut output.action)? {
        SeekOutcome::Seek {
            offset,
            force_steer,
        } => (offset, force_steer),
        SeekOutcome::Arrived { brake } => {
            output.direction = transform.to_local(brake);
            return Ok(output);
        }
        SeekOutcome::Hold | SeekOutcome::Abandon => return Ok(output),
    };

    // ── Context steering ────────────────────────────────────────────────────
    let mut direction = if !force_steer && frame.now < state.next_steer {
        state.last_direction
    } else {
        let mut interest = [0.0; INTEREST_DIRECTIONS];
        let mut danger = [0.0; INTEREST_DIRECTIONS];
        context::seek(
            &mut interest,
            &transform,
            offset,
            row.velocity,
            row.unit.max_speed,
            frame.dt,
        );

        let agent = AvoidanceAgent {
            entity: row.entity,
            transform,
            velocity: row.velocity,
            radius: row.unit.radius,
            layer,
            mask,
        };
        state.danger_points.clear();
        context::static_avoidance(
            &agent,
            basis,
            services.physics,
            &mut danger,
            &mut state.danger_points,
            &mut state.bodies,
        );
        context::separation(
            &agent,
            basis,
            services.physics,
            services.factions,
            settings.separation_damping,
            &mut danger,
            &mut state.bodies,
        );

        state
            .maps
            .blend(&interest, &danger, state.blend_elapsed, settings.blend_rate);
        state.blend_elapsed = 0.0;

        let chosen = state
            .maps
            .select()
            .map(|i| basis.direction(i))
            .unwrap_or(Vec2::ZERO);
        state.next_steer = frame.now + 1.0 / settings.steering_frequency.max(f32::EPSILON) as f64;
        state.last_direction = chosen;
        chosen
    };

    // ── Local avoidance ─────────────────────────────────────────────────────
    if settings.avoidance_enabled && direction != Vec2::ZERO && row.unit.max_speed > 0.0 {
        direction = avoid(row, direction, layer, mask, frame);
    }

    output.direction = direction.clamp_length_max(1.0);
    Ok(output)
}

/// Reconcile the chosen heading with the ORCA-feasible velocity. Agents
/// without an AvoidanceState keep their heading.
fn avoid(row: &mut AgentRow, direction: Vec2, layer: u32, mask: u32, frame: &TickFrame) -> Vec2 {
    let Some(avoidance) = row.avoidance.as_deref_mut() else {
        return direction;
    };
    let physics = frame.services.physics;
    let params = avoidance.params;
    let position = row.transform.position;
    let unit = row.unit;

    avoidance.obstacle_neighbors.clear();
    let obstacle_range = params.obstacle_time_horizon * unit.max_speed + unit.radius;
    physics.obstacle_edges(
        position,
        obstacle_range,
        mask,
        &mut avoidance.obstacle_neighbors,
    );

    avoidance.bodies.clear();
    avoidance.agent_neighbors.clear();
    physics.bodies_in_radius(
        position,
        params.neighbor_range,
        BodyKind::Dynamic,
        &mut avoidance.bodies,
    );
    for body in &avoidance.bodies {
        if body.entity == row.entity || !body.blocks(layer, mask) {
            continue;
        }
        let overlapping = physics
            .nearest_points(row.entity, body.entity)
            .is_some_and(|nearest| nearest.distance <= 0.0);
        avoidance.agent_neighbors.push(NeighborView {
            position: body.position,
            velocity: body.velocity,
            radius: body.radius,
            overlapping,
        });
    }

    let agent = AgentView {
        position,
        velocity: row.velocity,
        preferred_velocity: row.transform.to_world(direction) * unit.max_speed,
        radius: unit.radius,
        max_speed: unit.max_speed,
    };
    let inv_dt = if frame.dt > 0.0 { 1.0 / frame.dt } else { 0.0 };
    let solution = orca::compute_new_velocity(
        &agent,
        &params,
        &avoidance.obstacle_neighbors,
        &avoidance.agent_neighbors,
        inv_dt,
        &mut avoidance.scratch,
    );

    row.transform.to_local(solution.velocity) / unit.max_speed
}
