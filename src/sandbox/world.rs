// A small self-contained world for driving the steering core: a tile grid
// with walls, doors, breakables and tables, circle agents, and the
// collaborators the core expects from a host engine.
//
// Tick order:
//   1. advance SimTime and answer path requests queued last tick,
//   2. snapshot physics from the ECS,
//   3. steer (SteeringSystem::update),
//   4. apply obstacle actions (open, pry, attack, climb),
//   5. integrate movement.

use std::collections::HashMap;

use bevy_ecs::prelude::*;
use glam::{UVec2, Vec2};
use log::{debug, info};

use crate::engine::components::{MovementInput, SimTime, Transform, UnitAgent, Velocity};
use crate::engine::error::SteeringError;
use crate::engine::path::{PathFlags, PathService};
use crate::engine::queries::{
    ActionOutcome, BodyKind, DoorInfo, ObstacleAction, ObstacleActions, SteeringServices,
};
use crate::engine::settings::SteeringSettings;
use crate::engine::state::{Destination, SteeringState, SteeringStatus};
use crate::engine::system::SteeringSystem;

use super::components::{Climbable, Climbing, CollisionBody, Destructible, Door, FactionMember};
use super::mover::movement_system;
use super::navigation::{BREAKABLE_DAMAGE, CELL_SIZE, CellKind, GridPathService, NavigationGrid};
use super::physics::{LAYER_MOB, LAYER_STATIC, MASK_MOB, PhysicsBody, PhysicsSnapshot, Shape};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Seconds of prying to force an access-locked door.
pub const PRY_TIME: f32 = 1.0;
/// Damage per second dealt by an attacking agent.
pub const ATTACK_DPS: f32 = 20.0;
/// Seconds static collision is suspended while climbing.
pub const CLIMB_TIME: f32 = 1.0;
/// Padding around the grid covered by the physics broad phase.
const WORLD_MARGIN: f32 = 4.0;

/// Per-agent parameters for [`Sandbox::spawn_agent`].
#[derive(Debug, Clone, Copy)]
pub struct AgentSpec {
    pub radius: f32,
    pub max_speed: f32,
    pub faction: u32,
    pub flags: PathFlags,
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            radius: 0.35,
            max_speed: 3.0,
            faction: 0,
            flags: PathFlags::INTERACT,
        }
    }
}

// ============================================================================
// OBSTACLE ACTIONS
// ============================================================================

/// What an action target looked like at the start of the tick.
#[derive(Debug, Clone, Copy, Default)]
struct TargetInfo {
    door: Option<Door>,
    destructible: bool,
    climbable: bool,
}

/// Validates actions against the start-of-tick world and queues them; the
/// queue is applied to the ECS after steering.
#[derive(Debug, Default)]
pub struct SandboxActions {
    targets: HashMap<Entity, TargetInfo>,
    queued: Vec<(Entity, ObstacleAction)>,
    performed: usize,
}

impl SandboxActions {
    /// Actions accepted since creation.
    pub fn performed(&self) -> usize {
        self.performed
    }

    fn snapshot(&mut self, world: &mut World) {
        self.targets.clear();
        let mut query = world.query::<(
            Entity,
            Option<&Door>,
            Option<&Destructible>,
            Option<&Climbable>,
        )>();
        for (entity, door, destructible, climbable) in query.iter(world) {
            if door.is_none() && destructible.is_none() && climbable.is_none() {
                continue;
            }
            self.targets.insert(
                entity,
                TargetInfo {
                    door: door.copied(),
                    destructible: destructible.is_some(),
                    climbable: climbable.is_some(),
                },
            );
        }
    }

    fn apply(&mut self, world: &mut World, dt: f32) {
        for (agent, action) in self.queued.drain(..) {
            let target = action.target();
            if world.get::<Transform>(target).is_none() {
                continue;
            }
            match action {
                ObstacleAction::Open { .. } => {
                    if let Some(mut door) = world.get_mut::<Door>(target) {
                        door.open = true;
                        debug!("{agent:?} opened {target:?}");
                    }
                }
                ObstacleAction::Pry { .. } => {
                    if let Some(mut door) = world.get_mut::<Door>(target) {
                        door.pry_progress += dt;
                        if door.pry_progress >= PRY_TIME {
                            door.open = true;
                            debug!("{agent:?} pried {target:?} open");
                        }
                    }
                }
                ObstacleAction::Attack { .. } => {
                    let destroyed = world
                        .get_mut::<Destructible>(target)
                        .map(|mut health| {
                            health.health -= ATTACK_DPS * dt;
                            health.health <= 0.0
                        })
                        .unwrap_or(false);
                    if destroyed {
                        debug!("{agent:?} destroyed {target:?}");
                        world.despawn(target);
                    }
                }
                ObstacleAction::Climb { .. } => {
                    if world.get::<Transform>(agent).is_some() && world.get::<Climbing>(agent).is_none() {
                        world.entity_mut(agent).insert(Climbing {
                            remaining: CLIMB_TIME,
                        });
                    }
                }
            }
        }
    }
}

impl ObstacleActions for SandboxActions {
    fn perform(&mut self, agent: Entity, action: ObstacleAction) -> ActionOutcome {
        let Some(target) = self.targets.get(&action.target()).copied() else {
            return ActionOutcome::Failed;
        };

        let outcome = match action {
            ObstacleAction::Open { .. } => match target.door {
                Some(door) if door.open => ActionOutcome::Succeeded,
                Some(door) if !door.requires_access => ActionOutcome::InProgress,
                _ => ActionOutcome::Failed,
            },
            ObstacleAction::Pry { .. } => match target.door {
                Some(door) if door.open => ActionOutcome::Succeeded,
                Some(_) => ActionOutcome::InProgress,
                None => ActionOutcome::Failed,
            },
            ObstacleAction::Attack { .. } if target.destructible => ActionOutcome::InProgress,
            ObstacleAction::Climb { .. } if target.climbable => ActionOutcome::InProgress,
            ObstacleAction::Attack { .. } | ObstacleAction::Climb { .. } => ActionOutcome::Failed,
        };

        if outcome == ActionOutcome::InProgress {
            self.performed += 1;
            self.queued.push((agent, action));
        }
        outcome
    }
}

// ============================================================================
// SANDBOX
// ============================================================================

pub struct Sandbox {
    pub world: World,
    pub steering: SteeringSystem,
    pub paths: GridPathService,
    pub physics: PhysicsSnapshot,
    pub settings: SteeringSettings,
    actions: SandboxActions,
    scenery: HashMap<UVec2, Entity>,
}

impl Sandbox {
    /// Build a world from `grid`, spawning a static body for every
    /// non-open tile.
    pub fn new(grid: NavigationGrid, settings: SteeringSettings) -> Self {
        let mut world = World::new();
        world.insert_resource(SimTime::default());

        let world_min = grid.origin - Vec2::splat(WORLD_MARGIN);
        let world_max = grid.origin
            + Vec2::new(grid.width as f32, grid.height as f32) * CELL_SIZE
            + Vec2::splat(WORLD_MARGIN);

        let mut scenery = HashMap::new();
        for (cell, kind) in grid.occupied_cells() {
            let entity = spawn_scenery(&mut world, grid.cell_center(cell), kind);
            scenery.insert(cell, entity);
        }

        let graph = world.spawn_empty().id();
        info!(
            "sandbox: {}x{} grid, {} static bodies",
            grid.width,
            grid.height,
            scenery.len()
        );

        Self {
            world,
            steering: SteeringSystem::new(settings.clone()),
            paths: GridPathService::new(grid, graph),
            physics: PhysicsSnapshot::new(world_min, world_max),
            settings,
            actions: SandboxActions::default(),
            scenery,
        }
    }

    /// Run steering on a dedicated pool of `workers` threads.
    pub fn with_workers(mut self, workers: usize) -> Result<Self, SteeringError> {
        let defaults = self.settings.clone();
        self.steering = SteeringSystem::new(defaults).with_workers(workers)?;
        Ok(self)
    }

    pub fn spawn_agent(&mut self, position: Vec2, spec: AgentSpec) -> Entity {
        let agent = self
            .world
            .spawn((
                Transform::from_position(position),
                Velocity::default(),
                UnitAgent::new(spec.radius, spec.max_speed),
                MovementInput::default(),
                CollisionBody {
                    shape: Shape::Circle {
                        radius: spec.radius,
                    },
                    layer: LAYER_MOB,
                    mask: MASK_MOB,
                    hard: true,
                    kind: BodyKind::Dynamic,
                },
                FactionMember(spec.faction),
            ))
            .id();
        self.paths.set_traversal_flags(agent, spec.flags);
        agent
    }

    /// The static body spawned for a tile, if it still exists.
    pub fn scenery_at(&self, cell: UVec2) -> Option<Entity> {
        self.scenery
            .get(&cell)
            .copied()
            .filter(|&entity| self.world.get::<Transform>(entity).is_some())
    }

    pub fn register(
        &mut self,
        agent: Entity,
        destination: Destination,
    ) -> Result<SteeringStatus, SteeringError> {
        self.steering
            .register(&mut self.world, &self.paths, agent, destination)
            .map(|state| state.status())
    }

    pub fn try_register(&mut self, agent: Entity, destination: Destination) -> Result<bool, SteeringError> {
        self.steering
            .try_register(&mut self.world, &self.paths, agent, destination)
    }

    pub fn unregister(&mut self, agent: Entity) -> bool {
        self.steering.unregister(&mut self.world, agent)
    }

    pub fn status(&self, agent: Entity) -> Option<SteeringStatus> {
        self.world.get::<SteeringState>(agent).map(|state| state.status())
    }

    pub fn steering_state(&self, agent: Entity) -> Option<&SteeringState> {
        self.world.get::<SteeringState>(agent)
    }

    pub fn position(&self, agent: Entity) -> Option<Vec2> {
        self.world.get::<Transform>(agent).map(|t| t.position)
    }

    pub fn movement_input(&self, agent: Entity) -> Option<MovementInput> {
        self.world.get::<MovementInput>(agent).copied()
    }

    pub fn actions_performed(&self) -> usize {
        self.actions.performed()
    }

    pub fn tick(&self) -> u64 {
        self.world
            .get_resource::<SimTime>()
            .map(|time| time.tick)
            .unwrap_or_default()
    }

    /// Advance the world by one tick of length `dt`.
    pub fn step(&mut self, dt: f32) {
        if let Some(mut time) = self.world.get_resource_mut::<SimTime>() {
            time.advance(dt);
        }
        self.paths.pump();

        self.snapshot_physics();
        self.actions.snapshot(&mut self.world);

        let services = SteeringServices {
            physics: &self.physics,
            factions: &self.physics,
            blockers: &self.physics,
            paths: &self.paths as &dyn PathService,
        };
        self.steering
            .update(&mut self.world, &self.settings, services, &mut self.actions, dt);

        self.actions.apply(&mut self.world, dt);
        movement_system(&mut self.world, &self.physics, dt);
    }

    /// Step until `done` holds or `max_ticks` have elapsed.
    /// Returns the number of ticks run.
    pub fn run_until(&mut self, dt: f32, max_ticks: u32, mut done: impl FnMut(&Sandbox) -> bool) -> u32 {
        for tick in 0..max_ticks {
            if done(self) {
                return tick;
            }
            self.step(dt);
        }
        max_ticks
    }

    fn snapshot_physics(&mut self) {
        self.physics.clear();
        let mut query = self.world.query::<(
            Entity,
            &Transform,
            Option<&Velocity>,
            &CollisionBody,
            Option<&Door>,
            Option<&Destructible>,
            Option<&Climbable>,
            Option<&Climbing>,
            Option<&FactionMember>,
        )>();

        for (entity, transform, velocity, body, door, destructible, climbable, climbing, faction) in
            query.iter(&self.world)
        {
            let open = door.is_some_and(|door| door.open);
            self.physics.insert(PhysicsBody {
                entity,
                position: transform.position,
                velocity: velocity.map(|v| v.linear).unwrap_or_default(),
                shape: body.shape,
                layer: body.layer,
                mask: body.mask,
                hard: body.hard && !open,
                can_collide: climbing.is_none(),
                kind: body.kind,
                door: door.map(|door| DoorInfo {
                    open: door.open,
                    bump_open: door.bump_open,
                }),
                damageable: destructible.is_some(),
                climbable: climbable.is_some(),
            });
            if let Some(FactionMember(id)) = faction {
                self.physics.set_faction(entity, *id);
            }
        }
    }
}

fn spawn_scenery(world: &mut World, center: Vec2, kind: CellKind) -> Entity {
    let body = CollisionBody {
        shape: Shape::Box {
            half_extents: Vec2::splat(CELL_SIZE * 0.5),
        },
        layer: LAYER_STATIC,
        mask: 0,
        hard: true,
        kind: BodyKind::Static,
    };
    let mut entity = world.spawn((Transform::from_position(center), body));
    match kind {
        CellKind::Open | CellKind::Wall => {}
        CellKind::Door { requires_access } => {
            entity.insert(Door::closed(requires_access));
            if requires_access {
                entity.insert(Destructible {
                    health: BREAKABLE_DAMAGE * 2.0,
                });
            }
        }
        CellKind::Breakable => {
            entity.insert(Destructible {
                health: BREAKABLE_DAMAGE,
            });
        }
        CellKind::Climbable => {
            entity.insert((
                Climbable,
                Destructible {
                    health: BREAKABLE_DAMAGE,
                },
            ));
        }
    }
    entity.id()
}
