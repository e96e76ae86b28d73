//! Path corridor types and the pathfinding service contract.
//!
//! The steering core never plans paths itself. It asks a [`PathService`] for
//! a corridor of polygon nodes and receives the answer through a
//! [`PathTicket`] on some later tick. Each request carries a generation id so
//! a completion that arrives after the agent has moved on can be recognised
//! and dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bevy_ecs::entity::Entity;
use bitflags::bitflags;
use glam::Vec2;

/// Axis-aligned bounds of a corridor node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_center(center: Vec2, half_extents: Vec2) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    pub fn translated(&self, offset: Vec2) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

bitflags! {
    /// Traversal capabilities an agent negotiates with the path service.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PathFlags: u8 {
        /// Can force doors that require access.
        const PRYING   = 0b0001;
        /// Can attack destructible blockers out of the way.
        const SMASHING = 0b0010;
        /// Can climb over tables and similar.
        const CLIMBING = 0b0100;
        /// Can use doors that open on interaction.
        const INTERACT = 0b1000;
    }
}

/// What occupies a corridor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    FreeSpace,
    Door { requires_access: bool },
    Climbable,
    /// Blocked by some other static body (table, girder, crate).
    Obstacle,
    /// The service rebuilt this region; the node must not be followed.
    Invalid,
}

/// One polygon of a path corridor. Owned by the path service; the steering
/// core only holds shared references to it.
#[derive(Debug)]
pub struct PathPoly {
    /// Graph (grid) the bounds are expressed in.
    pub graph: Entity,
    /// Bounds in graph-local coordinates.
    pub bounds: Aabb,
    kind: NodeKind,
    /// Collision layer/mask of whatever occupies the node.
    pub collision_layer: u32,
    pub collision_mask: u32,
    /// Damage needed to clear the node's blockers.
    pub damage: f32,
    invalid: AtomicBool,
}

pub type PolyRef = Arc<PathPoly>;

impl PathPoly {
    pub fn new(graph: Entity, bounds: Aabb, kind: NodeKind) -> Self {
        Self {
            graph,
            bounds,
            kind,
            collision_layer: 0,
            collision_mask: 0,
            damage: 0.0,
            invalid: AtomicBool::new(false),
        }
    }

    pub fn with_collision(mut self, layer: u32, mask: u32) -> Self {
        self.collision_layer = layer;
        self.collision_mask = mask;
        self
    }

    pub fn with_damage(mut self, damage: f32) -> Self {
        self.damage = damage;
        self
    }

    pub fn kind(&self) -> NodeKind {
        if self.invalid.load(Ordering::Acquire) {
            NodeKind::Invalid
        } else {
            self.kind
        }
    }

    pub fn is_valid(&self) -> bool {
        self.kind() != NodeKind::Invalid
    }

    pub fn is_free_space(&self) -> bool {
        self.kind() == NodeKind::FreeSpace
    }

    /// Flag the node stale. Called by the path service when the region it
    /// covers is rebuilt; agents holding the node will drop it and repath.
    pub fn invalidate(&self) {
        self.invalid.store(true, Ordering::Release);
    }
}

/// Outcome of a path computation.
#[derive(Debug, Clone)]
pub enum PathResult {
    Success(VecDeque<PolyRef>),
    NoPath,
}

/// A completed request, tagged with the generation it was issued under.
#[derive(Debug, Clone)]
pub struct PathResponse {
    pub generation: u64,
    pub result: PathResult,
}

/// Cancellation flag shared between the requester and the path service.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

type ResponseSlot = Mutex<Option<PathResponse>>;

/// Receiving half of an asynchronous path request.
#[derive(Debug)]
pub struct PathTicket {
    slot: Arc<ResponseSlot>,
}

/// Completing half, handed to the path service.
///
/// Holds only a weak reference to the response slot: once the ticket has been
/// dropped (destination changed, agent unregistered) completion does nothing.
#[derive(Debug)]
pub struct PathCompleter {
    slot: Weak<ResponseSlot>,
    generation: u64,
}

impl PathTicket {
    pub fn new(generation: u64) -> (Self, PathCompleter) {
        let slot = Arc::new(Mutex::new(None));
        let completer = PathCompleter {
            slot: Arc::downgrade(&slot),
            generation,
        };
        (Self { slot }, completer)
    }

    /// Take the response if the service has delivered one.
    pub fn try_take(&self) -> Option<PathResponse> {
        match self.slot.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl PathCompleter {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver the result. Returns false when nobody is listening any more.
    pub fn complete(self, result: PathResult) -> bool {
        let Some(slot) = self.slot.upgrade() else {
            return false;
        };

        let response = PathResponse {
            generation: self.generation,
            result,
        };

        match slot.lock() {
            Ok(mut guard) => *guard = Some(response),
            Err(poisoned) => *poisoned.into_inner() = Some(response),
        }
        true
    }
}

/// Everything the path service needs to plan for one agent.
#[derive(Debug)]
pub struct PathRequest {
    pub agent: Entity,
    pub from: Vec2,
    pub to: Vec2,
    /// The path may end anywhere within this distance of `to`.
    pub arrival_range: f32,
    pub flags: PathFlags,
    pub cancel: CancelToken,
    pub completer: PathCompleter,
}

/// The outstanding request an agent is waiting on. At most one per agent.
///
/// Dropping the handle cancels the request, so an agent that is despawned
/// mid-request does not leave the service working for nobody.
#[derive(Debug)]
pub struct PathRequestHandle {
    pub generation: u64,
    pub cancel: CancelToken,
    pub ticket: PathTicket,
}

impl PathRequestHandle {
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for PathRequestHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Pathfinding collaborator contract.
///
/// Called concurrently from the steering workers, hence `Sync`.
pub trait PathService: Sync {
    /// Queue a request. The service completes `request.completer` on its own
    /// schedule and should skip work once `request.cancel` is set.
    fn request_path(&self, request: PathRequest);

    /// Capabilities the agent may use when traversing corridors.
    fn traversal_flags(&self, agent: Entity) -> PathFlags;

    /// The node containing a world-space point, if any.
    fn poly_at(&self, point: Vec2) -> Option<PolyRef>;

    /// World-space bounds of a node, or `None` when its graph is gone.
    fn world_bounds(&self, poly: &PathPoly) -> Option<Aabb>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> Entity {
        Entity::from_raw(1)
    }

    #[test]
    fn completion_reaches_live_ticket() {
        let (ticket, completer) = PathTicket::new(7);
        assert!(ticket.try_take().is_none());

        assert!(completer.complete(PathResult::NoPath));

        let response = ticket.try_take().expect("response should be delivered");
        assert_eq!(response.generation, 7);
        assert!(matches!(response.result, PathResult::NoPath));
        assert!(ticket.try_take().is_none(), "responses are taken once");
    }

    #[test]
    fn completion_after_ticket_dropped_is_a_no_op() {
        let (ticket, completer) = PathTicket::new(1);
        drop(ticket);
        assert!(!completer.complete(PathResult::NoPath));
    }

    #[test]
    fn invalidated_poly_reports_invalid_kind() {
        let poly = PathPoly::new(
            graph(),
            Aabb::new(Vec2::ZERO, Vec2::ONE),
            NodeKind::Door { requires_access: true },
        );
        assert!(!poly.is_free_space());
        assert!(poly.is_valid());

        poly.invalidate();
        assert_eq!(poly.kind(), NodeKind::Invalid);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let service_side = token.clone();
        token.cancel();
        assert!(service_side.is_cancelled());
    }

    #[test]
    fn dropping_request_handle_cancels_it() {
        let (ticket, _completer) = PathTicket::new(3);
        let token = CancelToken::new();
        let handle = PathRequestHandle {
            generation: 3,
            cancel: token.clone(),
            ticket,
        };

        drop(handle);
        assert!(token.is_cancelled());
    }

    #[test]
    fn aabb_geometry() {
        let bounds = Aabb::from_center(Vec2::new(2.0, 3.0), Vec2::splat(0.5));
        assert_eq!(bounds.center(), Vec2::new(2.0, 3.0));
        assert!(bounds.contains(Vec2::new(2.4, 3.4)));
        assert!(!bounds.contains(Vec2::new(2.6, 3.0)));
        assert_eq!(bounds.translated(Vec2::X).center(), Vec2::new(3.0, 3.0));
    }
}
