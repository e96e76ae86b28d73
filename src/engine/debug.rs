// Debug/introspection side channel.
//
// Snapshots are only assembled while at least one authorized observer is
// subscribed, and nothing here feeds back into the simulation.

use bevy_ecs::entity::Entity;
use glam::Vec2;
use serde::{Serialize, Serializer};

use super::directions::DirectionMap;
use super::error::SteeringError;

/// One agent's steering picture for a tick.
#[derive(Debug, Clone, Serialize)]
pub struct SteeringDebugData {
    #[serde(serialize_with = "entity_bits")]
    pub entity: Entity,
    pub position: Vec2,
    /// Movement input written this tick (grid-local).
    pub movement: Vec2,
    pub interest: DirectionMap,
    pub danger: DirectionMap,
    pub danger_points: Vec<Vec2>,
}

fn entity_bits<S: Serializer>(entity: &Entity, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(entity.to_bits())
}

/// Receives one frame of snapshots per tick.
pub trait DebugObserver: Send {
    fn on_frame(&mut self, tick: u64, frame: &[SteeringDebugData]);
}

impl<F> DebugObserver for F
where
    F: FnMut(u64, &[SteeringDebugData]) + Send,
{
    fn on_frame(&mut self, tick: u64, frame: &[SteeringDebugData]) {
        self(tick, frame)
    }
}

pub type ObserverId = u64;

#[derive(Default)]
pub struct DebugChannel {
    observers: Vec<(ObserverId, Box<dyn DebugObserver>)>,
    next_id: ObserverId,
}

impl DebugChannel {
    /// Subscribe an observer. Refused unless the caller vouches that the
    /// observer is authorized.
    pub fn subscribe(
        &mut self,
        observer: Box<dyn DebugObserver>,
        authorized: bool,
    ) -> Result<ObserverId, SteeringError> {
        if !authorized {
            return Err(SteeringError::Unauthorized);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.observers.push((id, observer));
        Ok(id)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer, _)| *observer != id);
        self.observers.len() != before
    }

    /// Whether snapshots should be built this tick.
    pub fn is_active(&self) -> bool {
        !self.observers.is_empty()
    }

    pub(crate) fn publish(&mut self, tick: u64, frame: &[SteeringDebugData]) {
        for (_, observer) in &mut self.observers {
            observer.on_frame(tick, frame);
        }
    }
}

impl std::fmt::Debug for DebugChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugChannel")
            .field("observers", &self.observers.len())
            .finish()
    }
}
