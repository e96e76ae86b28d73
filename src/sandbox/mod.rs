// Sandbox module - reference host for the steering core.
// Grid pathfinding, a physics snapshot and interactive scenery, wired to the
// core through its collaborator traits. Used by the demo binary and the
// scenario tests.

pub mod components;
pub mod mover;
pub mod navigation;
pub mod physics;
pub mod world;

pub use components::*;
pub use navigation::{CellKind, GridPathService, NavigationGrid};
pub use physics::PhysicsSnapshot;
pub use world::{AgentSpec, Sandbox};
