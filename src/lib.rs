// NPC steering: context steering, ORCA local avoidance and path following
// for autonomous agents on a 2D plane.
//
// `engine` is the movement core; `sandbox` provides reference collaborators
// (grid pathfinding, physics snapshot, doors) used by the demo and tests.

pub mod engine;
pub mod logging;
pub mod sandbox;
