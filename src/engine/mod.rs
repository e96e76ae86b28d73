// Engine module - the NPC movement core.
// Context steering, ORCA avoidance and path following, driven per tick by
// SteeringSystem. Everything outside the core is reached through the
// collaborator traits in `path` and `queries`.

pub mod components;
pub mod context;
pub mod debug;
pub mod directions;
pub mod error;
pub mod follower;
pub mod obstacles;
pub mod orca;
pub mod path;
pub mod queries;
pub mod settings;
pub mod spatial;
pub mod state;
pub mod stuck;
pub mod system;

// Re-export commonly used items
pub use components::*;
pub use debug::{DebugChannel, DebugObserver, SteeringDebugData};
pub use error::SteeringError;
pub use path::{PathFlags, PathService, PolyRef};
pub use queries::SteeringServices;
pub use settings::SteeringSettings;
pub use state::{AvoidanceState, Destination, SteeringState, SteeringStatus};
pub use system::SteeringSystem;
