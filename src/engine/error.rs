// Error type for the steering core.
// Movement failures (no path, blocked obstacle) are statuses, not errors;
// these cover API misuse and configuration problems.

use bevy_ecs::entity::Entity;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SteeringError {
    /// The entity has no transform, so it cannot be steered.
    #[error("entity {0:?} has no transform")]
    NotFound(Entity),

    #[error("entity {0:?} is not registered for steering")]
    NotRegistered(Entity),

    /// Only authorized observers may subscribe to the debug channel.
    #[error("debug subscription refused for unauthorized observer")]
    Unauthorized,

    #[error("invalid steering settings: {0}")]
    InvalidSettings(String),

    #[error("failed to parse steering settings")]
    Config(#[from] serde_json::Error),

    #[error("failed to build steering worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A corridor node whose graph can no longer be resolved to world space.
    #[error("path node on graph {0:?} cannot be resolved")]
    UnresolvedNode(Entity),
}
