//! Per-tick steering configuration.
//!
//! A [`SteeringSettings`] value is handed to every
//! [`SteeringSystem::update`](crate::engine::SteeringSystem::update) call, so
//! global toggles are explicit inputs rather than process-wide state and take
//! effect on the next tick boundary.

use serde::{Deserialize, Serialize};

use super::error::SteeringError;

/// Tunables and global toggles for the steering core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringSettings {
    /// Master switch. Disabling zeroes every movement input and cancels all
    /// outstanding path requests.
    pub enabled: bool,
    /// Run the ORCA solver on top of the context-steering heading.
    pub avoidance_enabled: bool,
    /// Use the path service. When off agents head straight for their
    /// destination and any in-flight request is cancelled.
    pub pathfinding_enabled: bool,
    /// Detect agents that stop making progress and repath or give up.
    pub anti_stuck: bool,

    /// How quickly interest/danger maps follow the raw per-tick values (1/s).
    pub blend_rate: f32,
    /// Maximum direction re-selections per second.
    pub steering_frequency: f32,

    /// Displacement that counts as progress for stuck detection.
    pub stuck_distance: f32,
    /// Multiple of the stuck budget after which the agent gives up.
    pub stuck_give_up_factor: f32,
    /// Consecutive failed path requests before the agent gives up.
    pub failed_path_limit: u32,

    /// Reach for interacting with doors and other blockers.
    pub interaction_range: f32,
    /// Speed below which an agent in range is allowed to simply stop.
    pub arrival_speed: f32,
    /// Look-ahead (seconds) used to decide between a hard and a tangential
    /// brake near the goal. Empirical; only affects smoothness.
    pub circling_tolerance: f32,
    /// Extra scale applied to same-faction separation danger.
    pub separation_damping: f32,
    /// Beeline toward an entity target without pathfinding when it is in
    /// unobstructed range within this distance.
    pub direct_los_range: f32,

    pub obstacle_time_horizon: f32,
    pub neighbor_time_horizon: f32,
    pub max_neighbors: usize,
    pub neighbor_range: f32,
}

impl Default for SteeringSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            avoidance_enabled: true,
            pathfinding_enabled: true,
            anti_stuck: true,
            blend_rate: 12.0,
            steering_frequency: 10.0,
            stuck_distance: 0.5,
            stuck_give_up_factor: 3.0,
            failed_path_limit: 3,
            interaction_range: 1.5,
            arrival_speed: 0.5,
            circling_tolerance: 0.5,
            separation_damping: 0.25,
            direct_los_range: 30.0,
            obstacle_time_horizon: 0.5,
            neighbor_time_horizon: 1.5,
            max_neighbors: 10,
            neighbor_range: 4.0,
        }
    }
}

impl SteeringSettings {
    /// Parse settings from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, SteeringError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SteeringError> {
        let non_negative = [
            ("steering_frequency", self.steering_frequency),
            ("stuck_distance", self.stuck_distance),
            ("stuck_give_up_factor", self.stuck_give_up_factor),
            ("interaction_range", self.interaction_range),
            ("arrival_speed", self.arrival_speed),
            ("circling_tolerance", self.circling_tolerance),
            ("separation_damping", self.separation_damping),
            ("direct_los_range", self.direct_los_range),
            ("neighbor_range", self.neighbor_range),
        ];

        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SteeringError::InvalidSettings(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }

        let positive = [
            ("blend_rate", self.blend_rate),
            ("obstacle_time_horizon", self.obstacle_time_horizon),
            ("neighbor_time_horizon", self.neighbor_time_horizon),
        ];

        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(SteeringError::InvalidSettings(format!(
                    "{name} must be finite and positive, got {value}"
                )));
            }
        }

        if self.stuck_give_up_factor < 1.0 {
            return Err(SteeringError::InvalidSettings(
                "stuck_give_up_factor must be at least 1".to_owned(),
            ));
        }

        Ok(())
    }
}
