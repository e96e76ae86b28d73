//! Shared helpers for the sandbox scenario tests.

#![allow(dead_code)]

use glam::Vec2;
use npc_steering::engine::{PathFlags, SteeringSettings};
use npc_steering::sandbox::{AgentSpec, NavigationGrid, Sandbox};

pub const DT: f32 = 1.0 / 30.0;

/// 14x7 room with a one-tile wall border.
pub const ROOM: &[&str] = &[
    "##############",
    "#............#",
    "#............#",
    "#............#",
    "#............#",
    "#............#",
    "##############",
];

pub fn sandbox(rows: &[&str], settings: SteeringSettings) -> Sandbox {
    Sandbox::new(NavigationGrid::from_ascii(rows, Vec2::ZERO), settings)
}

pub fn corridor_settings() -> SteeringSettings {
    SteeringSettings {
        avoidance_enabled: false,
        ..SteeringSettings::default()
    }
}

pub fn spec(flags: PathFlags) -> AgentSpec {
    AgentSpec {
        flags,
        ..AgentSpec::default()
    }
}

/// Centre of tile (x, y).
pub fn tile(x: u32, y: u32) -> Vec2 {
    Vec2::new(x as f32 + 0.5, y as f32 + 0.5)
}
