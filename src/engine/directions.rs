// Directional basis for context steering.
//
// A fixed fan of equally spaced unit vectors shared by every agent.
// Index 0 points along +X and indices advance counter-clockwise, which
// is also the tie-break order when two directions score the same.

use std::f32::consts::TAU;

use glam::Vec2;

/// Number of interest directions each agent scores per tick.
pub const INTEREST_DIRECTIONS: usize = 12;
/// Angular spacing between adjacent interest directions.
pub const INTEREST_RADIANS: f32 = TAU / INTEREST_DIRECTIONS as f32;

/// Per-direction scores, one slot per entry of the [`DirectionalBasis`].
pub type DirectionMap = [f32; INTEREST_DIRECTIONS];

#[derive(Debug, Clone)]
pub struct DirectionalBasis {
    directions: [Vec2; INTEREST_DIRECTIONS],
}

impl Default for DirectionalBasis {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectionalBasis {
    pub fn new() -> Self {
        Self {
            directions: std::array::from_fn(|i| Vec2::from_angle(Self::angle(i))),
        }
    }

    /// Angle of direction `index` in radians.
    #[inline]
    pub fn angle(index: usize) -> f32 {
        index as f32 * INTEREST_RADIANS
    }

    #[inline]
    pub fn direction(&self, index: usize) -> Vec2 {
        self.directions[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = Vec2> + '_ {
        self.directions.iter().copied()
    }
}
