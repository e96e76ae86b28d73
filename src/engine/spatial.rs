// Uniform spatial hash grid for neighbour lookup.
//
// Stores indices into the caller's body slice. Cleared and rebuilt every
// tick before the steering workers run; read-only while they run.

use glam::{IVec2, Vec2};

pub struct SpatialGrid {
    cells: Vec<Vec<usize>>,
    cell_size: f32,
    width: u32,
    height: u32,
    world_min: Vec2, // bottom-left corner of the covered area
}

impl SpatialGrid {
    /// `world_min` / `world_max` define the covered bounds.
    /// `cell_size` is the side length of each cell in world units.
    pub fn new(world_min: Vec2, world_max: Vec2, cell_size: f32) -> Self {
        let cell_size = cell_size.max(f32::EPSILON);
        let span = (world_max - world_min).max(Vec2::ZERO);
        let width = (span.x / cell_size).ceil() as u32 + 2;
        let height = (span.y / cell_size).ceil() as u32 + 2;
        Self {
            cells: vec![Vec::new(); (width * height) as usize],
            cell_size,
            width,
            height,
            world_min,
        }
    }

    /// Remove all stored indices. Call once per tick before inserting.
    pub fn clear(&mut self) {
        for c in &mut self.cells {
            c.clear();
        }
    }

    #[inline]
    fn cell_of(&self, pos: Vec2) -> IVec2 {
        ((pos - self.world_min) / self.cell_size).floor().as_ivec2()
    }

    #[inline]
    fn in_bounds(&self, cell: IVec2) -> bool {
        cell.x >= 0 && cell.y >= 0 && (cell.x as u32) < self.width && (cell.y as u32) < self.height
    }

    #[inline]
    fn slot(&self, cell: IVec2) -> usize {
        (cell.y as u32 * self.width + cell.x as u32) as usize
    }

    /// Insert body `idx` at a point.
    pub fn insert(&mut self, pos: Vec2, idx: usize) {
        let cell = self.cell_of(pos);
        if self.in_bounds(cell) {
            let slot = self.slot(cell);
            self.cells[slot].push(idx);
        }
    }

    /// Insert body `idx` into every cell its bounds overlap.
    pub fn insert_bounds(&mut self, min: Vec2, max: Vec2, idx: usize) {
        let lo = self.cell_of(min).max(IVec2::ZERO);
        let hi = self
            .cell_of(max)
            .min(IVec2::new(self.width as i32 - 1, self.height as i32 - 1));
        for cy in lo.y..=hi.y {
            for cx in lo.x..=hi.x {
                let slot = self.slot(IVec2::new(cx, cy));
                self.cells[slot].push(idx);
            }
        }
    }

    /// Append to `out` all indices in cells within `radius` of `pos`.
    ///
    /// Returns a superset, and bodies inserted with bounds may appear more
    /// than once. Callers must distance-filter and dedup.
    /// Does not clear `out` before writing.
    pub fn query_radius(&self, pos: Vec2, radius: f32, out: &mut Vec<usize>) {
        let r_cells = (radius / self.cell_size).ceil() as i32 + 1;
        let center = self.cell_of(pos);
        for dy in -r_cells..=r_cells {
            for dx in -r_cells..=r_cells {
                let cell = center + IVec2::new(dx, dy);
                if !self.in_bounds(cell) {
                    continue;
                }
                out.extend_from_slice(&self.cells[self.slot(cell)]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_query_finds_nearby_points_only() {
        let mut grid = SpatialGrid::new(Vec2::ZERO, Vec2::splat(20.0), 2.0);
        grid.insert(Vec2::new(1.0, 1.0), 0);
        grid.insert(Vec2::new(2.5, 1.0), 1);
        grid.insert(Vec2::new(18.0, 18.0), 2);

        let mut out = Vec::new();
        grid.query_radius(Vec2::new(1.5, 1.5), 1.0, &mut out);

        assert!(out.contains(&0));
        assert!(out.contains(&1));
        assert!(!out.contains(&2));
    }

    #[test]
    fn bounded_insert_covers_every_overlapped_cell() {
        let mut grid = SpatialGrid::new(Vec2::ZERO, Vec2::splat(10.0), 1.0);
        grid.insert_bounds(Vec2::new(0.5, 0.5), Vec2::new(6.5, 0.9), 7);

        let mut out = Vec::new();
        grid.query_radius(Vec2::new(6.0, 0.5), 0.1, &mut out);
        assert!(out.contains(&7));

        out.clear();
        grid.clear();
        grid.query_radius(Vec2::new(6.0, 0.5), 0.1, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn out_of_bounds_points_are_ignored() {
        let mut grid = SpatialGrid::new(Vec2::ZERO, Vec2::splat(4.0), 1.0);
        grid.insert(Vec2::new(-50.0, -50.0), 0);

        let mut out = Vec::new();
        grid.query_radius(Vec2::new(-50.0, -50.0), 1.0, &mut out);
        assert!(out.is_empty());
    }
}
