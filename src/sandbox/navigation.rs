// Grid pathfinding for the sandbox.
//
// Layer 1: NavigationGrid: what occupies each tile.
// Layer 2: GridPathService: BFS integration field from the goal, traced
//          back from the start into a corridor of per-tile nodes.
//
// Requests are queued and answered on `pump()`, so agents see the same
// asynchronous hand-off a real navigation backend gives them.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use bevy_ecs::entity::Entity;
use glam::{UVec2, Vec2};
use log::debug;

use crate::engine::path::{
    Aabb, NodeKind, PathFlags, PathPoly, PathRequest, PathResult, PathService, PolyRef,
};

use super::physics::LAYER_STATIC;

// ============================================================================
// CONSTANTS
// ============================================================================

/// World units per cell.
pub const CELL_SIZE: f32 = 1.0;
/// Damage needed to clear a breakable tile.
pub const BREAKABLE_DAMAGE: f32 = 10.0;

// ============================================================================
// NAVIGATION GRID
// ============================================================================

/// What occupies a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Open,
    Wall,
    Door { requires_access: bool },
    /// Crate, girder: can be smashed through.
    Breakable,
    /// Table: can be climbed over.
    Climbable,
}

impl CellKind {
    /// Whether an agent with `flags` may plan through a tile of this kind.
    pub fn traversable(self, flags: PathFlags) -> bool {
        match self {
            CellKind::Open => true,
            CellKind::Wall => false,
            CellKind::Door {
                requires_access: false,
            } => true,
            CellKind::Door {
                requires_access: true,
            } => flags.intersects(PathFlags::PRYING | PathFlags::SMASHING),
            CellKind::Breakable => flags.contains(PathFlags::SMASHING),
            CellKind::Climbable => flags.intersects(PathFlags::CLIMBING | PathFlags::SMASHING),
        }
    }

    fn node_kind(self) -> NodeKind {
        match self {
            CellKind::Open => NodeKind::FreeSpace,
            CellKind::Door { requires_access } => NodeKind::Door { requires_access },
            CellKind::Climbable => NodeKind::Climbable,
            CellKind::Wall | CellKind::Breakable => NodeKind::Obstacle,
        }
    }
}

/// Tile occupancy of one rectangular grid.
#[derive(Debug, Clone)]
pub struct NavigationGrid {
    cells: Vec<CellKind>,
    pub width: u32,
    pub height: u32,
    /// World position of the min corner of cell (0, 0).
    pub origin: Vec2,
}

impl NavigationGrid {
    /// Fully open grid.
    pub fn new_open(width: u32, height: u32, origin: Vec2) -> Self {
        Self {
            cells: vec![CellKind::Open; (width * height) as usize],
            width,
            height,
            origin,
        }
    }

    /// Build a grid from rows of ASCII, first row at the top (highest y).
    ///
    /// `#` wall, `D` door, `A` access-locked door, `X` breakable,
    /// `T` climbable, anything else open.
    pub fn from_ascii(rows: &[&str], origin: Vec2) -> Self {
        let height = rows.len() as u32;
        let width = rows.iter().map(|row| row.len()).max().unwrap_or(0) as u32;
        let mut grid = Self::new_open(width, height, origin);
        for (row_index, row) in rows.iter().enumerate() {
            let y = height - 1 - row_index as u32;
            for (x, ch) in row.chars().enumerate() {
                let kind = match ch {
                    '#' => CellKind::Wall,
                    'D' => CellKind::Door {
                        requires_access: false,
                    },
                    'A' => CellKind::Door {
                        requires_access: true,
                    },
                    'X' => CellKind::Breakable,
                    'T' => CellKind::Climbable,
                    _ => CellKind::Open,
                };
                grid.set(UVec2::new(x as u32, y), kind);
            }
        }
        grid
    }

    #[inline]
    fn idx(&self, cell: UVec2) -> usize {
        (cell.y * self.width + cell.x) as usize
    }

    pub fn kind(&self, cell: UVec2) -> CellKind {
        self.cells[self.idx(cell)]
    }

    pub fn set(&mut self, cell: UVec2, kind: CellKind) {
        let idx = self.idx(cell);
        self.cells[idx] = kind;
    }

    /// The cell containing a world position, if inside the grid.
    pub fn world_to_cell(&self, pos: Vec2) -> Option<UVec2> {
        let local = (pos - self.origin) / CELL_SIZE;
        if local.x < 0.0 || local.y < 0.0 {
            return None;
        }
        let cell = local.as_uvec2();
        (cell.x < self.width && cell.y < self.height).then_some(cell)
    }

    /// Bounds of a cell relative to the grid origin.
    pub fn cell_bounds_local(&self, cell: UVec2) -> Aabb {
        let min = cell.as_vec2() * CELL_SIZE;
        Aabb::new(min, min + Vec2::splat(CELL_SIZE))
    }

    pub fn cell_center(&self, cell: UVec2) -> Vec2 {
        self.origin + (cell.as_vec2() + Vec2::splat(0.5)) * CELL_SIZE
    }

    /// Every non-open cell with its kind, for spawning bodies.
    pub fn occupied_cells(&self) -> impl Iterator<Item = (UVec2, CellKind)> + '_ {
        (0..self.height)
            .flat_map(move |y| (0..self.width).map(move |x| UVec2::new(x, y)))
            .map(|cell| (cell, self.kind(cell)))
            .filter(|(_, kind)| *kind != CellKind::Open)
    }
}

// ============================================================================
// PATH COMPUTATION
// ============================================================================

/// BFS (4-connected) step distances to the goal set. `u32::MAX` = unreachable.
/// `start` is treated as traversable so agents standing in a doorway can
/// still plan out of it.
fn integration_field(
    grid: &NavigationGrid,
    goals: &[UVec2],
    start: UVec2,
    flags: PathFlags,
) -> Vec<u32> {
    let mut integration = vec![u32::MAX; (grid.width * grid.height) as usize];
    let mut queue = VecDeque::new();
    let passable = |cell: UVec2| cell == start || grid.kind(cell).traversable(flags);

    for &goal in goals {
        let idx = grid.idx(goal);
        if passable(goal) && integration[idx] == u32::MAX {
            integration[idx] = 0;
            queue.push_back(goal);
        }
    }

    while let Some(pos) = queue.pop_front() {
        let pos_cost = integration[grid.idx(pos)];
        for nb in cardinal_neighbors(pos, grid.width, grid.height) {
            let ni = grid.idx(nb);
            if integration[ni] == u32::MAX && passable(nb) {
                integration[ni] = pos_cost + 1;
                queue.push_back(nb);
            }
        }
    }

    integration
}

/// Cells within `range` of `to`, plus the cell containing it.
fn goal_cells(grid: &NavigationGrid, to: Vec2, range: f32) -> Vec<UVec2> {
    let mut goals = Vec::new();
    if let Some(cell) = grid.world_to_cell(to) {
        goals.push(cell);
    }
    let reach = (range / CELL_SIZE).ceil() as i32;
    let Some(center) = grid.world_to_cell(to) else {
        return goals;
    };
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            let x = center.x as i32 + dx;
            let y = center.y as i32 + dy;
            if x < 0 || y < 0 || x >= grid.width as i32 || y >= grid.height as i32 {
                continue;
            }
            let cell = UVec2::new(x as u32, y as u32);
            if cell != center && grid.cell_center(cell).distance(to) <= range {
                goals.push(cell);
            }
        }
    }
    goals
}

/// Shortest 4-connected cell sequence from `start` to any goal, start included.
pub fn find_cells(
    grid: &NavigationGrid,
    from: Vec2,
    to: Vec2,
    range: f32,
    flags: PathFlags,
) -> Option<Vec<UVec2>> {
    let start = grid.world_to_cell(from)?;
    let goals = goal_cells(grid, to, range);
    if goals.is_empty() {
        return None;
    }

    let integration = integration_field(grid, &goals, start, flags);
    let mut cost = integration[grid.idx(start)];
    if cost == u32::MAX {
        return None;
    }

    let mut cells = vec![start];
    let mut current = start;
    while cost > 0 {
        let next = cardinal_neighbors(current, grid.width, grid.height)
            .min_by_key(|nb| integration[grid.idx(*nb)])?;
        let next_cost = integration[grid.idx(next)];
        if next_cost >= cost {
            return None;
        }
        cells.push(next);
        current = next;
        cost = next_cost;
    }
    Some(cells)
}

// ============================================================================
// PATH SERVICE
// ============================================================================

/// Grid-backed [`PathService`] with a deferred request queue.
pub struct GridPathService {
    grid: NavigationGrid,
    /// Entity standing in for the grid; node bounds are relative to it.
    graph: Entity,
    polys: Vec<PolyRef>,
    pending: Mutex<VecDeque<PathRequest>>,
    flags: RwLock<HashMap<Entity, PathFlags>>,
    issued: AtomicUsize,
}

impl GridPathService {
    pub fn new(grid: NavigationGrid, graph: Entity) -> Self {
        let polys = (0..grid.height)
            .flat_map(|y| (0..grid.width).map(move |x| UVec2::new(x, y)))
            .map(|cell| make_poly(&grid, graph, cell))
            .collect();
        Self {
            grid,
            graph,
            polys,
            pending: Mutex::new(VecDeque::new()),
            flags: RwLock::new(HashMap::new()),
            issued: AtomicUsize::new(0),
        }
    }

    pub fn grid(&self) -> &NavigationGrid {
        &self.grid
    }

    pub fn graph(&self) -> Entity {
        self.graph
    }

    /// Traversal capabilities handed out for `agent` on registration.
    pub fn set_traversal_flags(&self, agent: Entity, flags: PathFlags) {
        match self.flags.write() {
            Ok(mut map) => map.insert(agent, flags),
            Err(poisoned) => poisoned.into_inner().insert(agent, flags),
        };
    }

    /// Change a tile. Nodes already handed out for it are invalidated so
    /// agents holding them repath.
    pub fn set_cell(&mut self, cell: UVec2, kind: CellKind) {
        self.grid.set(cell, kind);
        let idx = self.grid.idx(cell);
        self.polys[idx].invalidate();
        self.polys[idx] = make_poly(&self.grid, self.graph, cell);
    }

    /// Total requests received since creation.
    pub fn requests_issued(&self) -> usize {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn pending_requests(&self) -> usize {
        self.lock_pending().len()
    }

    /// Answer every queued request. Cancelled ones are skipped.
    /// Returns how many were delivered to a live requester.
    pub fn pump(&self) -> usize {
        let requests: Vec<PathRequest> = self.lock_pending().drain(..).collect();
        let mut delivered = 0;
        for request in requests {
            if request.cancel.is_cancelled() {
                debug!("{:?}: skipping cancelled path request", request.agent);
                continue;
            }
            let result = self.plan(&request);
            if request.completer.complete(result) {
                delivered += 1;
            }
        }
        delivered
    }

    fn plan(&self, request: &PathRequest) -> PathResult {
        match find_cells(
            &self.grid,
            request.from,
            request.to,
            request.arrival_range,
            request.flags,
        ) {
            Some(cells) => PathResult::Success(
                cells
                    .into_iter()
                    .map(|cell| Arc::clone(&self.polys[self.grid.idx(cell)]))
                    .collect(),
            ),
            None => PathResult::NoPath,
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, VecDeque<PathRequest>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn make_poly(grid: &NavigationGrid, graph: Entity, cell: UVec2) -> PolyRef {
    let kind = grid.kind(cell);
    let mut poly = PathPoly::new(graph, grid.cell_bounds_local(cell), kind.node_kind());
    if kind != CellKind::Open {
        poly = poly.with_collision(LAYER_STATIC, 0);
    }
    if kind == CellKind::Breakable {
        poly = poly.with_damage(BREAKABLE_DAMAGE);
    }
    Arc::new(poly)
}

impl PathService for GridPathService {
    fn request_path(&self, request: PathRequest) {
        self.issued.fetch_add(1, Ordering::Relaxed);
        self.lock_pending().push_back(request);
    }

    fn traversal_flags(&self, agent: Entity) -> PathFlags {
        let map = match self.flags.read() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.get(&agent).copied().unwrap_or(PathFlags::INTERACT)
    }

    fn poly_at(&self, point: Vec2) -> Option<PolyRef> {
        let cell = self.grid.world_to_cell(point)?;
        (self.grid.kind(cell) != CellKind::Wall).then(|| Arc::clone(&self.polys[self.grid.idx(cell)]))
    }

    fn world_bounds(&self, poly: &PathPoly) -> Option<Aabb> {
        (poly.graph == self.graph).then(|| poly.bounds.translated(self.grid.origin))
    }
}

// ============================================================================
// NEIGHBOR ITERATORS
// ============================================================================

/// The four cardinal (N/S/E/W) grid neighbors of a cell, clamped to bounds.
fn cardinal_neighbors(pos: UVec2, w: u32, h: u32) -> impl Iterator<Item = UVec2> {
    let (x, y) = (pos.x as i32, pos.y as i32);
    let (wi, hi) = (w as i32, h as i32);
    [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
        .into_iter()
        .filter(move |&(nx, ny)| nx >= 0 && ny >= 0 && nx < wi && ny < hi)
        .map(|(nx, ny)| UVec2::new(nx as u32, ny as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::path::{CancelToken, PathTicket};

    fn corridor_grid() -> NavigationGrid {
        NavigationGrid::from_ascii(
            &[
                "#######", //
                "#..X..#",
                "#######",
            ],
            Vec2::ZERO,
        )
    }

    fn request(from: Vec2, to: Vec2, flags: PathFlags) -> (PathRequest, PathTicket) {
        let (ticket, completer) = PathTicket::new(1);
        let request = PathRequest {
            agent: Entity::from_raw(1),
            from,
            to,
            arrival_range: 0.2,
            flags,
            cancel: CancelToken::new(),
            completer,
        };
        (request, ticket)
    }

    #[test]
    fn ascii_rows_map_top_down() {
        let grid = corridor_grid();
        assert_eq!(grid.width, 7);
        assert_eq!(grid.height, 3);
        assert_eq!(grid.kind(UVec2::new(3, 1)), CellKind::Breakable);
        assert_eq!(grid.kind(UVec2::new(3, 2)), CellKind::Wall);
        assert_eq!(grid.world_to_cell(Vec2::new(1.5, 1.5)), Some(UVec2::new(1, 1)));
        assert_eq!(grid.world_to_cell(Vec2::new(-0.5, 1.5)), None);
    }

    #[test]
    fn breakable_blocks_unless_smashing() {
        let grid = corridor_grid();
        let from = Vec2::new(1.5, 1.5);
        let to = Vec2::new(5.5, 1.5);

        assert!(find_cells(&grid, from, to, 0.2, PathFlags::empty()).is_none());

        let cells = find_cells(&grid, from, to, 0.2, PathFlags::SMASHING).expect("path");
        assert_eq!(cells.first(), Some(&UVec2::new(1, 1)));
        assert_eq!(cells.last(), Some(&UVec2::new(5, 1)));
        assert_eq!(cells.len(), 5);
    }

    #[test]
    fn pump_completes_live_requests_and_skips_cancelled() {
        let service = GridPathService::new(corridor_grid(), Entity::from_raw(50));

        let (live, live_ticket) = request(
            Vec2::new(1.5, 1.5),
            Vec2::new(5.5, 1.5),
            PathFlags::SMASHING,
        );
        let (dead, dead_ticket) = request(
            Vec2::new(1.5, 1.5),
            Vec2::new(5.5, 1.5),
            PathFlags::SMASHING,
        );
        dead.cancel.cancel();
        service.request_path(live);
        service.request_path(dead);

        assert_eq!(service.pump(), 1);
        assert_eq!(service.requests_issued(), 2);
        assert_eq!(service.pending_requests(), 0);

        let response = live_ticket.try_take().expect("delivered");
        let PathResult::Success(nodes) = response.result else {
            panic!("expected a path");
        };
        assert_eq!(nodes.len(), 5);
        assert_eq!(nodes[2].kind(), NodeKind::Obstacle);
        assert_eq!(nodes[2].damage, BREAKABLE_DAMAGE);
        assert!(dead_ticket.try_take().is_none());
    }

    #[test]
    fn changing_a_cell_invalidates_handed_out_nodes() {
        let mut service = GridPathService::new(corridor_grid(), Entity::from_raw(50));
        let before = service.poly_at(Vec2::new(3.5, 1.5)).expect("node");

        service.set_cell(UVec2::new(3, 1), CellKind::Open);

        assert!(!before.is_valid());
        let after = service.poly_at(Vec2::new(3.5, 1.5)).expect("node");
        assert!(after.is_free_space());
    }

    #[test]
    fn bounds_resolve_only_for_own_graph() {
        let service = GridPathService::new(
            NavigationGrid::new_open(4, 4, Vec2::new(-2.0, -2.0)),
            Entity::from_raw(50),
        );
        let node = service.poly_at(Vec2::new(-1.5, -1.5)).expect("node");
        let bounds = service.world_bounds(&node).expect("bounds");
        assert_eq!(bounds.center(), Vec2::new(-1.5, -1.5));

        let foreign = PathPoly::new(Entity::from_raw(51), node.bounds, NodeKind::FreeSpace);
        assert!(service.world_bounds(&foreign).is_none());
    }
}
