// Headless steering demo.
// Builds a small walled arena with doors, crates and tables, scatters agents
// over it and steers them to random destinations for a fixed number of ticks.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use glam::{UVec2, Vec2};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use npc_steering::engine::{Destination, PathFlags, SteeringDebugData, SteeringError, SteeringSettings, SteeringStatus};
use npc_steering::logging;
use npc_steering::sandbox::{AgentSpec, CellKind, NavigationGrid, Sandbox};

// ============================================================================
// ARENA
// ============================================================================

const ARENA: &[&str] = &[
    "########################",
    "#..........#...........#",
    "#..........#....T......#",
    "#...X......D...........#",
    "#..........#......X....#",
    "#####.######...........#",
    "#..........#####A#######",
    "#....T.................#",
    "#..........X...........#",
    "#..........#...........#",
    "########################",
];

/// Simulation step (seconds).
const DT: f32 = 1.0 / 30.0;

/// Headless NPC steering demo
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of agents to spawn
    #[arg(short, long, default_value_t = 12)]
    agents: usize,

    /// Ticks to simulate
    #[arg(short, long, default_value_t = 900)]
    ticks: u32,

    /// RNG seed for spawn points and destinations
    #[arg(short, long, default_value_t = 7)]
    seed: u64,

    /// Steering settings as JSON; missing fields take defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Worker threads for steering (0 = global pool)
    #[arg(short, long, default_value_t = 0)]
    workers: usize,

    /// Print every debug frame as a JSON line
    #[arg(long)]
    dump_debug: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_settings(path: Option<&PathBuf>) -> Result<SteeringSettings, SteeringError> {
    let Some(path) = path else {
        return Ok(SteeringSettings::default());
    };
    let json = fs::read_to_string(path).map_err(|err| {
        SteeringError::InvalidSettings(format!("cannot read {}: {err}", path.display()))
    })?;
    SteeringSettings::from_json(&json)
}

fn random_open_point(grid: &NavigationGrid, rng: &mut StdRng) -> Vec2 {
    loop {
        let cell = UVec2::new(rng.gen_range(0..grid.width), rng.gen_range(0..grid.height));
        if grid.kind(cell) == CellKind::Open {
            return grid.cell_center(cell);
        }
    }
}

fn random_flags(rng: &mut StdRng) -> PathFlags {
    let mut flags = PathFlags::INTERACT;
    if rng.gen_range(0..3) == 0 {
        flags |= PathFlags::SMASHING;
    }
    if rng.gen_range(0..3) == 0 {
        flags |= PathFlags::CLIMBING;
    }
    if rng.gen_range(0..4) == 0 {
        flags |= PathFlags::PRYING;
    }
    flags
}

fn main() -> Result<(), SteeringError> {
    let args = Args::parse();
    logging::init(args.verbose);

    let settings = load_settings(args.config.as_ref())?;
    let grid = NavigationGrid::from_ascii(ARENA, Vec2::ZERO);
    let mut rng = StdRng::seed_from_u64(args.seed);

    let mut sandbox = Sandbox::new(grid.clone(), settings);
    if args.workers > 0 {
        sandbox = sandbox.with_workers(args.workers)?;
    }

    if args.dump_debug {
        sandbox.steering.debug_channel().subscribe(
            Box::new(|tick: u64, frame: &[SteeringDebugData]| {
                match serde_json::to_string(&serde_json::json!({ "tick": tick, "agents": frame })) {
                    Ok(line) => println!("{line}"),
                    Err(err) => warn!("failed to serialize debug frame: {err}"),
                }
            }),
            true,
        )?;
    }

    let mut agents = Vec::with_capacity(args.agents);
    for i in 0..args.agents {
        let spec = AgentSpec {
            radius: rng.gen_range(0.3..0.4),
            max_speed: rng.gen_range(2.5..4.0),
            faction: (i % 2) as u32,
            flags: random_flags(&mut rng),
        };
        let agent = sandbox.spawn_agent(random_open_point(&grid, &mut rng), spec);
        let goal = random_open_point(&grid, &mut rng);
        sandbox.register(agent, Destination::Point(goal))?;
        info!("agent {agent:?} ({:?}) heading to {goal}", spec.flags);
        agents.push(agent);
    }

    for _ in 0..args.ticks {
        sandbox.step(DT);
    }

    let mut counts = [0usize; 4];
    for &agent in &agents {
        let slot = match sandbox.status(agent) {
            Some(SteeringStatus::Moving) => 0,
            Some(SteeringStatus::InRange) => 1,
            Some(SteeringStatus::NoPath) => 2,
            Some(SteeringStatus::Obstructed) => 3,
            None => continue,
        };
        counts[slot] += 1;
    }

    info!(
        "after {} ticks: {} arrived, {} moving, {} obstructed, {} gave up ({} path requests, {} obstacle actions)",
        sandbox.tick(),
        counts[1],
        counts[0],
        counts[3],
        counts[2],
        sandbox.paths.requests_issued(),
        sandbox.actions_performed(),
    );
    Ok(())
}
