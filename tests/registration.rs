//! Registration API, request cancellation and global toggles.

mod common;

use std::sync::{Arc, Mutex};

use common::{DT, ROOM, sandbox, spec, tile};
use glam::Vec2;
use npc_steering::engine::{
    Destination, PathFlags, PathService, SteeringDebugData, SteeringError, SteeringSettings,
    SteeringStatus,
};
use rstest::rstest;

#[test]
fn try_register_with_same_destination_is_a_no_op() {
    let mut sandbox = sandbox(ROOM, SteeringSettings::default());
    let agent = sandbox.spawn_agent(tile(1, 3), spec(PathFlags::INTERACT));
    let goal = Destination::Point(tile(10, 3));

    assert_eq!(sandbox.register(agent, goal).expect("registered"), SteeringStatus::Moving);
    sandbox.step(DT);
    assert_eq!(sandbox.paths.requests_issued(), 1);
    let generation = sandbox.steering_state(agent).expect("state").generation();

    assert!(!sandbox.try_register(agent, goal).expect("known agent"));
    sandbox.step(DT);

    let state = sandbox.steering_state(agent).expect("state");
    assert_eq!(state.generation(), generation);
    assert_eq!(sandbox.paths.requests_issued(), 1);
    assert!(!state.corridor().is_empty());
}

#[test]
fn try_register_with_new_destination_retargets() {
    let mut sandbox = sandbox(ROOM, SteeringSettings::default());
    let agent = sandbox.spawn_agent(tile(1, 3), spec(PathFlags::INTERACT));

    assert!(sandbox.try_register(agent, Destination::Point(tile(10, 3))).expect("new"));
    let generation = sandbox.steering_state(agent).expect("state").generation();
    assert!(sandbox.try_register(agent, Destination::Point(tile(10, 1))).expect("moved"));

    assert_eq!(
        sandbox.steering_state(agent).expect("state").generation(),
        generation + 1
    );
}

#[test]
fn register_unknown_entity_fails() {
    let mut sandbox = sandbox(ROOM, SteeringSettings::default());
    let ghost = sandbox.world.spawn_empty().id();

    let result = sandbox.register(ghost, Destination::Point(tile(5, 3)));
    assert!(matches!(result, Err(SteeringError::NotFound(e)) if e == ghost));
}

#[test]
fn retargeting_cancels_the_outstanding_request() {
    let mut sandbox = sandbox(ROOM, SteeringSettings::default());
    let agent = sandbox.spawn_agent(tile(1, 3), spec(PathFlags::INTERACT));
    let a = tile(10, 3);
    let b = tile(10, 1);

    sandbox.register(agent, Destination::Point(a)).expect("registered");
    sandbox.step(DT);
    assert_eq!(sandbox.paths.pending_requests(), 1);

    sandbox.register(agent, Destination::Point(b)).expect("retargeted");
    let state = sandbox.steering_state(agent).expect("state");
    assert!(!state.is_path_pending());
    assert!(state.corridor().is_empty());

    // The superseded request is skipped rather than delivered.
    assert_eq!(sandbox.paths.pump(), 0);
    assert_eq!(sandbox.paths.pending_requests(), 0);

    sandbox.step(DT);
    sandbox.step(DT);
    let state = sandbox.steering_state(agent).expect("state");
    let last = state.corridor().last().expect("corridor toward b");
    let bounds = sandbox.paths.world_bounds(last).expect("resolvable");
    assert_eq!(bounds.center(), b);
    assert_eq!(sandbox.paths.requests_issued(), 2);
}

#[test]
fn unregister_zeroes_input_and_forgets_the_agent() {
    let mut sandbox = sandbox(ROOM, SteeringSettings::default());
    let agent = sandbox.spawn_agent(tile(1, 3), spec(PathFlags::INTERACT));
    sandbox.register(agent, Destination::Point(tile(10, 3))).expect("registered");
    for _ in 0..10 {
        sandbox.step(DT);
    }
    assert!(sandbox.movement_input(agent).expect("input").direction.length() > 0.0);

    assert!(sandbox.unregister(agent));
    assert!(sandbox.status(agent).is_none());
    assert_eq!(sandbox.movement_input(agent).expect("input").direction, Vec2::ZERO);
    assert!(!sandbox.unregister(agent));

    sandbox.step(DT);
    assert_eq!(sandbox.movement_input(agent).expect("input").direction, Vec2::ZERO);
}

#[test]
fn disabling_pathfinding_cancels_requests_and_walks_straight() {
    let mut sandbox = sandbox(ROOM, SteeringSettings::default());
    let agent = sandbox.spawn_agent(tile(1, 3), spec(PathFlags::INTERACT));
    sandbox.register(agent, Destination::Point(tile(10, 3))).expect("registered");
    sandbox.step(DT);
    assert!(sandbox.steering_state(agent).expect("state").is_path_pending());

    sandbox.settings.pathfinding_enabled = false;
    sandbox.step(DT);

    let state = sandbox.steering_state(agent).expect("state");
    assert!(!state.is_path_pending());
    assert!(state.corridor().is_empty());
    let input = sandbox.movement_input(agent).expect("input");
    assert!(input.direction.x > 0.0, "heads for the goal directly: {input:?}");
}

#[test]
fn disabling_steering_zeroes_every_agent() {
    let mut sandbox = sandbox(ROOM, SteeringSettings::default());
    let agents: Vec<_> = [tile(1, 1), tile(1, 3), tile(1, 5)]
        .into_iter()
        .map(|start| {
            let agent = sandbox.spawn_agent(start, spec(PathFlags::INTERACT));
            sandbox
                .register(agent, Destination::Point(start + Vec2::new(10.0, 0.0)))
                .expect("registered");
            agent
        })
        .collect();
    for _ in 0..10 {
        sandbox.step(DT);
    }

    sandbox.settings.enabled = false;
    sandbox.step(DT);

    for agent in agents {
        assert_eq!(sandbox.movement_input(agent).expect("input").direction, Vec2::ZERO);
        assert!(!sandbox.steering_state(agent).expect("state").is_path_pending());
    }
}

#[rstest]
#[case(true)]
#[case(false)]
fn debug_frames_reach_authorized_observers_only(#[case] authorized: bool) {
    let mut sandbox = sandbox(ROOM, SteeringSettings::default());
    for start in [tile(1, 1), tile(1, 5)] {
        let agent = sandbox.spawn_agent(start, spec(PathFlags::INTERACT));
        sandbox
            .register(agent, Destination::Point(tile(10, 3)))
            .expect("registered");
    }

    let frames = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&frames);
    let subscription = sandbox.steering.debug_channel().subscribe(
        Box::new(move |tick: u64, frame: &[SteeringDebugData]| {
            sink.lock().unwrap().push((tick, frame.len()));
        }),
        authorized,
    );
    assert_eq!(subscription.is_ok(), authorized);

    sandbox.step(DT);
    sandbox.step(DT);

    let expected = if authorized { vec![(1, 2), (2, 2)] } else { Vec::new() };
    assert_eq!(*frames.lock().unwrap(), expected);
}
