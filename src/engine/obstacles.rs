// Obstacle handling for blocked corridor nodes.
//
// Runs when an agent reaches a node that is not free space. Picks at most one
// mitigation per tick; the action itself is dispatched by the orchestrator
// after the parallel phase, so this module only reads the world.

use log::debug;

use super::path::{Aabb, NodeKind, PathFlags, PathPoly};
use super::queries::{Blocker, BlockerQuery, ObstacleAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleStatus {
    /// Nothing in the way (any more).
    Completed,
    /// A mitigation is under way; check again next tick.
    Continuing,
    /// No capability applies. The path must be abandoned.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObstacleOutcome {
    pub status: ObstacleStatus,
    pub action: Option<ObstacleAction>,
}

impl ObstacleOutcome {
    const COMPLETED: Self = Self {
        status: ObstacleStatus::Completed,
        action: None,
    };
    const FAILED: Self = Self {
        status: ObstacleStatus::Failed,
        action: None,
    };

    fn continuing(action: ObstacleAction) -> Self {
        Self {
            status: ObstacleStatus::Continuing,
            action: Some(action),
        }
    }
}

/// Whether the node's occupant collides with an agent using (layer, mask).
#[inline]
pub fn node_blocks(node: &PathPoly, layer: u32, mask: u32) -> bool {
    (node.collision_layer & mask) != 0 || (layer & node.collision_mask) != 0
}

fn is_closed_door(blocker: &Blocker) -> bool {
    blocker.door.is_some_and(|door| !door.open)
}

/// Decide how to clear `node`. `bounds` are the node's world-space bounds.
/// `scratch` is cleared and refilled with the node's blockers.
pub fn handle(
    node: &PathPoly,
    bounds: Aabb,
    flags: PathFlags,
    layer: u32,
    mask: u32,
    blockers: &dyn BlockerQuery,
    scratch: &mut Vec<Blocker>,
) -> ObstacleOutcome {
    if !node_blocks(node, layer, mask) {
        return ObstacleOutcome::COMPLETED;
    }

    scratch.clear();
    blockers.blockers_in(bounds, layer, mask, scratch);
    if scratch.is_empty() {
        return ObstacleOutcome::COMPLETED;
    }

    match node.kind() {
        NodeKind::Door {
            requires_access: false,
        } => {
            let needs_opening = scratch
                .iter()
                .find(|b| b.door.is_some_and(|door| !door.open && !door.bump_open));
            if let Some(door) = needs_opening {
                return ObstacleOutcome::continuing(ObstacleAction::Open { door: door.entity });
            }
            // Bump-open doors swing out of the way as we walk in.
            if scratch.iter().all(|b| b.door.is_some()) {
                return ObstacleOutcome::COMPLETED;
            }
        }
        NodeKind::Door {
            requires_access: true,
        } if flags.contains(PathFlags::PRYING) => {
            if let Some(door) = scratch.iter().find(|b| is_closed_door(b)) {
                return ObstacleOutcome::continuing(ObstacleAction::Pry { door: door.entity });
            }
        }
        NodeKind::Climbable if flags.contains(PathFlags::CLIMBING) => {
            if let Some(target) = scratch.iter().find(|b| b.climbable) {
                return ObstacleOutcome::continuing(ObstacleAction::Climb {
                    target: target.entity,
                });
            }
        }
        _ => {}
    }

    if flags.contains(PathFlags::SMASHING) {
        if let Some(target) = scratch.iter().find(|b| b.damageable) {
            return ObstacleOutcome::continuing(ObstacleAction::Attack {
                target: target.entity,
            });
        }
    }

    debug!(
        "no capability clears {:?} node ({} blockers, flags {:?})",
        node.kind(),
        scratch.len(),
        flags
    );
    ObstacleOutcome::FAILED
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::queries::DoorInfo;
    use bevy_ecs::entity::Entity;
    use glam::Vec2;

    const WALL: u32 = 0b01;

    struct FixedBlockers(Vec<Blocker>);

    impl BlockerQuery for FixedBlockers {
        fn blockers_in(&self, _bounds: Aabb, _layer: u32, _mask: u32, out: &mut Vec<Blocker>) {
            out.extend_from_slice(&self.0);
        }
    }

    fn node(kind: NodeKind) -> PathPoly {
        PathPoly::new(Entity::from_raw(0), Aabb::new(Vec2::ZERO, Vec2::ONE), kind)
            .with_collision(WALL, 0)
    }

    fn door(entity: u32, open: bool, bump_open: bool) -> Blocker {
        Blocker {
            entity: Entity::from_raw(entity),
            door: Some(DoorInfo { open, bump_open }),
            damageable: true,
            climbable: false,
        }
    }

    fn crate_blocker(entity: u32) -> Blocker {
        Blocker {
            entity: Entity::from_raw(entity),
            door: None,
            damageable: true,
            climbable: false,
        }
    }

    fn run(kind: NodeKind, flags: PathFlags, blockers: Vec<Blocker>) -> ObstacleOutcome {
        let mut scratch = Vec::new();
        let node = node(kind);
        handle(
            &node,
            node.bounds,
            flags,
            0,
            WALL,
            &FixedBlockers(blockers),
            &mut scratch,
        )
    }

    #[test]
    fn node_outside_collision_mask_is_completed() {
        let node = node(NodeKind::Obstacle);
        let mut scratch = Vec::new();
        let outcome = handle(
            &node,
            node.bounds,
            PathFlags::empty(),
            0,
            0b10,
            &FixedBlockers(vec![crate_blocker(1)]),
            &mut scratch,
        );
        assert_eq!(outcome, ObstacleOutcome::COMPLETED);
        assert!(scratch.is_empty(), "blockers are not queried for non-blocking nodes");
    }

    #[test]
    fn cleared_node_is_completed() {
        let outcome = run(NodeKind::Obstacle, PathFlags::empty(), Vec::new());
        assert_eq!(outcome.status, ObstacleStatus::Completed);
    }

    #[test]
    fn closed_public_door_is_opened() {
        let outcome = run(
            NodeKind::Door {
                requires_access: false,
            },
            PathFlags::empty(),
            vec![door(3, false, false)],
        );
        assert_eq!(
            outcome,
            ObstacleOutcome::continuing(ObstacleAction::Open {
                door: Entity::from_raw(3)
            })
        );
    }

    #[test]
    fn bump_open_door_is_walked_through() {
        let outcome = run(
            NodeKind::Door {
                requires_access: false,
            },
            PathFlags::empty(),
            vec![door(3, false, true)],
        );
        assert_eq!(outcome.status, ObstacleStatus::Completed);
    }

    #[test]
    fn restricted_door_is_pried_with_capability() {
        let outcome = run(
            NodeKind::Door {
                requires_access: true,
            },
            PathFlags::PRYING,
            vec![door(4, false, false)],
        );
        assert_eq!(outcome.action, Some(ObstacleAction::Pry { door: Entity::from_raw(4) }));
    }

    #[test]
    fn smashing_attacks_first_damageable_blocker() {
        let outcome = run(
            NodeKind::Obstacle,
            PathFlags::SMASHING,
            vec![crate_blocker(5), crate_blocker(6)],
        );
        assert_eq!(
            outcome,
            ObstacleOutcome::continuing(ObstacleAction::Attack {
                target: Entity::from_raw(5)
            })
        );
    }

    #[test]
    fn climbable_node_is_climbed() {
        let table = Blocker {
            climbable: true,
            damageable: false,
            ..crate_blocker(8)
        };
        let outcome = run(NodeKind::Climbable, PathFlags::CLIMBING, vec![table]);
        assert_eq!(outcome.action, Some(ObstacleAction::Climb { target: Entity::from_raw(8) }));
    }

    #[test]
    fn restricted_door_without_capability_fails() {
        let outcome = run(
            NodeKind::Door {
                requires_access: true,
            },
            PathFlags::INTERACT,
            vec![door(4, false, false)],
        );
        assert_eq!(outcome, ObstacleOutcome::FAILED);
    }
}
