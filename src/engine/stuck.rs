// Stuck detection.
//
// An agent that is commanded to move but stays within `stuck_distance` of
// its anchor for longer than its budget gets one forced repath; staying put
// for `give_up_factor` budgets gives up on the destination.

use glam::Vec2;

/// Floor of the stuck budget in seconds.
const MIN_STUCK_SECONDS: f64 = 1.0;
/// Slack over the time it should take to cover the stuck distance.
const STUCK_TIME_SLACK: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuckVerdict {
    /// Moved far enough; anchor reset.
    Progressing,
    /// Not moving, still within budget.
    Waiting,
    /// Budget exceeded for the first time: ask for a new path.
    Repath,
    /// Stuck for too long: abandon the destination.
    GiveUp,
}

/// Seconds an agent may spend covering `stuck_distance` at `move_speed`.
pub fn stuck_budget(stuck_distance: f32, move_speed: f32) -> f64 {
    if move_speed <= f32::EPSILON {
        return MIN_STUCK_SECONDS;
    }
    (stuck_distance as f64 / move_speed as f64 * STUCK_TIME_SLACK).max(MIN_STUCK_SECONDS)
}

#[derive(Debug, Clone, Copy)]
pub struct StuckTracker {
    anchor: Vec2,
    since: f64,
    repath_issued: bool,
}

impl StuckTracker {
    pub fn new(position: Vec2, now: f64) -> Self {
        Self {
            anchor: position,
            since: now,
            repath_issued: false,
        }
    }

    pub fn reset(&mut self, position: Vec2, now: f64) {
        *self = Self::new(position, now);
    }

    pub fn anchor(&self) -> Vec2 {
        self.anchor
    }

    /// The forced repath went out; no more until the anchor moves.
    pub fn mark_repathed(&mut self) {
        self.repath_issued = true;
    }

    pub fn check(
        &mut self,
        position: Vec2,
        now: f64,
        move_speed: f32,
        stuck_distance: f32,
        give_up_factor: f32,
    ) -> StuckVerdict {
        if position.distance(self.anchor) >= stuck_distance {
            self.reset(position, now);
            return StuckVerdict::Progressing;
        }

        let budget = stuck_budget(stuck_distance, move_speed);
        let elapsed = now - self.since;

        if elapsed > budget * give_up_factor as f64 {
            StuckVerdict::GiveUp
        } else if elapsed > budget && !self.repath_issued {
            StuckVerdict::Repath
        } else {
            StuckVerdict::Waiting
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case::fast(0.5, 4.0, 1.0)]
    #[case::slow(0.5, 0.25, 2.4)]
    #[case::immobile(0.5, 0.0, 1.0)]
    fn budget_has_a_one_second_floor(#[case] distance: f32, #[case] speed: f32, #[case] expected: f64) {
        assert_relative_eq!(stuck_budget(distance, speed), expected, epsilon = 1e-6);
    }

    #[test]
    fn blocked_agent_repaths_once_then_gives_up() {
        let mut tracker = StuckTracker::new(Vec2::ZERO, 0.0);
        let check = |t: &mut StuckTracker, now| t.check(Vec2::new(0.1, 0.0), now, 4.0, 0.5, 3.0);

        assert_eq!(check(&mut tracker, 0.5), StuckVerdict::Waiting);
        assert_eq!(check(&mut tracker, 1.1), StuckVerdict::Repath);
        tracker.mark_repathed();
        assert_eq!(check(&mut tracker, 2.0), StuckVerdict::Waiting);
        assert_eq!(check(&mut tracker, 3.1), StuckVerdict::GiveUp);
    }

    #[test]
    fn repath_is_offered_until_one_goes_out() {
        let mut tracker = StuckTracker::new(Vec2::ZERO, 0.0);
        let check = |t: &mut StuckTracker, now| t.check(Vec2::new(0.1, 0.0), now, 4.0, 0.5, 3.0);

        assert_eq!(check(&mut tracker, 1.1), StuckVerdict::Repath);
        // Nothing was issued (a request was still pending), so ask again.
        assert_eq!(check(&mut tracker, 1.2), StuckVerdict::Repath);
        tracker.mark_repathed();
        assert_eq!(check(&mut tracker, 1.3), StuckVerdict::Waiting);
    }

    #[test]
    fn progress_resets_anchor() {
        let mut tracker = StuckTracker::new(Vec2::ZERO, 0.0);

        let verdict = tracker.check(Vec2::new(0.6, 0.0), 5.0, 4.0, 0.5, 3.0);

        assert_eq!(verdict, StuckVerdict::Progressing);
        assert_eq!(tracker.anchor(), Vec2::new(0.6, 0.0));
        assert_eq!(
            tracker.check(Vec2::new(0.6, 0.0), 5.5, 4.0, 0.5, 3.0),
            StuckVerdict::Waiting
        );
    }
}
