use crate::launcher::{ControlChannel, DeviceProfile, Direction, Launcher};
use std::thread;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionStep {
    Move {
        direction: Direction,
        duration: Duration,
    },
    Stop,
}

/// Turns signed run times (seconds, positive is right/down) into the
/// sequence of launcher commands needed.
///
/// With combined motion both axes run together for the shorter of the two
/// times, then the longer axis finishes alone. Without it, the horizontal
/// run completes and stops before the vertical one starts.
pub fn plan_motion(right_seconds: f64, down_seconds: f64, combined: bool) -> Vec<MotionStep> {
    let horizontal = axis(right_seconds, Direction::RIGHT, Direction::LEFT);
    let vertical = axis(down_seconds, Direction::DOWN, Direction::UP);

    let mut steps = Vec::new();
    match (horizontal, vertical) {
        (None, None) => return steps,
        (Some((h, h_secs)), Some((v, v_secs))) if combined => {
            let shared = h_secs.min(v_secs);
            steps.push(MotionStep::Move {
                direction: h | v,
                duration: Duration::from_secs_f64(shared),
            });
            let (rest, rest_secs) = if h_secs > v_secs {
                (h, h_secs - shared)
            } else {
                (v, v_secs - shared)
            };
            if rest_secs > 0. {
                steps.push(MotionStep::Move {
                    direction: rest,
                    duration: Duration::from_secs_f64(rest_secs),
                });
            }
            steps.push(MotionStep::Stop);
        }
        (h, v) => {
            for (direction, secs) in [h, v].into_iter().flatten() {
                steps.push(MotionStep::Move {
                    direction,
                    duration: Duration::from_secs_f64(secs),
                });
                steps.push(MotionStep::Stop);
            }
        }
    }
    steps
}

fn axis(seconds: f64, positive: Direction, negative: Direction) -> Option<(Direction, f64)> {
    if !seconds.is_finite() || seconds == 0. {
        None
    } else if seconds > 0. {
        Some((positive, seconds))
    } else {
        Some((negative, -seconds))
    }
}

pub struct Aimer {
    horizontal_speed: f64,
    vertical_speed: f64,
    combined: bool,
    settle_delay: Duration,
}

impl Aimer {
    pub fn new(profile: &DeviceProfile, settle_delay: Duration) -> Self {
        Self {
            horizontal_speed: profile.horizontal_speed,
            vertical_speed: profile.vertical_speed,
            combined: profile.supports_combined,
            settle_delay,
        }
    }

    /// Run times in seconds for a frame offset.
    pub fn run_times(&self, x_offset: f64, y_offset: f64) -> (f64, f64) {
        (
            x_offset * self.horizontal_speed,
            y_offset * self.vertical_speed,
        )
    }

    /// Moves the turret toward a target at the given frame offset.
    pub fn aim<C: ControlChannel>(
        &self,
        launcher: &mut Launcher<C>,
        x_offset: f64,
        y_offset: f64,
    ) -> crate::Result<()> {
        let (right, down) = self.run_times(x_offset, y_offset);
        self.adjust(launcher, right, down)
    }

    /// Moves by raw run times, then waits for the image to settle.
    pub fn adjust<C: ControlChannel>(
        &self,
        launcher: &mut Launcher<C>,
        right_seconds: f64,
        down_seconds: f64,
    ) -> crate::Result<()> {
        let steps = plan_motion(right_seconds, down_seconds, self.combined);
        if steps.is_empty() {
            return Ok(());
        }
        debug!("adjust right={right_seconds:+.3}s down={down_seconds:+.3}s");

        for step in steps {
            match step {
                MotionStep::Move {
                    direction,
                    duration,
                } => {
                    launcher.move_turret(direction)?;
                    thread::sleep(duration);
                }
                MotionStep::Stop => launcher.stop()?,
            }
        }

        thread::sleep(self.settle_delay);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::mock::MockChannel;
    use crate::launcher::{ORIGINAL, THUNDER};
    use approx::assert_abs_diff_eq;
    use std::time::Instant;

    fn secs(step: &MotionStep) -> f64 {
        match step {
            MotionStep::Move { duration, .. } => duration.as_secs_f64(),
            MotionStep::Stop => 0.,
        }
    }

    #[test]
    fn zero_offset_plans_nothing() {
        assert!(plan_motion(0., 0., true).is_empty());
        assert!(plan_motion(0., 0., false).is_empty());
    }

    #[test]
    fn right_only() {
        let steps = plan_motion(0.128, 0., true);
        assert_eq!(steps.len(), 2);
        assert!(matches!(
            steps[0],
            MotionStep::Move { direction, .. } if direction == Direction::RIGHT
        ));
        assert_abs_diff_eq!(secs(&steps[0]), 0.128, epsilon = 1e-9);
        assert_eq!(steps[1], MotionStep::Stop);
    }

    #[test]
    fn combined_runs_shorter_axis_first() {
        let steps = plan_motion(-0.3, 0.1, true);
        assert_eq!(steps.len(), 3);
        assert!(matches!(
            steps[0],
            MotionStep::Move { direction, .. } if direction == Direction::LEFT | Direction::DOWN
        ));
        assert_abs_diff_eq!(secs(&steps[0]), 0.1, epsilon = 1e-9);
        assert!(matches!(
            steps[1],
            MotionStep::Move { direction, .. } if direction == Direction::LEFT
        ));
        assert_abs_diff_eq!(secs(&steps[1]), 0.2, epsilon = 1e-9);
        assert_eq!(steps[2], MotionStep::Stop);
    }

    #[test]
    fn combined_equal_axes_single_leg() {
        let steps = plan_motion(0.2, -0.2, true);
        assert_eq!(steps.len(), 2);
        assert!(matches!(
            steps[0],
            MotionStep::Move { direction, .. } if direction == Direction::RIGHT | Direction::UP
        ));
    }

    #[test]
    fn sequential_axes() {
        let steps = plan_motion(0.1, -0.05, false);
        assert_eq!(steps.len(), 4);
        assert!(matches!(
            steps[0],
            MotionStep::Move { direction, .. } if direction == Direction::RIGHT
        ));
        assert_eq!(steps[1], MotionStep::Stop);
        assert!(matches!(
            steps[2],
            MotionStep::Move { direction, .. } if direction == Direction::UP
        ));
        assert_abs_diff_eq!(secs(&steps[2]), 0.05, epsilon = 1e-9);
        assert_eq!(steps[3], MotionStep::Stop);
    }

    #[test]
    fn aim_right_holds_for_scaled_time() {
        let aimer = Aimer::new(&THUNDER, Duration::ZERO);
        let mut launcher = Launcher::new(MockChannel::default(), &THUNDER);

        let start = Instant::now();
        aimer.aim(&mut launcher, 0.20, 0.0).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(127));

        let timeline = launcher.channel().timeline();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].0.data, vec![0x02, 0x08, 0, 0, 0, 0, 0, 0]);
        assert_eq!(timeline[1].0.data, vec![0x02, 0x20, 0, 0, 0, 0, 0, 0]);
        let held = timeline[1].1 - timeline[0].1;
        assert!(held >= Duration::from_millis(127));
        assert!(held < Duration::from_millis(400));
    }

    #[test]
    fn sequential_profile_never_sends_diagonal() {
        let aimer = Aimer::new(&ORIGINAL, Duration::ZERO);
        let mut launcher = Launcher::new(MockChannel::default(), &ORIGINAL);
        aimer.aim(&mut launcher, 0.02, 0.02).unwrap();

        // two moves and two stops, three transfers each
        assert_eq!(launcher.channel().transfers().len(), 12);
    }

    #[test]
    fn no_offset_no_transfers() {
        let aimer = Aimer::new(&THUNDER, Duration::from_secs(5));
        let mut launcher = Launcher::new(MockChannel::default(), &THUNDER);
        aimer.aim(&mut launcher, 0.0, 0.0).unwrap();
        assert!(launcher.channel().transfers().is_empty());
    }
}
