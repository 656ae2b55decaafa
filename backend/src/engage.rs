use crate::cv::vision::TargetOffset;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Tracking,
    Locked,
    Firing,
    Cooldown,
    Depleted,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngagementError {
    #[error("cannot fire while {0:?}")]
    NotLocked(Phase),
    #[error("magazine empty")]
    Empty,
    #[error("cannot reload while {0:?}")]
    NotDepleted(Phase),
    #[error("no shot in progress ({0:?})")]
    NoShot(Phase),
}

/// What to do with a locked target this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Not on target.
    Track,
    /// On target and armed.
    Fire,
    /// On target but disarmed; hold aim, light on, no shot.
    Trained,
    /// On target but out of ammunition.
    Blocked,
}

#[derive(Debug, Clone)]
pub struct EngagementState {
    phase: Phase,
    capacity: u32,
    ammunition_remaining: u32,
    cooldown_active: bool,
    locked: bool,
    shot_sequence_counter: u32,
}

impl EngagementState {
    pub fn new(capacity: u32) -> Self {
        Self {
            phase: Phase::Idle,
            capacity,
            ammunition_remaining: capacity,
            cooldown_active: false,
            locked: false,
            shot_sequence_counter: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn ammunition_remaining(&self) -> u32 {
        self.ammunition_remaining
    }

    pub fn cooldown_active(&self) -> bool {
        self.cooldown_active
    }

    pub fn locked(&self) -> bool {
        self.locked
    }

    pub fn shot_sequence_counter(&self) -> u32 {
        self.shot_sequence_counter
    }

    pub fn is_depleted(&self) -> bool {
        self.phase == Phase::Depleted
    }

    /// Updates lock status from this cycle's offset. A missing target never
    /// locks, even though its offset reads as centered.
    ///
    /// Returns the new `locked` value. While depleted the phase is left
    /// alone so that firing stays blocked.
    pub fn observe(&mut self, offset: &TargetOffset, tolerance: f64) -> bool {
        self.locked = offset.target_found
            && offset.x_offset.abs() < tolerance
            && offset.y_offset.abs() < tolerance;

        if self.phase != Phase::Depleted {
            self.phase = if self.locked {
                Phase::Locked
            } else {
                Phase::Tracking
            };
        }
        self.locked
    }

    pub fn decide(&self, armed: bool) -> Decision {
        if !self.locked {
            Decision::Track
        } else if self.phase == Phase::Depleted {
            Decision::Blocked
        } else if !armed {
            Decision::Trained
        } else {
            Decision::Fire
        }
    }

    pub fn begin_fire(&mut self) -> Result<(), EngagementError> {
        if self.phase != Phase::Locked {
            return Err(EngagementError::NotLocked(self.phase));
        }
        if self.ammunition_remaining < 1 {
            return Err(EngagementError::Empty);
        }
        self.phase = Phase::Firing;
        Ok(())
    }

    /// Books the missile that just left and enters cooldown. Returns the
    /// sequence number of the shot.
    pub fn record_shot(&mut self) -> Result<u32, EngagementError> {
        if self.phase != Phase::Firing {
            return Err(EngagementError::NoShot(self.phase));
        }
        self.ammunition_remaining = self.ammunition_remaining.saturating_sub(1);
        self.shot_sequence_counter += 1;
        self.cooldown_active = true;
        self.phase = Phase::Cooldown;
        Ok(self.shot_sequence_counter)
    }

    pub fn finish_cooldown(&mut self) -> Phase {
        if self.phase == Phase::Cooldown {
            self.cooldown_active = false;
            self.phase = if self.ammunition_remaining < 1 {
                Phase::Depleted
            } else {
                Phase::Tracking
            };
        }
        self.phase
    }

    /// Operator confirmed a fresh magazine.
    pub fn reload(&mut self) -> Result<(), EngagementError> {
        if self.phase != Phase::Depleted {
            return Err(EngagementError::NotDepleted(self.phase));
        }
        self.ammunition_remaining = self.capacity;
        self.locked = false;
        self.phase = Phase::Tracking;
        Ok(())
    }
}

/// Seconds of upward correction for projectile drop.
///
/// `factor * ln(height_fraction)` is negative for any target smaller than
/// the frame, which the aimer reads as upward travel. A zero height has no
/// logarithm and gets no correction.
pub fn drop_compensation(height_fraction: f64, factor: f64) -> f64 {
    if height_fraction > 0. && height_fraction.is_finite() {
        factor * height_fraction.ln()
    } else {
        0.
    }
}
