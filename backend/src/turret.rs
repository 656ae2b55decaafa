use crate::aim::Aimer;
use crate::config::{DepletedPolicy, TurretConfig};
use crate::cv::vision::TargetOffset;
use crate::engage::{drop_compensation, Decision, EngagementState, Phase};
use crate::launcher::{ControlChannel, Launcher};
use std::thread;
use tracing::{info, warn};

/// Operator's answer while the magazine is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    Reloaded,
    Shutdown,
}

/// Source of the operator's reload confirmation.
pub trait ReloadAcknowledger {
    /// Blocks until the operator reloads or a shutdown is requested.
    fn wait_for_reload(&mut self) -> crate::Result<Acknowledgement>;

    /// Non-blocking check for an answer.
    fn poll_reload(&mut self) -> crate::Result<Option<Acknowledgement>>;
}

/// Post-shot capture ("killcam").
pub trait ShotRecorder {
    fn record(&mut self, shot: u32) -> crate::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NoTarget,
    Tracking,
    /// Locked but disarmed.
    Trained,
    Fired { shot: u32, remaining: u32 },
    /// Locked but the magazine is empty.
    Depleted,
    Reloaded,
    Shutdown,
}

/// Aiming and engagement for one launcher.
///
/// Dropping the turret stops any motion and turns the indicator off.
pub struct Turret<C: ControlChannel> {
    launcher: Launcher<C>,
    aimer: Aimer,
    engagement: EngagementState,
    config: TurretConfig,
    indicator_on: bool,
    parked: bool,
}

impl<C: ControlChannel> Turret<C> {
    pub fn new(launcher: Launcher<C>, config: TurretConfig) -> Self {
        let profile = launcher.profile();
        Self {
            aimer: Aimer::new(profile, config.settle_delay()),
            engagement: EngagementState::new(profile.capacity),
            launcher,
            config,
            indicator_on: false,
            parked: false,
        }
    }

    pub fn launcher(&self) -> &Launcher<C> {
        &self.launcher
    }

    pub fn engagement(&self) -> &EngagementState {
        &self.engagement
    }

    pub fn armed(&self) -> bool {
        self.config.armed
    }

    pub fn center(&mut self) -> crate::Result<()> {
        self.parked = false;
        self.launcher.center()
    }

    /// Runs one control cycle for the latest target offset.
    pub fn cycle(
        &mut self,
        offset: &TargetOffset,
        recorder: Option<&mut dyn ShotRecorder>,
        acknowledger: &mut dyn ReloadAcknowledger,
    ) -> crate::Result<Outcome> {
        self.parked = false;

        if self.engagement.is_depleted() {
            match self.config.depleted_policy {
                DepletedPolicy::Pause => return self.await_reload(acknowledger),
                DepletedPolicy::KeepTracking => {
                    if let Some(answer) = acknowledger.poll_reload()? {
                        return self.acknowledge(answer);
                    }
                }
            }
        }

        let locked = self
            .engagement
            .observe(offset, self.config.lock_tolerance);
        self.set_indicator(locked)?;

        match self.engagement.decide(self.config.armed) {
            Decision::Track if !offset.target_found => Ok(Outcome::NoTarget),
            Decision::Track => {
                self.aimer
                    .aim(&mut self.launcher, offset.x_offset, offset.y_offset)?;
                Ok(Outcome::Tracking)
            }
            Decision::Trained => {
                info!("target trained, launcher disarmed");
                Ok(Outcome::Trained)
            }
            Decision::Blocked => Ok(Outcome::Depleted),
            Decision::Fire => self.fire(offset, recorder),
        }
    }

    fn fire(
        &mut self,
        offset: &TargetOffset,
        recorder: Option<&mut dyn ShotRecorder>,
    ) -> crate::Result<Outcome> {
        self.engagement.begin_fire()?;

        let lift = drop_compensation(
            offset.height_fraction,
            self.config.drop_compensation_factor,
        );
        if lift != 0. {
            self.aimer.adjust(&mut self.launcher, 0., lift)?;
        }

        self.launcher.fire()?;
        let shot = self.engagement.record_shot()?;
        info!(
            "shot {shot} away, {} remaining",
            self.engagement.ammunition_remaining()
        );

        if let Some(recorder) = recorder {
            recorder.record(shot)?;
        }

        thread::sleep(self.config.cooldown());
        if self.engagement.finish_cooldown() == Phase::Depleted {
            warn!("out of ammunition");
            self.set_indicator(false)?;
        }

        Ok(Outcome::Fired {
            shot,
            remaining: self.engagement.ammunition_remaining(),
        })
    }

    fn await_reload(&mut self, acknowledger: &mut dyn ReloadAcknowledger) -> crate::Result<Outcome> {
        self.launcher.stop()?;
        self.set_indicator(false)?;
        info!("waiting for reload");
        let answer = acknowledger.wait_for_reload()?;
        self.acknowledge(answer)
    }

    fn acknowledge(&mut self, answer: Acknowledgement) -> crate::Result<Outcome> {
        match answer {
            Acknowledgement::Shutdown => Ok(Outcome::Shutdown),
            Acknowledgement::Reloaded => {
                self.engagement.reload()?;
                info!(
                    "reloaded with {} missiles",
                    self.engagement.ammunition_remaining()
                );
                thread::sleep(self.config.reload_recovery());
                Ok(Outcome::Reloaded)
            }
        }
    }

    fn set_indicator(&mut self, on: bool) -> crate::Result<()> {
        if self.indicator_on != on {
            self.launcher.toggle_indicator(on)?;
            self.indicator_on = on;
        }
        Ok(())
    }

    /// Stops motion and turns the indicator off.
    pub fn park(&mut self) -> crate::Result<()> {
        self.launcher.stop()?;
        self.launcher.toggle_indicator(false)?;
        self.indicator_on = false;
        self.parked = true;
        Ok(())
    }
}

impl<C: ControlChannel> Drop for Turret<C> {
    fn drop(&mut self) {
        if self.parked {
            return;
        }
        if let Err(e) = self.park() {
            warn!("failed to park turret: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::mock::MockChannel;
    use crate::launcher::{ControlTransfer, THUNDER};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct NeverAsked;

    impl ReloadAcknowledger for NeverAsked {
        fn wait_for_reload(&mut self) -> crate::Result<Acknowledgement> {
            panic!("unexpected reload prompt");
        }

        fn poll_reload(&mut self) -> crate::Result<Option<Acknowledgement>> {
            Ok(None)
        }
    }

    fn quick_turret(armed: bool) -> Turret<MockChannel> {
        let config = TurretConfig {
            armed,
            settle_delay_ms: 0,
            cooldown_ms: 0,
            reload_recovery_ms: 0,
            ..Default::default()
        };
        Turret::new(Launcher::new(MockChannel::default(), &THUNDER), config)
    }

    #[test]
    fn no_target_issues_nothing() {
        let mut turret = quick_turret(true);
        let outcome = turret
            .cycle(&TargetOffset::none(), None, &mut NeverAsked)
            .unwrap();
        assert_eq!(outcome, Outcome::NoTarget);
        assert_eq!(turret.engagement().phase(), Phase::Tracking);
        assert!(turret.launcher().channel().transfers().is_empty());
    }

    #[test]
    fn lock_lights_indicator() {
        let mut turret = quick_turret(false);
        let offset = TargetOffset {
            target_found: true,
            x_offset: 0.01,
            y_offset: -0.02,
            height_fraction: 0.3,
        };
        assert_eq!(
            turret.cycle(&offset, None, &mut NeverAsked).unwrap(),
            Outcome::Trained
        );
        assert_eq!(
            turret.launcher().channel().payloads(),
            vec![vec![0x03, 0x01, 0, 0, 0, 0, 0, 0]]
        );
    }

    struct SharedChannel(Rc<RefCell<MockChannel>>);

    impl ControlChannel for SharedChannel {
        fn send(&mut self, transfer: &ControlTransfer) -> crate::Result<()> {
            self.0.borrow_mut().send(transfer)
        }
    }

    #[test]
    fn drop_parks_launcher() {
        let log = Rc::new(RefCell::new(MockChannel::default()));
        {
            let launcher = Launcher::new(SharedChannel(log.clone()), &THUNDER);
            let _turret = Turret::new(launcher, TurretConfig::default());
        }
        assert_eq!(
            log.borrow().payloads(),
            vec![
                vec![0x02, 0x20, 0, 0, 0, 0, 0, 0],
                vec![0x03, 0x00, 0, 0, 0, 0, 0, 0],
            ]
        );
    }

    #[test]
    fn explicit_park_is_not_repeated_on_drop() {
        let log = Rc::new(RefCell::new(MockChannel::default()));
        {
            let launcher = Launcher::new(SharedChannel(log.clone()), &THUNDER);
            let mut turret = Turret::new(launcher, TurretConfig::default());
            turret.park().unwrap();
        }
        assert_eq!(log.borrow().transfers().len(), 2);
    }
}
