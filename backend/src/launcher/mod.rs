use std::fmt::{Display, Formatter};
use std::ops::BitOr;
use std::thread;
use tracing::{debug, info};

pub mod mock;
pub mod profile;
pub mod usb;

pub use profile::{CommandFraming, DeviceProfile, LauncherModel, ORIGINAL, THUNDER};

/// Set of movement directions. Horizontal and vertical bits may be combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Direction(u8);

impl Direction {
    pub const NONE: Direction = Direction(0);
    pub const UP: Direction = Direction(0b0001);
    pub const DOWN: Direction = Direction(0b0010);
    pub const LEFT: Direction = Direction(0b0100);
    pub const RIGHT: Direction = Direction(0b1000);

    pub const fn contains(self, other: Direction) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Drops opposing bits on the same axis: left+right and up+down both
    /// collapse to no motion on that axis.
    pub fn normalized(self) -> Direction {
        let mut bits = self.0;
        if self.contains(Direction::LEFT | Direction::RIGHT) {
            bits &= !(Direction::LEFT.0 | Direction::RIGHT.0);
        }
        if self.contains(Direction::UP | Direction::DOWN) {
            bits &= !(Direction::UP.0 | Direction::DOWN.0);
        }
        Direction(bits)
    }

    pub fn horizontal(self) -> Direction {
        Direction(self.0 & (Direction::LEFT.0 | Direction::RIGHT.0))
    }

    pub fn vertical(self) -> Direction {
        Direction(self.0 & (Direction::UP.0 | Direction::DOWN.0))
    }

    pub fn is_combined(self) -> bool {
        !self.horizontal().is_empty() && !self.vertical().is_empty()
    }
}

impl BitOr for Direction {
    type Output = Direction;

    fn bitor(self, rhs: Self) -> Self::Output {
        Direction(self.0 | rhs.0)
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names = [
            (Direction::UP, "up"),
            (Direction::DOWN, "down"),
            (Direction::LEFT, "left"),
            (Direction::RIGHT, "right"),
        ];
        let parts: Vec<&str> = names
            .iter()
            .filter(|(d, _)| self.contains(*d))
            .map(|(_, n)| *n)
            .collect();

        if parts.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", parts.join("+"))
        }
    }
}

/// High-level intent sent to the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Move(Direction),
    Stop,
    Fire,
    Indicator(bool),
}

/// A single USB control transfer (host to device).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlTransfer {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub data: Vec<u8>,
}

/// Transport that delivers control transfers to the launcher.
pub trait ControlChannel {
    fn send(&mut self, transfer: &ControlTransfer) -> crate::Result<()>;
}

/// Open-loop launcher driver. There is no position feedback; every command
/// stays active on the device until it is superseded.
pub struct Launcher<C: ControlChannel> {
    channel: C,
    profile: &'static DeviceProfile,
}

impl<C: ControlChannel> Launcher<C> {
    pub fn new(channel: C, profile: &'static DeviceProfile) -> Self {
        info!(
            "{} launcher ready ({:04x}:{:04x}, {} missiles)",
            profile.name, profile.vendor_id, profile.product_id, profile.capacity
        );
        Self { channel, profile }
    }

    pub fn profile(&self) -> &'static DeviceProfile {
        self.profile
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    fn issue(&mut self, command: Command) -> crate::Result<()> {
        for transfer in self.profile.encode(command) {
            debug!("{:?} -> {:02x?}", command, transfer.data);
            self.channel.send(&transfer)?;
        }
        Ok(())
    }

    /// Starts moving in `direction` until the next command.
    pub fn move_turret(&mut self, direction: Direction) -> crate::Result<()> {
        let direction = direction.normalized();
        if direction.is_empty() {
            return self.stop();
        }
        if direction.is_combined() && !self.profile.supports_combined {
            return Err(crate::error::Error::UnsupportedDirection {
                profile: self.profile.name,
                direction,
            });
        }
        self.issue(Command::Move(direction))
    }

    pub fn stop(&mut self) -> crate::Result<()> {
        self.issue(Command::Stop)
    }

    pub fn fire(&mut self) -> crate::Result<()> {
        info!("firing");
        self.issue(Command::Fire)
    }

    /// Switches the indicator light. Does nothing on launchers without one.
    pub fn toggle_indicator(&mut self, on: bool) -> crate::Result<()> {
        self.issue(Command::Indicator(on))
    }

    /// Drives the turret to its calibrated home orientation.
    pub fn center(&mut self) -> crate::Result<()> {
        info!("centering {} launcher", self.profile.name);
        for step in self.profile.center_sequence {
            self.move_turret(step.direction)?;
            thread::sleep(step.duration);
            self.stop()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockChannel;
    use super::*;

    #[test]
    fn opposing_bits_cancel() {
        let d = (Direction::LEFT | Direction::RIGHT | Direction::UP).normalized();
        assert_eq!(d, Direction::UP);
        let d = (Direction::UP | Direction::DOWN).normalized();
        assert!(d.is_empty());
    }

    #[test]
    fn direction_display() {
        assert_eq!((Direction::UP | Direction::LEFT).to_string(), "up+left");
        assert_eq!(Direction::NONE.to_string(), "none");
    }

    #[test]
    fn move_right_then_stop() {
        let mut launcher = Launcher::new(MockChannel::default(), &THUNDER);
        launcher.move_turret(Direction::RIGHT).unwrap();
        launcher.stop().unwrap();

        let payloads = launcher.channel().payloads();
        assert_eq!(
            payloads,
            vec![
                vec![0x02, 0x08, 0, 0, 0, 0, 0, 0],
                vec![0x02, 0x20, 0, 0, 0, 0, 0, 0],
            ]
        );
    }

    #[test]
    fn empty_move_is_a_stop() {
        let mut launcher = Launcher::new(MockChannel::default(), &THUNDER);
        launcher
            .move_turret(Direction::LEFT | Direction::RIGHT)
            .unwrap();
        assert_eq!(
            launcher.channel().payloads(),
            vec![vec![0x02, 0x20, 0, 0, 0, 0, 0, 0]]
        );
    }

    #[test]
    fn combined_move_rejected_on_sequential_profile() {
        let mut launcher = Launcher::new(MockChannel::default(), &ORIGINAL);
        let err = launcher
            .move_turret(Direction::UP | Direction::RIGHT)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::UnsupportedDirection { .. }
        ));
        assert!(launcher.channel().transfers().is_empty());
    }

    #[test]
    fn indicator_is_noop_without_light() {
        let mut launcher = Launcher::new(MockChannel::default(), &ORIGINAL);
        launcher.toggle_indicator(true).unwrap();
        assert!(launcher.channel().transfers().is_empty());
    }

    #[test]
    fn transfer_failure_propagates() {
        let mut launcher = Launcher::new(MockChannel::failing_after(1), &THUNDER);
        launcher.move_turret(Direction::DOWN).unwrap();
        assert!(launcher.fire().is_err());
    }
}
