//! Device profiles and command framing for the supported launcher models.
//!
//! Two framings exist in the wild:
//!
//! * single packet: `[0x02, bits, 0, 0, 0, 0, 0, 0]`, one transfer per command
//! * init pair + command: two 8-byte `USBC` handshakes followed by a
//!   64-byte payload `[0, left, right, up, down, fire, 8, 8, 0 ...]`
//!
//! The device silently drops a Profile B command whose handshake is missing,
//! so [`DeviceProfile::encode`] always emits all three transfers together.

use super::{Command, ControlTransfer, Direction};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const HID_SET_REPORT_TYPE: u8 = 0x21;
const HID_SET_REPORT: u8 = 0x09;

const SINGLE_MOVE_PREFIX: u8 = 0x02;
const SINGLE_INDICATOR_PREFIX: u8 = 0x03;
const SINGLE_DOWN: u8 = 0x01;
const SINGLE_UP: u8 = 0x02;
const SINGLE_LEFT: u8 = 0x04;
const SINGLE_RIGHT: u8 = 0x08;
const SINGLE_FIRE: u8 = 0x10;
const SINGLE_STOP: u8 = 0x20;

const HANDSHAKE_FIRST: [u8; 8] = [b'U', b'S', b'B', b'C', 0x00, 0x00, 0x04, 0x00];
const HANDSHAKE_SECOND: [u8; 8] = [b'U', b'S', b'B', b'C', 0x00, 0x40, 0x02, 0x00];
const PAIR_REPORT_VALUE: u16 = 0x0200;
const PAIR_REPORT_INDEX: u16 = 0x01;
const PAIR_TRAILER: [u8; 2] = [0x08, 0x08];
pub const PAIR_PAYLOAD_LEN: usize = 64;

/// How commands are framed on the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFraming {
    /// One 8-byte report per command.
    SinglePacket,
    /// Two 8-byte handshakes, then a zero-padded 64-byte command.
    InitPacketPair,
}

/// One leg of the homing sequence run by `center()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenterStep {
    pub direction: Direction,
    pub duration: Duration,
}

const fn step(direction: Direction, millis: u64) -> CenterStep {
    CenterStep {
        direction,
        duration: Duration::from_millis(millis),
    }
}

/// Protocol framing plus physical constants for one launcher model.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    pub name: &'static str,
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface: u8,
    pub framing: CommandFraming,
    /// Missiles per full magazine.
    pub capacity: u32,
    /// Seconds of travel per unit of horizontal frame offset.
    pub horizontal_speed: f64,
    /// Seconds of travel per unit of vertical frame offset.
    pub vertical_speed: f64,
    pub supports_combined: bool,
    pub has_indicator: bool,
    pub center_sequence: &'static [CenterStep],
}

pub const THUNDER: DeviceProfile = DeviceProfile {
    name: "Thunder",
    vendor_id: 0x2123,
    product_id: 0x1010,
    interface: 0,
    framing: CommandFraming::SinglePacket,
    capacity: 4,
    horizontal_speed: 0.64,
    vertical_speed: 0.48,
    supports_combined: true,
    has_indicator: true,
    center_sequence: &[
        step(Direction::LEFT, 6000),
        step(Direction::DOWN, 1000),
        step(Direction::RIGHT, 3250),
        step(Direction::UP, 540),
    ],
};

pub const ORIGINAL: DeviceProfile = DeviceProfile {
    name: "Original",
    vendor_id: 0x1130,
    product_id: 0x0202,
    interface: 1,
    framing: CommandFraming::InitPacketPair,
    capacity: 3,
    horizontal_speed: 0.75,
    vertical_speed: 0.55,
    supports_combined: false,
    has_indicator: false,
    center_sequence: &[
        step(Direction::LEFT, 7000),
        step(Direction::DOWN, 1300),
        step(Direction::RIGHT, 3600),
        step(Direction::UP, 700),
    ],
};

/// Probe order used when no model is requested explicitly.
pub const KNOWN_PROFILES: [&DeviceProfile; 2] = [&THUNDER, &ORIGINAL];

/// Launcher models selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LauncherModel {
    Thunder,
    Original,
}

impl LauncherModel {
    pub fn profile(self) -> &'static DeviceProfile {
        match self {
            LauncherModel::Thunder => &THUNDER,
            LauncherModel::Original => &ORIGINAL,
        }
    }
}

impl DeviceProfile {
    /// Encodes a command into the transfers that must be issued, in order.
    ///
    /// Returns an empty list for commands the profile has no use for, such as
    /// indicator changes on a launcher without a light.
    pub fn encode(&self, command: Command) -> Vec<ControlTransfer> {
        match self.framing {
            CommandFraming::SinglePacket => self.encode_single(command).into_iter().collect(),
            CommandFraming::InitPacketPair => self.encode_pair(command),
        }
    }

    fn encode_single(&self, command: Command) -> Option<ControlTransfer> {
        let (prefix, byte) = match command {
            Command::Move(direction) => (SINGLE_MOVE_PREFIX, single_direction_bits(direction)),
            Command::Stop => (SINGLE_MOVE_PREFIX, SINGLE_STOP),
            Command::Fire => (SINGLE_MOVE_PREFIX, SINGLE_FIRE),
            Command::Indicator(on) if self.has_indicator => (SINGLE_INDICATOR_PREFIX, on as u8),
            Command::Indicator(_) => return None,
        };

        Some(ControlTransfer {
            request_type: HID_SET_REPORT_TYPE,
            request: HID_SET_REPORT,
            value: 0,
            index: 0,
            data: vec![prefix, byte, 0, 0, 0, 0, 0, 0],
        })
    }

    fn encode_pair(&self, command: Command) -> Vec<ControlTransfer> {
        // [0, left, right, up, down, fire]
        let mut bits = [0u8; 6];
        match command {
            Command::Move(direction) => {
                bits[1] = direction.contains(Direction::LEFT) as u8;
                bits[2] = direction.contains(Direction::RIGHT) as u8;
                bits[3] = direction.contains(Direction::UP) as u8;
                bits[4] = direction.contains(Direction::DOWN) as u8;
            }
            Command::Fire => bits[5] = 1,
            Command::Stop => {}
            Command::Indicator(_) => return Vec::new(),
        }

        let mut payload = Vec::with_capacity(PAIR_PAYLOAD_LEN);
        payload.extend_from_slice(&bits);
        payload.extend_from_slice(&PAIR_TRAILER);
        payload.resize(PAIR_PAYLOAD_LEN, 0);

        [HANDSHAKE_FIRST.to_vec(), HANDSHAKE_SECOND.to_vec(), payload]
            .into_iter()
            .map(|data| ControlTransfer {
                request_type: HID_SET_REPORT_TYPE,
                request: HID_SET_REPORT,
                value: PAIR_REPORT_VALUE,
                index: PAIR_REPORT_INDEX,
                data,
            })
            .collect()
    }
}

fn single_direction_bits(direction: Direction) -> u8 {
    let mut byte = 0;
    if direction.contains(Direction::DOWN) {
        byte |= SINGLE_DOWN;
    }
    if direction.contains(Direction::UP) {
        byte |= SINGLE_UP;
    }
    if direction.contains(Direction::LEFT) {
        byte |= SINGLE_LEFT;
    }
    if direction.contains(Direction::RIGHT) {
        byte |= SINGLE_RIGHT;
    }
    byte
}
