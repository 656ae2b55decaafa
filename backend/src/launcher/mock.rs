use super::{ControlChannel, ControlTransfer};
use std::time::Instant;
use tracing::debug;

/// Control channel that records transfers instead of touching hardware.
#[derive(Debug, Default)]
pub struct MockChannel {
    sent: Vec<(ControlTransfer, Instant)>,
    fail_after: Option<usize>,
}

impl MockChannel {
    /// Accepts `count` transfers, then fails every one after that.
    pub fn failing_after(count: usize) -> Self {
        Self {
            fail_after: Some(count),
            ..Default::default()
        }
    }

    pub fn transfers(&self) -> Vec<&ControlTransfer> {
        self.sent.iter().map(|(t, _)| t).collect()
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.sent.iter().map(|(t, _)| t.data.clone()).collect()
    }

    /// Transfers paired with the instant they were sent.
    pub fn timeline(&self) -> &[(ControlTransfer, Instant)] {
        &self.sent
    }
}

impl ControlChannel for MockChannel {
    fn send(&mut self, transfer: &ControlTransfer) -> crate::Result<()> {
        if self.fail_after.is_some_and(|n| self.sent.len() >= n) {
            return Err(rusb::Error::NoDevice.into());
        }
        self.sent.push((transfer.clone(), Instant::now()));
        Ok(())
    }
}

/// Logs transfers and forgets them. Only a running count is kept.
#[derive(Debug, Default)]
pub struct DryRunChannel {
    count: u64,
}

impl DryRunChannel {
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl ControlChannel for DryRunChannel {
    fn send(&mut self, transfer: &ControlTransfer) -> crate::Result<()> {
        self.count += 1;
        debug!(
            "dry run transfer #{} type={:#04x} req={:#04x} value={:#06x} index={} data={:02x?}",
            self.count,
            transfer.request_type,
            transfer.request,
            transfer.value,
            transfer.index,
            transfer.data
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::{Direction, Launcher, ORIGINAL};
    use std::mem::size_of;

    #[test]
    fn dry_run_keeps_no_history() {
        let mut launcher = Launcher::new(DryRunChannel::default(), &ORIGINAL);
        for _ in 0..1000 {
            launcher.move_turret(Direction::LEFT).unwrap();
            launcher.stop().unwrap();
        }
        // every original command is a handshake pair plus the payload
        assert_eq!(launcher.channel().count(), 6000);
        assert_eq!(size_of::<DryRunChannel>(), size_of::<u64>());
    }

    #[test]
    fn mock_fails_after_budget() {
        let mut channel = MockChannel::failing_after(1);
        let transfer = ControlTransfer {
            request_type: 0x21,
            request: 0x09,
            value: 0,
            index: 0,
            data: vec![0x02, 0x20, 0, 0, 0, 0, 0, 0],
        };
        channel.send(&transfer).unwrap();
        assert!(channel.send(&transfer).is_err());
        assert_eq!(channel.transfers().len(), 1);
    }
}
