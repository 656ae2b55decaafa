use super::profile::KNOWN_PROFILES;
use super::{ControlChannel, ControlTransfer, DeviceProfile};
use crate::error::Error;
use rusb::{DeviceHandle, GlobalContext};
use std::time::Duration;
use tracing::{debug, info, warn};

// libusb treats a zero timeout as "wait forever"
const NO_TIMEOUT: Duration = Duration::ZERO;

/// Launcher attached over USB, claimed for exclusive use.
pub struct UsbChannel {
    handle: DeviceHandle<GlobalContext>,
    interface: u8,
}

impl UsbChannel {
    /// Opens and claims the launcher described by `profile`.
    pub fn open(profile: &DeviceProfile) -> crate::Result<Self> {
        let mut handle = rusb::open_device_with_vid_pid(profile.vendor_id, profile.product_id)
            .ok_or(Error::LauncherNotFound {
                vendor_id: profile.vendor_id,
                product_id: profile.product_id,
            })?;

        if let Ok(true) = handle.kernel_driver_active(profile.interface) {
            debug!("detaching kernel driver from interface {}", profile.interface);
            handle.detach_kernel_driver(profile.interface)?;
        }
        handle.set_active_configuration(1)?;
        handle.claim_interface(profile.interface)?;

        info!(
            "claimed {} launcher on interface {}",
            profile.name, profile.interface
        );

        Ok(Self {
            handle,
            interface: profile.interface,
        })
    }

    /// Opens the first known launcher that is plugged in.
    pub fn detect() -> crate::Result<(Self, &'static DeviceProfile)> {
        for profile in KNOWN_PROFILES {
            match Self::open(profile) {
                Ok(channel) => return Ok((channel, profile)),
                Err(Error::LauncherNotFound { .. }) => {
                    debug!("no {} launcher present", profile.name);
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::NoLauncher)
    }
}

impl ControlChannel for UsbChannel {
    fn send(&mut self, transfer: &ControlTransfer) -> crate::Result<()> {
        let written = self.handle.write_control(
            transfer.request_type,
            transfer.request,
            transfer.value,
            transfer.index,
            &transfer.data,
            NO_TIMEOUT,
        )?;

        if written != transfer.data.len() {
            return Err(Error::ShortTransfer {
                written,
                expected: transfer.data.len(),
            });
        }

        Ok(())
    }
}

impl Drop for UsbChannel {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.interface) {
            warn!("failed to release launcher interface: {e}");
        }
    }
}
