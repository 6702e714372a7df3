use crate::bus::Bus;
use crate::error::Error;
use crate::firmware::DownloadOutcome;

use super::DeviceInfo;

/// Peripheral-specific steps injected into configuration.
///
/// Every hook receives the device's bus so it can issue extra register
/// traffic. Defaults do nothing.
pub trait PeripheralHooks {
    /// Runs right after power-up, before any settings are applied.
    fn configure(&mut self, _bus: &mut dyn Bus, _info: &DeviceInfo) -> Result<(), Error> {
        Ok(())
    }

    /// Runs before the firmware-init settings and the download.
    fn pre_firmware(&mut self, _bus: &mut dyn Bus) -> Result<(), Error> {
        Ok(())
    }

    /// Runs after a download, whether or not anything was written.
    fn post_firmware(
        &mut self,
        _bus: &mut dyn Bus,
        _outcome: DownloadOutcome,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// Hooks that leave configuration untouched.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopHooks;

impl PeripheralHooks for NoopHooks {}
