//! STM32 glue: the I2C transport and the rail GPIOs.

#![cfg(target_os = "none")]

pub mod i2c;
pub mod power;

use embassy_time::{Duration, block_for};

/// Busy-waits for `duration`; requests run to completion on the executor.
pub(crate) fn spin(duration: core::time::Duration) {
    block_for(Duration::from_micros(
        u64::try_from(duration.as_micros()).unwrap_or(u64::MAX),
    ));
}
