//! The actuator fitted to this controller board.
//!
//! Bring-up buffers are built at boot with [`CommandBuilder`] so they stay in
//! step with the decoder.

use alloc::vec::Vec;

use embassy_time::Instant;
use ois_core::builder::CommandBuilder;
use ois_core::bus::FrequencyMode;
use ois_core::clock::Clock;
use ois_core::device::DeviceConfig;
use ois_core::operation::{AddressType, DataType, RegisterWrite};
use ois_core::power::REFERENCE_VARIANT;

use crate::blobs::StaticBlobs;

/// 7-bit address of the actuator driver.
pub const SLAVE_ADDRESS: u16 = 0x0E;

const DEVICE_NAME: &str = "ois-ref";
const CONTROL_REG: u32 = 0x0002;
const MODE_REG: u32 = 0x0004;
const STATUS_REG: u32 = 0x0006;
const READY: u32 = 0x01;

/// Firmware images linked into the binary. The reference module boots from ROM.
pub static IMAGES: StaticBlobs = StaticBlobs::new(&[]);

/// Monotonic clock backed by the embassy time driver.
#[derive(Copy, Clone, Debug, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ticks(&self) -> u64 {
        Instant::now().as_ticks()
    }
}

pub fn device_config() -> DeviceConfig {
    DeviceConfig {
        variant: REFERENCE_VARIANT,
        ..DeviceConfig::default()
    }
}

/// Command buffers submitted by the boot-time configure request.
pub struct BringUp {
    pub device_info: Vec<u8>,
    pub init: Vec<u8>,
}

impl BringUp {
    pub fn new() -> Self {
        let device_info = CommandBuilder::new()
            .device_info(
                SLAVE_ADDRESS,
                FrequencyMode::Fast.to_raw(),
                false,
                false,
                DEVICE_NAME,
                [0; 4],
            )
            .finish();
        let init = CommandBuilder::new()
            .random_write(
                AddressType::Word,
                DataType::Byte,
                &[RegisterWrite::new(CONTROL_REG, 0x80)],
            )
            .software_wait(2)
            .poll(AddressType::Word, DataType::Byte, STATUS_REG, READY, READY, 10, 1)
            .random_write(
                AddressType::Word,
                DataType::Byte,
                &[RegisterWrite::new(MODE_REG, 0x01)],
            )
            .finish();
        Self { device_info, init }
    }

    pub fn buffers(&self) -> [&[u8]; 2] {
        [&self.device_info, &self.init]
    }
}

impl Default for BringUp {
    fn default() -> Self {
        Self::new()
    }
}
