//! Register-addressed transactions over the blocking STM32 I2C driver.

use embassy_stm32::i2c::{Error as I2cError, I2c};
use embassy_stm32::mode::Blocking;
use heapless::Vec;
use ois_core::bus::{Bus, BusError, BusTarget, FrequencyMode, sequential_frames};
use ois_core::operation::{AddressType, DataType, RegisterWrite, SequentialMode};

/// Largest address-plus-payload frame sent in one transaction.
pub const MAX_FRAME: usize = 260;

pub struct I2cBus<'d> {
    i2c: I2c<'d, Blocking>,
    target: BusTarget,
    frame: Vec<u8, MAX_FRAME>,
}

impl<'d> I2cBus<'d> {
    pub fn new(i2c: I2c<'d, Blocking>) -> Self {
        Self {
            i2c,
            target: BusTarget {
                slave_address: 0,
                frequency: FrequencyMode::Standard,
            },
            frame: Vec::new(),
        }
    }

    fn address(&self) -> Result<u8, BusError> {
        u8::try_from(self.target.slave_address).map_err(|_| BusError::Io)
    }

    fn begin(&mut self, address_type: AddressType, register: u32) -> Result<(), BusError> {
        self.frame.clear();
        let bytes = register.to_be_bytes();
        self.frame
            .extend_from_slice(&bytes[4 - address_type.width()..])
            .map_err(|_| BusError::Io)
    }

    fn push(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        self.frame.extend_from_slice(bytes).map_err(|_| BusError::Io)
    }

    fn send(&mut self) -> Result<(), BusError> {
        let address = self.address()?;
        self.i2c
            .blocking_write(address, &self.frame)
            .map_err(map_error)
    }

    fn read_register(
        &mut self,
        address_type: AddressType,
        register: u32,
        out: &mut [u8],
    ) -> Result<(), BusError> {
        self.begin(address_type, register)?;
        let address = self.address()?;
        self.i2c
            .blocking_write_read(address, &self.frame, out)
            .map_err(map_error)
    }
}

impl Bus for I2cBus<'_> {
    fn write_random(
        &mut self,
        address_type: AddressType,
        data_type: DataType,
        entries: &[RegisterWrite],
    ) -> Result<(), BusError> {
        let width = data_type.width();
        for entry in entries {
            let mut value = entry.data;
            if entry.mask != 0 {
                let mut current = [0u8; 4];
                self.read_register(address_type, entry.address, &mut current[4 - width..])?;
                value = (u32::from_be_bytes(current) & !entry.mask) | (entry.data & entry.mask);
            }

            self.begin(address_type, entry.address)?;
            self.push(&value.to_be_bytes()[4 - width..])?;
            self.send()?;
            if entry.delay_us > 0 {
                super::spin(core::time::Duration::from_micros(u64::from(entry.delay_us)));
            }
        }
        Ok(())
    }

    fn write_sequential(
        &mut self,
        address_type: AddressType,
        data_type: DataType,
        base_address: u32,
        data: &[u8],
        mode: SequentialMode,
    ) -> Result<(), BusError> {
        let max_payload = MAX_FRAME - address_type.width();
        let frames = sequential_frames(data_type, base_address, data, mode, max_payload);
        for (register, payload) in frames {
            self.begin(address_type, register)?;
            self.push(payload)?;
            self.send()?;
        }
        Ok(())
    }

    fn read(
        &mut self,
        address_type: AddressType,
        _data_type: DataType,
        address: u32,
        out: &mut [u8],
    ) -> Result<(), BusError> {
        self.read_register(address_type, address, out)
    }

    fn delay(&mut self, duration: core::time::Duration) {
        super::spin(duration);
    }

    fn set_target(&mut self, target: BusTarget) -> Result<(), BusError> {
        if target.frequency != self.target.frequency {
            defmt::debug!(
                "i2c: target 0x{:02x} requests {} Hz",
                target.slave_address,
                target.frequency.hz()
            );
        }
        self.target = target;
        Ok(())
    }
}

fn map_error(err: I2cError) -> BusError {
    match err {
        I2cError::Nack => BusError::NoAcknowledge,
        I2cError::Timeout => BusError::Timeout,
        I2cError::Arbitration | I2cError::Bus => BusError::TransportResetting,
        _ => BusError::Io,
    }
}
