//! Host-side doubles shared by the unit tests.

use core::time::Duration;

use ois_core::bus::{Bus, BusError, BusTarget};
use ois_core::operation::{AddressType, DataType, RegisterWrite, SequentialMode};

/// Bus that accepts every write and reads all ones, like an idle line.
pub struct PulledUpBus;

impl Bus for PulledUpBus {
    fn write_random(
        &mut self,
        _address_type: AddressType,
        _data_type: DataType,
        _entries: &[RegisterWrite],
    ) -> Result<(), BusError> {
        Ok(())
    }

    fn write_sequential(
        &mut self,
        _address_type: AddressType,
        _data_type: DataType,
        _base_address: u32,
        _data: &[u8],
        _mode: SequentialMode,
    ) -> Result<(), BusError> {
        Ok(())
    }

    fn read(
        &mut self,
        _address_type: AddressType,
        _data_type: DataType,
        _address: u32,
        out: &mut [u8],
    ) -> Result<(), BusError> {
        out.fill(0xFF);
        Ok(())
    }

    fn delay(&mut self, _duration: Duration) {}

    fn set_target(&mut self, _target: BusTarget) -> Result<(), BusError> {
        Ok(())
    }
}
