//! Encoder for command buffers.
//!
//! Produces exactly the byte layout the decoder accepts. Used by the emulator
//! fixtures and throughout the test suites.

use alloc::vec::Vec;

use crate::decoder::records::NAME_LEN;
use crate::decoder::{
    CMD_DEVICE_INFO, CMD_FIRMWARE_INFO, CMD_POWER_DOWN, CMD_POWER_UP, CMD_RANDOM_READ,
    CMD_RANDOM_WRITE, CMD_SEQUENTIAL_READ, CMD_SEQUENTIAL_WRITE, CMD_WAIT, SEQUENTIAL_BURST,
    SEQUENTIAL_SINGLE, WAIT_CONDITIONAL, WAIT_HARDWARE, WAIT_SOFTWARE,
};
use crate::firmware::{Endianness, WriteMode};
use crate::operation::{AddressType, DataType, RegisterWrite, SequentialMode};
use crate::power::PowerSetting;

/// Firmware unit description for [`CommandBuilder::firmware_metadata`].
#[derive(Copy, Clone, Debug)]
pub struct FirmwareUnitSpec<'a> {
    name: &'a str,
    address: u32,
    size: u32,
    length_per_write: u16,
    address_type: AddressType,
    data_type: DataType,
    write_mode: WriteMode,
    delay_us: u32,
    start_offset: u32,
    init: &'a [u8],
    finalize: &'a [u8],
}

impl<'a> FirmwareUnitSpec<'a> {
    /// Burst unit streaming the whole blob in 32-byte chunks.
    pub const fn new(
        name: &'a str,
        address: u32,
        address_type: AddressType,
        data_type: DataType,
    ) -> Self {
        Self {
            name,
            address,
            size: 0,
            length_per_write: 32,
            address_type,
            data_type,
            write_mode: WriteMode::Burst,
            delay_us: 0,
            start_offset: 0,
            init: &[],
            finalize: &[],
        }
    }

    #[must_use]
    pub const fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub const fn length_per_write(mut self, length: u16) -> Self {
        self.length_per_write = length;
        self
    }

    #[must_use]
    pub const fn write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    #[must_use]
    pub const fn delay_us(mut self, delay_us: u32) -> Self {
        self.delay_us = delay_us;
        self
    }

    #[must_use]
    pub const fn start_offset(mut self, offset: u32) -> Self {
        self.start_offset = offset;
        self
    }

    #[must_use]
    pub const fn init(mut self, settings: &'a [u8]) -> Self {
        self.init = settings;
        self
    }

    #[must_use]
    pub const fn finalize(mut self, settings: &'a [u8]) -> Self {
        self.finalize = settings;
        self
    }
}

/// Appends records to a command buffer.
#[derive(Clone, Debug, Default)]
pub struct CommandBuilder {
    bytes: Vec<u8>,
}

impl CommandBuilder {
    pub const fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }

    /// Appends bytes verbatim, e.g. to craft malformed input.
    #[must_use]
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    #[must_use]
    pub fn random_write(
        mut self,
        address_type: AddressType,
        data_type: DataType,
        entries: &[RegisterWrite],
    ) -> Self {
        self.header(CMD_RANDOM_WRITE, 0);
        self.widths(address_type, data_type);
        self.u16(count16(entries.len()));
        for entry in entries {
            self.u32(entry.address);
            self.u32(entry.data);
            self.u32(entry.delay_us);
            self.u32(entry.mask);
        }
        self
    }

    /// `data` holds bus-order values, `data_type` bytes each.
    #[must_use]
    pub fn sequential_write(
        mut self,
        address_type: AddressType,
        data_type: DataType,
        base_address: u32,
        data: &[u8],
        mode: SequentialMode,
        delay_us: u32,
    ) -> Self {
        let op_code = match mode {
            SequentialMode::Burst => SEQUENTIAL_BURST,
            SequentialMode::Sequential => SEQUENTIAL_SINGLE,
        };
        self.header(CMD_SEQUENTIAL_WRITE, op_code);
        self.widths(address_type, data_type);
        self.u16(count16(data.len() / data_type.width()));
        self.u32(base_address);
        self.u32(delay_us);
        self.bytes.extend_from_slice(data);
        self
    }

    #[must_use]
    pub fn hardware_wait(mut self, delay_us: u32) -> Self {
        self.header(CMD_WAIT, WAIT_HARDWARE);
        self.u16(0);
        self.u32(delay_us);
        self
    }

    #[must_use]
    pub fn software_wait(mut self, delay_ms: u32) -> Self {
        self.header(CMD_WAIT, WAIT_SOFTWARE);
        self.u16(0);
        self.u32(delay_ms);
        self
    }

    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn poll(
        mut self,
        address_type: AddressType,
        data_type: DataType,
        address: u32,
        expected: u32,
        mask: u32,
        max_attempts: u16,
        delay_ms: u16,
    ) -> Self {
        self.header(CMD_WAIT, WAIT_CONDITIONAL);
        self.widths(address_type, data_type);
        self.u32(address);
        self.u32(expected);
        self.u32(mask);
        self.u16(max_attempts);
        self.u16(delay_ms);
        self
    }

    /// Each entry is `(address, size)`.
    #[must_use]
    pub fn random_read(
        mut self,
        address_type: AddressType,
        data_type: DataType,
        entries: &[(u32, u32)],
    ) -> Self {
        self.header(CMD_RANDOM_READ, 0);
        self.widths(address_type, data_type);
        self.u16(count16(entries.len()));
        for (address, size) in entries {
            self.u32(*address);
            self.u32(*size);
        }
        self
    }

    #[must_use]
    pub fn sequential_read(
        mut self,
        address_type: AddressType,
        data_type: DataType,
        base_address: u32,
        size: u32,
    ) -> Self {
        self.header(CMD_SEQUENTIAL_READ, 0);
        self.widths(address_type, data_type);
        self.u32(base_address);
        self.u32(size);
        self
    }

    #[must_use]
    pub fn power_up(mut self, steps: &[PowerSetting]) -> Self {
        self.power(CMD_POWER_UP, steps);
        self
    }

    #[must_use]
    pub fn power_down(mut self, steps: &[PowerSetting]) -> Self {
        self.power(CMD_POWER_DOWN, steps);
        self
    }

    /// `opcodes` is `[prog, coeff, peripheral, memory]`.
    #[must_use]
    pub fn device_info(
        mut self,
        slave_address: u16,
        frequency: u8,
        calibration: bool,
        firmware: bool,
        name: &str,
        opcodes: [u32; 4],
    ) -> Self {
        self.header(CMD_DEVICE_INFO, 0);
        self.u16(slave_address);
        self.bytes.push(frequency);
        self.bytes.push(u8::from(calibration));
        self.bytes.push(u8::from(firmware));
        self.bytes.push(0);
        self.name(name);
        for opcode in opcodes {
            self.u32(opcode);
        }
        self
    }

    #[must_use]
    pub fn firmware_metadata(
        mut self,
        endianness: Endianness,
        param_mask: u32,
        version_check: &[u8],
        units: &[FirmwareUnitSpec<'_>],
    ) -> Self {
        self.header(CMD_FIRMWARE_INFO, 0);
        self.bytes.push(endianness.to_raw());
        self.bytes.push(u8::try_from(units.len()).unwrap_or(u8::MAX));
        self.u32(param_mask);
        self.u32(len32(version_check.len()));

        for unit in units {
            self.name(unit.name);
            self.u32(unit.address);
            self.u32(unit.size);
            self.u16(unit.length_per_write);
            self.widths(unit.address_type, unit.data_type);
            self.bytes.push(unit.write_mode.to_raw());
            self.bytes.push(0);
            self.u16(0);
            self.u32(unit.delay_us);
            self.u32(unit.start_offset);
            self.u32(len32(unit.init.len()));
            self.u32(len32(unit.finalize.len()));
        }

        self.bytes.extend_from_slice(version_check);
        for unit in units {
            self.bytes.extend_from_slice(unit.init);
            self.bytes.extend_from_slice(unit.finalize);
        }
        self
    }

    fn power(&mut self, cmd_type: u8, steps: &[PowerSetting]) {
        self.header(cmd_type, 0);
        self.u16(count16(steps.len()));
        for step in steps {
            self.bytes.push(step.rail.to_raw());
            self.bytes.push(0);
            self.u16(step.delay_ms);
            self.u32(step.config);
        }
    }

    fn header(&mut self, cmd_type: u8, op_code: u8) {
        self.bytes.push(cmd_type);
        self.bytes.push(op_code);
    }

    fn widths(&mut self, address_type: AddressType, data_type: DataType) {
        self.bytes.push(address_type.to_raw());
        self.bytes.push(data_type.to_raw());
    }

    fn name(&mut self, name: &str) {
        let mut padded = [0u8; NAME_LEN];
        let len = name.len().min(NAME_LEN);
        padded[..len].copy_from_slice(&name.as_bytes()[..len]);
        self.bytes.extend_from_slice(&padded);
    }

    fn u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }
}

fn count16(count: usize) -> u16 {
    u16::try_from(count).unwrap_or(u16::MAX)
}

fn len32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
