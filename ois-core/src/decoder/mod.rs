//! Command-buffer decoder.
//!
//! Buffers are self-describing streams of records that each start with a
//! `{ cmd_type: u8, op_code: u8 }` header. Settings buffers decode into
//! [`Operation`]s; device-addressing, power and firmware-metadata buffers are
//! handled by the dedicated parsers in [`records`]. The decoder is a pure
//! function of its input: a failure discards only what the current call was
//! building.

mod cursor;
pub mod records;

use alloc::vec::Vec;
use core::time::Duration;

pub use cursor::ByteCursor;
pub use records::{decode_device_info, decode_firmware_metadata, decode_power_settings};

use crate::error::{DecodeError, Error};
use crate::operation::{
    AddressType, DataType, Operation, ReadEntry, RegisterWrite, SequentialMode, WaitKind,
};
use crate::settings::{OperationList, SettingsRole};

pub const CMD_POWER_UP: u8 = 0x02;
pub const CMD_POWER_DOWN: u8 = 0x03;
pub const CMD_DEVICE_INFO: u8 = 0x04;
pub const CMD_RANDOM_WRITE: u8 = 0x05;
pub const CMD_RANDOM_READ: u8 = 0x06;
pub const CMD_SEQUENTIAL_WRITE: u8 = 0x07;
pub const CMD_SEQUENTIAL_READ: u8 = 0x08;
pub const CMD_WAIT: u8 = 0x09;
pub const CMD_FIRMWARE_INFO: u8 = 0x0B;

pub const WAIT_CONDITIONAL: u8 = 1;
pub const WAIT_HARDWARE: u8 = 2;
pub const WAIT_SOFTWARE: u8 = 3;

pub const SEQUENTIAL_BURST: u8 = 1;
pub const SEQUENTIAL_SINGLE: u8 = 2;

/// Common record header.
pub const HEADER_LEN: usize = 2;
pub const RANDOM_WRITE_FIXED_LEN: usize = 6;
pub const RANDOM_WRITE_ENTRY_LEN: usize = 16;
pub const SEQUENTIAL_WRITE_FIXED_LEN: usize = 14;
pub const WAIT_UNCONDITIONAL_LEN: usize = 8;
pub const WAIT_CONDITIONAL_LEN: usize = 20;
pub const RANDOM_READ_FIXED_LEN: usize = 6;
pub const RANDOM_READ_ENTRY_LEN: usize = 8;
pub const SEQUENTIAL_READ_LEN: usize = 12;

/// Purpose of a command buffer, determined by its first record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferKind {
    DeviceInfo,
    PowerSettings,
    FirmwareMetadata,
    Settings,
}

/// Routes a buffer by peeking at its first record's command type.
pub fn classify(buffer: &[u8]) -> Result<BufferKind, DecodeError> {
    let cmd_type = *buffer.first().ok_or(DecodeError::EmptyBuffer)?;
    match cmd_type {
        CMD_DEVICE_INFO => Ok(BufferKind::DeviceInfo),
        CMD_POWER_UP | CMD_POWER_DOWN => Ok(BufferKind::PowerSettings),
        CMD_FIRMWARE_INFO => Ok(BufferKind::FirmwareMetadata),
        CMD_RANDOM_WRITE | CMD_RANDOM_READ | CMD_SEQUENTIAL_WRITE | CMD_SEQUENTIAL_READ
        | CMD_WAIT => Ok(BufferKind::Settings),
        other => Err(DecodeError::UnknownCommand {
            offset: 0,
            cmd_type: other,
        }),
    }
}

/// Decodes a settings buffer into a valid list tagged with `role`.
pub fn decode(buffer: &[u8], role: SettingsRole, request_id: u64) -> Result<OperationList, Error> {
    let operations = decode_operations(buffer)?;
    Ok(OperationList::from_operations(role, operations, request_id))
}

/// Like [`decode`], but only the first `length` bytes belong to the buffer.
pub fn decode_exact(
    buffer: &[u8],
    length: usize,
    role: SettingsRole,
    request_id: u64,
) -> Result<OperationList, Error> {
    let window = buffer.get(..length).ok_or(DecodeError::LengthMismatch {
        declared: length,
        actual: buffer.len(),
    })?;
    decode(window, role, request_id)
}

/// Decodes a settings buffer into `list`, leaving it untouched on failure.
pub fn decode_into(list: &mut OperationList, buffer: &[u8], request_id: u64) -> Result<(), Error> {
    let operations = decode_operations(buffer)?;
    list.populate(operations, request_id);
    Ok(())
}

/// Decodes every record of a settings buffer.
pub fn decode_operations(buffer: &[u8]) -> Result<Vec<Operation>, Error> {
    let mut cursor = ByteCursor::new(buffer);
    let mut operations = Vec::new();

    while !cursor.is_empty() {
        if let Some(operation) = decode_record(&mut cursor)? {
            operations
                .try_reserve(1)
                .map_err(|_| Error::ResourceExhausted)?;
            operations.push(operation);
        }
    }

    if cursor.offset() != buffer.len() {
        return Err(DecodeError::LengthMismatch {
            declared: buffer.len(),
            actual: cursor.offset(),
        }
        .into());
    }

    trace!(
        "decoder: {} operations from {} bytes",
        operations.len(),
        buffer.len()
    );
    Ok(operations)
}

/// Decodes one record; zero-sized requests consume their bytes but yield nothing.
fn decode_record(cursor: &mut ByteCursor<'_>) -> Result<Option<Operation>, Error> {
    let offset = cursor.offset();
    cursor.require(HEADER_LEN)?;
    let cmd_type = cursor.u8()?;
    let op_code = cursor.u8()?;

    match cmd_type {
        CMD_RANDOM_WRITE => random_write(cursor),
        CMD_SEQUENTIAL_WRITE => sequential_write(cursor, offset, op_code),
        CMD_WAIT => wait(cursor, offset, op_code).map(Some),
        CMD_RANDOM_READ => random_read(cursor),
        CMD_SEQUENTIAL_READ => sequential_read(cursor),
        CMD_POWER_UP | CMD_POWER_DOWN | CMD_DEVICE_INFO | CMD_FIRMWARE_INFO => {
            Err(DecodeError::UnexpectedRecord { offset, cmd_type }.into())
        }
        other => Err(DecodeError::UnknownCommand {
            offset,
            cmd_type: other,
        }
        .into()),
    }
}

pub(crate) fn address_type(cursor: &mut ByteCursor<'_>) -> Result<AddressType, DecodeError> {
    let offset = cursor.offset();
    let raw = cursor.u8()?;
    AddressType::from_raw(raw).ok_or(DecodeError::InvalidWidth { offset, value: raw })
}

pub(crate) fn data_type(cursor: &mut ByteCursor<'_>) -> Result<DataType, DecodeError> {
    let offset = cursor.offset();
    let raw = cursor.u8()?;
    DataType::from_raw(raw).ok_or(DecodeError::InvalidWidth { offset, value: raw })
}

pub(crate) fn try_vec<T>(capacity: usize) -> Result<Vec<T>, Error> {
    let mut items = Vec::new();
    items
        .try_reserve_exact(capacity)
        .map_err(|_| Error::ResourceExhausted)?;
    Ok(items)
}

fn random_write(cursor: &mut ByteCursor<'_>) -> Result<Option<Operation>, Error> {
    cursor.require(RANDOM_WRITE_FIXED_LEN - HEADER_LEN)?;
    let address_type = address_type(cursor)?;
    let data_type = data_type(cursor)?;
    let count = usize::from(cursor.u16()?);
    cursor.require_items(count, RANDOM_WRITE_ENTRY_LEN)?;

    if count == 0 {
        return Ok(None);
    }

    let mut entries = try_vec(count)?;
    for _ in 0..count {
        entries.push(RegisterWrite {
            address: cursor.u32()?,
            data: cursor.u32()?,
            delay_us: cursor.u32()?,
            mask: cursor.u32()?,
        });
    }

    Ok(Some(Operation::RandomWrite {
        address_type,
        data_type,
        entries,
    }))
}

fn sequential_write(
    cursor: &mut ByteCursor<'_>,
    offset: usize,
    op_code: u8,
) -> Result<Option<Operation>, Error> {
    let mode = match op_code {
        SEQUENTIAL_BURST => SequentialMode::Burst,
        SEQUENTIAL_SINGLE => SequentialMode::Sequential,
        other => {
            return Err(DecodeError::UnknownOpCode {
                offset,
                cmd_type: CMD_SEQUENTIAL_WRITE,
                op_code: other,
            }
            .into());
        }
    };

    cursor.require(SEQUENTIAL_WRITE_FIXED_LEN - HEADER_LEN)?;
    let address_type = address_type(cursor)?;
    let data_type = data_type(cursor)?;
    let count = usize::from(cursor.u16()?);
    let base_address = cursor.u32()?;
    let delay_us = cursor.u32()?;
    let len = cursor.require_items(count, data_type.width())?;
    let payload = cursor.take(len)?;

    if count == 0 {
        return Ok(None);
    }

    let mut data = try_vec(len)?;
    data.extend_from_slice(payload);

    Ok(Some(Operation::SequentialWrite {
        address_type,
        data_type,
        base_address,
        data,
        delay_us,
        mode,
    }))
}

fn wait(cursor: &mut ByteCursor<'_>, offset: usize, op_code: u8) -> Result<Operation, Error> {
    match op_code {
        WAIT_HARDWARE | WAIT_SOFTWARE => {
            cursor.require(WAIT_UNCONDITIONAL_LEN - HEADER_LEN)?;
            cursor.skip(2)?;
            let raw = u64::from(cursor.u32()?);
            let (kind, delay) = if op_code == WAIT_HARDWARE {
                (WaitKind::Hardware, Duration::from_micros(raw))
            } else {
                (WaitKind::Software, Duration::from_millis(raw))
            };
            Ok(Operation::UnconditionalWait { kind, delay })
        }
        WAIT_CONDITIONAL => {
            cursor.require(WAIT_CONDITIONAL_LEN - HEADER_LEN)?;
            let address_type = address_type(cursor)?;
            let data_type = data_type(cursor)?;
            let address = cursor.u32()?;
            let expected = cursor.u32()?;
            let mask = cursor.u32()?;
            let max_attempts = cursor.u16()?;
            let delay = Duration::from_millis(u64::from(cursor.u16()?));
            Ok(Operation::ConditionalPollWait {
                address,
                expected,
                mask,
                address_type,
                data_type,
                delay,
                max_attempts,
            })
        }
        other => Err(DecodeError::UnknownOpCode {
            offset,
            cmd_type: CMD_WAIT,
            op_code: other,
        }
        .into()),
    }
}

fn random_read(cursor: &mut ByteCursor<'_>) -> Result<Option<Operation>, Error> {
    cursor.require(RANDOM_READ_FIXED_LEN - HEADER_LEN)?;
    let address_type = address_type(cursor)?;
    let data_type = data_type(cursor)?;
    let count = usize::from(cursor.u16()?);
    cursor.require_items(count, RANDOM_READ_ENTRY_LEN)?;

    let mut entries = try_vec(count)?;
    for _ in 0..count {
        let address = cursor.u32()?;
        let size = cursor.u32()? as usize;
        if size > 0 {
            entries.push(ReadEntry { address, size });
        }
    }

    if entries.is_empty() {
        return Ok(None);
    }

    Ok(Some(Operation::RandomRead {
        address_type,
        data_type,
        entries,
    }))
}

fn sequential_read(cursor: &mut ByteCursor<'_>) -> Result<Option<Operation>, Error> {
    cursor.require(SEQUENTIAL_READ_LEN - HEADER_LEN)?;
    let address_type = address_type(cursor)?;
    let data_type = data_type(cursor)?;
    let base_address = cursor.u32()?;
    let size = cursor.u32()? as usize;

    if size == 0 {
        return Ok(None);
    }

    Ok(Some(Operation::SequentialRead {
        address_type,
        data_type,
        base_address,
        size,
    }))
}
