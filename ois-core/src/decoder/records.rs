//! Parsers for the non-operation records: device addressing, power settings
//! and firmware metadata.

use heapless::{String, Vec};

use super::{
    ByteCursor, CMD_DEVICE_INFO, CMD_FIRMWARE_INFO, CMD_POWER_DOWN, CMD_POWER_UP, HEADER_LEN,
    address_type, data_type, decode_operations,
};
use crate::bus::{BusTarget, FrequencyMode};
use crate::device::{DeviceInfo, OpcodeTable};
use crate::error::{DecodeError, Error};
use crate::firmware::{
    Endianness, FirmwareConfig, FirmwareDescriptor, FirmwareUnit, MAX_FIRMWARE_UNITS,
    PARAM_VERSION_CHECK, WriteMode,
};
use crate::power::{MAX_POWER_SETTINGS, PowerRail, PowerSetting, PowerSettings, PowerSteps};
use crate::settings::{OperationList, SettingsRole};

pub const NAME_LEN: usize = 32;
pub const DEVICE_INFO_LEN: usize = HEADER_LEN + 6 + NAME_LEN + 16;
pub const POWER_FIXED_LEN: usize = HEADER_LEN + 2;
pub const POWER_ENTRY_LEN: usize = 8;
pub const FIRMWARE_FIXED_LEN: usize = HEADER_LEN + 10;
pub const FIRMWARE_DESCRIPTOR_LEN: usize = NAME_LEN + 32;

/// Parses a device addressing record. The buffer must hold exactly one.
pub fn decode_device_info(buffer: &[u8]) -> Result<DeviceInfo, Error> {
    let mut cursor = ByteCursor::new(buffer);
    expect_header(&mut cursor, &[CMD_DEVICE_INFO])?;
    cursor.require(DEVICE_INFO_LEN - HEADER_LEN)?;

    let slave_address = cursor.u16()?;
    let frequency = FrequencyMode::from_raw(cursor.u8()?);
    let calibration_enabled = cursor.u8()? != 0;
    let firmware_enabled = cursor.u8()? != 0;
    cursor.skip(1)?;
    let name = name(&mut cursor)?;
    let opcodes = OpcodeTable {
        prog: cursor.u32()?,
        coeff: cursor.u32()?,
        peripheral: cursor.u32()?,
        memory: cursor.u32()?,
    };
    expect_end(&cursor, buffer.len())?;

    Ok(DeviceInfo {
        target: BusTarget {
            slave_address,
            frequency,
        },
        name,
        calibration_enabled,
        firmware_enabled,
        opcodes,
    })
}

/// Parses one or more power records. Sequences absent from the buffer stay
/// empty so the caller can keep what was submitted earlier.
pub fn decode_power_settings(buffer: &[u8]) -> Result<PowerSettings, Error> {
    if buffer.is_empty() {
        return Err(DecodeError::EmptyBuffer.into());
    }

    let mut cursor = ByteCursor::new(buffer);
    let mut settings = PowerSettings::new();

    while !cursor.is_empty() {
        let cmd_type = expect_header(&mut cursor, &[CMD_POWER_UP, CMD_POWER_DOWN])?;
        cursor.require(POWER_FIXED_LEN - HEADER_LEN)?;
        let count = cursor.u16()?;
        if usize::from(count) > MAX_POWER_SETTINGS {
            return Err(DecodeError::TooManyPowerSettings { count }.into());
        }
        cursor.require_items(usize::from(count), POWER_ENTRY_LEN)?;

        let mut steps = PowerSteps::new();
        for _ in 0..count {
            let rail = PowerRail::from_raw(cursor.u8()?);
            cursor.skip(1)?;
            let delay_ms = cursor.u16()?;
            let config = cursor.u32()?;
            steps
                .push(PowerSetting::new(rail, config, delay_ms))
                .map_err(|_| DecodeError::TooManyPowerSettings { count })?;
        }

        if cmd_type == CMD_POWER_UP {
            settings.up = steps;
        } else {
            settings.down = steps;
        }
    }

    Ok(settings)
}

/// Parses firmware metadata, including the inline version-check and
/// per-unit init/finalize settings. Every decoded list carries `request_id`.
pub fn decode_firmware_metadata(buffer: &[u8], request_id: u64) -> Result<FirmwareConfig, Error> {
    let mut cursor = ByteCursor::new(buffer);
    expect_header(&mut cursor, &[CMD_FIRMWARE_INFO])?;
    cursor.require(FIRMWARE_FIXED_LEN - HEADER_LEN)?;

    let raw_endianness = cursor.u8()?;
    let endianness = Endianness::from_raw(raw_endianness).ok_or(DecodeError::InvalidEndianness {
        value: raw_endianness,
    })?;
    let count = cursor.u8()?;
    if usize::from(count) > MAX_FIRMWARE_UNITS {
        return Err(DecodeError::TooManyUnits { count }.into());
    }
    let param_mask = cursor.u32()?;
    let version_check_size = cursor.u32()? as usize;
    cursor.require_items(usize::from(count), FIRMWARE_DESCRIPTOR_LEN)?;

    let mut descriptors: Vec<(FirmwareDescriptor, usize, usize), MAX_FIRMWARE_UNITS> = Vec::new();
    for _ in 0..count {
        let entry = descriptor(&mut cursor)?;
        descriptors
            .push(entry)
            .map_err(|_| DecodeError::TooManyUnits { count })?;
    }

    let mut config = FirmwareConfig::new(endianness, param_mask);

    let version_check = cursor.take(version_check_size)?;
    if param_mask & PARAM_VERSION_CHECK != 0 {
        config.version_check = inline_list(version_check, SettingsRole::VersionCheck, request_id)?;
    }

    for (index, (descriptor, init_size, finalize_size)) in descriptors.into_iter().enumerate() {
        let index = u8::try_from(index).map_err(|_| DecodeError::TooManyUnits { count })?;
        let init = inline_list(
            cursor.take(init_size)?,
            SettingsRole::UnitInit(index),
            request_id,
        )?;
        let finalize = inline_list(
            cursor.take(finalize_size)?,
            SettingsRole::UnitFinalize(index),
            request_id,
        )?;
        config
            .units
            .push(FirmwareUnit {
                descriptor,
                init,
                finalize,
            })
            .map_err(|_| DecodeError::TooManyUnits { count })?;
    }

    expect_end(&cursor, buffer.len())?;
    Ok(config)
}

fn descriptor(
    cursor: &mut ByteCursor<'_>,
) -> Result<(FirmwareDescriptor, usize, usize), DecodeError> {
    let name = name(cursor)?;
    let address = cursor.u32()?;
    let size = cursor.u32()?;
    let length_per_write = cursor.u16()?;
    let address_type = address_type(cursor)?;
    let data_type = data_type(cursor)?;
    let mode_offset = cursor.offset();
    let raw_mode = cursor.u8()?;
    let write_mode = WriteMode::from_raw(raw_mode).ok_or(DecodeError::InvalidWriteMode {
        offset: mode_offset,
        value: raw_mode,
    })?;
    cursor.skip(3)?;
    let delay_us = cursor.u32()?;
    let start_offset = cursor.u32()?;
    let init_size = cursor.u32()? as usize;
    let finalize_size = cursor.u32()? as usize;

    let width = data_type.width();
    if length_per_write == 0 || usize::from(length_per_write) % width != 0 {
        return Err(DecodeError::InvalidChunkLength {
            length_per_write,
            width: data_type.to_raw(),
        });
    }

    Ok((
        FirmwareDescriptor {
            name,
            address,
            size,
            length_per_write,
            address_type,
            data_type,
            write_mode,
            delay_us,
            start_offset,
        },
        init_size,
        finalize_size,
    ))
}

/// Decodes an inline settings region; an empty region yields an unused list.
fn inline_list(bytes: &[u8], role: SettingsRole, request_id: u64) -> Result<OperationList, Error> {
    if bytes.is_empty() {
        return Ok(OperationList::new(role));
    }
    let operations = decode_operations(bytes)?;
    Ok(OperationList::from_operations(role, operations, request_id))
}

fn expect_header(cursor: &mut ByteCursor<'_>, allowed: &[u8]) -> Result<u8, DecodeError> {
    let offset = cursor.offset();
    cursor.require(HEADER_LEN)?;
    let cmd_type = cursor.u8()?;
    let _op_code = cursor.u8()?;
    if allowed.contains(&cmd_type) {
        Ok(cmd_type)
    } else {
        Err(DecodeError::UnexpectedRecord { offset, cmd_type })
    }
}

const fn expect_end(cursor: &ByteCursor<'_>, declared: usize) -> Result<(), DecodeError> {
    if cursor.is_empty() {
        Ok(())
    } else {
        Err(DecodeError::LengthMismatch {
            declared,
            actual: cursor.offset(),
        })
    }
}

fn name(cursor: &mut ByteCursor<'_>) -> Result<String<NAME_LEN>, DecodeError> {
    let raw = cursor.take_array::<NAME_LEN>()?;
    let end = raw.iter().position(|byte| *byte == 0).unwrap_or(NAME_LEN);
    let text = core::str::from_utf8(&raw[..end]).map_err(|_| DecodeError::InvalidName)?;
    let mut name = String::new();
    name.push_str(text).map_err(|_| DecodeError::InvalidName)?;
    Ok(name)
}
