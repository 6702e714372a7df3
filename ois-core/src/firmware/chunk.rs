//! Converts firmware payload slices into bus operations.

use alloc::vec::Vec;

use super::{Endianness, FirmwareDescriptor, WriteMode};
use crate::decoder::try_vec;
use crate::error::Error;
use crate::operation::{Operation, RegisterWrite, SequentialMode};

const WORD: usize = 4;

/// Copies `bytes` into `out` in bus order.
///
/// Big-endian images are reversed in 4-byte groups aligned to the start of
/// `bytes`; a trailing remainder shorter than a group is reversed one
/// `width`-byte element at a time.
pub fn to_bus_order(
    bytes: &[u8],
    width: usize,
    endianness: Endianness,
    out: &mut Vec<u8>,
) -> Result<(), Error> {
    out.try_reserve(bytes.len())
        .map_err(|_| Error::ResourceExhausted)?;

    match endianness {
        Endianness::Little => out.extend_from_slice(bytes),
        Endianness::Big => {
            let groups = bytes.chunks_exact(WORD);
            let remainder = groups.remainder();
            for group in groups {
                out.extend(group.iter().rev());
            }
            for element in remainder.chunks(width.max(1)) {
                out.extend(element.iter().rev());
            }
        }
    }
    Ok(())
}

/// Builds the operation writing one chunk of a unit's payload.
///
/// `elements_written` counts the data-width elements already streamed for
/// this unit and drives address advancement for sequential and random modes.
pub fn build_chunk(
    descriptor: &FirmwareDescriptor,
    endianness: Endianness,
    chunk: &[u8],
    elements_written: u32,
) -> Result<Operation, Error> {
    let width = descriptor.data_type.width();
    let mut data = try_vec(chunk.len())?;
    to_bus_order(chunk, width, endianness, &mut data)?;

    let operation = match descriptor.write_mode {
        WriteMode::Burst => Operation::SequentialWrite {
            address_type: descriptor.address_type,
            data_type: descriptor.data_type,
            base_address: descriptor.address,
            data,
            delay_us: 0,
            mode: SequentialMode::Burst,
        },
        WriteMode::Sequential => Operation::SequentialWrite {
            address_type: descriptor.address_type,
            data_type: descriptor.data_type,
            base_address: descriptor.address.wrapping_add(elements_written),
            data,
            delay_us: 0,
            mode: SequentialMode::Sequential,
        },
        WriteMode::Random => {
            let mut entries = try_vec(data.len().div_ceil(width))?;
            let mut address = descriptor.address.wrapping_add(elements_written);
            for element in data.chunks(width) {
                entries.push(RegisterWrite::new(
                    address,
                    descriptor.data_type.value_from_bus(element),
                ));
                address = address.wrapping_add(1);
            }
            Operation::RandomWrite {
                address_type: descriptor.address_type,
                data_type: descriptor.data_type,
                entries,
            }
        }
    };
    Ok(operation)
}
