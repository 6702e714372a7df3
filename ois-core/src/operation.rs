//! Typed bus operations produced by the decoder and consumed by the engine.

use alloc::vec::Vec;
use core::time::Duration;

/// Width of a register address on the bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressType {
    Byte,
    Word,
    ThreeByte,
    Dword,
}

/// Width of a register value on the bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataType {
    Byte,
    Word,
    ThreeByte,
    Dword,
}

impl AddressType {
    /// Decodes a wire width tag (1..=4).
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Byte),
            2 => Some(Self::Word),
            3 => Some(Self::ThreeByte),
            4 => Some(Self::Dword),
            _ => None,
        }
    }

    /// Wire tag for this width.
    pub const fn to_raw(self) -> u8 {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::ThreeByte => 3,
            Self::Dword => 4,
        }
    }

    /// Number of address bytes clocked onto the bus.
    pub const fn width(self) -> usize {
        self.to_raw() as usize
    }
}

impl DataType {
    /// Decodes a wire width tag (1..=4).
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Byte),
            2 => Some(Self::Word),
            3 => Some(Self::ThreeByte),
            4 => Some(Self::Dword),
            _ => None,
        }
    }

    /// Wire tag for this width.
    pub const fn to_raw(self) -> u8 {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::ThreeByte => 3,
            Self::Dword => 4,
        }
    }

    /// Number of bytes in one register value.
    pub const fn width(self) -> usize {
        self.to_raw() as usize
    }

    /// Mask covering every bit of a value of this width.
    pub const fn full_mask(self) -> u32 {
        match self {
            Self::Byte => 0xFF,
            Self::Word => 0xFFFF,
            Self::ThreeByte => 0x00FF_FFFF,
            Self::Dword => u32::MAX,
        }
    }

    /// Interprets up to four bus-order (big-endian) bytes as a register value.
    pub fn value_from_bus(self, bytes: &[u8]) -> u32 {
        bytes
            .iter()
            .take(self.width())
            .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte))
    }
}

/// How a contiguous run of values is clocked onto the bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequentialMode {
    /// One transaction, the device auto-increments (or FIFOs) internally.
    Burst,
    /// Successive single-address writes starting at the base address.
    Sequential,
}

/// Distinguishes the two unconditional wait flavours.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitKind {
    /// Wait for hardware to settle; encoded in microseconds.
    Hardware,
    /// Sleep the calling context; encoded in milliseconds.
    Software,
}

/// One entry of a random write.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterWrite {
    pub address: u32,
    pub data: u32,
    pub delay_us: u32,
    /// Bits to update; zero writes the full value.
    pub mask: u32,
}

impl RegisterWrite {
    pub const fn new(address: u32, data: u32) -> Self {
        Self {
            address,
            data,
            delay_us: 0,
            mask: 0,
        }
    }
}

/// One entry of a random read.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReadEntry {
    pub address: u32,
    pub size: usize,
}

/// A decoded, typed bus action.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operation {
    RandomWrite {
        address_type: AddressType,
        data_type: DataType,
        entries: Vec<RegisterWrite>,
    },
    SequentialWrite {
        address_type: AddressType,
        data_type: DataType,
        base_address: u32,
        data: Vec<u8>,
        delay_us: u32,
        mode: SequentialMode,
    },
    UnconditionalWait {
        kind: WaitKind,
        delay: Duration,
    },
    ConditionalPollWait {
        address: u32,
        expected: u32,
        mask: u32,
        address_type: AddressType,
        data_type: DataType,
        delay: Duration,
        max_attempts: u16,
    },
    RandomRead {
        address_type: AddressType,
        data_type: DataType,
        entries: Vec<ReadEntry>,
    },
    SequentialRead {
        address_type: AddressType,
        data_type: DataType,
        base_address: u32,
        size: usize,
    },
}

impl Operation {
    /// Total bytes a read operation deposits into the destination buffer,
    /// or `None` when the entry sizes overflow `usize`.
    pub fn read_len(&self) -> Option<usize> {
        match self {
            Operation::RandomRead { entries, .. } => entries
                .iter()
                .try_fold(0usize, |total, entry| total.checked_add(entry.size)),
            Operation::SequentialRead { size, .. } => Some(*size),
            _ => Some(0),
        }
    }
}
