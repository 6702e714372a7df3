//! Error taxonomy shared by the decoder, execution engine, firmware
//! orchestrator and lifecycle state machine.

use core::fmt;

use crate::bus::BusError;
use crate::device::{DeviceState, RequestKind};
use crate::power::PowerError;
use crate::settings::SettingsRole;

/// Reasons a command buffer was rejected by the decoder.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// A record needs more bytes than remain in the buffer.
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    /// The command-type tag is not one the decoder understands.
    UnknownCommand { offset: usize, cmd_type: u8 },
    /// The auxiliary op-code is not valid for its command type.
    UnknownOpCode {
        offset: usize,
        cmd_type: u8,
        op_code: u8,
    },
    /// Address or data width tag outside of 1..=4.
    InvalidWidth { offset: usize, value: u8 },
    /// Firmware write mode tag outside of the known set.
    InvalidWriteMode { offset: usize, value: u8 },
    /// Firmware endianness tag outside of the known set.
    InvalidEndianness { value: u8 },
    /// A non-operation record appeared inside a settings buffer.
    UnexpectedRecord { offset: usize, cmd_type: u8 },
    /// Declared length disagrees with the bytes actually provided or consumed.
    LengthMismatch { declared: usize, actual: usize },
    /// Firmware metadata announced more units than the table can hold.
    TooManyUnits { count: u8 },
    /// Power record announced more settings than the table can hold.
    TooManyPowerSettings { count: u16 },
    /// `length_per_write` is zero or not a multiple of the element width.
    InvalidChunkLength { length_per_write: u16, width: u8 },
    /// Device or firmware name is not valid UTF-8.
    InvalidName,
    /// Buffer contained no records where one was required.
    EmptyBuffer,
    /// Every generic settings list was already claimed by earlier buffers.
    NoSettingsSlot,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated {
                offset,
                needed,
                remaining,
            } => write!(
                f,
                "truncated record at {offset}: needs {needed} bytes, {remaining} remain"
            ),
            DecodeError::UnknownCommand { offset, cmd_type } => {
                write!(f, "unknown command type {cmd_type:#04x} at {offset}")
            }
            DecodeError::UnknownOpCode {
                offset,
                cmd_type,
                op_code,
            } => write!(
                f,
                "op-code {op_code:#04x} invalid for command {cmd_type:#04x} at {offset}"
            ),
            DecodeError::InvalidWidth { offset, value } => {
                write!(f, "invalid width tag {value} at {offset}")
            }
            DecodeError::InvalidWriteMode { offset, value } => {
                write!(f, "invalid write mode {value} at {offset}")
            }
            DecodeError::InvalidEndianness { value } => {
                write!(f, "invalid endianness tag {value}")
            }
            DecodeError::UnexpectedRecord { offset, cmd_type } => {
                write!(f, "record {cmd_type:#04x} not allowed in settings at {offset}")
            }
            DecodeError::LengthMismatch { declared, actual } => {
                write!(f, "declared length {declared} but found {actual}")
            }
            DecodeError::TooManyUnits { count } => write!(f, "too many firmware units ({count})"),
            DecodeError::TooManyPowerSettings { count } => {
                write!(f, "too many power settings ({count})")
            }
            DecodeError::InvalidChunkLength {
                length_per_write,
                width,
            } => write!(
                f,
                "length per write {length_per_write} is not a multiple of width {width}"
            ),
            DecodeError::InvalidName => f.write_str("name is not valid UTF-8"),
            DecodeError::EmptyBuffer => f.write_str("empty command buffer"),
            DecodeError::NoSettingsSlot => f.write_str("no unclaimed settings list"),
        }
    }
}

/// Errors surfaced by engine, orchestrator, and lifecycle operations.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Command buffer failed to decode.
    Malformed(DecodeError),
    /// Transport is mid-reset; the caller may retry the same list once.
    TransportResetting,
    /// A conditional wait exhausted its attempts without matching.
    ValueMismatch,
    /// Firmware blob could not be resolved.
    BlobNotFound,
    /// Firmware blob is shorter than the configured offset and size.
    BlobTooShort,
    /// Request is not legal in the current lifecycle state.
    IllegalState {
        state: DeviceState,
        request: RequestKind,
    },
    /// Allocation failed while building a list or staging a chunk.
    ResourceExhausted,
    /// The list was never populated for this configuration cycle.
    InvalidList(SettingsRole),
    /// A read destination is smaller than the requested size.
    ReadBufferTooSmall { needed: usize, available: usize },
    /// Time-sync settings lack an 8-byte sequential payload.
    InvalidTimePayload,
    /// Non-transient transport failure.
    Bus(BusError),
    /// Power rail sequencing failed.
    Power(PowerError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Malformed(err) => write!(f, "malformed buffer: {err}"),
            Error::TransportResetting => f.write_str("transport resetting"),
            Error::ValueMismatch => f.write_str("poll value mismatch"),
            Error::BlobNotFound => f.write_str("firmware blob not found"),
            Error::BlobTooShort => f.write_str("firmware blob too short"),
            Error::IllegalState { state, request } => {
                write!(f, "{request} not allowed in state {state}")
            }
            Error::ResourceExhausted => f.write_str("resource exhausted"),
            Error::InvalidList(role) => write!(f, "{role} settings are not valid"),
            Error::ReadBufferTooSmall { needed, available } => {
                write!(f, "read needs {needed} bytes, destination holds {available}")
            }
            Error::InvalidTimePayload => f.write_str("time-sync payload must be 8 bytes"),
            Error::Bus(err) => write!(f, "bus error: {err}"),
            Error::Power(err) => write!(f, "power error: {err}"),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Error::Malformed(value)
    }
}

impl From<BusError> for Error {
    fn from(value: BusError) -> Self {
        match value {
            BusError::TransportResetting => Error::TransportResetting,
            other => Error::Bus(other),
        }
    }
}

impl From<PowerError> for Error {
    fn from(value: PowerError) -> Self {
        Error::Power(value)
    }
}
