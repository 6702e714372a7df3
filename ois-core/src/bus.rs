//! Register transport interface and the operation execution engine.
//!
//! The engine walks an [`OperationList`] front to back and performs each
//! [`Operation`] against a [`Bus`]. Execution stops at the first error and is
//! never rolled back; callers that see [`Error::TransportResetting`] may retry
//! the whole list once via [`apply_with_retry`].

use core::fmt;
use core::time::Duration;

use crate::error::Error;
use crate::operation::{AddressType, DataType, Operation, RegisterWrite, SequentialMode};
use crate::settings::OperationList;

/// Pause between a transient transport reset and the single retry.
pub const TRANSPORT_RESET_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Bus clock selection announced in the device addressing record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrequencyMode {
    Standard,
    Fast,
    FastPlus,
    Custom(u8),
}

impl FrequencyMode {
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Standard,
            1 => Self::Fast,
            2 => Self::FastPlus,
            other => Self::Custom(other),
        }
    }

    pub const fn to_raw(self) -> u8 {
        match self {
            Self::Standard => 0,
            Self::Fast => 1,
            Self::FastPlus => 2,
            Self::Custom(raw) => raw,
        }
    }

    /// Nominal SCL rate in hertz, if the mode is a standard one.
    pub const fn hz(self) -> Option<u32> {
        match self {
            Self::Standard => Some(100_000),
            Self::Fast => Some(400_000),
            Self::FastPlus => Some(1_000_000),
            Self::Custom(_) => None,
        }
    }
}

/// Peripheral the bus should talk to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusTarget {
    pub slave_address: u16,
    pub frequency: FrequencyMode,
}

/// Transport failures.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// The controller is recovering from a reset; retrying shortly may succeed.
    TransportResetting,
    /// The peripheral did not acknowledge its address or data.
    NoAcknowledge,
    /// The transaction did not complete in time.
    Timeout,
    /// Any other controller fault.
    Io,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportResetting => f.write_str("transport resetting"),
            Self::NoAcknowledge => f.write_str("no acknowledge"),
            Self::Timeout => f.write_str("timeout"),
            Self::Io => f.write_str("i/o failure"),
        }
    }
}

/// Register-addressed serial transport.
pub trait Bus {
    /// Writes every entry as one transaction; entry delays and masks are
    /// honoured by the transport.
    fn write_random(
        &mut self,
        address_type: AddressType,
        data_type: DataType,
        entries: &[RegisterWrite],
    ) -> Result<(), BusError>;

    /// Writes a contiguous run of bus-order bytes starting at `base_address`.
    fn write_sequential(
        &mut self,
        address_type: AddressType,
        data_type: DataType,
        base_address: u32,
        data: &[u8],
        mode: SequentialMode,
    ) -> Result<(), BusError>;

    /// Reads `out.len()` bytes starting at `address`.
    fn read(
        &mut self,
        address_type: AddressType,
        data_type: DataType,
        address: u32,
        out: &mut [u8],
    ) -> Result<(), BusError>;

    /// Blocks the calling context for `duration`.
    fn delay(&mut self, duration: Duration);

    /// Selects the peripheral for subsequent transactions.
    fn set_target(&mut self, target: BusTarget) -> Result<(), BusError>;
}

impl<T: Bus + ?Sized> Bus for &mut T {
    fn write_random(
        &mut self,
        address_type: AddressType,
        data_type: DataType,
        entries: &[RegisterWrite],
    ) -> Result<(), BusError> {
        (**self).write_random(address_type, data_type, entries)
    }

    fn write_sequential(
        &mut self,
        address_type: AddressType,
        data_type: DataType,
        base_address: u32,
        data: &[u8],
        mode: SequentialMode,
    ) -> Result<(), BusError> {
        (**self).write_sequential(address_type, data_type, base_address, data, mode)
    }

    fn read(
        &mut self,
        address_type: AddressType,
        data_type: DataType,
        address: u32,
        out: &mut [u8],
    ) -> Result<(), BusError> {
        (**self).read(address_type, data_type, address, out)
    }

    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration);
    }

    fn set_target(&mut self, target: BusTarget) -> Result<(), BusError> {
        (**self).set_target(target)
    }
}

/// Splits a sequential write into frames of at most `max_payload` bytes for
/// transports with a bounded transaction size. Elements are never split.
///
/// Burst frames all target `base_address`; sequential frames start at the
/// register following the elements already written.
pub fn sequential_frames<'a>(
    data_type: DataType,
    base_address: u32,
    data: &'a [u8],
    mode: SequentialMode,
    max_payload: usize,
) -> impl Iterator<Item = (u32, &'a [u8])> + 'a {
    let width = data_type.width();
    let elements_per_frame = (max_payload / width).max(1);
    data.chunks(elements_per_frame * width)
        .enumerate()
        .map(move |(index, frame)| {
            let address = match mode {
                SequentialMode::Burst => base_address,
                SequentialMode::Sequential => {
                    let written = u32::try_from(index * elements_per_frame).unwrap_or(u32::MAX);
                    base_address.wrapping_add(written)
                }
            };
            (address, frame)
        })
}

/// Result of a retried apply.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RetryOutcome<T> {
    pub value: T,
    /// `true` when the first attempt hit a transport reset.
    pub retried: bool,
}

/// Performs one operation. Read results land at the front of `out`; the
/// number of bytes written there is returned.
pub fn execute<B: Bus + ?Sized>(
    operation: &Operation,
    bus: &mut B,
    out: &mut [u8],
) -> Result<usize, Error> {
    match operation {
        Operation::RandomWrite {
            address_type,
            data_type,
            entries,
        } => {
            bus.write_random(*address_type, *data_type, entries)?;
            Ok(0)
        }
        Operation::SequentialWrite {
            address_type,
            data_type,
            base_address,
            data,
            delay_us,
            mode,
        } => {
            bus.write_sequential(*address_type, *data_type, *base_address, data, *mode)?;
            if *delay_us > 0 {
                bus.delay(Duration::from_micros(u64::from(*delay_us)));
            }
            Ok(0)
        }
        Operation::UnconditionalWait { delay, .. } => {
            bus.delay(*delay);
            Ok(0)
        }
        Operation::ConditionalPollWait {
            address,
            expected,
            mask,
            address_type,
            data_type,
            delay,
            max_attempts,
        } => {
            poll(
                bus,
                *address_type,
                *data_type,
                *address,
                *expected,
                *mask,
                *delay,
                *max_attempts,
            )?;
            Ok(0)
        }
        Operation::RandomRead {
            address_type,
            data_type,
            entries,
        } => {
            // An overflowing total can never fit.
            let needed = operation.read_len().unwrap_or(usize::MAX);
            ensure_capacity(needed, out.len())?;
            let mut offset = 0;
            for entry in entries {
                let end = offset + entry.size;
                bus.read(*address_type, *data_type, entry.address, &mut out[offset..end])?;
                offset = end;
            }
            Ok(needed)
        }
        Operation::SequentialRead {
            address_type,
            data_type,
            base_address,
            size,
        } => {
            ensure_capacity(*size, out.len())?;
            bus.read(*address_type, *data_type, *base_address, &mut out[..*size])?;
            Ok(*size)
        }
    }
}

const fn ensure_capacity(needed: usize, available: usize) -> Result<(), Error> {
    if needed > available {
        Err(Error::ReadBufferTooSmall { needed, available })
    } else {
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn poll<B: Bus + ?Sized>(
    bus: &mut B,
    address_type: AddressType,
    data_type: DataType,
    address: u32,
    expected: u32,
    mask: u32,
    delay: Duration,
    max_attempts: u16,
) -> Result<(), Error> {
    let mask = if mask == 0 { data_type.full_mask() } else { mask };
    let attempts = max_attempts.max(1);
    let mut raw = [0u8; 4];
    let raw = &mut raw[..data_type.width()];

    for attempt in 1..=attempts {
        bus.read(address_type, data_type, address, raw)?;
        let value = data_type.value_from_bus(raw);
        if value & mask == expected & mask {
            trace!("poll: {} matched after {} attempts", address, attempt);
            return Ok(());
        }
        if attempt < attempts {
            bus.delay(delay);
        }
    }

    debug!("poll: {} never matched {}", address, expected);
    Err(Error::ValueMismatch)
}

/// Applies every operation of a valid list in order.
pub fn apply<B: Bus + ?Sized>(list: &OperationList, bus: &mut B) -> Result<(), Error> {
    apply_into(list, bus, &mut []).map(|_| ())
}

/// Applies a valid list, concatenating read results into `out`.
pub fn apply_into<B: Bus + ?Sized>(
    list: &OperationList,
    bus: &mut B,
    out: &mut [u8],
) -> Result<usize, Error> {
    list.ensure_valid()?;
    let mut written = 0;
    for operation in list.operations() {
        let tail = out.get_mut(written..).unwrap_or_default();
        written += execute(operation, bus, tail)?;
    }
    Ok(written)
}

/// Applies a list, retrying once after a transient transport reset.
pub fn apply_with_retry<B: Bus + ?Sized>(
    list: &OperationList,
    bus: &mut B,
) -> Result<RetryOutcome<()>, Error> {
    retry_once(bus, |bus| apply(list, bus))
}

/// [`apply_into`] with the same single-retry contract as [`apply_with_retry`].
pub fn apply_into_with_retry<B: Bus + ?Sized>(
    list: &OperationList,
    bus: &mut B,
    out: &mut [u8],
) -> Result<RetryOutcome<usize>, Error> {
    retry_once(bus, |bus| apply_into(list, bus, out))
}

/// Runs `attempt`, and on [`Error::TransportResetting`] waits
/// [`TRANSPORT_RESET_RETRY_DELAY`] and runs it exactly once more.
pub fn retry_once<B, T, F>(bus: &mut B, mut attempt: F) -> Result<RetryOutcome<T>, Error>
where
    B: Bus + ?Sized,
    F: FnMut(&mut B) -> Result<T, Error>,
{
    match attempt(bus) {
        Ok(value) => Ok(RetryOutcome {
            value,
            retried: false,
        }),
        Err(Error::TransportResetting) => {
            warn!("bus: transport resetting, retrying once");
            bus.delay(TRANSPORT_RESET_RETRY_DELAY);
            let value = attempt(bus)?;
            Ok(RetryOutcome {
                value,
                retried: true,
            })
        }
        Err(err) => Err(err),
    }
}
