//! Firmware download orchestration.
//!
//! A device either describes its firmware as up to [`MAX_FIRMWARE_UNITS`]
//! units (each with its own blob, chunking, and init/finalize brackets) or
//! relies on the legacy pair of `<name>.prog` / `<name>.coeff` blobs. An
//! optional version-check list gates the whole download.

pub mod chunk;

use alloc::format;
use alloc::vec::Vec;
use core::time::Duration;

use heapless::String;

use crate::bus::{Bus, apply_with_retry, execute};
use crate::decoder::records::NAME_LEN;
use crate::device::OpcodeTable;
use crate::error::Error;
use crate::operation::{AddressType, DataType, Operation, SequentialMode};
use crate::settings::{OperationList, SettingsRole};

pub use chunk::{build_chunk, to_bus_order};

/// Upper bound on firmware units per device.
pub const MAX_FIRMWARE_UNITS: usize = 4;

/// `param_mask` bit announcing inline version-check settings.
pub const PARAM_VERSION_CHECK: u32 = 0x1;

/// Byte order of the firmware images as stored.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Little),
            1 => Some(Self::Big),
            _ => None,
        }
    }

    pub const fn to_raw(self) -> u8 {
        match self {
            Self::Little => 0,
            Self::Big => 1,
        }
    }
}

/// How a unit's chunks are clocked onto the bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteMode {
    /// One register write per element at consecutive addresses.
    Random,
    /// Every chunk is written to the same FIFO-style address.
    Burst,
    /// Each chunk starts where the previous one ended.
    Sequential,
}

impl WriteMode {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Random),
            1 => Some(Self::Burst),
            2 => Some(Self::Sequential),
            _ => None,
        }
    }

    pub const fn to_raw(self) -> u8 {
        match self {
            Self::Random => 0,
            Self::Burst => 1,
            Self::Sequential => 2,
        }
    }
}

/// Static description of one firmware unit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FirmwareDescriptor {
    pub name: String<NAME_LEN>,
    pub address: u32,
    /// Payload size in bytes; zero streams the rest of the blob.
    pub size: u32,
    /// Chunk size in bytes, a non-zero multiple of the data width.
    pub length_per_write: u16,
    pub address_type: AddressType,
    pub data_type: DataType,
    pub write_mode: WriteMode,
    /// Pause after every chunk.
    pub delay_us: u32,
    pub start_offset: u32,
}

/// A firmware unit together with its bracketing settings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FirmwareUnit {
    pub descriptor: FirmwareDescriptor,
    pub init: OperationList,
    pub finalize: OperationList,
}

/// Firmware metadata submitted during configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FirmwareConfig {
    pub endianness: Endianness,
    pub param_mask: u32,
    pub version_check: OperationList,
    pub units: heapless::Vec<FirmwareUnit, MAX_FIRMWARE_UNITS>,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self::new(Endianness::Little, 0)
    }
}

impl FirmwareConfig {
    pub const fn new(endianness: Endianness, param_mask: u32) -> Self {
        Self {
            endianness,
            param_mask,
            version_check: OperationList::new(SettingsRole::VersionCheck),
            units: heapless::Vec::new(),
        }
    }

    /// Returns `true` when per-unit metadata was supplied.
    pub fn is_multi_unit(&self) -> bool {
        !self.units.is_empty()
    }

    /// Clears the version-check list and every unit's brackets.
    pub fn clear_one_shot(&mut self) {
        self.version_check.clear();
        for unit in &mut self.units {
            unit.init.clear();
            unit.finalize.clear();
        }
    }

    /// Forgets all units and resets the endianness.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Resolves firmware images by name.
pub trait BlobSource {
    type Blob: AsRef<[u8]>;

    /// Returns the image named `name`, or `None` when it does not exist.
    fn fetch(&mut self, name: &str) -> Option<Self::Blob>;
}

impl<T: BlobSource + ?Sized> BlobSource for &mut T {
    type Blob = T::Blob;

    fn fetch(&mut self, name: &str) -> Option<Self::Blob> {
        (**self).fetch(name)
    }
}

/// Blob source that never finds anything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoBlobs;

impl BlobSource for NoBlobs {
    type Blob = &'static [u8];

    fn fetch(&mut self, _name: &str) -> Option<Self::Blob> {
        None
    }
}

/// What a download pass did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DownloadOutcome {
    /// The version check matched; nothing was written.
    UpToDate,
    /// Firmware was streamed to the device.
    Completed { units: usize, bytes: usize },
}

/// Legacy firmware destination, taken from the device addressing record.
#[derive(Copy, Clone, Debug)]
pub struct LegacyTarget<'a> {
    pub name: &'a str,
    pub opcodes: &'a OpcodeTable,
}

/// Runs the version gate and then the multi-unit or legacy download.
pub fn download<B, S>(
    config: &mut FirmwareConfig,
    legacy: LegacyTarget<'_>,
    bus: &mut B,
    blobs: &mut S,
) -> Result<DownloadOutcome, Error>
where
    B: Bus + ?Sized,
    S: BlobSource + ?Sized,
{
    if version_matches(&mut config.version_check, bus)? {
        info!("firmware: version check matched, skipping download");
        return Ok(DownloadOutcome::UpToDate);
    }

    if config.is_multi_unit() {
        download_units(config, bus, blobs)
    } else {
        download_legacy(legacy, bus, blobs)
    }
}

/// Applies the version-check list if present. The list is always cleared.
fn version_matches<B: Bus + ?Sized>(
    version_check: &mut OperationList,
    bus: &mut B,
) -> Result<bool, Error> {
    if !version_check.is_valid() {
        return Ok(false);
    }

    let result = apply_with_retry(version_check, bus);
    version_check.clear();
    match result {
        Ok(_) => Ok(true),
        Err(Error::ValueMismatch) => {
            debug!("firmware: version check mismatch, downloading");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

fn download_units<B, S>(
    config: &FirmwareConfig,
    bus: &mut B,
    blobs: &mut S,
) -> Result<DownloadOutcome, Error>
where
    B: Bus + ?Sized,
    S: BlobSource + ?Sized,
{
    let mut bytes = 0;
    for unit in &config.units {
        bytes += download_unit(unit, config.endianness, bus, blobs)?;
    }
    info!(
        "firmware: {} units, {} bytes written",
        config.units.len(),
        bytes
    );
    Ok(DownloadOutcome::Completed {
        units: config.units.len(),
        bytes,
    })
}

fn download_unit<B, S>(
    unit: &FirmwareUnit,
    endianness: Endianness,
    bus: &mut B,
    blobs: &mut S,
) -> Result<usize, Error>
where
    B: Bus + ?Sized,
    S: BlobSource + ?Sized,
{
    let descriptor = &unit.descriptor;
    let blob = blobs
        .fetch(descriptor.name.as_str())
        .ok_or(Error::BlobNotFound)?;
    let payload = payload(blob.as_ref(), descriptor)?;

    if unit.init.is_valid() {
        apply_with_retry(&unit.init, bus)?;
    }

    let width = descriptor.data_type.width();
    let delay = Duration::from_micros(u64::from(descriptor.delay_us));
    let mut elements_written: u32 = 0;
    for chunk in payload.chunks(usize::from(descriptor.length_per_write)) {
        let operation = build_chunk(descriptor, endianness, chunk, elements_written)?;
        execute(&operation, bus, &mut [])?;
        if !delay.is_zero() {
            bus.delay(delay);
        }
        let elements = u32::try_from(chunk.len().div_ceil(width)).unwrap_or(u32::MAX);
        elements_written = elements_written.wrapping_add(elements);
    }

    if unit.finalize.is_valid() {
        apply_with_retry(&unit.finalize, bus)?;
    }

    trace!(
        "firmware: unit {} wrote {} bytes",
        descriptor.name.as_str(),
        payload.len()
    );
    Ok(payload.len())
}

/// Selects the bytes of `blob` a unit streams.
fn payload<'a>(blob: &'a [u8], descriptor: &FirmwareDescriptor) -> Result<&'a [u8], Error> {
    let start = descriptor.start_offset as usize;
    let rest = blob.get(start..).ok_or(Error::BlobTooShort)?;
    if descriptor.size == 0 {
        return Ok(rest);
    }
    rest.get(..descriptor.size as usize)
        .ok_or(Error::BlobTooShort)
}

fn download_legacy<B, S>(
    legacy: LegacyTarget<'_>,
    bus: &mut B,
    blobs: &mut S,
) -> Result<DownloadOutcome, Error>
where
    B: Bus + ?Sized,
    S: BlobSource + ?Sized,
{
    let mut bytes = 0;
    for (suffix, register) in [("prog", legacy.opcodes.prog), ("coeff", legacy.opcodes.coeff)] {
        let name = format!("{}.{suffix}", legacy.name);
        let blob = blobs.fetch(&name).ok_or(Error::BlobNotFound)?;
        let image = blob.as_ref();

        let mut data: Vec<u8> = Vec::new();
        data.try_reserve_exact(image.len())
            .map_err(|_| Error::ResourceExhausted)?;
        data.extend_from_slice(image);

        let operation = Operation::SequentialWrite {
            address_type: AddressType::Word,
            data_type: DataType::Byte,
            base_address: register,
            data,
            delay_us: 0,
            mode: SequentialMode::Burst,
        };
        execute(&operation, bus, &mut [])?;
        bytes += image.len();
    }

    info!("firmware: legacy download wrote {} bytes", bytes);
    Ok(DownloadOutcome::Completed { units: 0, bytes })
}
