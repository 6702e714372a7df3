//! Shared engine for the OIS actuator driver.
//!
//! Everything here stays portable across the MCU firmware and the host
//! emulator. The transport, power rails, firmware store and timer are injected
//! through the traits in `bus`, `power`, `firmware` and `device`.

#![no_std]

extern crate alloc;

#[macro_use]
mod log;

pub mod builder;
pub mod bus;
pub mod clock;
pub mod decoder;
pub mod device;
pub mod error;
pub mod firmware;
pub mod operation;
pub mod power;
pub mod settings;

pub use bus::{Bus, BusError, BusTarget};
pub use clock::Clock;
pub use device::{Device, DeviceConfig, DeviceState, DeviceStatus, Request, Response};
pub use error::{DecodeError, Error};
pub use firmware::{BlobSource, DownloadOutcome};
pub use operation::{AddressType, DataType, Operation};
pub use power::{PowerSequencer, VariantRegistry};
pub use settings::{OperationList, SettingsRole};
