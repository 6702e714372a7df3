//! Ordered operation lists and the roles they play in the device lifecycle.

use alloc::vec::Vec;
use core::fmt;

use crate::error::Error;
use crate::operation::Operation;

/// Logical settings group a list belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingsRole {
    Init,
    Calibration,
    FirmwareInit,
    ModeControl,
    TimeSync,
    Read,
    VersionCheck,
    UnitInit(u8),
    UnitFinalize(u8),
}

impl SettingsRole {
    /// One-shot lists are cleared once configuration finishes.
    pub const fn is_one_shot(self) -> bool {
        matches!(
            self,
            SettingsRole::Init
                | SettingsRole::Calibration
                | SettingsRole::FirmwareInit
                | SettingsRole::VersionCheck
                | SettingsRole::UnitInit(_)
                | SettingsRole::UnitFinalize(_)
        )
    }
}

impl fmt::Display for SettingsRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsRole::Init => f.write_str("init"),
            SettingsRole::Calibration => f.write_str("calibration"),
            SettingsRole::FirmwareInit => f.write_str("fw-init"),
            SettingsRole::ModeControl => f.write_str("mode-control"),
            SettingsRole::TimeSync => f.write_str("time-sync"),
            SettingsRole::Read => f.write_str("read"),
            SettingsRole::VersionCheck => f.write_str("version-check"),
            SettingsRole::UnitInit(index) => write!(f, "unit{index}-init"),
            SettingsRole::UnitFinalize(index) => write!(f, "unit{index}-finalize"),
        }
    }
}

/// Ordered, append-only collection of operations with a validity flag.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationList {
    role: SettingsRole,
    operations: Vec<Operation>,
    valid: bool,
    request_id: u64,
}

impl OperationList {
    /// Creates an empty, invalid list for `role`.
    pub const fn new(role: SettingsRole) -> Self {
        Self {
            role,
            operations: Vec::new(),
            valid: false,
            request_id: 0,
        }
    }

    /// Builds a valid list from already decoded operations.
    pub fn from_operations(
        role: SettingsRole,
        operations: Vec<Operation>,
        request_id: u64,
    ) -> Self {
        Self {
            role,
            operations,
            valid: true,
            request_id,
        }
    }

    pub const fn role(&self) -> SettingsRole {
        self.role
    }

    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    pub const fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn operations_mut(&mut self) -> &mut [Operation] {
        &mut self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Replaces the contents with a freshly decoded set and marks the list valid.
    pub fn populate(&mut self, operations: Vec<Operation>, request_id: u64) {
        self.operations = operations;
        self.request_id = request_id;
        self.valid = true;
    }

    /// Drops every operation and marks the list unused. Idempotent.
    pub fn clear(&mut self) {
        self.operations = Vec::new();
        self.valid = false;
        self.request_id = 0;
    }

    /// Fails with [`Error::InvalidList`] unless the list was populated.
    pub fn ensure_valid(&self) -> Result<(), Error> {
        if self.valid {
            Ok(())
        } else {
            Err(Error::InvalidList(self.role))
        }
    }
}
