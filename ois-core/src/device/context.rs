use core::time::Duration;

use heapless::String;

use crate::bus::{BusTarget, FrequencyMode};
use crate::decoder::records::NAME_LEN;
use crate::firmware::FirmwareConfig;
use crate::power::{PowerSettings, VariantId};
use crate::settings::{OperationList, SettingsRole};

use super::DeviceState;

/// Longest device name carried by the addressing record.
pub const DEVICE_NAME_LEN: usize = NAME_LEN;

/// Idle time before a configured, powered device is powered down.
pub const DEFAULT_POWER_DOWN_WINDOW: Duration = Duration::from_secs(2);

pub type DeviceName = String<DEVICE_NAME_LEN>;

/// Handle returned by a successful acquire.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandleId(pub u32);

/// Register addresses used for legacy firmware and peripheral control.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OpcodeTable {
    pub prog: u32,
    pub coeff: u32,
    pub peripheral: u32,
    pub memory: u32,
}

/// Addressing and feature flags from the device-info record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceInfo {
    pub target: BusTarget,
    pub name: DeviceName,
    pub calibration_enabled: bool,
    pub firmware_enabled: bool,
    pub opcodes: OpcodeTable,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            target: BusTarget {
                slave_address: 0,
                frequency: FrequencyMode::Standard,
            },
            name: String::new(),
            calibration_enabled: false,
            firmware_enabled: false,
            opcodes: OpcodeTable::default(),
        }
    }
}

/// Construction-time settings for a [`Device`](super::Device).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeviceConfig {
    /// Board variant whose default power sequences apply when none are submitted.
    pub variant: VariantId,
    /// Idle period after which the runtime powers a configured device down.
    pub power_down_window: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            variant: VariantId(0),
            power_down_window: DEFAULT_POWER_DOWN_WINDOW,
        }
    }
}

/// Operation lists owned by one device.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SettingsLists {
    pub init: OperationList,
    pub calibration: OperationList,
    pub fw_init: OperationList,
    pub mode_control: OperationList,
    pub time_sync: OperationList,
    pub read: OperationList,
}

impl Default for SettingsLists {
    fn default() -> Self {
        Self {
            init: OperationList::new(SettingsRole::Init),
            calibration: OperationList::new(SettingsRole::Calibration),
            fw_init: OperationList::new(SettingsRole::FirmwareInit),
            mode_control: OperationList::new(SettingsRole::ModeControl),
            time_sync: OperationList::new(SettingsRole::TimeSync),
            read: OperationList::new(SettingsRole::Read),
        }
    }
}

impl SettingsLists {
    /// Clears the lists consumed by a configuration pass.
    pub fn clear_one_shot(&mut self) {
        self.init.clear();
        self.calibration.clear();
        self.fw_init.clear();
    }

    pub fn clear_all(&mut self) {
        self.clear_one_shot();
        self.mode_control.clear();
        self.time_sync.clear();
        self.read.clear();
    }
}

/// Running totals reported by status queries.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Counters {
    pub configure_attempts: u32,
    pub transport_retries: u32,
    pub firmware_downloads: u32,
}

/// Mutable per-device state. Only the owning device touches it.
#[derive(Clone, Debug, Default)]
pub struct DeviceContext {
    pub state: DeviceState,
    pub handle: Option<HandleId>,
    pub info: DeviceInfo,
    pub powered: bool,
    pub tearing_down: bool,
    pub power: PowerSettings,
    pub lists: SettingsLists,
    pub firmware: FirmwareConfig,
    pub counters: Counters,
}

impl DeviceContext {
    /// Clears every one-shot list, including the firmware brackets.
    pub fn clear_one_shot(&mut self) {
        self.lists.clear_one_shot();
        self.firmware.clear_one_shot();
    }

    /// Returns the context to its post-construction state, keeping counters.
    pub fn reset(&mut self) {
        let counters = self.counters;
        *self = Self {
            counters,
            ..Self::default()
        };
    }
}

/// Snapshot returned by status queries.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceStatus {
    pub state: DeviceState,
    pub handle: Option<HandleId>,
    pub slave_address: u16,
    pub name: DeviceName,
    pub powered: bool,
    pub firmware_units: usize,
    pub counters: Counters,
}
