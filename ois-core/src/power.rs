//! Power-rail sequencing interface and per-variant default tables.

use core::fmt;

use heapless::Vec;

/// Maximum number of power-up (or power-down) steps per device.
pub const MAX_POWER_SETTINGS: usize = 16;

/// Maximum number of peripheral variants that can be registered.
pub const MAX_VARIANTS: usize = 8;

/// Rail or control line touched by a power step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerRail {
    Mclk,
    Vana,
    Vdig,
    Vio,
    Vaf,
    Reset,
    Standby,
    /// Board-specific line identified by its raw tag.
    Custom(u8),
}

impl PowerRail {
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Mclk,
            1 => Self::Vana,
            2 => Self::Vdig,
            3 => Self::Vio,
            4 => Self::Vaf,
            5 => Self::Reset,
            6 => Self::Standby,
            other => Self::Custom(other),
        }
    }

    pub const fn to_raw(self) -> u8 {
        match self {
            Self::Mclk => 0,
            Self::Vana => 1,
            Self::Vdig => 2,
            Self::Vio => 3,
            Self::Vaf => 4,
            Self::Reset => 5,
            Self::Standby => 6,
            Self::Custom(raw) => raw,
        }
    }
}

impl fmt::Display for PowerRail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mclk => f.write_str("mclk"),
            Self::Vana => f.write_str("vana"),
            Self::Vdig => f.write_str("vdig"),
            Self::Vio => f.write_str("vio"),
            Self::Vaf => f.write_str("vaf"),
            Self::Reset => f.write_str("reset"),
            Self::Standby => f.write_str("standby"),
            Self::Custom(raw) => write!(f, "custom{raw}"),
        }
    }
}

/// One step of a power sequence.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PowerSetting {
    pub rail: PowerRail,
    /// Rail-specific value (voltage in microvolts, GPIO level, clock rate).
    pub config: u32,
    /// Settle time after the step, in milliseconds.
    pub delay_ms: u16,
}

impl PowerSetting {
    pub const fn new(rail: PowerRail, config: u32, delay_ms: u16) -> Self {
        Self {
            rail,
            config,
            delay_ms,
        }
    }
}

pub type PowerSteps = Vec<PowerSetting, MAX_POWER_SETTINGS>;

/// Ordered power-up and power-down sequences for one device.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PowerSettings {
    pub up: PowerSteps,
    pub down: PowerSteps,
}

impl PowerSettings {
    pub const fn new() -> Self {
        Self {
            up: Vec::new(),
            down: Vec::new(),
        }
    }

    /// Returns `true` when neither sequence has been provided.
    pub fn is_empty(&self) -> bool {
        self.up.is_empty() && self.down.is_empty()
    }
}

/// Failures reported by a [`PowerSequencer`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerError {
    /// The sequencer does not drive this rail.
    UnsupportedRail(PowerRail),
    /// The regulator or GPIO rejected the request.
    RailFault(PowerRail),
}

impl fmt::Display for PowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedRail(rail) => write!(f, "rail {rail} is not supported"),
            Self::RailFault(rail) => write!(f, "rail {rail} faulted"),
        }
    }
}

/// Drives the actuator's regulators, clocks, and control GPIOs.
pub trait PowerSequencer {
    /// Executes the power-up steps in order.
    fn power_up(&mut self, steps: &[PowerSetting]) -> Result<(), PowerError>;

    /// Executes the power-down steps in order.
    fn power_down(&mut self, steps: &[PowerSetting]) -> Result<(), PowerError>;
}

/// Sequencer that accepts every request without touching hardware.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopPowerSequencer;

impl PowerSequencer for NoopPowerSequencer {
    fn power_up(&mut self, _steps: &[PowerSetting]) -> Result<(), PowerError> {
        Ok(())
    }

    fn power_down(&mut self, _steps: &[PowerSetting]) -> Result<(), PowerError> {
        Ok(())
    }
}

/// Builds a variant's default power sequences.
pub type PowerDefaultsBuilder = fn() -> PowerSettings;

/// Identifier of an actuator board variant.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VariantId(pub u8);

/// Errors raised when registering variant defaults.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VariantRegistryError {
    /// The variant already has a default builder.
    Duplicate(VariantId),
    /// The registry is full.
    Capacity,
}

impl fmt::Display for VariantRegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate(id) => write!(f, "variant {} already registered", id.0),
            Self::Capacity => f.write_str("variant registry is full"),
        }
    }
}

/// Maps peripheral variants to their default power sequences.
///
/// Variants are selected once, when a device is constructed; the registry is
/// never consulted while dispatching requests.
#[derive(Clone, Debug, Default)]
pub struct VariantRegistry {
    entries: Vec<(VariantId, PowerDefaultsBuilder), MAX_VARIANTS>,
}

impl VariantRegistry {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers the default builder for `id`.
    pub fn register(
        &mut self,
        id: VariantId,
        builder: PowerDefaultsBuilder,
    ) -> Result<(), VariantRegistryError> {
        if self.get(id).is_some() {
            return Err(VariantRegistryError::Duplicate(id));
        }
        self.entries
            .push((id, builder))
            .map_err(|_| VariantRegistryError::Capacity)
    }

    pub fn get(&self, id: VariantId) -> Option<PowerDefaultsBuilder> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == id)
            .map(|(_, builder)| *builder)
    }

    /// Builds the defaults for `id`, or an empty table for unknown variants.
    pub fn defaults_for(&self, id: VariantId) -> PowerSettings {
        self.get(id).map_or_else(PowerSettings::new, |builder| builder())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Variant id of the reference actuator module.
pub const REFERENCE_VARIANT: VariantId = VariantId(1);

/// Default rails of the reference module. Supplies come up I/O first and
/// reset is released last; power-down drives the same rails low in reverse.
pub fn reference_power() -> PowerSettings {
    PowerSettings {
        up: PowerSteps::from_array([
            PowerSetting::new(PowerRail::Vio, 1, 1),
            PowerSetting::new(PowerRail::Vdig, 1, 1),
            PowerSetting::new(PowerRail::Vana, 1, 2),
            PowerSetting::new(PowerRail::Reset, 1, 5),
        ]),
        down: PowerSteps::from_array([
            PowerSetting::new(PowerRail::Reset, 0, 0),
            PowerSetting::new(PowerRail::Vana, 0, 0),
            PowerSetting::new(PowerRail::Vdig, 0, 0),
            PowerSetting::new(PowerRail::Vio, 0, 0),
        ]),
    }
}

/// Registry holding every variant with built-in defaults.
pub fn builtin_variants() -> Result<VariantRegistry, VariantRegistryError> {
    let mut registry = VariantRegistry::new();
    registry.register(REFERENCE_VARIANT, reference_power)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_defaults() -> PowerSettings {
        let mut settings = PowerSettings::new();
        settings
            .up
            .push(PowerSetting::new(PowerRail::Vio, 1_800_000, 1))
            .unwrap();
        settings
            .up
            .push(PowerSetting::new(PowerRail::Reset, 1, 5))
            .unwrap();
        settings
            .down
            .push(PowerSetting::new(PowerRail::Reset, 0, 0))
            .unwrap();
        settings
    }

    #[test]
    fn registry_builds_registered_defaults() {
        let mut registry = VariantRegistry::new();
        registry.register(VariantId(1), reference_defaults).unwrap();

        let defaults = registry.defaults_for(VariantId(1));
        assert_eq!(defaults.up.len(), 2);
        assert_eq!(defaults.up[0].rail, PowerRail::Vio);
        assert!(registry.defaults_for(VariantId(9)).is_empty());
    }

    #[test]
    fn registry_rejects_duplicates() {
        let mut registry = VariantRegistry::new();
        registry.register(VariantId(3), reference_defaults).unwrap();
        assert_eq!(
            registry.register(VariantId(3), reference_defaults),
            Err(VariantRegistryError::Duplicate(VariantId(3)))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reference_rails_come_down_in_reverse() {
        let settings = reference_power();
        let up: alloc::vec::Vec<PowerRail> = settings.up.iter().map(|s| s.rail).collect();
        let down: alloc::vec::Vec<PowerRail> = settings.down.iter().map(|s| s.rail).collect();
        assert_eq!(
            up,
            [PowerRail::Vio, PowerRail::Vdig, PowerRail::Vana, PowerRail::Reset]
        );
        assert_eq!(
            down,
            [PowerRail::Reset, PowerRail::Vana, PowerRail::Vdig, PowerRail::Vio]
        );
        assert!(settings.down.iter().all(|s| s.config == 0));
    }

    #[test]
    fn builtin_registry_resolves_reference_variant() {
        let registry = builtin_variants().unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.defaults_for(REFERENCE_VARIANT), reference_power());
    }

    #[test]
    fn rail_tags_keep_custom_lines() {
        assert_eq!(PowerRail::from_raw(2), PowerRail::Vdig);
        assert_eq!(PowerRail::from_raw(0x40), PowerRail::Custom(0x40));
        assert_eq!(PowerRail::Custom(0x40).to_raw(), 0x40);
    }
}
