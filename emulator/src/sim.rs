//! Simulated actuator: a register file behind a [`Bus`], plus the host-side
//! power, clock and firmware store that go with it.

use std::cell::Cell;
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use ois_core::bus::{Bus, BusError, BusTarget};
use ois_core::clock::Clock;
use ois_core::firmware::BlobSource;
use ois_core::operation::{AddressType, DataType, RegisterWrite, SequentialMode};
use ois_core::power::{PowerError, PowerSequencer, PowerSetting};

/// Virtual time shared by the bus, the power rails and the device clock.
///
/// Delays advance it instead of sleeping, so transcripts are reproducible.
#[derive(Clone, Debug, Default)]
pub struct VirtualClock {
    elapsed: Rc<Cell<Duration>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get().saturating_add(duration));
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }
}

impl Clock for VirtualClock {
    fn now_ticks(&self) -> u64 {
        u64::try_from(self.elapsed.get().as_micros()).unwrap_or(u64::MAX)
    }
}

/// One transaction seen by the simulated bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusEvent {
    Write { address: u32, value: u32 },
    Burst { address: u32, len: usize },
    Read { address: u32, len: usize },
    Target(BusTarget),
    Reset,
}

/// Register file addressed by register index; every register holds one
/// `data_type`-wide value.
#[derive(Debug)]
pub struct SimulatedBus {
    registers: BTreeMap<u32, u32>,
    fifos: BTreeMap<u32, Vec<u8>>,
    pending_resets: usize,
    target: Option<BusTarget>,
    clock: VirtualClock,
    pub log: Vec<BusEvent>,
    /// Values returned by reads ahead of the register file.
    pub scripted_reads: VecDeque<u32>,
}

impl SimulatedBus {
    pub fn new(clock: VirtualClock) -> Self {
        Self {
            registers: BTreeMap::new(),
            fifos: BTreeMap::new(),
            pending_resets: 0,
            target: None,
            clock,
            log: Vec::new(),
            scripted_reads: VecDeque::new(),
        }
    }

    /// Fails the next `count` accesses with [`BusError::TransportResetting`].
    pub fn inject_resets(&mut self, count: usize) {
        self.pending_resets += count;
    }

    pub fn register(&self, address: u32) -> u32 {
        self.registers.get(&address).copied().unwrap_or(0)
    }

    pub fn set_register(&mut self, address: u32, value: u32) {
        self.registers.insert(address, value);
    }

    /// Bytes streamed into the burst port at `address`.
    pub fn fifo(&self, address: u32) -> &[u8] {
        self.fifos.get(&address).map_or(&[], Vec::as_slice)
    }

    pub fn target(&self) -> Option<BusTarget> {
        self.target
    }

    fn access(&mut self) -> Result<(), BusError> {
        if self.pending_resets > 0 {
            self.pending_resets -= 1;
            self.log.push(BusEvent::Reset);
            return Err(BusError::TransportResetting);
        }
        if self.target.is_none() {
            return Err(BusError::NoAcknowledge);
        }
        Ok(())
    }
}

fn value_from_bytes(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte))
}

impl Bus for SimulatedBus {
    fn write_random(
        &mut self,
        _address_type: AddressType,
        data_type: DataType,
        entries: &[RegisterWrite],
    ) -> Result<(), BusError> {
        self.access()?;
        let full = data_type.full_mask();
        for entry in entries {
            let mask = if entry.mask == 0 { full } else { entry.mask & full };
            let current = self.register(entry.address);
            let value = (current & !mask) | (entry.data & mask);
            self.registers.insert(entry.address, value);
            self.log.push(BusEvent::Write {
                address: entry.address,
                value,
            });
            if entry.delay_us > 0 {
                self.clock
                    .advance(Duration::from_micros(u64::from(entry.delay_us)));
            }
        }
        Ok(())
    }

    fn write_sequential(
        &mut self,
        _address_type: AddressType,
        data_type: DataType,
        base_address: u32,
        data: &[u8],
        mode: SequentialMode,
    ) -> Result<(), BusError> {
        self.access()?;
        match mode {
            SequentialMode::Burst => {
                self.fifos
                    .entry(base_address)
                    .or_default()
                    .extend_from_slice(data);
                self.log.push(BusEvent::Burst {
                    address: base_address,
                    len: data.len(),
                });
            }
            SequentialMode::Sequential => {
                let mut address = base_address;
                for element in data.chunks(data_type.width()) {
                    let value = value_from_bytes(element);
                    self.registers.insert(address, value);
                    self.log.push(BusEvent::Write { address, value });
                    address = address.wrapping_add(1);
                }
            }
        }
        Ok(())
    }

    fn read(
        &mut self,
        _address_type: AddressType,
        data_type: DataType,
        address: u32,
        out: &mut [u8],
    ) -> Result<(), BusError> {
        self.access()?;
        let width = data_type.width();
        let mut register = address;
        for chunk in out.chunks_mut(width) {
            let value = self
                .scripted_reads
                .pop_front()
                .unwrap_or_else(|| self.register(register));
            let bytes = value.to_be_bytes();
            let len = chunk.len();
            chunk.copy_from_slice(&bytes[4 - width..4 - width + len]);
            register = register.wrapping_add(1);
        }
        self.log.push(BusEvent::Read {
            address,
            len: out.len(),
        });
        Ok(())
    }

    fn delay(&mut self, duration: Duration) {
        self.clock.advance(duration);
    }

    fn set_target(&mut self, target: BusTarget) -> Result<(), BusError> {
        self.target = Some(target);
        self.log.push(BusEvent::Target(target));
        Ok(())
    }
}

/// Power rails that only record what they were told.
#[derive(Debug)]
pub struct HostPower {
    clock: VirtualClock,
    rails: BTreeMap<u8, u32>,
    pub events: Vec<String>,
}

impl HostPower {
    pub fn new(clock: VirtualClock) -> Self {
        Self {
            clock,
            rails: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    /// Last value driven onto the rail with raw id `rail`.
    pub fn rail(&self, rail: u8) -> Option<u32> {
        self.rails.get(&rail).copied()
    }

    fn run(&mut self, label: &str, steps: &[PowerSetting]) {
        for step in steps {
            self.rails.insert(step.rail.to_raw(), step.config);
            self.clock
                .advance(Duration::from_millis(u64::from(step.delay_ms)));
        }
        self.events.push(format!("{label} ({} steps)", steps.len()));
    }
}

impl PowerSequencer for HostPower {
    fn power_up(&mut self, steps: &[PowerSetting]) -> Result<(), PowerError> {
        self.run("power-up", steps);
        Ok(())
    }

    fn power_down(&mut self, steps: &[PowerSetting]) -> Result<(), PowerError> {
        self.run("power-down", steps);
        Ok(())
    }
}

/// Firmware images stored as files in one directory.
#[derive(Clone, Debug)]
pub struct DirectoryBlobs {
    root: PathBuf,
}

impl DirectoryBlobs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl BlobSource for DirectoryBlobs {
    type Blob = Vec<u8>;

    fn fetch(&mut self, name: &str) -> Option<Self::Blob> {
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return None;
        }
        fs::read(self.root.join(name)).ok()
    }
}
