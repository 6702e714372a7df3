#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use ois_core::bus::{Bus, BusError, BusTarget};
use ois_core::firmware::BlobSource;
use ois_core::operation::{AddressType, DataType, RegisterWrite, SequentialMode};
use ois_core::power::{PowerError, PowerSequencer, PowerSetting};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transaction {
    RandomWrite(Vec<RegisterWrite>),
    SequentialWrite {
        base_address: u32,
        data: Vec<u8>,
        mode: SequentialMode,
    },
    Read {
        address: u32,
        len: usize,
    },
    Delay(Duration),
    SetTarget(BusTarget),
}

/// Byte-addressed register file that records every call.
#[derive(Debug, Default)]
pub struct RecordingBus {
    pub log: Vec<Transaction>,
    pub memory: BTreeMap<u32, u8>,
    /// Consumed by reads before falling back to `memory`.
    pub scripted_reads: VecDeque<Vec<u8>>,
    /// Consumed by every bus access; empty means success.
    pub faults: VecDeque<Result<(), BusError>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&mut self, faults: impl IntoIterator<Item = Result<(), BusError>>) {
        self.faults.extend(faults);
    }

    pub fn writes(&self) -> Vec<&Transaction> {
        self.log
            .iter()
            .filter(|t| {
                matches!(
                    t,
                    Transaction::RandomWrite(_) | Transaction::SequentialWrite { .. }
                )
            })
            .collect()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.log
            .iter()
            .filter_map(|t| match t {
                Transaction::Delay(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    pub fn bus_accesses(&self) -> usize {
        self.log
            .iter()
            .filter(|t| !matches!(t, Transaction::Delay(_) | Transaction::SetTarget(_)))
            .count()
    }

    fn access(&mut self) -> Result<(), BusError> {
        self.faults.pop_front().unwrap_or(Ok(()))
    }
}

impl Bus for RecordingBus {
    fn write_random(
        &mut self,
        _address_type: AddressType,
        data_type: DataType,
        entries: &[RegisterWrite],
    ) -> Result<(), BusError> {
        self.access()?;
        for entry in entries {
            let bytes = entry.data.to_be_bytes();
            let width = data_type.width();
            for (offset, byte) in bytes[4 - width..].iter().enumerate() {
                self.memory.insert(entry.address + offset as u32, *byte);
            }
        }
        self.log.push(Transaction::RandomWrite(entries.to_vec()));
        Ok(())
    }

    fn write_sequential(
        &mut self,
        _address_type: AddressType,
        _data_type: DataType,
        base_address: u32,
        data: &[u8],
        mode: SequentialMode,
    ) -> Result<(), BusError> {
        self.access()?;
        self.log.push(Transaction::SequentialWrite {
            base_address,
            data: data.to_vec(),
            mode,
        });
        Ok(())
    }

    fn read(
        &mut self,
        _address_type: AddressType,
        _data_type: DataType,
        address: u32,
        out: &mut [u8],
    ) -> Result<(), BusError> {
        self.access()?;
        if let Some(scripted) = self.scripted_reads.pop_front() {
            let len = scripted.len().min(out.len());
            out[..len].copy_from_slice(&scripted[..len]);
        } else {
            for (offset, slot) in out.iter_mut().enumerate() {
                *slot = self
                    .memory
                    .get(&(address + offset as u32))
                    .copied()
                    .unwrap_or(0);
            }
        }
        self.log.push(Transaction::Read {
            address,
            len: out.len(),
        });
        Ok(())
    }

    fn delay(&mut self, duration: Duration) {
        self.log.push(Transaction::Delay(duration));
    }

    fn set_target(&mut self, target: BusTarget) -> Result<(), BusError> {
        self.log.push(Transaction::SetTarget(target));
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PowerEvent {
    Up(usize),
    Down(usize),
}

#[derive(Debug, Default)]
pub struct RecordingPower {
    pub events: Vec<PowerEvent>,
    pub fail_up: Option<PowerError>,
}

impl PowerSequencer for RecordingPower {
    fn power_up(&mut self, steps: &[PowerSetting]) -> Result<(), PowerError> {
        if let Some(err) = self.fail_up {
            return Err(err);
        }
        self.events.push(PowerEvent::Up(steps.len()));
        Ok(())
    }

    fn power_down(&mut self, steps: &[PowerSetting]) -> Result<(), PowerError> {
        self.events.push(PowerEvent::Down(steps.len()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MapBlobs {
    pub blobs: BTreeMap<String, Vec<u8>>,
    pub fetched: Vec<String>,
}

impl MapBlobs {
    pub fn with(mut self, name: &str, bytes: &[u8]) -> Self {
        self.blobs.insert(name.to_owned(), bytes.to_vec());
        self
    }
}

impl BlobSource for MapBlobs {
    type Blob = Vec<u8>;

    fn fetch(&mut self, name: &str) -> Option<Self::Blob> {
        self.fetched.push(name.to_owned());
        self.blobs.get(name).cloned()
    }
}
