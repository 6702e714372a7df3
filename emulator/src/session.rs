use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ois_core::device::{Device, DeviceConfig, Request, Response, TIMESTAMP_LEN};
use ois_core::power::{VariantId, builtin_variants};

use crate::script::{ScriptCommand, parse_line};
use crate::sim::{DirectoryBlobs, HostPower, SimulatedBus, VirtualClock};

pub type EmulatedDevice = Device<SimulatedBus, HostPower, DirectoryBlobs, VirtualClock>;

/// One emulated device plus the directory its settings files live in.
pub struct Session {
    device: EmulatedDevice,
    clock: VirtualClock,
    settings_dir: PathBuf,
}

impl Session {
    pub fn new(settings_dir: &Path, blob_dir: &Path, variant: VariantId) -> Result<Self> {
        let registry = builtin_variants().map_err(|err| anyhow::anyhow!("{err}"))?;
        let clock = VirtualClock::new();
        let device = Device::new(
            SimulatedBus::new(clock.clone()),
            HostPower::new(clock.clone()),
            DirectoryBlobs::new(blob_dir),
            clock.clone(),
            DeviceConfig {
                variant,
                ..DeviceConfig::default()
            },
            &registry,
        );
        Ok(Self {
            device,
            clock,
            settings_dir: settings_dir.to_path_buf(),
        })
    }

    pub fn device(&self) -> &EmulatedDevice {
        &self.device
    }

    /// Virtual milliseconds since the session started.
    pub fn elapsed_ms(&self) -> u128 {
        self.clock.elapsed().as_millis()
    }

    /// Parses and runs one script line. Device errors become `ERR` lines;
    /// syntax and file errors abort.
    pub fn run_line(&mut self, line: &str) -> Result<Vec<String>> {
        match parse_line(line)? {
            Some(command) => self.execute(&command),
            None => Ok(Vec::new()),
        }
    }

    pub fn execute(&mut self, command: &ScriptCommand<'_>) -> Result<Vec<String>> {
        let lines = match command {
            ScriptCommand::Acquire => render(
                self.device.dispatch(Request::Acquire),
                |response| match response {
                    Response::Acquired(handle) => format!("OK handle {}", handle.0),
                    _ => "OK".to_owned(),
                },
            ),
            ScriptCommand::Configure(files) => {
                let buffers = files
                    .iter()
                    .map(|file| self.load(file))
                    .collect::<Result<Vec<_>>>()?;
                let slices: Vec<&[u8]> = buffers.iter().map(Vec::as_slice).collect();
                render(self.device.dispatch(Request::Configure(&slices)), |_| {
                    "OK configured".to_owned()
                })
            }
            ScriptCommand::Start => render(self.device.dispatch(Request::Start), |_| {
                "OK streaming".to_owned()
            }),
            ScriptCommand::Stop => render(self.device.dispatch(Request::Stop), |_| {
                "OK stopped".to_owned()
            }),
            ScriptCommand::Mode(file) => {
                let buffer = self.load(file)?;
                render(self.device.dispatch(Request::ModeControl(&buffer)), |_| {
                    "OK mode".to_owned()
                })
            }
            ScriptCommand::Time(file) => {
                let buffer = self.load(file)?;
                render(self.device.dispatch(Request::TimeSync(&buffer)), |_| {
                    "OK time-sync".to_owned()
                })
            }
            ScriptCommand::Read {
                settings,
                len,
                stamp,
            } => {
                let buffer = self.load(settings)?;
                self.read(&buffer, *len, *stamp)
            }
            ScriptCommand::Release => render(self.device.dispatch(Request::Release), |_| {
                "OK released".to_owned()
            }),
            ScriptCommand::Status => self.status(),
            ScriptCommand::Dump { address, len } => self.dump(*address, *len),
            ScriptCommand::Resets(count) => {
                self.device.bus_mut().inject_resets(*count);
                vec![format!("OK next {count} accesses reset")]
            }
        };
        Ok(lines)
    }

    fn load(&self, file: &str) -> Result<Vec<u8>> {
        let path = self.settings_dir.join(file);
        fs::read(&path).with_context(|| format!("reading settings file {}", path.display()))
    }

    fn read(&mut self, buffer: &[u8], len: usize, stamp: bool) -> Vec<String> {
        let mut results = vec![0u8; len];
        let mut timestamp = [0u8; TIMESTAMP_LEN];
        let result = {
            let mut outputs: Vec<&mut [u8]> = vec![&mut results[..]];
            if stamp {
                outputs.push(&mut timestamp[..]);
            }
            self.device.read(buffer, &mut outputs)
        };

        match result {
            Ok(count) => {
                let mut lines = vec![format!("OK {count} bytes {}", hex(&results[..count]))];
                if stamp {
                    lines.push(format!("stamp {}", u64::from_le_bytes(timestamp)));
                }
                lines
            }
            Err(err) => vec![format!("ERR {err}")],
        }
    }

    fn status(&self) -> Vec<String> {
        let status = self.device.status();
        let handle = status
            .handle
            .map_or_else(|| "-".to_owned(), |handle| handle.0.to_string());
        vec![
            format!(
                "state={} handle={} slave=0x{:02x} name={:?} powered={}",
                status.state,
                handle,
                status.slave_address,
                status.name.as_str(),
                status.powered
            ),
            format!(
                "firmware_units={} configure_attempts={} transport_retries={} downloads={}",
                status.firmware_units,
                status.counters.configure_attempts,
                status.counters.transport_retries,
                status.counters.firmware_downloads
            ),
        ]
    }

    fn dump(&self, address: u32, len: usize) -> Vec<String> {
        let bus = self.device.bus();
        let mut lines = Vec::new();
        let mut register = address;
        for _ in 0..len {
            lines.push(format!("0x{register:04x}: 0x{:08x}", bus.register(register)));
            register = register.wrapping_add(1);
        }
        let fifo = bus.fifo(address);
        if !fifo.is_empty() {
            lines.push(format!("fifo 0x{address:04x}: {} bytes", fifo.len()));
        }
        lines
    }
}

fn render<E: std::fmt::Display>(
    result: Result<Response, E>,
    ok: impl FnOnce(Response) -> String,
) -> Vec<String> {
    match result {
        Ok(response) => vec![ok(response)],
        Err(err) => vec![format!("ERR {err}")],
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (index, byte) in bytes.iter().enumerate() {
        if index > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02x}");
    }
    out
}
