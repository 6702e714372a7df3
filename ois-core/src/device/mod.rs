//! Actuator lifecycle state machine.
//!
//! A [`Device`] owns its transport, power sequencer, firmware store, clock and
//! peripheral hooks together with the [`DeviceContext`]. Every request runs
//! through `&mut Device`, so callers that share a device across tasks wrap it
//! in their own lock.

mod context;
mod hooks;
mod state;

pub use context::{
    Counters, DEFAULT_POWER_DOWN_WINDOW, DEVICE_NAME_LEN, DeviceConfig, DeviceContext, DeviceInfo,
    DeviceName, DeviceStatus, HandleId, OpcodeTable, SettingsLists,
};
pub use hooks::{NoopHooks, PeripheralHooks};
pub use state::{DeviceState, RequestKind};

use crate::bus::{Bus, apply_into_with_retry, apply_with_retry};
use crate::clock::Clock;
use crate::decoder::{self, BufferKind};
use crate::error::{DecodeError, Error};
use crate::firmware::{self, BlobSource, DownloadOutcome, Endianness, FirmwareConfig, LegacyTarget};
use crate::operation::Operation;
use crate::power::{PowerSequencer, PowerSettings, VariantRegistry};
use crate::settings::{OperationList, SettingsRole};

/// Size of the timestamp written after read results and into time-sync payloads.
pub const TIMESTAMP_LEN: usize = 8;

/// Abstract request surface served by [`Device::dispatch`].
#[derive(Debug)]
pub enum Request<'a> {
    Acquire,
    /// Device-info, power, firmware-metadata and settings buffers, in any order.
    Configure(&'a [&'a [u8]]),
    Start,
    Stop,
    ModeControl(&'a [u8]),
    TimeSync(&'a [u8]),
    /// Read settings plus the destination regions: results first, then an
    /// optional timestamp region.
    Read {
        settings: &'a [u8],
        outputs: &'a mut [&'a mut [u8]],
    },
    Release,
    Query,
}

impl Request<'_> {
    pub const fn kind(&self) -> RequestKind {
        match self {
            Request::Acquire => RequestKind::Acquire,
            Request::Configure(_) => RequestKind::Configure,
            Request::Start => RequestKind::Start,
            Request::Stop => RequestKind::Stop,
            Request::ModeControl(_) => RequestKind::ModeControl,
            Request::TimeSync(_) => RequestKind::TimeSync,
            Request::Read { .. } => RequestKind::Read,
            Request::Release => RequestKind::Release,
            Request::Query => RequestKind::Query,
        }
    }
}

/// Successful reply to a [`Request`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    Acquired(HandleId),
    Done,
    /// Number of bytes deposited in the first output region.
    Read(usize),
    Status(DeviceStatus),
}

/// Settings decoded by a configure request, held until every buffer decoded.
#[derive(Default)]
struct Staged {
    info: Option<DeviceInfo>,
    power: Option<PowerSettings>,
    firmware: Option<FirmwareConfig>,
    init: Option<OperationList>,
    calibration: Option<OperationList>,
    fw_init: Option<OperationList>,
}

impl Staged {
    /// Next generic settings slot, in init, calibration, fw-init order.
    fn free_slot(&self) -> Option<SettingsRole> {
        if self.init.is_none() {
            Some(SettingsRole::Init)
        } else if self.calibration.is_none() {
            Some(SettingsRole::Calibration)
        } else if self.fw_init.is_none() {
            Some(SettingsRole::FirmwareInit)
        } else {
            None
        }
    }

    fn stage(&mut self, buffer: &[u8], request_id: u64) -> Result<(), Error> {
        match decoder::classify(buffer)? {
            BufferKind::DeviceInfo => self.info = Some(decoder::decode_device_info(buffer)?),
            BufferKind::PowerSettings => {
                let decoded = decoder::decode_power_settings(buffer)?;
                let merged = self.power.get_or_insert_with(PowerSettings::new);
                if !decoded.up.is_empty() {
                    merged.up = decoded.up;
                }
                if !decoded.down.is_empty() {
                    merged.down = decoded.down;
                }
            }
            BufferKind::FirmwareMetadata => {
                self.firmware = Some(decoder::decode_firmware_metadata(buffer, request_id)?);
            }
            BufferKind::Settings => {
                let role = self.free_slot().ok_or(DecodeError::NoSettingsSlot)?;
                let list = decoder::decode(buffer, role, request_id)?;
                match role {
                    SettingsRole::Init => self.init = Some(list),
                    SettingsRole::Calibration => self.calibration = Some(list),
                    _ => self.fw_init = Some(list),
                }
            }
        }
        Ok(())
    }

    fn commit(self, ctx: &mut DeviceContext) {
        if let Some(info) = self.info {
            ctx.info = info;
        }
        if let Some(power) = self.power {
            if !power.up.is_empty() {
                ctx.power.up = power.up;
            }
            if !power.down.is_empty() {
                ctx.power.down = power.down;
            }
        }
        if let Some(firmware) = self.firmware {
            ctx.firmware = firmware;
        }
        if let Some(list) = self.init {
            ctx.lists.init = list;
        }
        if let Some(list) = self.calibration {
            ctx.lists.calibration = list;
        }
        if let Some(list) = self.fw_init {
            ctx.lists.fw_init = list;
        }
    }
}

/// One actuator instance and its collaborators.
pub struct Device<B, P, S, C, H = NoopHooks> {
    bus: B,
    power: P,
    blobs: S,
    clock: C,
    hooks: H,
    config: DeviceConfig,
    defaults: PowerSettings,
    ctx: DeviceContext,
    next_handle: u32,
    next_request: u64,
}

impl<B, P, S, C> Device<B, P, S, C, NoopHooks>
where
    B: Bus,
    P: PowerSequencer,
    S: BlobSource,
    C: Clock,
{
    /// Creates a device without peripheral hooks.
    pub fn new(
        bus: B,
        power: P,
        blobs: S,
        clock: C,
        config: DeviceConfig,
        variants: &VariantRegistry,
    ) -> Self {
        Self::with_hooks(bus, power, blobs, clock, NoopHooks, config, variants)
    }
}

impl<B, P, S, C, H> Device<B, P, S, C, H>
where
    B: Bus,
    P: PowerSequencer,
    S: BlobSource,
    C: Clock,
    H: PeripheralHooks,
{
    /// Creates a device, resolving the variant's default power sequences once.
    pub fn with_hooks(
        bus: B,
        power: P,
        blobs: S,
        clock: C,
        hooks: H,
        config: DeviceConfig,
        variants: &VariantRegistry,
    ) -> Self {
        Self {
            bus,
            power,
            blobs,
            clock,
            hooks,
            config,
            defaults: variants.defaults_for(config.variant),
            ctx: DeviceContext::default(),
            next_handle: 1,
            next_request: 1,
        }
    }

    pub const fn state(&self) -> DeviceState {
        self.ctx.state
    }

    pub const fn is_powered(&self) -> bool {
        self.ctx.powered
    }

    pub const fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub const fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    pub const fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub const fn power(&self) -> &P {
        &self.power
    }

    /// Returns `true` when the device is a candidate for deferred power-down.
    pub const fn is_idle_candidate(&self) -> bool {
        self.ctx.powered && matches!(self.ctx.state, DeviceState::Configured)
    }

    /// Serves one request from the abstract request surface.
    pub fn dispatch(&mut self, request: Request<'_>) -> Result<Response, Error> {
        match request {
            Request::Acquire => self.acquire().map(Response::Acquired),
            Request::Configure(buffers) => self.configure(buffers).map(|()| Response::Done),
            Request::Start => self.start().map(|()| Response::Done),
            Request::Stop => self.stop().map(|()| Response::Done),
            Request::ModeControl(buffer) => self.mode_control(buffer).map(|()| Response::Done),
            Request::TimeSync(buffer) => self.time_sync(buffer).map(|()| Response::Done),
            Request::Read { settings, outputs } => self.read(settings, outputs).map(Response::Read),
            Request::Release => self.release().map(|()| Response::Done),
            Request::Query => Ok(Response::Status(self.status())),
        }
    }

    /// Init -> Acquired. Allocates a handle; touches no hardware.
    pub fn acquire(&mut self) -> Result<HandleId, Error> {
        RequestKind::Acquire.check(self.ctx.state)?;
        let handle = HandleId(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.ctx.handle = Some(handle);
        self.ctx.tearing_down = false;
        self.ctx.state = DeviceState::Acquired;
        info!("device: acquired handle {}", handle.0);
        Ok(handle)
    }

    /// Acquired -> Configured. Decodes every buffer, powers the actuator up,
    /// downloads firmware when enabled and applies init and calibration.
    pub fn configure(&mut self, buffers: &[&[u8]]) -> Result<(), Error> {
        RequestKind::Configure.check(self.ctx.state)?;
        self.ctx.counters.configure_attempts += 1;
        let request_id = self.next_request_id();

        let mut staged = Staged::default();
        for buffer in buffers {
            if let Err(err) = staged.stage(buffer, request_id) {
                warn!("device: configure rejected: {}", err);
                self.ctx.clear_one_shot();
                return Err(err);
            }
        }
        staged.commit(&mut self.ctx);

        let result = self.run_configure();
        self.ctx.clear_one_shot();
        match result {
            Ok(()) => {
                self.ctx.state = DeviceState::Configured;
                info!("device: configured");
                Ok(())
            }
            Err(err) => {
                error!("device: configure failed: {}", err);
                Err(err)
            }
        }
    }

    fn run_configure(&mut self) -> Result<(), Error> {
        self.bus.set_target(self.ctx.info.target)?;
        self.power_up()?;

        if let Err(err) = self.configure_powered() {
            if let Err(power_err) = self.power_down() {
                warn!("device: power-down after failure also failed: {}", power_err);
            }
            return Err(err);
        }
        Ok(())
    }

    fn configure_powered(&mut self) -> Result<(), Error> {
        self.hooks.configure(&mut self.bus, &self.ctx.info)?;

        if self.ctx.info.firmware_enabled {
            self.hooks.pre_firmware(&mut self.bus)?;
            if self.ctx.lists.fw_init.is_valid() {
                apply_counted(&mut self.bus, &self.ctx.lists.fw_init, &mut self.ctx.counters)?;
            }
            let outcome = firmware::download(
                &mut self.ctx.firmware,
                LegacyTarget {
                    name: self.ctx.info.name.as_str(),
                    opcodes: &self.ctx.info.opcodes,
                },
                &mut self.bus,
                &mut self.blobs,
            )?;
            if matches!(outcome, DownloadOutcome::Completed { .. }) {
                self.ctx.counters.firmware_downloads += 1;
            }
            self.hooks.post_firmware(&mut self.bus, outcome)?;
        }

        apply_counted(&mut self.bus, &self.ctx.lists.init, &mut self.ctx.counters)?;

        if self.ctx.info.calibration_enabled && self.ctx.lists.calibration.is_valid() {
            apply_counted(
                &mut self.bus,
                &self.ctx.lists.calibration,
                &mut self.ctx.counters,
            )?;
        }
        Ok(())
    }

    /// Configured -> Streaming.
    pub fn start(&mut self) -> Result<(), Error> {
        RequestKind::Start.check(self.ctx.state)?;
        self.ctx.state = DeviceState::Streaming;
        debug!("device: streaming");
        Ok(())
    }

    /// Streaming -> Configured.
    pub fn stop(&mut self) -> Result<(), Error> {
        RequestKind::Stop.check(self.ctx.state)?;
        self.ctx.state = DeviceState::Configured;
        debug!("device: stopped");
        Ok(())
    }

    /// Decodes and applies a mode-control buffer.
    pub fn mode_control(&mut self, buffer: &[u8]) -> Result<(), Error> {
        RequestKind::ModeControl.check(self.ctx.state)?;
        let request_id = self.next_request_id();
        let result = decoder::decode_into(&mut self.ctx.lists.mode_control, buffer, request_id)
            .and_then(|()| {
                apply_counted(
                    &mut self.bus,
                    &self.ctx.lists.mode_control,
                    &mut self.ctx.counters,
                )
            });
        self.ctx.lists.mode_control.clear();
        result
    }

    /// Decodes a time-sync buffer, stamps its 8-byte payload with the current
    /// tick count and applies it.
    pub fn time_sync(&mut self, buffer: &[u8]) -> Result<(), Error> {
        RequestKind::TimeSync.check(self.ctx.state)?;
        let request_id = self.next_request_id();
        let result = self.run_time_sync(buffer, request_id);
        self.ctx.lists.time_sync.clear();
        result
    }

    fn run_time_sync(&mut self, buffer: &[u8], request_id: u64) -> Result<(), Error> {
        decoder::decode_into(&mut self.ctx.lists.time_sync, buffer, request_id)?;

        let ticks = self.clock.now_ticks();
        let stamp = match self.ctx.firmware.endianness {
            Endianness::Little => ticks.to_le_bytes(),
            Endianness::Big => ticks.to_be_bytes(),
        };
        let payload = self
            .ctx
            .lists
            .time_sync
            .operations_mut()
            .iter_mut()
            .find_map(|operation| match operation {
                Operation::SequentialWrite { data, .. } => Some(data),
                _ => None,
            })
            .filter(|data| data.len() == TIMESTAMP_LEN)
            .ok_or(Error::InvalidTimePayload)?;
        payload.copy_from_slice(&stamp);

        apply_counted(
            &mut self.bus,
            &self.ctx.lists.time_sync,
            &mut self.ctx.counters,
        )
    }

    /// Decodes and applies a read buffer. Results land in `outputs[0]`; when a
    /// second region is present the 8-byte little-endian tick count is
    /// written to it.
    pub fn read(&mut self, buffer: &[u8], outputs: &mut [&mut [u8]]) -> Result<usize, Error> {
        RequestKind::Read.check(self.ctx.state)?;
        let request_id = self.next_request_id();
        let result = self.run_read(buffer, outputs, request_id);
        self.ctx.lists.read.clear();
        result
    }

    fn run_read(
        &mut self,
        buffer: &[u8],
        outputs: &mut [&mut [u8]],
        request_id: u64,
    ) -> Result<usize, Error> {
        decoder::decode_into(&mut self.ctx.lists.read, buffer, request_id)?;

        let needed = self
            .ctx
            .lists
            .read
            .operations()
            .iter()
            .try_fold(0usize, |total, op| total.checked_add(op.read_len()?))
            .unwrap_or(usize::MAX);
        let (results, rest) = outputs
            .split_first_mut()
            .ok_or(Error::ReadBufferTooSmall {
                needed,
                available: 0,
            })?;
        if let Some(stamp) = rest.first() {
            if stamp.len() < TIMESTAMP_LEN {
                return Err(Error::ReadBufferTooSmall {
                    needed: TIMESTAMP_LEN,
                    available: stamp.len(),
                });
            }
        }

        let outcome = apply_into_with_retry(&self.ctx.lists.read, &mut self.bus, &mut **results)?;
        if outcome.retried {
            self.ctx.counters.transport_retries += 1;
        }

        if let Some(stamp) = rest.first_mut() {
            let ticks = self.clock.now_ticks();
            stamp[..TIMESTAMP_LEN].copy_from_slice(&ticks.to_le_bytes());
        }
        Ok(outcome.value)
    }

    /// Any state past Init -> Init. Powers down if needed and forgets every
    /// list, firmware unit and submitted power setting.
    pub fn release(&mut self) -> Result<(), Error> {
        RequestKind::Release.check(self.ctx.state)?;
        self.ctx.tearing_down = true;

        let result = if self.ctx.powered {
            self.power_down()
        } else {
            Ok(())
        };
        if let Err(err) = &result {
            warn!("device: power-down during release failed: {}", err);
        }

        if let Some(handle) = self.ctx.handle {
            info!("device: released handle {}", handle.0);
        }
        self.ctx.reset();
        result
    }

    /// Snapshot of the device for status queries. Legal in every state.
    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            state: self.ctx.state,
            handle: self.ctx.handle,
            slave_address: self.ctx.info.target.slave_address,
            name: self.ctx.info.name.clone(),
            powered: self.ctx.powered,
            firmware_units: self.ctx.firmware.units.len(),
            counters: self.ctx.counters,
        }
    }

    /// Powers down a configured device that sat idle. Returns `true` when the
    /// device was powered down and moved back to Acquired.
    pub fn power_down_idle(&mut self) -> Result<bool, Error> {
        if !self.is_idle_candidate() || self.ctx.tearing_down {
            return Ok(false);
        }

        self.power_down()?;
        self.ctx.lists.clear_all();
        self.ctx.firmware.clear_one_shot();
        self.ctx.state = DeviceState::Acquired;
        info!("device: idle power-down");
        Ok(true)
    }

    fn power_up(&mut self) -> Result<(), Error> {
        if self.ctx.powered {
            return Ok(());
        }
        let steps = if self.ctx.power.up.is_empty() {
            &self.defaults.up
        } else {
            &self.ctx.power.up
        };
        self.power.power_up(steps)?;
        self.ctx.powered = true;
        debug!("device: powered up ({} steps)", steps.len());
        Ok(())
    }

    fn power_down(&mut self) -> Result<(), Error> {
        let steps = if self.ctx.power.down.is_empty() {
            &self.defaults.down
        } else {
            &self.ctx.power.down
        };
        self.power.power_down(steps)?;
        self.ctx.powered = false;
        debug!("device: powered down ({} steps)", steps.len());
        Ok(())
    }

    fn next_request_id(&mut self) -> u64 {
        let id = self.next_request;
        self.next_request = self.next_request.wrapping_add(1);
        id
    }
}

fn apply_counted<B: Bus + ?Sized>(
    bus: &mut B,
    list: &OperationList,
    counters: &mut Counters,
) -> Result<(), Error> {
    let outcome = apply_with_retry(list, bus)?;
    if outcome.retried {
        counters.transport_retries += 1;
    }
    Ok(())
}
