mod support;

use ois_core::builder::{CommandBuilder, FirmwareUnitSpec};
use ois_core::bus::{BusError, BusTarget, FrequencyMode};
use ois_core::clock::FixedClock;
use ois_core::device::{
    Device, DeviceConfig, DeviceState, HandleId, Request, RequestKind, Response,
};
use ois_core::error::{DecodeError, Error};
use ois_core::firmware::{Endianness, PARAM_VERSION_CHECK};
use ois_core::operation::{AddressType, DataType, RegisterWrite, SequentialMode};
use ois_core::power::{
    PowerError, PowerRail, PowerSetting, PowerSettings, VariantId, VariantRegistry,
};

use support::{MapBlobs, PowerEvent, RecordingBus, RecordingPower, Transaction};

type TestDevice = Device<RecordingBus, RecordingPower, MapBlobs, FixedClock>;

const TICKS: u64 = 0x0102_0304_0506_0708;

fn reference_defaults() -> PowerSettings {
    let mut settings = PowerSettings::new();
    settings
        .up
        .push(PowerSetting::new(PowerRail::Vio, 1_800_000, 1))
        .unwrap();
    settings
        .up
        .push(PowerSetting::new(PowerRail::Reset, 1, 2))
        .unwrap();
    settings
        .down
        .push(PowerSetting::new(PowerRail::Reset, 0, 0))
        .unwrap();
    settings
}

fn device_with(blobs: MapBlobs) -> TestDevice {
    let mut variants = VariantRegistry::new();
    variants.register(VariantId(1), reference_defaults).unwrap();
    Device::new(
        RecordingBus::new(),
        RecordingPower::default(),
        blobs,
        FixedClock(TICKS),
        DeviceConfig {
            variant: VariantId(1),
            ..DeviceConfig::default()
        },
        &variants,
    )
}

fn device() -> TestDevice {
    device_with(MapBlobs::default())
}

fn device_info(calibration: bool, firmware: bool) -> Vec<u8> {
    CommandBuilder::new()
        .device_info(0x7A, 1, calibration, firmware, "ois-ref", [0x80, 0x81, 0, 0])
        .finish()
}

fn write(address: u32, data: u32) -> Vec<u8> {
    CommandBuilder::new()
        .random_write(
            AddressType::Word,
            DataType::Byte,
            &[RegisterWrite::new(address, data)],
        )
        .finish()
}

fn configured() -> TestDevice {
    let mut device = device();
    device.acquire().unwrap();
    device
        .configure(&[&device_info(false, false), &write(0x10, 1)])
        .unwrap();
    device
}

#[test]
fn acquire_allocates_handles_without_bus_traffic() {
    let mut device = device();
    assert_eq!(device.acquire(), Ok(HandleId(1)));
    assert_eq!(device.state(), DeviceState::Acquired);
    assert!(device.bus().log.is_empty());
    assert!(!device.is_powered());

    assert_eq!(
        device.acquire(),
        Err(Error::IllegalState {
            state: DeviceState::Acquired,
            request: RequestKind::Acquire
        })
    );
}

#[test]
fn configure_with_calibration_applies_both_lists() {
    let mut device = device();
    device.acquire().unwrap();

    device
        .configure(&[
            &device_info(true, false),
            &write(0x10, 0x01),
            &write(0x20, 0x02),
        ])
        .unwrap();

    assert_eq!(device.state(), DeviceState::Configured);
    assert!(device.is_powered());
    assert_eq!(device.power().events, vec![PowerEvent::Up(2)]);

    let bus = device.bus();
    assert_eq!(
        bus.log[0],
        Transaction::SetTarget(BusTarget {
            slave_address: 0x7A,
            frequency: FrequencyMode::Fast,
        })
    );
    assert_eq!(
        bus.writes(),
        vec![
            &Transaction::RandomWrite(vec![RegisterWrite::new(0x10, 0x01)]),
            &Transaction::RandomWrite(vec![RegisterWrite::new(0x20, 0x02)]),
        ]
    );

    let lists = &device.context().lists;
    assert!(!lists.init.is_valid());
    assert!(!lists.calibration.is_valid());
}

#[test]
fn calibration_is_skipped_when_disabled() {
    let mut device = device();
    device.acquire().unwrap();
    device
        .configure(&[
            &device_info(false, false),
            &write(0x10, 0x01),
            &write(0x20, 0x02),
        ])
        .unwrap();
    assert_eq!(device.bus().writes().len(), 1);
}

#[test]
fn submitted_power_settings_override_variant_defaults() {
    let mut device = device();
    device.acquire().unwrap();
    let power = CommandBuilder::new()
        .power_up(&[PowerSetting::new(PowerRail::Vana, 2_800_000, 0)])
        .finish();

    device
        .configure(&[&power, &device_info(false, false), &write(0x10, 1)])
        .unwrap();
    assert_eq!(device.power().events, vec![PowerEvent::Up(1)]);

    // Power-down falls back to the variant table.
    device.release().unwrap();
    assert_eq!(
        device.power().events,
        vec![PowerEvent::Up(1), PowerEvent::Down(1)]
    );
}

#[test]
fn configure_requires_an_acquired_device() {
    let mut device = configured();
    assert_eq!(
        device.configure(&[&write(0x10, 1)]),
        Err(Error::IllegalState {
            state: DeviceState::Configured,
            request: RequestKind::Configure
        })
    );
}

#[test]
fn configure_decode_failure_keeps_state_and_power() {
    let mut device = device();
    device.acquire().unwrap();

    let full = write(0x10, 1);
    let result = device.configure(&[&device_info(false, false), &full[..10]]);

    assert!(matches!(
        result,
        Err(Error::Malformed(DecodeError::Truncated { .. }))
    ));
    assert_eq!(device.state(), DeviceState::Acquired);
    assert!(device.power().events.is_empty());
    assert!(device.bus().log.is_empty());
    assert_eq!(device.context().info.target.slave_address, 0);
}

#[test]
fn fourth_settings_buffer_has_no_slot() {
    let mut device = device();
    device.acquire().unwrap();
    let result = device.configure(&[
        &write(1, 1),
        &write(2, 2),
        &write(3, 3),
        &write(4, 4),
    ]);
    assert_eq!(result, Err(Error::Malformed(DecodeError::NoSettingsSlot)));
    assert_eq!(device.state(), DeviceState::Acquired);
}

#[test]
fn failure_after_power_up_powers_down_and_clears_lists() {
    let mut device = device();
    device.acquire().unwrap();
    device.bus_mut().inject([Err(BusError::NoAcknowledge)]);

    let result = device.configure(&[&device_info(true, false), &write(0x10, 1), &write(0x20, 2)]);

    assert_eq!(result, Err(Error::Bus(BusError::NoAcknowledge)));
    assert_eq!(device.state(), DeviceState::Acquired);
    assert!(!device.is_powered());
    assert_eq!(
        device.power().events,
        vec![PowerEvent::Up(2), PowerEvent::Down(1)]
    );
    assert!(!device.context().lists.init.is_valid());
    assert!(!device.context().lists.calibration.is_valid());

    // A fresh configure starts from scratch.
    device
        .configure(&[&device_info(false, false), &write(0x10, 1)])
        .unwrap();
    assert_eq!(device.state(), DeviceState::Configured);
    assert_eq!(device.status().counters.configure_attempts, 2);
}

#[test]
fn power_failure_aborts_before_any_settings() {
    let mut variants = VariantRegistry::new();
    variants.register(VariantId(1), reference_defaults).unwrap();
    let mut device = Device::new(
        RecordingBus::new(),
        RecordingPower {
            fail_up: Some(PowerError::RailFault(PowerRail::Vio)),
            ..RecordingPower::default()
        },
        MapBlobs::default(),
        FixedClock(0),
        DeviceConfig::default(),
        &variants,
    );
    device.acquire().unwrap();

    assert_eq!(
        device.configure(&[&device_info(false, false), &write(0x10, 1)]),
        Err(Error::Power(PowerError::RailFault(PowerRail::Vio)))
    );
    assert!(!device.is_powered());
    assert!(device.bus().writes().is_empty());
}

#[test]
fn transport_reset_during_init_is_retried_and_counted() {
    let mut device = device();
    device.acquire().unwrap();
    device
        .bus_mut()
        .inject([Err(BusError::TransportResetting)]);

    device
        .configure(&[&device_info(false, false), &write(0x10, 1)])
        .unwrap();

    assert_eq!(device.bus().writes().len(), 1);
    assert_eq!(device.status().counters.transport_retries, 1);
}

#[test]
fn firmware_enabled_configure_downloads_legacy_images() {
    let blobs = MapBlobs::default()
        .with("ois-ref.prog", &[1, 2])
        .with("ois-ref.coeff", &[3]);
    let mut device = device_with(blobs);
    device.acquire().unwrap();

    device
        .configure(&[&device_info(false, true), &write(0x10, 1)])
        .unwrap();

    let writes = device.bus().writes();
    assert_eq!(writes.len(), 3);
    assert_eq!(
        writes[0],
        &Transaction::SequentialWrite {
            base_address: 0x80,
            data: vec![1, 2],
            mode: SequentialMode::Burst,
        }
    );
    assert_eq!(device.status().counters.firmware_downloads, 1);
}

#[test]
fn firmware_failure_powers_down() {
    let mut device = device();
    device.acquire().unwrap();

    assert_eq!(
        device.configure(&[&device_info(false, true), &write(0x10, 1)]),
        Err(Error::BlobNotFound)
    );
    assert!(!device.is_powered());
    assert_eq!(device.state(), DeviceState::Acquired);
}

#[test]
fn start_and_stop_are_guarded() {
    let mut device = device();
    device.acquire().unwrap();
    assert_eq!(
        device.start(),
        Err(Error::IllegalState {
            state: DeviceState::Acquired,
            request: RequestKind::Start
        })
    );

    let mut device = configured();
    assert_eq!(
        device.stop(),
        Err(Error::IllegalState {
            state: DeviceState::Configured,
            request: RequestKind::Stop
        })
    );
    device.start().unwrap();
    assert_eq!(device.state(), DeviceState::Streaming);
    assert!(device.start().is_err());
    assert_eq!(device.state(), DeviceState::Streaming);
    device.stop().unwrap();
    assert_eq!(device.state(), DeviceState::Configured);
}

#[test]
fn runtime_requests_need_configuration() {
    let mut device = device();
    device.acquire().unwrap();
    assert_eq!(
        device.mode_control(&write(0x30, 1)),
        Err(Error::IllegalState {
            state: DeviceState::Acquired,
            request: RequestKind::ModeControl
        })
    );
    assert!(device.bus().log.is_empty());
}

#[test]
fn mode_control_applies_and_clears() {
    let mut device = configured();
    device.start().unwrap();
    device.mode_control(&write(0x30, 7)).unwrap();

    assert_eq!(
        device.bus().writes().last(),
        Some(&&Transaction::RandomWrite(vec![RegisterWrite::new(0x30, 7)]))
    );
    assert!(!device.context().lists.mode_control.is_valid());
}

#[test]
fn runtime_errors_leave_power_alone() {
    let mut device = configured();
    device.bus_mut().inject([Err(BusError::Timeout)]);
    assert_eq!(
        device.mode_control(&write(0x30, 7)),
        Err(Error::Bus(BusError::Timeout))
    );
    assert!(device.is_powered());
    assert_eq!(device.state(), DeviceState::Configured);
}

fn time_payload() -> Vec<u8> {
    CommandBuilder::new()
        .sequential_write(
            AddressType::Word,
            DataType::Byte,
            0x50,
            &[0; 8],
            SequentialMode::Burst,
            0,
        )
        .finish()
}

#[test]
fn time_sync_stamps_little_endian_ticks() {
    let mut device = configured();
    device.time_sync(&time_payload()).unwrap();

    assert_eq!(
        device.bus().writes().last(),
        Some(&&Transaction::SequentialWrite {
            base_address: 0x50,
            data: TICKS.to_le_bytes().to_vec(),
            mode: SequentialMode::Burst,
        })
    );
}

#[test]
fn time_sync_follows_firmware_endianness() {
    let mut device = device();
    device.acquire().unwrap();
    let metadata = CommandBuilder::new()
        .firmware_metadata(Endianness::Big, 0, &[], &[])
        .finish();
    device
        .configure(&[&device_info(false, false), &metadata, &write(0x10, 1)])
        .unwrap();

    device.time_sync(&time_payload()).unwrap();
    assert_eq!(
        device.bus().writes().last(),
        Some(&&Transaction::SequentialWrite {
            base_address: 0x50,
            data: TICKS.to_be_bytes().to_vec(),
            mode: SequentialMode::Burst,
        })
    );
}

#[test]
fn time_sync_rejects_payloads_that_are_not_eight_bytes() {
    let mut device = configured();
    let short = CommandBuilder::new()
        .sequential_write(
            AddressType::Word,
            DataType::Byte,
            0x50,
            &[0; 4],
            SequentialMode::Burst,
            0,
        )
        .finish();
    assert_eq!(device.time_sync(&short), Err(Error::InvalidTimePayload));
    assert_eq!(device.time_sync(&write(1, 1)), Err(Error::InvalidTimePayload));
    assert!(!device.context().lists.time_sync.is_valid());
}

#[test]
fn read_fills_results_and_timestamp() {
    let mut device = configured();
    device.bus_mut().memory.insert(0x60, 0xAB);
    device.bus_mut().memory.insert(0x61, 0xCD);
    let settings = CommandBuilder::new()
        .sequential_read(AddressType::Word, DataType::Byte, 0x60, 2)
        .finish();

    let mut results = [0u8; 4];
    let mut stamp = [0u8; 8];
    let read = device
        .read(&settings, &mut [&mut results[..], &mut stamp[..]])
        .unwrap();

    assert_eq!(read, 2);
    assert_eq!(&results[..2], &[0xAB, 0xCD]);
    assert_eq!(stamp, TICKS.to_le_bytes());
    assert!(!device.context().lists.read.is_valid());
}

#[test]
fn read_rejects_small_regions() {
    let mut device = configured();
    let settings = CommandBuilder::new()
        .sequential_read(AddressType::Word, DataType::Byte, 0x60, 8)
        .finish();

    let mut results = [0u8; 4];
    assert_eq!(
        device.read(&settings, &mut [&mut results[..]]),
        Err(Error::ReadBufferTooSmall {
            needed: 8,
            available: 4
        })
    );

    let mut results = [0u8; 8];
    let mut stamp = [0u8; 4];
    assert_eq!(
        device.read(&settings, &mut [&mut results[..], &mut stamp[..]]),
        Err(Error::ReadBufferTooSmall {
            needed: 8,
            available: 4
        })
    );
}

#[test]
fn release_powers_down_and_resets_everything() {
    let mut device = configured();
    device.start().unwrap();
    device.release().unwrap();

    assert_eq!(device.state(), DeviceState::Init);
    assert!(!device.is_powered());
    let status = device.status();
    assert_eq!(status.handle, None);
    assert_eq!(status.slave_address, 0);
    assert!(device.context().power.is_empty());
    assert_no_valid_lists(&device);
    assert_eq!(
        device.power().events,
        vec![PowerEvent::Up(2), PowerEvent::Down(1)]
    );

    assert_eq!(device.acquire(), Ok(HandleId(2)));
}

fn assert_no_valid_lists(device: &TestDevice) {
    let context = device.context();
    let lists = &context.lists;
    for list in [
        &lists.init,
        &lists.calibration,
        &lists.fw_init,
        &lists.mode_control,
        &lists.time_sync,
        &lists.read,
        &context.firmware.version_check,
    ] {
        assert!(!list.is_valid(), "{:?} still valid", list.role());
        assert!(list.is_empty());
    }
    for unit in &context.firmware.units {
        assert!(!unit.init.is_valid());
        assert!(!unit.finalize.is_valid());
    }
}

#[test]
fn release_forgets_firmware_units_and_metadata() {
    let mut device = device();
    device.acquire().unwrap();

    let version = CommandBuilder::new()
        .poll(AddressType::Word, DataType::Byte, 0x30, 0x02, 0, 1, 1)
        .finish();
    let unit_init = CommandBuilder::new().software_wait(1).finish();
    let unit_finalize = CommandBuilder::new().software_wait(2).finish();
    let unit = FirmwareUnitSpec::new("fw0", 0x1000, AddressType::Word, DataType::Byte)
        .init(&unit_init)
        .finalize(&unit_finalize);
    let metadata = CommandBuilder::new()
        .firmware_metadata(Endianness::Big, PARAM_VERSION_CHECK, &version, &[unit])
        .finish();

    device
        .configure(&[
            &device_info(true, false),
            &metadata,
            &write(0x10, 0x01),
            &write(0x20, 0x02),
        ])
        .unwrap();
    device.mode_control(&write(0x40, 0x03)).unwrap();

    assert_eq!(device.context().firmware.units.len(), 1);
    assert_eq!(device.context().firmware.endianness, Endianness::Big);
    assert_no_valid_lists(&device);

    device.release().unwrap();

    let firmware = &device.context().firmware;
    assert!(firmware.units.is_empty());
    assert_eq!(firmware.endianness, Endianness::Little);
    assert_eq!(firmware.param_mask, 0);
    assert_no_valid_lists(&device);
    assert_eq!(device.status().firmware_units, 0);
}

#[test]
fn release_from_acquired_skips_power() {
    let mut device = device();
    device.acquire().unwrap();
    device.release().unwrap();
    assert!(device.power().events.is_empty());
    assert_eq!(
        device.release(),
        Err(Error::IllegalState {
            state: DeviceState::Init,
            request: RequestKind::Release
        })
    );
}

#[test]
fn idle_power_down_returns_to_acquired() {
    let mut device = configured();
    assert!(device.is_idle_candidate());
    assert_eq!(device.power_down_idle(), Ok(true));
    assert_eq!(device.state(), DeviceState::Acquired);
    assert!(!device.is_powered());

    assert_eq!(device.power_down_idle(), Ok(false));
    device
        .configure(&[&device_info(false, false), &write(0x10, 1)])
        .unwrap();
    assert!(device.is_powered());
}

#[test]
fn streaming_devices_are_never_idled() {
    let mut device = configured();
    device.start().unwrap();
    assert!(!device.is_idle_candidate());
    assert_eq!(device.power_down_idle(), Ok(false));
    assert!(device.is_powered());
}

#[test]
fn dispatch_covers_the_request_surface() {
    let mut device = device();
    assert_eq!(
        device.dispatch(Request::Acquire),
        Ok(Response::Acquired(HandleId(1)))
    );

    let info = device_info(false, false);
    let init = write(0x10, 1);
    let buffers: [&[u8]; 2] = [&info, &init];
    assert_eq!(
        device.dispatch(Request::Configure(&buffers)),
        Ok(Response::Done)
    );
    assert_eq!(device.dispatch(Request::Start), Ok(Response::Done));

    let settings = CommandBuilder::new()
        .sequential_read(AddressType::Word, DataType::Byte, 0x10, 1)
        .finish();
    let mut results = [0u8; 1];
    let mut outputs = [&mut results[..]];
    assert_eq!(
        device.dispatch(Request::Read {
            settings: &settings,
            outputs: &mut outputs,
        }),
        Ok(Response::Read(1))
    );
    assert_eq!(results, [1]);

    match device.dispatch(Request::Query) {
        Ok(Response::Status(status)) => {
            assert_eq!(status.state, DeviceState::Streaming);
            assert_eq!(status.slave_address, 0x7A);
            assert_eq!(status.name.as_str(), "ois-ref");
            assert!(status.powered);
        }
        other => panic!("unexpected response: {other:?}"),
    }

    assert_eq!(device.dispatch(Request::Stop), Ok(Response::Done));
    assert_eq!(device.dispatch(Request::Release), Ok(Response::Done));
    assert_eq!(device.state(), DeviceState::Init);
}

#[derive(Default)]
struct TracingHooks {
    calls: Vec<&'static str>,
}

impl ois_core::device::PeripheralHooks for TracingHooks {
    fn configure(
        &mut self,
        bus: &mut dyn ois_core::Bus,
        info: &ois_core::device::DeviceInfo,
    ) -> Result<(), Error> {
        self.calls.push("configure");
        bus.write_random(
            AddressType::Word,
            DataType::Byte,
            &[RegisterWrite::new(info.opcodes.peripheral, 0xEE)],
        )?;
        Ok(())
    }

    fn pre_firmware(&mut self, _bus: &mut dyn ois_core::Bus) -> Result<(), Error> {
        self.calls.push("pre-firmware");
        Ok(())
    }

    fn post_firmware(
        &mut self,
        _bus: &mut dyn ois_core::Bus,
        outcome: ois_core::DownloadOutcome,
    ) -> Result<(), Error> {
        assert!(matches!(
            outcome,
            ois_core::DownloadOutcome::Completed { units: 0, .. }
        ));
        self.calls.push("post-firmware");
        Ok(())
    }
}

#[test]
fn hooks_run_around_firmware_download() {
    let blobs = MapBlobs::default()
        .with("ois-ref.prog", &[1])
        .with("ois-ref.coeff", &[2]);
    let mut device = Device::with_hooks(
        RecordingBus::new(),
        RecordingPower::default(),
        blobs,
        FixedClock(0),
        TracingHooks::default(),
        DeviceConfig::default(),
        &VariantRegistry::new(),
    );
    device.acquire().unwrap();
    let info = CommandBuilder::new()
        .device_info(0x7A, 0, false, true, "ois-ref", [0x80, 0x81, 0x0F, 0])
        .finish();
    device.configure(&[&info, &write(0x10, 1)]).unwrap();

    let writes = device.bus().writes();
    assert_eq!(writes.len(), 4);
    assert_eq!(
        writes[0],
        &Transaction::RandomWrite(vec![RegisterWrite::new(0x0F, 0xEE)])
    );
    assert_eq!(
        writes[3],
        &Transaction::RandomWrite(vec![RegisterWrite::new(0x10, 1)])
    );
}
