mod support;

use ois_core::builder::{CommandBuilder, FirmwareUnitSpec};
use ois_core::decoder::decode_firmware_metadata;
use ois_core::device::OpcodeTable;
use ois_core::error::Error;
use ois_core::firmware::{
    DownloadOutcome, Endianness, FirmwareConfig, LegacyTarget, PARAM_VERSION_CHECK, WriteMode,
    download,
};
use ois_core::operation::{AddressType, DataType, RegisterWrite, SequentialMode};

use support::{MapBlobs, RecordingBus, Transaction};

const OPCODES: OpcodeTable = OpcodeTable {
    prog: 0x80,
    coeff: 0x81,
    peripheral: 0x10,
    memory: 0x20,
};

fn legacy() -> LegacyTarget<'static> {
    LegacyTarget {
        name: "ois-ref",
        opcodes: &OPCODES,
    }
}

fn version_check() -> Vec<u8> {
    CommandBuilder::new()
        .poll(AddressType::Word, DataType::Byte, 0x00F0, 0x42, 0, 1, 0)
        .finish()
}

fn config(endianness: Endianness, mask: u32, units: &[FirmwareUnitSpec<'_>]) -> FirmwareConfig {
    let buffer = CommandBuilder::new()
        .firmware_metadata(endianness, mask, &version_check(), units)
        .finish();
    decode_firmware_metadata(&buffer, 1).unwrap()
}

#[test]
fn matching_version_skips_download_and_clears_gate() {
    let unit = FirmwareUnitSpec::new("fw0", 0x1000, AddressType::Word, DataType::Byte);
    let mut config = config(Endianness::Little, PARAM_VERSION_CHECK, &[unit]);
    let mut bus = RecordingBus::new();
    bus.scripted_reads.push_back(vec![0x42]);
    let mut blobs = MapBlobs::default().with("fw0", &[1, 2, 3, 4]);

    let outcome = download(&mut config, legacy(), &mut bus, &mut blobs).unwrap();

    assert_eq!(outcome, DownloadOutcome::UpToDate);
    assert!(bus.writes().is_empty());
    assert!(blobs.fetched.is_empty());
    assert!(!config.version_check.is_valid());
}

#[test]
fn gate_runs_once_then_downloads() {
    let unit = FirmwareUnitSpec::new("fw0", 0x1000, AddressType::Word, DataType::Byte);
    let mut config = config(Endianness::Little, PARAM_VERSION_CHECK, &[unit]);
    let mut blobs = MapBlobs::default().with("fw0", &[1, 2, 3, 4]);

    let mut bus = RecordingBus::new();
    bus.scripted_reads.push_back(vec![0x42]);
    assert_eq!(
        download(&mut config, legacy(), &mut bus, &mut blobs),
        Ok(DownloadOutcome::UpToDate)
    );

    // The gate was consumed; a second pass has nothing to compare against.
    let mut bus = RecordingBus::new();
    let outcome = download(&mut config, legacy(), &mut bus, &mut blobs).unwrap();
    assert_eq!(outcome, DownloadOutcome::Completed { units: 1, bytes: 4 });
    assert_eq!(bus.writes().len(), 1);
}

#[test]
fn mismatching_version_downloads_every_unit() {
    let units = [
        FirmwareUnitSpec::new("fw0", 0x1000, AddressType::Word, DataType::Byte)
            .length_per_write(4),
        FirmwareUnitSpec::new("fw1", 0x2000, AddressType::Word, DataType::Byte)
            .length_per_write(4),
    ];
    let mut config = config(Endianness::Little, PARAM_VERSION_CHECK, &units);
    let mut bus = RecordingBus::new();
    bus.scripted_reads.push_back(vec![0x41]);
    let mut blobs = MapBlobs::default()
        .with("fw0", &[0; 10])
        .with("fw1", &[0; 4]);

    let outcome = download(&mut config, legacy(), &mut bus, &mut blobs).unwrap();

    assert_eq!(outcome, DownloadOutcome::Completed { units: 2, bytes: 14 });
    // 10 bytes in 4-byte chunks is 3 writes, plus 1 for the second unit.
    assert_eq!(bus.writes().len(), 4);
    assert_eq!(blobs.fetched, vec!["fw0".to_owned(), "fw1".to_owned()]);
    assert!(!config.version_check.is_valid());
}

#[test]
fn gate_errors_other_than_mismatch_abort() {
    let unit = FirmwareUnitSpec::new("fw0", 0x1000, AddressType::Word, DataType::Byte);
    let mut config = config(Endianness::Little, PARAM_VERSION_CHECK, &[unit]);
    let mut bus = RecordingBus::new();
    bus.inject([Err(ois_core::BusError::Io)]);
    let mut blobs = MapBlobs::default().with("fw0", &[1]);

    assert_eq!(
        download(&mut config, legacy(), &mut bus, &mut blobs),
        Err(Error::Bus(ois_core::BusError::Io))
    );
    assert!(!config.version_check.is_valid());
    assert!(blobs.fetched.is_empty());
}

#[test]
fn big_endian_burst_chunks_are_word_swapped() {
    let unit = FirmwareUnitSpec::new("fw0", 0x1000, AddressType::Word, DataType::Word)
        .length_per_write(6)
        .write_mode(WriteMode::Burst);
    let mut config = config(Endianness::Big, 0, &[unit]);
    let mut bus = RecordingBus::new();
    let mut blobs = MapBlobs::default().with("fw0", &[1, 2, 3, 4, 5, 6, 7, 8]);

    download(&mut config, legacy(), &mut bus, &mut blobs).unwrap();

    assert_eq!(
        bus.writes(),
        vec![
            &Transaction::SequentialWrite {
                base_address: 0x1000,
                data: vec![4, 3, 2, 1, 6, 5],
                mode: SequentialMode::Burst,
            },
            &Transaction::SequentialWrite {
                base_address: 0x1000,
                data: vec![8, 7],
                mode: SequentialMode::Burst,
            },
        ]
    );
}

#[test]
fn sequential_chunks_advance_and_honour_offset_and_size() {
    let unit = FirmwareUnitSpec::new("fw0", 0x100, AddressType::Word, DataType::Word)
        .length_per_write(4)
        .write_mode(WriteMode::Sequential)
        .start_offset(2)
        .size(8)
        .delay_us(50);
    let mut config = config(Endianness::Little, 0, &[unit]);
    let mut bus = RecordingBus::new();
    let mut blobs = MapBlobs::default().with("fw0", &[0xEE, 0xEE, 1, 2, 3, 4, 5, 6, 7, 8, 0xEE]);

    let outcome = download(&mut config, legacy(), &mut bus, &mut blobs).unwrap();

    assert_eq!(outcome, DownloadOutcome::Completed { units: 1, bytes: 8 });
    let writes = bus.writes();
    assert_eq!(
        writes[0],
        &Transaction::SequentialWrite {
            base_address: 0x100,
            data: vec![1, 2, 3, 4],
            mode: SequentialMode::Sequential,
        }
    );
    assert_eq!(
        writes[1],
        &Transaction::SequentialWrite {
            base_address: 0x102,
            data: vec![5, 6, 7, 8],
            mode: SequentialMode::Sequential,
        }
    );
    assert_eq!(
        bus.delays(),
        vec![std::time::Duration::from_micros(50); 2]
    );
}

#[test]
fn random_mode_writes_one_register_per_element() {
    let unit = FirmwareUnitSpec::new("fw0", 0x300, AddressType::Word, DataType::Byte)
        .length_per_write(2)
        .write_mode(WriteMode::Random);
    let mut config = config(Endianness::Little, 0, &[unit]);
    let mut bus = RecordingBus::new();
    let mut blobs = MapBlobs::default().with("fw0", &[0xA, 0xB, 0xC]);

    download(&mut config, legacy(), &mut bus, &mut blobs).unwrap();

    assert_eq!(
        bus.writes(),
        vec![
            &Transaction::RandomWrite(vec![
                RegisterWrite::new(0x300, 0xA),
                RegisterWrite::new(0x301, 0xB),
            ]),
            &Transaction::RandomWrite(vec![RegisterWrite::new(0x302, 0xC)]),
        ]
    );
}

#[test]
fn unit_brackets_wrap_the_payload() {
    let init = CommandBuilder::new()
        .random_write(AddressType::Word, DataType::Byte, &[RegisterWrite::new(0x01, 1)])
        .finish();
    let finalize = CommandBuilder::new()
        .random_write(AddressType::Word, DataType::Byte, &[RegisterWrite::new(0x02, 2)])
        .finish();
    let unit = FirmwareUnitSpec::new("fw0", 0x1000, AddressType::Word, DataType::Byte)
        .init(&init)
        .finalize(&finalize);
    let mut config = config(Endianness::Little, 0, &[unit]);
    let mut bus = RecordingBus::new();
    let mut blobs = MapBlobs::default().with("fw0", &[9, 9]);

    download(&mut config, legacy(), &mut bus, &mut blobs).unwrap();

    let writes = bus.writes();
    assert_eq!(writes.len(), 3);
    assert_eq!(
        writes[0],
        &Transaction::RandomWrite(vec![RegisterWrite::new(0x01, 1)])
    );
    assert!(matches!(writes[1], Transaction::SequentialWrite { .. }));
    assert_eq!(
        writes[2],
        &Transaction::RandomWrite(vec![RegisterWrite::new(0x02, 2)])
    );
}

#[test]
fn missing_blob_aborts_before_any_write() {
    let unit = FirmwareUnitSpec::new("fw0", 0x1000, AddressType::Word, DataType::Byte);
    let mut config = config(Endianness::Little, 0, &[unit]);
    let mut bus = RecordingBus::new();
    let mut blobs = MapBlobs::default();

    assert_eq!(
        download(&mut config, legacy(), &mut bus, &mut blobs),
        Err(Error::BlobNotFound)
    );
    assert!(bus.log.is_empty());
}

#[test]
fn blob_shorter_than_offset_and_size_is_rejected() {
    let unit = FirmwareUnitSpec::new("fw0", 0x1000, AddressType::Word, DataType::Byte)
        .start_offset(4)
        .size(8);
    let mut config = config(Endianness::Little, 0, &[unit]);
    let mut bus = RecordingBus::new();
    let mut blobs = MapBlobs::default().with("fw0", &[0; 10]);

    assert_eq!(
        download(&mut config, legacy(), &mut bus, &mut blobs),
        Err(Error::BlobTooShort)
    );
    assert!(bus.writes().is_empty());
}

#[test]
fn legacy_shape_bursts_prog_and_coeff() {
    let mut config = FirmwareConfig::default();
    let mut bus = RecordingBus::new();
    let mut blobs = MapBlobs::default()
        .with("ois-ref.prog", &[1, 2, 3])
        .with("ois-ref.coeff", &[4, 5]);

    let outcome = download(&mut config, legacy(), &mut bus, &mut blobs).unwrap();

    assert_eq!(outcome, DownloadOutcome::Completed { units: 0, bytes: 5 });
    assert_eq!(
        bus.writes(),
        vec![
            &Transaction::SequentialWrite {
                base_address: 0x80,
                data: vec![1, 2, 3],
                mode: SequentialMode::Burst,
            },
            &Transaction::SequentialWrite {
                base_address: 0x81,
                data: vec![4, 5],
                mode: SequentialMode::Burst,
            },
        ]
    );
}

#[test]
fn legacy_shape_needs_both_images() {
    let mut config = FirmwareConfig::default();
    let mut bus = RecordingBus::new();
    let mut blobs = MapBlobs::default().with("ois-ref.prog", &[1]);

    assert_eq!(
        download(&mut config, legacy(), &mut bus, &mut blobs),
        Err(Error::BlobNotFound)
    );
}
