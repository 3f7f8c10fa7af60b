//! Corruption detection tests
//!
//! Damaged files must fail with a classified error or load with warnings;
//! nothing may loop forever or read past the image.

use byteorder::{ByteOrder, LittleEndian};
use compound_rs::{
    CompoundError, CompoundFile, FileMagic, Filesystem, IntegrityIssue, Options, SectorSize,
};

const SECTOR: usize = 512;
const RECORD: usize = 128;

/// Surface load warnings with RUST_LOG=compound_rs=warn
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn sector_offset(sector: u32) -> usize {
    (sector as usize + 1) * SECTOR
}

/// Offset of the allocation table slot for `sector` (single table sector)
fn slot_offset(bytes: &[u8], sector: u32) -> usize {
    let table = LittleEndian::read_u32(&bytes[76..80]);
    sector_offset(table) + sector as usize * 4
}

fn set_slot(bytes: &mut [u8], sector: u32, value: u32) {
    let offset = slot_offset(bytes, sector);
    LittleEndian::write_u32(&mut bytes[offset..offset + 4], value);
}

fn record_offset(bytes: &[u8], index: usize) -> usize {
    record_offset_sized(bytes, index, SECTOR)
}

fn record_offset_sized(bytes: &[u8], index: usize, sector: usize) -> usize {
    let directory = LittleEndian::read_u32(&bytes[48..52]) as usize;
    (directory + 1) * sector + index * RECORD
}

/// Image holding a single 5000-byte document "Doc" as record 1
fn image_with_doc(sector_size: SectorSize) -> Vec<u8> {
    let options = Options::new().with_sector_size(sector_size);
    let mut fs = Filesystem::create_empty(options).unwrap();
    let root = fs.root();
    fs.create_document(root, "Doc", &[7u8; 5000]).unwrap();
    fs.into_bytes().unwrap()
}

/// A recorded size far past the chain must fail reads and saves with a
/// classified error and show up in the integrity report
fn assert_oversized_size_rejected(bytes: Vec<u8>) {
    let mut fs = Filesystem::open(bytes).unwrap();
    let id = fs.resolve("Doc").unwrap();

    let err = fs.read_document(id).unwrap_err();
    assert!(matches!(err, CompoundError::CorruptDirectory(_)), "{:?}", err);
    assert!(err.is_corruption());

    let report = fs.check_integrity().unwrap();
    assert!(report
        .issues
        .iter()
        .any(|issue| matches!(issue, IntegrityIssue::LengthMismatch { .. })));

    let mut sink = Vec::new();
    assert!(fs.write_to(&mut sink).unwrap_err().is_corruption());
    fs.flush().unwrap();
}

/// Image with one big document; returns the bytes and its chain
fn image_with_big_document() -> (Vec<u8>, Vec<u32>) {
    let mut fs = Filesystem::new().unwrap();
    let root = fs.root();
    let id = fs.create_document(root, "Doc", &[9u8; 5000]).unwrap();
    let (_, chain) = fs.document_chain(id).unwrap();
    (fs.into_bytes().unwrap(), chain)
}

#[test]
fn test_document_chain_loop_is_rejected() {
    let (mut bytes, chain) = image_with_big_document();
    // chain[0] -> chain[1] -> chain[2] -> chain[0]
    set_slot(&mut bytes, chain[2], chain[0]);

    let fs = Filesystem::open(bytes).unwrap();
    let id = fs.resolve("Doc").unwrap();
    let err = fs.read_document(id).unwrap_err();
    assert!(matches!(err, CompoundError::ChainLoop { .. }), "{:?}", err);
    assert!(err.is_corruption());

    let report = fs.check_integrity().unwrap();
    assert!(report
        .issues
        .iter()
        .any(|issue| matches!(issue, IntegrityIssue::BrokenChain { .. })));
}

#[test]
fn test_directory_chain_loop_fails_load() {
    let (mut bytes, _) = image_with_big_document();
    let directory = LittleEndian::read_u32(&bytes[48..52]);
    set_slot(&mut bytes, directory, directory);

    let err = Filesystem::open(bytes).unwrap_err();
    assert!(matches!(err, CompoundError::ChainLoop { .. }), "{:?}", err);
}

#[test]
fn test_link_out_of_range() {
    let (mut bytes, chain) = image_with_big_document();
    set_slot(&mut bytes, chain[1], 50_000);

    let fs = Filesystem::open(bytes).unwrap();
    let id = fs.resolve("Doc").unwrap();
    let err = fs.read_document(id).unwrap_err();
    assert!(err.is_corruption(), "{:?}", err);
}

#[test]
fn test_chain_ending_early() {
    let (mut bytes, chain) = image_with_big_document();
    set_slot(&mut bytes, chain[4], 0xFFFF_FFFE);

    let fs = Filesystem::open(bytes).unwrap();
    let id = fs.resolve("Doc").unwrap();
    assert!(fs.read_document(id).unwrap_err().is_corruption());

    let report = fs.check_integrity().unwrap();
    assert!(report
        .issues
        .iter()
        .any(|issue| matches!(issue, IntegrityIssue::LengthMismatch { .. })));
}

#[test]
fn test_oversized_v3_size() {
    let mut bytes = image_with_doc(SectorSize::V3);
    let offset = record_offset(&bytes, 1);
    // High half is ignored for version 3, the low half still claims 4 GiB
    LittleEndian::write_u64(&mut bytes[offset + 120..offset + 128], u64::MAX);
    assert_oversized_size_rejected(bytes);
}

#[test]
fn test_oversized_v4_size() {
    let mut bytes = image_with_doc(SectorSize::V4);
    let offset = record_offset_sized(&bytes, 1, 4096);
    LittleEndian::write_u64(&mut bytes[offset + 120..offset + 128], u64::MAX);
    assert_oversized_size_rejected(bytes);
}

#[test]
fn test_out_of_range_filetime_is_unset() {
    let mut bytes = image_with_doc(SectorSize::V3);
    let offset = record_offset(&bytes, 1);
    LittleEndian::write_u64(&mut bytes[offset + 100..offset + 108], 0x8000_0000_0000_0000);
    LittleEndian::write_u64(&mut bytes[offset + 108..offset + 116], u64::MAX);

    let file = CompoundFile::from_bytes(bytes).unwrap();
    let info = file.metadata("Doc").unwrap();
    assert_eq!(info.created, None);
    assert_eq!(info.modified, None);
    assert_eq!(file.list_children("").unwrap().len(), 1);
    assert_eq!(file.read("Doc").unwrap(), vec![7u8; 5000]);
}

#[test]
fn test_truncated_image() {
    let (mut bytes, chain) = image_with_big_document();
    let last = *chain.last().unwrap();
    bytes.truncate(sector_offset(last));

    let fs = Filesystem::open(bytes).unwrap();
    let id = fs.resolve("Doc").unwrap();
    let err = fs.read_document(id).unwrap_err();
    assert!(matches!(err, CompoundError::Truncated { .. }), "{:?}", err);
}

#[test]
fn test_degraded_record_is_skipped() {
    init_tracing();
    let mut fs = Filesystem::new().unwrap();
    let root = fs.root();
    fs.create_document(root, "A", b"first").unwrap();
    fs.create_document(root, "B", b"second").unwrap();
    let mut bytes = fs.into_bytes().unwrap();

    let offset = record_offset(&bytes, 1);
    bytes[offset + 66] = 9;

    let loaded = Filesystem::load(bytes.clone(), Options::default()).unwrap();
    assert_eq!(loaded.warnings.len(), 1);
    let fs = loaded.filesystem;
    assert_eq!(fs.children(fs.root()).unwrap().len(), 1);

    let strict = Options::new().with_strict_directory(true);
    let err = Filesystem::load(bytes, strict).unwrap_err();
    assert!(matches!(err, CompoundError::CorruptDirectory(_)));
}

#[test]
fn test_bad_root_record_fails_load() {
    let fs = Filesystem::new().unwrap();
    let mut bytes = fs.into_bytes().unwrap();
    let offset = record_offset(&bytes, 0);
    bytes[offset + 66] = 9;

    let err = Filesystem::open(bytes).unwrap_err();
    assert!(matches!(err, CompoundError::CorruptDirectory(_)));
    assert!(err.is_corruption());
}

#[test]
fn test_format_mismatch_is_classified() {
    let cases: Vec<(Vec<u8>, FileMagic)> = vec![
        (Vec::new(), FileMagic::Empty),
        (b"PK\x03\x04\x14\x00\x06\x00".to_vec(), FileMagic::Ooxml),
        (b"%PDF-1.7\n".to_vec(), FileMagic::Pdf),
        (b"{\\rtf1\\ansi".to_vec(), FileMagic::Rtf),
    ];
    for (bytes, expected) in cases {
        match Filesystem::open(bytes) {
            Err(CompoundError::NotCompoundFile { detected }) => assert_eq!(detected, expected),
            other => panic!("expected format mismatch, got {:?}", other.map(|_| ())),
        }
    }
}

#[test]
fn test_bad_sector_shift() {
    let mut bytes = Filesystem::new().unwrap().into_bytes().unwrap();
    bytes[30] = 10;
    let err = Filesystem::open(bytes).unwrap_err();
    assert!(matches!(
        err,
        CompoundError::UnsupportedSectorShift { shift: 10 }
    ));
    assert!(err.is_format_mismatch());
}

#[test]
fn test_duplicate_table_locator() {
    let mut fs = Filesystem::new().unwrap();
    let root = fs.root();
    fs.create_document(root, "Large", &vec![1u8; 200 * SECTOR]).unwrap();
    let mut bytes = fs.into_bytes().unwrap();

    // Point the second table locator at the first table sector
    let first = LittleEndian::read_u32(&bytes[76..80]);
    LittleEndian::write_u32(&mut bytes[80..84], first);

    let err = Filesystem::open(bytes).unwrap_err();
    assert!(err.is_corruption(), "{:?}", err);
}
