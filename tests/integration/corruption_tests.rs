//! Damaged and incomplete containers.

use zisraw::format::{DIRECTORY_HEADER_SIZE, DV_FIXED_SIZE, SEGMENT_HEADER_SIZE};
use zisraw::io::MemoryRangeReader;
use zisraw::{
    Container, ContainerError, DirectorySource, IntRect, OpenOptions, SubBlockEntry,
    SubBlockSpec, WriterOptions,
};

use super::test_utils::{build_container, file_header, gray8};

fn sample_container() -> Vec<u8> {
    build_container(WriterOptions::default(), |writer| {
        for m in 0..3 {
            writer
                .add_subblock(
                    SubBlockSpec::new(
                        format!("C0M{}", m).parse().unwrap(),
                        IntRect::new(m * 8, 0, 8, 8),
                    ),
                    &gray8(8, 8, m as u8 + 1),
                )
                .unwrap();
        }
        writer.add_attachment("Label", "JPG", b"label").unwrap();
    })
}

fn open(
    bytes: Vec<u8>,
    source: DirectorySource,
) -> Result<Container<MemoryRangeReader>, ContainerError> {
    Container::from_reader(
        MemoryRangeReader::new(bytes),
        OpenOptions::new().directory_source(source),
    )
}

#[test]
fn test_empty_file_is_corrupt() {
    assert!(matches!(
        open(Vec::new(), DirectorySource::Segment),
        Err(ContainerError::CorruptContainer { .. })
    ));
}

#[test]
fn test_bad_magic_is_corrupt() {
    let mut bytes = sample_container();
    bytes[0] = b'X';
    assert!(matches!(
        open(bytes, DirectorySource::Segment),
        Err(ContainerError::CorruptContainer { .. })
    ));
}

#[test]
fn test_truncated_file_is_corrupt() {
    let bytes = sample_container();
    let directory_position = file_header(&bytes).directory_position as usize;
    let truncated = bytes[..directory_position + 40].to_vec();
    assert!(matches!(
        open(truncated, DirectorySource::Segment),
        Err(ContainerError::CorruptContainer { .. })
    ));

    let header_only = bytes[..100].to_vec();
    assert!(matches!(
        open(header_only, DirectorySource::Segment),
        Err(ContainerError::CorruptContainer { .. })
    ));
}

#[test]
fn test_directory_checksum_is_verified() {
    let mut bytes = sample_container();
    let directory_position = file_header(&bytes).directory_position as usize;
    // A byte of the first entry's file position
    bytes[directory_position + 32 + 128 + 8] ^= 0x01;

    assert!(matches!(
        open(bytes.clone(), DirectorySource::Segment),
        Err(ContainerError::CorruptContainer { .. })
    ));

    // Scanning ignores the directory segment
    let container = open(bytes, DirectorySource::Scan).unwrap();
    assert_eq!(container.directory().len(), 3);
    for m in 0..3 {
        let entry = container
            .find(&format!("C0M{}", m).parse().unwrap(), 0)
            .unwrap()
            .clone();
        let decoded = container.decode_subblock(&entry).unwrap();
        assert_eq!(decoded.data()[0], m as u8 + 1);
    }
    assert_eq!(&container.read_attachment("Label").unwrap()[..], b"label");
}

#[test]
fn test_damaged_subblock_payload_fails_only_that_tile() {
    let mut bytes = sample_container();
    let container = open(bytes.clone(), DirectorySource::Segment).unwrap();
    let entry = container.find(&"C0M1".parse().unwrap(), 0).unwrap().clone();
    drop(container);

    // Corrupt the segment id of the second subblock
    bytes[entry.file_position as usize] = b'?';
    let container = open(bytes, DirectorySource::Segment).unwrap();
    assert!(matches!(
        container.decode_subblock(&entry),
        Err(ContainerError::CorruptContainer { .. })
    ));
    let first = container.find(&"C0M0".parse().unwrap(), 0).unwrap().clone();
    assert!(container.decode_subblock(&first).is_ok());
}

#[test]
fn test_oversized_directory_entry_is_corrupt() {
    let mut bytes = sample_container();
    let entries_start = file_header(&bytes).directory_position as usize
        + SEGMENT_HEADER_SIZE
        + DIRECTORY_HEADER_SIZE;

    let mut entries_end = entries_start;
    for _ in 0..3 {
        let (_, consumed) = SubBlockEntry::parse(&bytes[entries_end..]).unwrap();
        entries_end += consumed;
    }

    // X then Y record of the first entry; size field at offset 8
    for record in 0..2 {
        let size = entries_start + DV_FIXED_SIZE + record * 20 + 8;
        bytes[size..size + 4].copy_from_slice(&i32::MAX.to_le_bytes());
    }
    // Keep the checksum valid so only the geometry is wrong
    let crc = crc32fast::hash(&bytes[entries_start..entries_end]);
    bytes[entries_end..entries_end + 4].copy_from_slice(&crc.to_le_bytes());

    match open(bytes, DirectorySource::Segment) {
        Err(ContainerError::CorruptContainer { reason }) => {
            assert!(reason.contains("pixels"), "{}", reason)
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("oversized entry was accepted"),
    }
}
