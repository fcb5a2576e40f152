//! End-to-end scenarios from spec.md §8: small on-disk PHDI images (a
//! descriptor plus one or two backing files) built in a temp directory and
//! read back through the public [`phdi_rs::PhdiHandle`] facade.

use std::io::SeekFrom;
use std::path::Path;

use phdi_rs::{PhdiError, PhdiHandle};
use tempfile::tempdir;

const SECTOR: u64 = 512;
const SPARSE_HEADER_SIZE: usize = 64;

fn sparse_header(
    block_size_sectors: u32,
    bat_entry_count: u32,
    sector_count: u64,
    data_start_sector: u32,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SPARSE_HEADER_SIZE);
    buf.extend_from_slice(b"WithoutFreeSpace");
    buf.extend_from_slice(&2u32.to_le_bytes()); // format_version
    buf.extend_from_slice(&0u32.to_le_bytes()); // number_of_heads
    buf.extend_from_slice(&0u32.to_le_bytes()); // number_of_cylinders
    buf.extend_from_slice(&block_size_sectors.to_le_bytes());
    buf.extend_from_slice(&bat_entry_count.to_le_bytes());
    buf.extend_from_slice(&sector_count.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // in_use
    buf.extend_from_slice(&data_start_sector.to_le_bytes());
    buf.extend_from_slice(&[0u8; 12]); // reserved
    assert_eq!(buf.len(), SPARSE_HEADER_SIZE);
    buf
}

/// Writes a sparse (`Compressed`) image file at `path`. `blocks[i]` is
/// `Some(fill_byte)` for an allocated block filled uniformly with that byte,
/// or `None` for a hole (BAT entry 0). Blocks are packed back-to-back
/// starting at `data_start_sector`.
fn write_sparse_image(path: &Path, block_bytes: u64, blocks: &[Option<u8>]) {
    let block_size_sectors = (block_bytes / SECTOR) as u32;
    let data_start_sector = 1u32; // header+BAT fit in sector 0 for these small tests
    let bat_entry_count = blocks.len() as u32;
    let sector_count = blocks.len() as u64 * block_size_sectors as u64;

    let mut file = sparse_header(block_size_sectors, bat_entry_count, sector_count, data_start_sector);

    let mut next_sector = data_start_sector;
    let mut bat_entries = Vec::with_capacity(blocks.len());
    let mut data = Vec::new();
    for block in blocks {
        match block {
            Some(fill) => {
                bat_entries.push(next_sector);
                data.extend(std::iter::repeat(*fill).take(block_bytes as usize));
                next_sector += block_size_sectors;
            }
            None => bat_entries.push(0u32),
        }
    }

    for entry in &bat_entries {
        file.extend_from_slice(&entry.to_le_bytes());
    }
    let data_start_byte = data_start_sector as usize * SECTOR as usize;
    file.resize(data_start_byte, 0);
    file.extend_from_slice(&data);

    std::fs::write(path, file).unwrap();
}

fn descriptor_xml(disk_size_sectors: u64, image_guid: &str, image_type: &str, filename: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Parallels_disk_image>
  <Disk_Parameters>
    <Disk_size>{disk_size_sectors}</Disk_size>
  </Disk_Parameters>
  <StorageData>
    <Storage>
      <Start>0</Start>
      <End>{disk_size_sectors}</End>
      <Image>
        <GUID>{image_guid}</GUID>
        <Type>{image_type}</Type>
        <File>{filename}</File>
      </Image>
    </Storage>
  </StorageData>
</Parallels_disk_image>"#
    )
}

fn open(dir: &Path) -> PhdiHandle {
    let handle = PhdiHandle::new();
    handle.open(&dir.join("disk.phdi")).unwrap();
    handle
}

/// Scenario 1: Plain, one extent.
#[test]
fn plain_one_extent() {
    let dir = tempdir().unwrap();
    let size = 2 * 1024 * 1024u64;
    let mut payload = vec![0u8; size as usize];
    for (i, b) in payload.iter_mut().enumerate() {
        *b = (i % 256) as u8;
    }
    std::fs::write(dir.path().join("disk.hdd"), &payload).unwrap();
    std::fs::write(
        dir.path().join("disk.phdi"),
        descriptor_xml(size / SECTOR, "{5fbaabe1-6958-40ff-9867-0b2c8af75f5c}", "Plain", "disk.hdd"),
    )
    .unwrap();

    let handle = open(dir.path());
    assert_eq!(handle.media_size().unwrap(), size);

    let mut buf = [0u8; 16];
    assert_eq!(handle.read_at_offset(0, &mut buf).unwrap(), 16);
    assert_eq!(&buf, &payload[..16]);

    let mut buf = [0u8; 16];
    let n = handle.read_at_offset(size - 8, &mut buf).unwrap();
    assert_eq!(n, 8);
    assert_eq!(&buf[..8], &payload[payload.len() - 8..]);
}

/// Scenario 2 & 3: Sparse, fully allocated, and with a hole.
#[test]
fn sparse_fully_allocated_and_with_hole() {
    let dir = tempdir().unwrap();
    let block_bytes = 2048u64 * SECTOR; // 1 MiB
    write_sparse_image(&dir.path().join("a.hds"), block_bytes, &[Some(0xCD), Some(0xEF)]);
    std::fs::write(
        dir.path().join("disk.phdi"),
        descriptor_xml(
            2 * block_bytes / SECTOR,
            "{5fbaabe1-6958-40ff-9867-0b2c8af75f5c}",
            "Compressed",
            "a.hds",
        ),
    )
    .unwrap();

    let handle = open(dir.path());
    assert_eq!(handle.media_size().unwrap(), 2 * block_bytes);

    let mut buf = vec![0u8; block_bytes as usize];
    assert_eq!(handle.read_at_offset(0, &mut buf).unwrap(), buf.len());
    assert!(buf.iter().all(|&b| b == 0xCD));

    let mut buf = vec![0u8; block_bytes as usize];
    assert_eq!(handle.read_at_offset(block_bytes, &mut buf).unwrap(), buf.len());
    assert!(buf.iter().all(|&b| b == 0xEF));
}

#[test]
fn sparse_hole_reads_as_zero() {
    let dir = tempdir().unwrap();
    let block_bytes = 2048u64 * SECTOR;
    write_sparse_image(&dir.path().join("a.hds"), block_bytes, &[Some(0xCD), None]);
    std::fs::write(
        dir.path().join("disk.phdi"),
        descriptor_xml(
            2 * block_bytes / SECTOR,
            "{5fbaabe1-6958-40ff-9867-0b2c8af75f5c}",
            "Compressed",
            "a.hds",
        ),
    )
    .unwrap();

    let handle = open(dir.path());
    let mut buf = vec![0xFFu8; block_bytes as usize];
    assert_eq!(handle.read_at_offset(block_bytes, &mut buf).unwrap(), buf.len());
    assert!(buf.iter().all(|&b| b == 0));
}

/// Scenario 4: snapshot chain — a hole in the top (child) image falls
/// through to the parent.
#[test]
fn snapshot_chain_falls_through_hole_to_parent() {
    let dir = tempdir().unwrap();
    let block_bytes = SECTOR; // one sector per block, to keep the fixture small
    let parent_guid = "{00000000-0000-0000-0000-000000000001}";
    let child_guid = "{00000000-0000-0000-0000-000000000002}";

    write_sparse_image(&dir.path().join("parent.hds"), block_bytes, &[Some(0xAA), Some(0xAA)]);
    write_sparse_image(&dir.path().join("child.hds"), block_bytes, &[Some(0xBB), None]);

    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Parallels_disk_image>
  <Disk_Parameters>
    <Disk_size>2</Disk_size>
  </Disk_Parameters>
  <StorageData>
    <Storage>
      <Start>0</Start>
      <End>2</End>
      <Image>
        <GUID>{parent_guid}</GUID>
        <Type>Compressed</Type>
        <File>parent.hds</File>
      </Image>
      <Image>
        <GUID>{child_guid}</GUID>
        <Type>Compressed</Type>
        <File>child.hds</File>
      </Image>
    </Storage>
  </StorageData>
  <Snapshots>
    <TopGUID>{child_guid}</TopGUID>
    <Shot>
      <GUID>{parent_guid}</GUID>
      <ParentGUID></ParentGUID>
    </Shot>
    <Shot>
      <GUID>{child_guid}</GUID>
      <ParentGUID>{parent_guid}</ParentGUID>
    </Shot>
  </Snapshots>
</Parallels_disk_image>"#
    );
    std::fs::write(dir.path().join("disk.phdi"), xml).unwrap();

    let handle = open(dir.path());
    assert_eq!(handle.snapshots_count().unwrap(), 2);

    let mut buf = [0u8; 1];
    assert_eq!(handle.read_at_offset(0, &mut buf).unwrap(), 1);
    assert_eq!(buf[0], 0xBB);

    let mut buf = [0u8; 1];
    assert_eq!(handle.read_at_offset(block_bytes, &mut buf).unwrap(), 1);
    assert_eq!(buf[0], 0xAA);
}

/// Scenario 5: a read spanning two sparse blocks returns bytes from both.
#[test]
fn cross_block_read_spans_two_blocks() {
    let dir = tempdir().unwrap();
    let block_bytes = 65_536u64;
    write_sparse_image(&dir.path().join("a.hds"), block_bytes, &[Some(1), Some(2)]);
    std::fs::write(
        dir.path().join("disk.phdi"),
        descriptor_xml(
            2 * block_bytes / SECTOR,
            "{5fbaabe1-6958-40ff-9867-0b2c8af75f5c}",
            "Compressed",
            "a.hds",
        ),
    )
    .unwrap();

    let handle = open(dir.path());
    let mut buf = [0u8; 12];
    let n = handle.read_at_offset(block_bytes - 6, &mut buf).unwrap();
    assert_eq!(n, 12);
    assert_eq!(&buf[..6], &[1u8; 6]);
    assert_eq!(&buf[6..], &[2u8; 6]);
}

/// Scenario 6: a descriptor that doesn't start with an XML element fails
/// the signature gate before any parsing is attempted.
#[test]
fn invalid_signature_is_rejected() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("disk.phdi"), b"not an xml file at all").unwrap();

    let handle = PhdiHandle::new();
    let err = handle.open(&dir.path().join("disk.phdi")).unwrap_err();
    assert!(matches!(err, PhdiError::UnsupportedFormat(_)));
}

/// The signature gate checks the literal `<?xml` prologue (spec.md §4.9
/// step 1 / §8), not just "starts with `<`" — a well-formed-looking root
/// element with no `<?xml` prologue must still be rejected before parsing.
#[test]
fn angle_bracket_prefixed_descriptor_without_xml_prologue_is_rejected() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("disk.phdi"),
        "<Parallels_disk_image><Disk_Parameters><Disk_size>1</Disk_size></Disk_Parameters></Parallels_disk_image>",
    )
    .unwrap();

    let handle = PhdiHandle::new();
    let err = handle.open(&dir.path().join("disk.phdi")).unwrap_err();
    assert!(matches!(err, PhdiError::UnsupportedFormat(_)));
}

/// Boundary behaviours from spec.md §8.
#[test]
fn boundary_reads_and_seeks() {
    let dir = tempdir().unwrap();
    let size = 4096u64;
    std::fs::write(dir.path().join("disk.hdd"), vec![0x42u8; size as usize]).unwrap();
    std::fs::write(
        dir.path().join("disk.phdi"),
        descriptor_xml(size / SECTOR, "{5fbaabe1-6958-40ff-9867-0b2c8af75f5c}", "Plain", "disk.hdd"),
    )
    .unwrap();

    let handle = open(dir.path());

    let mut buf = [0u8; 16];
    assert_eq!(handle.read_at_offset(size, &mut buf).unwrap(), 0);

    let mut buf = [0u8; 4096];
    assert_eq!(handle.read_at_offset(size - 1024, &mut buf).unwrap(), 1024);

    let mut empty = [0u8; 0];
    assert_eq!(handle.read_at_offset(0, &mut empty).unwrap(), 0);

    assert_eq!(handle.seek(SeekFrom::Start(100)).unwrap(), 100);
    assert_eq!(handle.offset().unwrap(), 100);
    assert_eq!(handle.seek(SeekFrom::Current(10)).unwrap(), 110);
    assert_eq!(handle.offset().unwrap(), 110);
    assert_eq!(handle.seek(SeekFrom::End(0)).unwrap(), size);
}

/// Two sequential positional reads of the same range return identical bytes
/// (cache correctness, not just plain-file correctness).
#[test]
fn repeated_reads_are_identical() {
    let dir = tempdir().unwrap();
    let block_bytes = 4096u64;
    write_sparse_image(&dir.path().join("a.hds"), block_bytes, &[Some(0x77), Some(0x88)]);
    std::fs::write(
        dir.path().join("disk.phdi"),
        descriptor_xml(
            2 * block_bytes / SECTOR,
            "{5fbaabe1-6958-40ff-9867-0b2c8af75f5c}",
            "Compressed",
            "a.hds",
        ),
    )
    .unwrap();

    let handle = open(dir.path());
    let mut first = [0u8; 100];
    let mut second = [0u8; 100];
    handle.read_at_offset(10, &mut first).unwrap();
    handle.read_at_offset(10, &mut second).unwrap();
    assert_eq!(first, second);
}
