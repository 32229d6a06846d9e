//! End-to-end tests against an in-memory memory-unit image.
//!
//! The fixture builds a minimal but well-formed device: a zeroed cache
//! region (skipped during load) and a content partition with a 2 KiB block
//! size, a 16-bit allocation table and a single empty folder in the root.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fatx::structures::TableWidth;
use fatx::{AddMode, Drive, DriveKind, Error, PackageParser, ReadSeek};
use pretty_assertions::assert_eq;

const SECTOR: usize = 0x200;
const CONTENT_BASE: usize = 0x7F_F000;
const CONTENT_SIZE: usize = 0x10_0000;
const BLOCK: usize = 0x800;
/// Superblock page + the 1 KiB table rounded up to 4 KiB.
const DATA_START: usize = CONTENT_BASE + 0x2000;

fn block_offset(block: usize) -> usize {
    DATA_START + (block - 1) * BLOCK
}

fn set_fat16(image: &mut [u8], block: usize, value: u16) {
    let offset = CONTENT_BASE + 0x1000 + block * 2;
    image[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

fn dir_record(name: &str, start: u32, size: u32, folder: bool) -> [u8; 64] {
    let mut bytes = [0u8; 64];
    bytes[0] = name.len() as u8;
    bytes[1] = if folder { 0x10 } else { 0 };
    bytes[2..2 + name.len()].copy_from_slice(name.as_bytes());
    bytes[0x2C..0x30].copy_from_slice(&start.to_be_bytes());
    bytes[0x30..0x34].copy_from_slice(&size.to_be_bytes());
    bytes[0x34..0x38].copy_from_slice(&0x3E71_AB85_u32.to_be_bytes());
    bytes[0x38..0x3C].copy_from_slice(&0x3E71_AB85_u32.to_be_bytes());
    bytes[0x3C..0x40].copy_from_slice(&0x3E71_AB85_u32.to_be_bytes());
    bytes
}

/// A memory unit whose content partition holds one empty folder, "Sample",
/// in directory block 2.
fn mu_image() -> Vec<u8> {
    let mut image = vec![0u8; CONTENT_BASE + CONTENT_SIZE];
    image[CONTENT_BASE..CONTENT_BASE + 4].copy_from_slice(b"XTAF");
    image[CONTENT_BASE + 4..CONTENT_BASE + 8].copy_from_slice(&0x0123_4567_u32.to_be_bytes());
    image[CONTENT_BASE + 8..CONTENT_BASE + 12].copy_from_slice(&4_u32.to_be_bytes());
    image[CONTENT_BASE + 12..CONTENT_BASE + 16].copy_from_slice(&1_u32.to_be_bytes());
    // Root chain and the folder's single directory block.
    set_fat16(&mut image, 1, 0xFFFF);
    set_fat16(&mut image, 2, 0xFFFF);
    let record = dir_record("Sample", 2, 0, true);
    image[DATA_START..DATA_START + 64].copy_from_slice(&record);
    image
}

fn open(image: Vec<u8>) -> Drive {
    Drive::from_stream(Box::new(Cursor::new(image))).expect("fixture image must parse")
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn extract_bytes(file: &fatx::FileEntry) -> Vec<u8> {
    let mut out = Vec::new();
    file.extract(&mut out).expect("extract");
    out
}

#[test]
fn detects_memory_unit_layout() {
    let drive = open(mu_image());
    assert_eq!(drive.kind(), DriveKind::MemoryUnit);
    assert_eq!(drive.sector_size(), SECTOR as u32);

    // The zeroed cache region has no superblock and must be skipped.
    assert_eq!(drive.partitions().len(), 1);
    let content = &drive.partitions()[0];
    assert_eq!(content.name(), "Content");
    assert_eq!(content.block_size(), BLOCK as u32);
    assert_eq!(content.table_width(), TableWidth::Fatx16);
    assert_eq!(content.folders().len(), 1);
    assert_eq!(content.folders()[0].name(), "Sample");
    assert!(content.files().is_empty());
}

#[test]
fn add_and_extract_round_trip() {
    let mut drive = open(mu_image());
    let folder = drive.partitions()[0].folders()[0].clone();

    // Deliberately not a block multiple, so the last block is partial.
    let data = pattern(3000);
    let file = folder.add_file("save.dat", &data, AddMode::Fail).unwrap();
    assert_eq!(file.size(), 3000);
    assert_eq!(extract_bytes(&file), data);

    // The entry must survive a full reload from the device.
    drive.reload().unwrap();
    let contents = drive.read_dir("Content/Sample").unwrap();
    assert_eq!(contents.files.len(), 1);
    assert_eq!(contents.files[0].name(), "save.dat");
    assert_eq!(extract_bytes(&contents.files[0]), data);
}

#[test]
fn inject_grows_and_shrinks_in_place() {
    let drive = open(mu_image());
    let folder = drive.partitions()[0].folders()[0].clone();

    let mut file = folder.add_file("game.sav", &pattern(1000), AddMode::Fail).unwrap();
    let start = file.start_block();

    let grown = pattern(5000);
    file.inject(&grown).unwrap();
    assert_eq!(file.start_block(), start, "inject keeps the start block");
    assert_eq!(file.size(), 5000);
    assert_eq!(extract_bytes(&file), grown);

    let shrunk = pattern(100);
    file.inject(&shrunk).unwrap();
    assert_eq!(file.start_block(), start);
    assert_eq!(file.size(), 100);
    assert_eq!(extract_bytes(&file), shrunk);
}

#[test]
fn shrinking_inject_frees_blocks_for_reuse() {
    let drive = open(mu_image());
    let folder = drive.partitions()[0].folders()[0].clone();

    let mut file = folder.add_file("big.bin", &pattern(5 * BLOCK), AddMode::Fail).unwrap();
    file.inject(&pattern(BLOCK)).unwrap();

    // The four released blocks must be allocatable again.
    let other = folder.add_file("next.bin", &pattern(4 * BLOCK), AddMode::Fail).unwrap();
    assert_eq!(extract_bytes(&other), pattern(4 * BLOCK));
    assert_eq!(extract_bytes(&file), pattern(BLOCK));
}

#[test]
fn replace_moves_to_a_fresh_chain() {
    let drive = open(mu_image());
    let folder = drive.partitions()[0].folders()[0].clone();

    let mut file = folder.add_file("prof.dat", &pattern(1000), AddMode::Fail).unwrap();
    let old_start = file.start_block();

    let data = pattern(3000);
    file.replace(&data).unwrap();
    assert_ne!(file.start_block(), old_start, "replace allocates a new chain");
    assert_eq!(file.size(), 3000);
    assert_eq!(extract_bytes(&file), data);
}

#[test]
fn delete_tombstones_and_frees_the_chain() {
    let mut drive = open(mu_image());
    let folder = drive.partitions()[0].folders()[0].clone();

    let mut file = folder.add_file("temp.bin", &pattern(2000), AddMode::Fail).unwrap();
    file.delete().unwrap();
    assert!(file.is_tombstoned());

    drive.reload().unwrap();
    let contents = drive.read_dir("Content/Sample").unwrap();
    assert!(contents.files.is_empty(), "deleted file must not be listed");

    // Deleting the only file must not disturb its siblings or parent.
    assert_eq!(drive.partitions()[0].folders()[0].name(), "Sample");
}

#[test]
fn duplicate_names_dispatch_on_add_mode() {
    let drive = open(mu_image());
    let folder = drive.partitions()[0].folders()[0].clone();

    folder.add_file("dup.bin", &pattern(100), AddMode::Fail).unwrap();
    match folder.add_file("DUP.BIN", &pattern(100), AddMode::Fail) {
        Err(Error::AlreadyExists(name)) => assert_eq!(name, "DUP.BIN"),
        other => panic!("expected AlreadyExists, got {other:?}"),
    }

    let injected = folder.add_file("dup.bin", &pattern(300), AddMode::Inject).unwrap();
    assert_eq!(injected.size(), 300);

    let replaced = folder.add_file("dup.bin", &pattern(4000), AddMode::Replace).unwrap();
    assert_eq!(replaced.size(), 4000);
    assert_eq!(extract_bytes(&replaced), pattern(4000));
}

#[test]
fn rejects_invalid_names_and_empty_data() {
    let drive = open(mu_image());
    let folder = drive.partitions()[0].folders()[0].clone();

    assert!(matches!(
        folder.add_file("bad/name", &pattern(10), AddMode::Fail),
        Err(Error::InvalidName(_))
    ));
    assert!(matches!(
        folder.add_file("empty.bin", &[], AddMode::Fail),
        Err(Error::EmptyFile)
    ));
    assert!(matches!(folder.add_folder("a:b"), Err(Error::InvalidName(_))));
}

#[test]
fn tombstoned_slots_are_skipped_but_not_terminal() {
    let mut image = mu_image();
    // Slot 1 is a tombstone; slot 2 holds a live file that the scan must
    // still reach.
    let mut dead = dir_record("dead.bin", 3, 10, false);
    dead[0] = 0xE5;
    image[DATA_START + 64..DATA_START + 128].copy_from_slice(&dead);
    let keep = dir_record("keep.bin", 3, 10, false);
    image[DATA_START + 128..DATA_START + 192].copy_from_slice(&keep);
    set_fat16(&mut image, 3, 0xFFFF);
    image[block_offset(3)..block_offset(3) + 10].copy_from_slice(&pattern(10));

    // Slot 3 is uninitialized (all zeros); the well-formed record behind it
    // at slot 4 must be unreachable.
    let ghost = dir_record("ghost.bin", 3, 10, false);
    image[DATA_START + 256..DATA_START + 320].copy_from_slice(&ghost);

    let drive = open(image);
    let content = &drive.partitions()[0];
    assert_eq!(content.files().len(), 1);
    assert_eq!(content.files()[0].name(), "keep.bin");
    assert_eq!(extract_bytes(&content.files()[0]), pattern(10));
}

#[test]
fn directory_grows_when_every_slot_is_taken() {
    let mut drive = open(mu_image());
    let folder = drive.partitions()[0].folders()[0].clone();

    // One 2 KiB directory block holds 32 records; the 33rd forces a second
    // block onto the folder's chain.
    let names: Vec<String> = (0..33).map(|i| format!("file{i:02}.bin")).collect();
    for name in &names {
        folder.add_file(name, &pattern(64), AddMode::Fail).unwrap();
    }

    drive.reload().unwrap();
    let contents = drive.read_dir("Content/Sample").unwrap();
    assert_eq!(contents.files.len(), 33);
    let mut listed: Vec<&str> = contents.files.iter().map(|f| f.name()).collect();
    listed.sort_unstable();
    let mut expected: Vec<&str> = names.iter().map(String::as_str).collect();
    expected.sort_unstable();
    assert_eq!(listed, expected);
}

#[test]
fn navigates_nested_folders_by_path() {
    let drive = open(mu_image());
    let folder = drive.partitions()[0].folders()[0].clone();

    let nested = folder.add_folder("Nested").unwrap();
    nested.add_file("deep.bin", &pattern(42), AddMode::Fail).unwrap();

    let contents = drive.read_dir("Content/Sample/Nested").unwrap();
    assert_eq!(contents.files.len(), 1);
    assert_eq!(contents.files[0].name(), "deep.bin");
    assert_eq!(extract_bytes(&contents.files[0]), pattern(42));

    assert!(matches!(
        drive.read_dir("Content/NoSuchFolder"),
        Err(Error::NotFound(_))
    ));
    assert!(matches!(drive.read_dir("Bogus"), Err(Error::NotFound(_))));
}

#[test]
fn extracts_folder_trees_to_disk() {
    let drive = open(mu_image());
    let folder = drive.partitions()[0].folders()[0].clone();

    folder.add_file("top.bin", &pattern(500), AddMode::Fail).unwrap();
    let nested = folder.add_folder("Inner").unwrap();
    nested.add_file("leaf.bin", &pattern(1234), AddMode::Fail).unwrap();

    let dir = tempfile::tempdir().unwrap();
    folder.extract(dir.path(), true).unwrap();

    let top = std::fs::read(dir.path().join("Sample/top.bin")).unwrap();
    assert_eq!(top, pattern(500));
    let leaf = std::fs::read(dir.path().join("Sample/Inner/leaf.bin")).unwrap();
    assert_eq!(leaf, pattern(1234));
}

#[test]
fn rename_persists_across_reload() {
    let mut drive = open(mu_image());
    let folder = drive.partitions()[0].folders()[0].clone();
    let mut file = folder.add_file("old.bin", &pattern(100), AddMode::Fail).unwrap();

    file.rename("new.bin").unwrap();
    assert!(matches!(file.rename("x".repeat(43).as_str()), Err(Error::InvalidName(_))));

    drive.reload().unwrap();
    let contents = drive.read_dir("Content/Sample").unwrap();
    assert_eq!(contents.files[0].name(), "new.bin");
}

#[test]
fn lists_nested_sub_partitions() {
    let mut image = mu_image();

    // A 256 KiB inner volume living in the outer partition's data region,
    // referenced by a root file with the extended-system-partition name.
    let inner_size = 0x4_0000_u32;
    let inner_base = block_offset(3);
    let record = dir_record("extendedsystem.partition", 3, inner_size, false);
    image[DATA_START + 64..DATA_START + 128].copy_from_slice(&record);
    let inner_blocks = inner_size as usize / BLOCK;
    for i in 0..inner_blocks {
        let next = if i == inner_blocks - 1 { 0xFFFF } else { (3 + i + 1) as u16 };
        set_fat16(&mut image, 3 + i, next);
    }

    // Inner superblock: one sector per block, root in block 1.
    image[inner_base..inner_base + 4].copy_from_slice(b"XTAF");
    image[inner_base + 8..inner_base + 12].copy_from_slice(&1_u32.to_be_bytes());
    image[inner_base + 12..inner_base + 16].copy_from_slice(&1_u32.to_be_bytes());
    // Inner FAT16: root chain plus one file chain.
    let inner_fat = inner_base + 0x1000;
    image[inner_fat + 2..inner_fat + 4].copy_from_slice(&0xFFFF_u16.to_be_bytes());
    image[inner_fat + 4..inner_fat + 6].copy_from_slice(&0xFFFF_u16.to_be_bytes());
    // Inner root: a single 16-byte file in inner block 2.
    let inner_data = inner_base + 0x2000;
    let inner_file = dir_record("inner.bin", 2, 16, false);
    image[inner_data..inner_data + 64].copy_from_slice(&inner_file);
    let file_data = inner_data + SECTOR;
    image[file_data..file_data + 16].copy_from_slice(&pattern(16));

    let drive = open(image);
    let content = &drive.partitions()[0];
    assert!(content.files().is_empty(), "the backing file is promoted");
    assert_eq!(content.sub_partitions().len(), 1);

    let sub = &content.sub_partitions()[0];
    assert_eq!(sub.name(), "extendedsystem.partition");
    assert_eq!(sub.block_size(), SECTOR as u32);
    assert_eq!(sub.files().len(), 1);
    assert_eq!(sub.files()[0].name(), "inner.bin");
    assert_eq!(extract_bytes(&sub.files()[0]), pattern(16));

    // Path navigation may hop through the sub-partition.
    let listed = drive.read_dir("Content/extendedsystem.partition").unwrap();
    assert_eq!(listed.files.len(), 1);
}

#[test]
fn dumps_the_exact_image() {
    let image = mu_image();
    let drive = open(image.clone());
    let mut dumped = Vec::new();
    drive.extract_image(&mut dumped).unwrap();
    assert_eq!(dumped.len(), image.len());
    assert!(dumped == image, "dump must be byte-identical to the device");
}

#[test]
fn restore_overwrites_and_reloads() {
    let mut drive = open(mu_image());

    // A second image with one extra root file.
    let mut other = mu_image();
    let record = dir_record("extra.bin", 3, 4, false);
    other[DATA_START + 64..DATA_START + 128].copy_from_slice(&record);
    set_fat16(&mut other, 3, 0xFFFF);
    other[block_offset(3)..block_offset(3) + 4].copy_from_slice(b"xtra");

    drive.restore_image(&mut Cursor::new(other)).unwrap();
    let contents = drive.read_dir("Content").unwrap();
    assert_eq!(contents.files.len(), 1);
    assert_eq!(contents.files[0].name(), "extra.bin");
    assert_eq!(extract_bytes(&contents.files[0]), b"xtra".to_vec());
}

/// Verifies the bytes visible through the chain-backed stream against the
/// data originally written, seeking from all three origins. An empty
/// expectation means the parser must never have been invoked.
struct StubParser {
    expected: Vec<u8>,
}

impl PackageParser for StubParser {
    fn package_name(&self, stream: &mut dyn ReadSeek) -> fatx::Result<String> {
        if self.expected.is_empty() {
            return Ok("parser invoked unexpectedly".to_owned());
        }

        // A read straddling the first block boundary.
        stream.seek(SeekFrom::Start(BLOCK as u64 - 8))?;
        let mut straddle = [0u8; 16];
        stream.read_exact(&mut straddle)?;
        if straddle[..] != self.expected[BLOCK - 8..BLOCK + 8] {
            return Err(Error::Package("mismatch across block boundary".to_owned()));
        }

        // Rewind relative to the current position, then re-read.
        stream.seek(SeekFrom::Current(-16))?;
        let mut head = [0u8; 8];
        stream.read_exact(&mut head)?;
        if head[..] != self.expected[BLOCK - 8..BLOCK] {
            return Err(Error::Package("mismatch after relative seek".to_owned()));
        }

        // The logical end is the file size, not the last block's capacity.
        stream.seek(SeekFrom::End(-8))?;
        let mut tail = [0u8; 8];
        stream.read_exact(&mut tail)?;
        if tail[..] != self.expected[self.expected.len() - 8..] {
            return Err(Error::Package("mismatch at end of stream".to_owned()));
        }
        let mut probe = [0u8; 4];
        if stream.read(&mut probe)? != 0 {
            return Err(Error::Package("read past end of stream".to_owned()));
        }

        Ok("Gamer Profile".to_owned())
    }
}

/// Rejects every container, with the magic bytes in the message.
struct RejectingParser;

impl PackageParser for RejectingParser {
    fn package_name(&self, stream: &mut dyn ReadSeek) -> fatx::Result<String> {
        let mut magic = [0u8; 4];
        stream.read_exact(&mut magic)?;
        Err(Error::Package(format!("unknown container magic {magic:02X?}")))
    }
}

#[test]
fn package_name_reads_through_the_chain() {
    let drive = open(mu_image());
    let folder = drive.partitions()[0].folders()[0].clone();

    let data = pattern(3 * BLOCK + 100);
    let file = folder.add_file("package.bin", &data, AddMode::Fail).unwrap();

    let parser = StubParser { expected: data };
    assert_eq!(file.package_name(&parser).unwrap(), "Gamer Profile");
}

#[test]
fn package_lookup_surfaces_parser_errors_with_context() {
    let drive = open(mu_image());
    let folder = drive.partitions()[0].folders()[0].clone();

    let file = folder.add_file("notpkg.bin", &pattern(0x600), AddMode::Fail).unwrap();
    match file.package_name(&RejectingParser) {
        Err(Error::Package(msg)) => assert!(msg.contains("magic"), "unexpected message: {msg}"),
        other => panic!("expected Package error, got {other:?}"),
    }
}

#[test]
fn package_lookup_rejects_undersized_files_before_parsing() {
    let drive = open(mu_image());
    let folder = drive.partitions()[0].folders()[0].clone();

    // 0x4FF bytes is one short of the smallest plausible container.
    let file = folder.add_file("tiny.bin", &pattern(0x4FF), AddMode::Fail).unwrap();
    let parser = StubParser { expected: Vec::new() };
    match file.package_name(&parser) {
        Err(Error::Package(msg)) => assert!(msg.contains("too small"), "unexpected message: {msg}"),
        other => panic!("expected Package error, got {other:?}"),
    }
}

#[test]
fn package_lookup_fails_on_an_entry_without_a_chain() {
    let mut image = mu_image();
    // A record whose start block is 0 (never addressable): large enough to
    // pass the size gate, but backed by no chain at all.
    let orphan = dir_record("orphan.bin", 0, 0x600, false);
    image[DATA_START + 64..DATA_START + 128].copy_from_slice(&orphan);

    let drive = open(image);
    let file = drive.partitions()[0].files()[0].clone();
    assert_eq!(file.name(), "orphan.bin");

    let parser = StubParser { expected: Vec::new() };
    assert!(matches!(file.package_name(&parser), Err(Error::MissingChain)));
}

/// Sector (offset, length) pairs for the devkit partition table, in table
/// order: System, Content, Compatibility.
const DEVKIT_PAIRS: [(u32, u32); 3] = [(0x100, 0x200), (0x300, 0x200), (0x500, 0x200)];

/// Writes a minimal valid volume at `base`: one sector per block, a root in
/// block 1 holding a single 8-byte file in block 2.
fn devkit_volume(image: &mut [u8], base: usize) {
    image[base..base + 4].copy_from_slice(b"XTAF");
    image[base + 8..base + 12].copy_from_slice(&1_u32.to_be_bytes());
    image[base + 12..base + 16].copy_from_slice(&1_u32.to_be_bytes());
    let fat = base + 0x1000;
    image[fat + 2..fat + 4].copy_from_slice(&0xFFFF_u16.to_be_bytes());
    image[fat + 4..fat + 6].copy_from_slice(&0xFFFF_u16.to_be_bytes());
    let data = base + 0x2000;
    let record = dir_record("boot.bin", 2, 8, false);
    image[data..data + 64].copy_from_slice(&record);
    image[data + SECTOR..data + SECTOR + 8].copy_from_slice(b"DEVKIT!!");
}

#[test]
fn detects_devkit_drives_through_the_sector_table() {
    // The image is far too short for any fixed-offset probe to hit, so
    // detection falls through to the scanned table at offset 8.
    let mut image = vec![0u8; 0xE0000];
    for (i, (offset, length)) in DEVKIT_PAIRS.iter().enumerate() {
        let at = 8 + i * 8;
        image[at..at + 4].copy_from_slice(&offset.to_be_bytes());
        image[at + 4..at + 8].copy_from_slice(&length.to_be_bytes());
    }
    for (offset, _) in DEVKIT_PAIRS {
        devkit_volume(&mut image, offset as usize * SECTOR);
    }

    let drive = open(image);
    assert_eq!(drive.kind(), DriveKind::DevHardDrive);

    // Names come from table position, offsets from sector-to-byte scaling.
    let names: Vec<&str> = drive.partitions().iter().map(|p| p.name()).collect();
    assert_eq!(names, ["System", "Content", "Compatibility"]);
    for partition in drive.partitions() {
        assert_eq!(partition.block_size(), SECTOR as u32);
        assert_eq!(partition.table_width(), TableWidth::Fatx16);
        assert_eq!(partition.files().len(), 1);
        assert_eq!(partition.files()[0].name(), "boot.bin");
        assert_eq!(extract_bytes(&partition.files()[0]), b"DEVKIT!!".to_vec());
    }

    // Paths resolve against the scanned layout like any other.
    let listed = drive.read_dir("System").unwrap();
    assert_eq!(listed.files.len(), 1);
}

/// Wraps a cursor and fails every write while the shared flag is set.
struct FaultyStream {
    inner: Cursor<Vec<u8>>,
    fail_writes: Arc<AtomicBool>,
}

impl Read for FaultyStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for FaultyStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl Write for FaultyStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::other("injected write failure"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::other("injected write failure"));
        }
        self.inner.flush()
    }
}

#[test]
fn failed_replace_rolls_back_the_entry() {
    let fail_writes = Arc::new(AtomicBool::new(false));
    let stream = FaultyStream {
        inner: Cursor::new(mu_image()),
        fail_writes: fail_writes.clone(),
    };
    let drive = Drive::from_stream(Box::new(stream)).unwrap();
    let folder = drive.partitions()[0].folders()[0].clone();

    let data = pattern(1000);
    let mut file = folder.add_file("keep.dat", &data, AddMode::Fail).unwrap();
    let start = file.start_block();

    fail_writes.store(true, Ordering::SeqCst);
    assert!(file.replace(&pattern(3000)).is_err());
    fail_writes.store(false, Ordering::SeqCst);

    // The entry still describes the old, readable data.
    assert_eq!(file.start_block(), start);
    assert_eq!(file.size(), 1000);
    assert_eq!(extract_bytes(&file), data);

    // The drive is not stuck busy after the failure.
    assert!(file.inject(&pattern(500)).is_ok());
}
