//! Partition parsing: superblock, allocation table region and root
//! directory, including nested sub-partitions.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use fatx_io::ReadBeExt;
use tracing::debug;

use crate::error::Result;
use crate::structures::raw::constants::{ENTRY_SIZE, FAT_REGION_ALIGN, FAT_REGION_OFFSET};
use crate::structures::{AllocationTable, EntryRecord, ParsedRecord, Superblock, TableWidth};

use super::{DriveCtx, FileEntry, FolderEntry, PartitionCtx};

/// Root-level files with this name back a nested partition.
pub(crate) const EXTENDED_PARTITION_NAME: &str = "extendedsystem.partition";

/// One FATX volume region on a drive.
pub struct Partition {
    pub(crate) ctx: Arc<PartitionCtx>,
    name: String,
    folders: Vec<FolderEntry>,
    files: Vec<FileEntry>,
    sub_partitions: Vec<Partition>,
}

impl Partition {
    /// Parses the volume at `base`; `Ok(None)` means the region is not a
    /// valid FATX partition (bad magic, unreadable, or an empty root).
    pub(crate) fn parse(
        drive: &Arc<DriveCtx>,
        base: u64,
        size: u64,
        name: &str,
    ) -> Result<Option<Partition>> {
        let (superblock, fat_buf) = {
            let mut io = drive.io();
            if io.seek(SeekFrom::Start(base)).is_err() {
                return Ok(None);
            }
            let header: [u8; 16] = match io.read_array() {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let Some(superblock) = Superblock::parse(&header) else {
                debug!(base, name, "no FATX superblock, skipping region");
                return Ok(None);
            };
            if superblock.sectors_per_block == 0 {
                return Ok(None);
            }

            let block_size = superblock.sectors_per_block as u64 * drive.sector_size as u64;
            let block_count = (size / block_size) as u32;
            let width = TableWidth::for_block_count(block_count);
            let fat_size = (block_count as u64 * width.entry_size() as u64
                + (FAT_REGION_ALIGN as u64 - 1))
                & !(FAT_REGION_ALIGN as u64 - 1);

            let mut fat_buf = vec![0u8; fat_size as usize];
            io.seek(SeekFrom::Start(base + FAT_REGION_OFFSET))?;
            match io.read_exact(&mut fat_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e.into()),
            }
            (superblock, fat_buf)
        };

        let block_size = superblock.sectors_per_block * drive.sector_size;
        let fat_size = fat_buf.len() as u32;
        let width = TableWidth::for_block_count((size / block_size as u64) as u32);
        // Blocks addressable in the data region, after the superblock and
        // FAT regions are taken out.
        let data_blocks =
            (size.saturating_sub(FAT_REGION_OFFSET + fat_size as u64) / block_size as u64) as u32;
        let table = AllocationTable::new(fat_buf, data_blocks, width);

        let ctx = Arc::new(PartitionCtx {
            drive: drive.clone(),
            base,
            block_size,
            fat_size,
            root_block: superblock.root_dir_block,
            block_count: data_blocks,
            width,
            table: Mutex::new(table),
        });

        let (files, folders) = scan_directory(&ctx, superblock.root_dir_block)?;

        // Root files carrying the extended-system-partition marker name back
        // a nested volume; parse it and promote it out of the file list.
        let mut root_files = Vec::with_capacity(files.len());
        let mut sub_partitions = Vec::new();
        for file in files {
            if file.name().eq_ignore_ascii_case(EXTENDED_PARTITION_NAME) {
                if let Some(offset) = ctx.block_to_offset(file.start_block()) {
                    if let Some(sub) =
                        Partition::parse(drive, offset, file.size() as u64, file.name())?
                    {
                        sub_partitions.push(sub);
                        continue;
                    }
                }
            }
            root_files.push(file);
        }

        if folders.is_empty() && root_files.is_empty() && sub_partitions.is_empty() {
            debug!(base, name, "partition has an empty root, skipping");
            return Ok(None);
        }

        debug!(
            base,
            name,
            block_size,
            blocks = data_blocks,
            width = ?width,
            files = root_files.len(),
            folders = folders.len(),
            "parsed partition"
        );

        Ok(Some(Partition {
            ctx,
            name: name.to_owned(),
            folders,
            files: root_files,
            sub_partitions,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root-level folders. Deeper levels are discovered through
    /// [`FolderEntry::read_contents`].
    pub fn folders(&self) -> &[FolderEntry] {
        &self.folders
    }

    pub fn folders_mut(&mut self) -> &mut [FolderEntry] {
        &mut self.folders
    }

    /// Root-level files, excluding any promoted to sub-partitions.
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut [FileEntry] {
        &mut self.files
    }

    /// Nested partitions backed by extended-system-partition files.
    pub fn sub_partitions(&self) -> &[Partition] {
        &self.sub_partitions
    }

    pub fn sub_partitions_mut(&mut self) -> &mut [Partition] {
        &mut self.sub_partitions
    }

    pub fn block_size(&self) -> u32 {
        self.ctx.block_size
    }

    pub fn block_count(&self) -> u32 {
        self.ctx.block_count
    }

    pub fn table_width(&self) -> TableWidth {
        self.ctx.width
    }
}

/// Scans one directory level: walks `start_block`'s chain and decodes the
/// fixed-size records in each block sequentially.
///
/// Tombstoned records are skipped; an uninitialized or corrupt record ends
/// the scan of its block (but not of later chain blocks). Valid records are
/// split into file and folder lists.
pub(crate) fn scan_directory(
    ctx: &Arc<PartitionCtx>,
    start_block: u32,
) -> Result<(Vec<FileEntry>, Vec<FolderEntry>)> {
    let chain = ctx.table().chain(start_block);
    let mut files = Vec::new();
    let mut folders = Vec::new();

    let mut io = ctx.drive.io();
    for block in chain {
        let Some(block_offset) = ctx.block_to_offset(block) else {
            break;
        };
        for slot in 0..ctx.entries_per_block() as u64 {
            let record_offset = block_offset + slot * ENTRY_SIZE as u64;
            io.seek(SeekFrom::Start(record_offset))?;
            let bytes: [u8; ENTRY_SIZE] = io.read_array()?;
            match EntryRecord::parse(&bytes, record_offset) {
                ParsedRecord::Valid(record) if record.is_folder() => {
                    folders.push(FolderEntry::new(record, ctx.clone()));
                }
                ParsedRecord::Valid(record) => {
                    files.push(FileEntry::new(record, ctx.clone()));
                }
                ParsedRecord::Tombstone => continue,
                ParsedRecord::EndOfScan => break,
            }
        }
    }

    Ok((files, folders))
}

/// Writes a record back to its slot in the directory region.
pub(crate) fn write_record(ctx: &PartitionCtx, record: &EntryRecord) -> Result<()> {
    let bytes = record.serialize();
    let mut io = ctx.drive.io();
    io.seek(SeekFrom::Start(record.offset()))?;
    io.write_all(&bytes)?;
    io.flush()?;
    Ok(())
}
