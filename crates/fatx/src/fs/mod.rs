//! The drive / partition / entry object model.
//!
//! A [`Drive`] owns the single device stream and a list of parsed
//! [`Partition`]s; entries hold shared read-only handles to their partition
//! and drive contexts instead of owning them, so the parent/child references
//! of the on-disk tree never form ownership cycles.

use std::io::{Seek, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use fatx_io::BlockStream;

use crate::error::{Error, Result};
use crate::structures::raw::constants::{ENTRY_SIZE, FAT_REGION_OFFSET};
use crate::structures::{AllocationTable, TableWidth};

pub mod drive;
pub mod file;
pub mod folder;
pub mod partition;

pub use drive::{Drive, DriveKind};
pub use file::{ChainReader, FileEntry, PackageParser};
pub use folder::{AddMode, FolderContents, FolderEntry};
pub use partition::Partition;

/// Shared per-drive state: the one stream handle and the single-flight
/// operation guard.
pub(crate) struct DriveCtx {
    io: Mutex<Box<dyn BlockStream>>,
    active: AtomicBool,
    pub(crate) sector_size: u32,
    pub(crate) kind: DriveKind,
}

impl DriveCtx {
    pub(crate) fn new(stream: Box<dyn BlockStream>, sector_size: u32, kind: DriveKind) -> Self {
        Self {
            io: Mutex::new(stream),
            active: AtomicBool::new(false),
            sector_size,
            kind,
        }
    }

    /// Claims the drive for one logical operation.
    ///
    /// Non-blocking try-lock semantics: if another operation is in flight
    /// this fails immediately with [`Error::Busy`]. The returned guard
    /// releases the flag when dropped, on every exit path.
    pub(crate) fn begin_op(&self) -> Result<OpGuard<'_>> {
        if self
            .active
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(Error::Busy);
        }
        Ok(OpGuard(self))
    }

    pub(crate) fn io(&self) -> MutexGuard<'_, Box<dyn BlockStream>> {
        // Not poisoned in practice: the drive is single-writer by the
        // active-flag protocol. Recover the guard rather than panic.
        self.io.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Scoped release of the drive's active flag.
pub(crate) struct OpGuard<'a>(&'a DriveCtx);

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.0.active.store(false, Ordering::Release);
    }
}

/// Shared per-partition state: geometry plus the owned allocation table.
///
/// The table is mutated only while the drive's active flag is held, so the
/// mutex sees no contention; it exists to keep the context shareable across
/// the entries that reference it.
pub(crate) struct PartitionCtx {
    pub(crate) drive: Arc<DriveCtx>,
    /// Absolute byte offset of the partition on the device.
    pub(crate) base: u64,
    /// Block size in bytes (sectors-per-block x device sector size).
    pub(crate) block_size: u32,
    /// Size of the FAT region in bytes, rounded up to a 4096 boundary.
    pub(crate) fat_size: u32,
    pub(crate) root_block: u32,
    pub(crate) block_count: u32,
    pub(crate) width: TableWidth,
    pub(crate) table: Mutex<AllocationTable>,
}

impl PartitionCtx {
    pub(crate) fn fat_offset(&self) -> u64 {
        self.base + FAT_REGION_OFFSET
    }

    pub(crate) fn data_start(&self) -> u64 {
        self.base + FAT_REGION_OFFSET + self.fat_size as u64
    }

    pub(crate) fn entries_per_block(&self) -> u32 {
        self.block_size / ENTRY_SIZE as u32
    }

    pub(crate) fn table(&self) -> MutexGuard<'_, AllocationTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Absolute byte offset of a data block, or `None` for the terminal
    /// sentinel, block 0 and out-of-range indices.
    pub(crate) fn block_to_offset(&self, block: u32) -> Option<u64> {
        if block == self.width.chain_end() || block == 0 || block >= self.block_count {
            return None;
        }
        Some((block as u64 - 1) * self.block_size as u64 + self.data_start())
    }

    /// Number of blocks needed to hold `len` bytes (at least one).
    pub(crate) fn blocks_for(&self, len: usize) -> u32 {
        if len == 0 {
            1
        } else {
            ((len - 1) / self.block_size as usize + 1) as u32
        }
    }

    /// Streams `data` into `blocks`, one block-size chunk per block,
    /// flushing after each write.
    pub(crate) fn write_file(&self, blocks: &[u32], data: &[u8]) -> Result<()> {
        let block_size = self.block_size as usize;
        let mut io = self.drive.io();
        for (i, &block) in blocks.iter().enumerate() {
            let offset = self
                .block_to_offset(block)
                .ok_or(Error::InvalidBlock(block))?;
            let start = (i * block_size).min(data.len());
            let end = ((i + 1) * block_size).min(data.len());
            io.seek(std::io::SeekFrom::Start(offset))?;
            io.write_all(&data[start..end])?;
            io.flush()?;
        }
        Ok(())
    }

    /// Flushes the in-memory allocation table back to the device's FAT
    /// region, sector by sector.
    pub(crate) fn write_alloc_table(&self, table: &AllocationTable) -> Result<()> {
        let mut io = self.drive.io();
        io.seek(std::io::SeekFrom::Start(self.fat_offset()))?;
        for sector in table.as_bytes().chunks(self.drive.sector_size as usize) {
            io.write_all(sector)?;
            io.flush()?;
        }
        Ok(())
    }
}
