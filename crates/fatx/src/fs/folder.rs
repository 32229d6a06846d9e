//! Folder entries: listing contents, creating children and bulk extraction.

use std::fmt;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use fatx_io::ReadBeExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::structures::raw::constants::{ENTRY_SIZE, MAX_NAME_LEN, NAME_END};
use crate::structures::{is_valid_name, EntryRecord, FatxTimestamp};

use super::partition::{scan_directory, write_record};
use super::{FileEntry, PartitionCtx};

/// What to do when a file being added collides with an existing name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMode {
    /// Fail with [`Error::AlreadyExists`].
    Fail,
    /// Overwrite the existing file in place, reusing its chain.
    Inject,
    /// Rewrite the existing file onto a fresh chain.
    Replace,
}

/// The files and folders found at one directory level.
pub struct FolderContents {
    pub files: Vec<FileEntry>,
    pub folders: Vec<FolderEntry>,
}

/// One folder record in a directory, bound to its partition context.
#[derive(Clone)]
pub struct FolderEntry {
    record: EntryRecord,
    ctx: Arc<PartitionCtx>,
}

impl fmt::Debug for FolderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FolderEntry")
            .field("record", &self.record)
            .finish()
    }
}

impl FolderEntry {
    pub(crate) fn new(record: EntryRecord, ctx: Arc<PartitionCtx>) -> Self {
        Self { record, ctx }
    }

    pub fn name(&self) -> &str {
        self.record.name()
    }

    pub fn start_block(&self) -> u32 {
        self.record.start_block()
    }

    pub fn created(&self) -> FatxTimestamp {
        self.record.created()
    }

    pub fn modified(&self) -> FatxTimestamp {
        self.record.modified()
    }

    pub fn accessed(&self) -> FatxTimestamp {
        self.record.accessed()
    }

    /// Writes the entry's current record back to its directory slot.
    pub fn write_entry(&self) -> Result<()> {
        let _guard = self.ctx.drive.begin_op()?;
        write_record(&self.ctx, &self.record)
    }

    /// Reads the folder's immediate children from the device.
    pub fn read_contents(&self) -> Result<FolderContents> {
        let _guard = self.ctx.drive.begin_op()?;
        self.read_contents_internal()
    }

    pub(crate) fn read_contents_internal(&self) -> Result<FolderContents> {
        let (files, folders) = scan_directory(&self.ctx, self.record.start_block())?;
        Ok(FolderContents { files, folders })
    }

    /// Creates an empty child folder.
    ///
    /// The folder's single directory block is written zeroed, so scans of it
    /// stop at the first slot.
    pub fn add_folder(&self, name: &str) -> Result<FolderEntry> {
        if !is_valid_name(name) {
            return Err(Error::InvalidName(name.to_owned()));
        }
        let _guard = self.ctx.drive.begin_op()?;
        let contents = self.read_contents_internal()?;
        if contents
            .folders
            .iter()
            .any(|f| f.name().eq_ignore_ascii_case(name))
        {
            return Err(Error::AlreadyExists(name.to_owned()));
        }

        let zeroed = vec![0u8; self.ctx.block_size as usize];
        let record = self.create_entry(name, &zeroed, true)?;
        debug!(parent = self.name(), name, "created folder");
        Ok(FolderEntry::new(record, self.ctx.clone()))
    }

    /// Adds a file with the given contents, dispatching on `mode` when a
    /// file of the same name already exists.
    pub fn add_file(&self, name: &str, data: &[u8], mode: AddMode) -> Result<FileEntry> {
        if !is_valid_name(name) {
            return Err(Error::InvalidName(name.to_owned()));
        }
        if data.is_empty() {
            return Err(Error::EmptyFile);
        }
        let _guard = self.ctx.drive.begin_op()?;
        let contents = self.read_contents_internal()?;

        if let Some(mut existing) = contents
            .files
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
        {
            return match mode {
                AddMode::Fail => Err(Error::AlreadyExists(name.to_owned())),
                AddMode::Inject => {
                    existing.inject_internal(data)?;
                    Ok(existing)
                }
                AddMode::Replace => {
                    existing.replace_internal(data)?;
                    Ok(existing)
                }
            };
        }

        let record = self.create_entry(name, data, false)?;
        debug!(parent = self.name(), name, size = data.len(), "added file");
        Ok(FileEntry::new(record, self.ctx.clone()))
    }

    /// Extracts the folder's contents under `dest`, creating a directory
    /// named after the folder.
    ///
    /// Children that fail to extract are logged and skipped; one bad entry
    /// does not abort its siblings.
    pub fn extract<P: AsRef<Path>>(&self, dest: P, recursive: bool) -> Result<()> {
        let _guard = self.ctx.drive.begin_op()?;
        self.extract_internal(dest.as_ref(), recursive)
    }

    pub(crate) fn extract_internal(&self, dest: &Path, recursive: bool) -> Result<()> {
        let target = dest.join(self.name());
        std::fs::create_dir_all(&target)?;

        let contents = self.read_contents_internal()?;
        for file in &contents.files {
            if let Err(err) = file.extract_to_file(&target.join(file.name())) {
                warn!(file = file.name(), %err, "skipping file that failed to extract");
            }
        }
        if recursive {
            for folder in &contents.folders {
                if let Err(err) = folder.extract_internal(&target, true) {
                    warn!(folder = folder.name(), %err, "skipping folder that failed to extract");
                }
            }
        }
        Ok(())
    }

    /// Renames the entry in place. Children are unaffected.
    pub fn rename(&mut self, name: &str) -> Result<()> {
        if !is_valid_name(name) {
            return Err(Error::InvalidName(name.to_owned()));
        }
        let _guard = self.ctx.drive.begin_op()?;
        self.record.set_name(name);
        self.record.modified = FatxTimestamp::now();
        write_record(&self.ctx, &self.record)
    }

    /// Writes a new child entry: finds a free record slot, allocates and
    /// fills the data chain, writes the record, and only then links any
    /// newly grown directory block into the folder's chain.
    ///
    /// Ordering matters: the record write precedes the directory-chain link
    /// and table flush, so a failure mid-way leaves at worst an unreferenced
    /// (still free) block rather than a dangling record.
    fn create_entry(&self, name: &str, data: &[u8], is_folder: bool) -> Result<EntryRecord> {
        let (slot_offset, new_dir_block) = self.find_free_slot()?;

        // When the slot came from a brand-new directory block, search for
        // data blocks strictly past it so the two allocations cannot collide.
        let search_start = new_dir_block.map_or(1, |b| b + 1);
        let chain = {
            let mut table = self.ctx.table();
            let chain = table.allocate_chain(self.ctx.blocks_for(data.len()), search_start)?;
            table.link_chain(&chain);
            chain
        };

        self.ctx.write_file(&chain, data)?;

        let record =
            EntryRecord::create(name, chain[0], data.len() as u32, slot_offset, is_folder);
        write_record(&self.ctx, &record)?;

        if let Some(new_block) = new_dir_block {
            let mut table = self.ctx.table();
            let mut dir_chain = table.chain(self.record.start_block());
            dir_chain.push(new_block);
            table.link_chain(&dir_chain);
        }
        {
            let table = self.ctx.table();
            self.ctx.write_alloc_table(&table)?;
        }

        Ok(record)
    }

    /// Finds the offset of a usable record slot in this folder's directory
    /// chain.
    ///
    /// A slot qualifies if its name-length byte is an end marker, a
    /// tombstone or a corrupt length (tombstones fall in the over-length
    /// range). When every slot in the chain is occupied, a fresh zeroed
    /// directory block is claimed and its first slot returned; the caller is
    /// responsible for linking it into the chain once the new record is in
    /// place.
    fn find_free_slot(&self) -> Result<(u64, Option<u32>)> {
        let chain = self.ctx.table().chain(self.record.start_block());
        {
            let mut io = self.ctx.drive.io();
            for &block in &chain {
                let Some(block_offset) = self.ctx.block_to_offset(block) else {
                    break;
                };
                for slot in 0..self.ctx.entries_per_block() as u64 {
                    let record_offset = block_offset + slot * ENTRY_SIZE as u64;
                    io.seek(SeekFrom::Start(record_offset))?;
                    let status = io.read_u8()?;
                    if status == NAME_END || status as usize > MAX_NAME_LEN {
                        return Ok((record_offset, None));
                    }
                }
            }
        }

        // Every slot in every chain block is taken: grow the directory by
        // one block and zero it so stale bytes cannot read as records.
        let new_block = self.ctx.table().allocate_chain(1, 1)?[0];
        let offset = self
            .ctx
            .block_to_offset(new_block)
            .ok_or(Error::InvalidBlock(new_block))?;
        {
            let mut io = self.ctx.drive.io();
            io.seek(SeekFrom::Start(offset))?;
            io.write_all(&vec![0u8; self.ctx.block_size as usize])?;
            io.flush()?;
        }
        debug!(folder = self.name(), new_block, "grew directory by one block");
        Ok((offset, Some(new_block)))
    }
}
