//! File entries and the operations that mutate them.
//!
//! Every mutation follows the same discipline: chain bookkeeping happens on
//! the in-memory allocation table first, data is written before the table is
//! flushed, and the directory record is rewritten last, so a failure at any
//! step leaves the visible directory state either fully old or fully new.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use fatx_io::ReadSeek;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::structures::{EntryRecord, FatxTimestamp};

use super::partition::write_record;
use super::PartitionCtx;

/// Minimum plausible size for a nested package container; smaller files are
/// rejected before the parser is invoked.
const MIN_PACKAGE_SIZE: u32 = 0x500;

/// Decodes a nested container format held inside a file's data blocks.
///
/// The driver only hands the parser a seekable view over the file's chain;
/// magic checks, hash-tree walks and metadata extraction are the parser's
/// business.
pub trait PackageParser {
    /// Returns the container's user-facing display name, or a descriptive
    /// error if the stream does not hold a valid package.
    fn package_name(&self, stream: &mut dyn ReadSeek) -> Result<String>;
}

/// One file record in a directory, bound to its partition context.
#[derive(Clone)]
pub struct FileEntry {
    record: EntryRecord,
    ctx: Arc<PartitionCtx>,
}

impl fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEntry")
            .field("record", &self.record)
            .finish()
    }
}

impl FileEntry {
    pub(crate) fn new(record: EntryRecord, ctx: Arc<PartitionCtx>) -> Self {
        Self { record, ctx }
    }

    pub fn name(&self) -> &str {
        self.record.name()
    }

    pub fn size(&self) -> u32 {
        self.record.size()
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

    pub fn is_tombstoned(&self) -> bool {
        self.record.is_tombstoned()
    }

    /// Writes the entry's current record back to its directory slot.
    pub fn write_entry(&self) -> Result<()> {
        let _guard = self.ctx.drive.begin_op()?;
        self.write_record()
    }

    /// Overwrites the file in place, reusing its current chain.
    ///
    /// The chain is extended or shrunk to exactly the block count the new
    /// data needs; the table is only flushed when the count changed. The
    /// entry keeps its start block and slot.
    pub fn inject(&mut self, data: &[u8]) -> Result<()> {
        let drive = Arc::clone(&self.ctx.drive);
        let _guard = drive.begin_op()?;
        self.inject_internal(data)
    }

    pub(crate) fn inject_internal(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::EmptyFile);
        }
        let (chain, resized) = {
            let mut table = self.ctx.table();
            let mut chain = table.chain(self.record.start_block());
            if chain.is_empty() {
                return Err(Error::MissingChain);
            }
            let required = self.ctx.blocks_for(data.len()) as usize;
            let resized = chain.len() != required;
            if chain.len() < required {
                let extra = table.allocate_chain((required - chain.len()) as u32, 1)?;
                chain.extend(extra);
                table.link_chain(&chain);
            } else if chain.len() > required {
                let released = chain.split_off(required);
                table.release_chain(&released);
                // Relink so the truncated chain ends on the terminal
                // sentinel instead of pointing into freed blocks.
                table.link_chain(&chain);
            }
            (chain, resized)
        };

        self.ctx.write_file(&chain, data)?;
        if resized {
            let table = self.ctx.table();
            self.ctx.write_alloc_table(&table)?;
        }

        debug!(
            name = self.record.name(),
            size = data.len(),
            blocks = chain.len(),
            resized,
            "injected file"
        );
        self.record.size = data.len() as u32;
        self.record.modified = FatxTimestamp::now();
        self.write_record()
    }

    /// Rewrites the file onto a freshly allocated chain, releasing the old
    /// one only after the new data and table are on the device.
    ///
    /// On failure the in-memory record is rolled back to the old start block
    /// and size, so the entry still describes the data that remains readable
    /// on the device.
    pub fn replace(&mut self, data: &[u8]) -> Result<()> {
        let drive = Arc::clone(&self.ctx.drive);
        let _guard = drive.begin_op()?;
        self.replace_internal(data)
    }

    pub(crate) fn replace_internal(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::EmptyFile);
        }
        let old_start = self.record.start_block();
        let old_size = self.record.size();

        let (old_chain, new_chain) = {
            let mut table = self.ctx.table();
            let old_chain = table.chain(old_start);
            // The old chain is still marked allocated during the search, so
            // the new chain never overlaps it.
            let new_chain = table.allocate_chain(self.ctx.blocks_for(data.len()), 1)?;
            table.link_chain(&new_chain);
            table.release_chain(&old_chain);
            (old_chain, new_chain)
        };

        let result = self.commit_replace(&new_chain, data);
        if result.is_err() {
            // Put the in-memory table back; the old chain is still intact on
            // the device, so the entry keeps describing readable data.
            let mut table = self.ctx.table();
            table.release_chain(&new_chain);
            table.link_chain(&old_chain);
            self.record.start_block = old_start;
            self.record.size = old_size;
        }
        result
    }

    fn commit_replace(&mut self, new_chain: &[u32], data: &[u8]) -> Result<()> {
        self.ctx.write_file(new_chain, data)?;
        {
            let table = self.ctx.table();
            self.ctx.write_alloc_table(&table)?;
        }

        debug!(
            name = self.record.name(),
            size = data.len(),
            old_start = self.record.start_block(),
            new_start = new_chain[0],
            "replaced file"
        );
        self.record.start_block = new_chain[0];
        self.record.size = data.len() as u32;
        self.record.modified = FatxTimestamp::now();
        self.write_record()
    }

    /// Deletes the file: releases its chain, flushes the table, then
    /// tombstones the record.
    ///
    /// The record write comes last, so a failed table flush leaves the entry
    /// visible and intact rather than half-deleted.
    pub fn delete(&mut self) -> Result<()> {
        let _guard = self.ctx.drive.begin_op()?;
        {
            let mut table = self.ctx.table();
            let chain = table.chain(self.record.start_block());
            if chain.is_empty() {
                return Err(Error::MissingChain);
            }
            table.release_chain(&chain);
            self.ctx.write_alloc_table(&table)?;
        }
        debug!(name = self.record.name(), "deleted file");
        self.record.tombstone();
        self.write_record()
    }

    /// Copies the file's contents to `out`.
    pub fn extract<W: Write>(&self, out: &mut W) -> Result<()> {
        let _guard = self.ctx.drive.begin_op()?;
        self.extract_internal(out)
    }

    /// Extracts the file to a new file at `path`.
    pub fn extract_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let _guard = self.ctx.drive.begin_op()?;
        self.extract_to_file(path.as_ref())
    }

    pub(crate) fn extract_to_file(&self, path: &Path) -> Result<()> {
        let mut out = File::create(path)?;
        self.extract_internal(&mut out)
    }

    pub(crate) fn extract_internal(&self, out: &mut dyn Write) -> Result<()> {
        let chain = self.ctx.table().chain(self.record.start_block());
        let size = self.record.size() as usize;
        let required = self.ctx.blocks_for(size) as usize;
        if chain.len() < required {
            return Err(Error::ChainTruncated {
                blocks: chain.len(),
                size: self.record.size(),
            });
        }

        let block_size = self.ctx.block_size as usize;
        let mut buf = vec![0u8; block_size];
        let mut io = self.ctx.drive.io();
        for &block in &chain[..required - 1] {
            let offset = self
                .ctx
                .block_to_offset(block)
                .ok_or(Error::InvalidBlock(block))?;
            io.seek(SeekFrom::Start(offset))?;
            io.read_exact(&mut buf)?;
            out.write_all(&buf)?;
        }
        // The final block only contributes the remaining bytes of the
        // declared size, never its full capacity.
        let last = chain[required - 1];
        let remainder = (size - 1) % block_size + 1;
        let offset = self
            .ctx
            .block_to_offset(last)
            .ok_or(Error::InvalidBlock(last))?;
        io.seek(SeekFrom::Start(offset))?;
        io.read_exact(&mut buf[..remainder])?;
        out.write_all(&buf[..remainder])?;
        out.flush()?;

        trace!(name = self.record.name(), size, blocks = required, "extracted file");
        Ok(())
    }

    /// Renames the entry in place. The data chain is untouched.
    pub fn rename(&mut self, name: &str) -> Result<()> {
        if !crate::structures::is_valid_name(name) {
            return Err(Error::InvalidName(name.to_owned()));
        }
        let _guard = self.ctx.drive.begin_op()?;
        self.record.set_name(name);
        self.record.modified = FatxTimestamp::now();
        self.write_record()
    }

    /// Resolves the display name of the package container stored in this
    /// file, using `parser` to decode the nested format.
    pub fn package_name(&self, parser: &dyn PackageParser) -> Result<String> {
        let _guard = self.ctx.drive.begin_op()?;
        if self.record.size() < MIN_PACKAGE_SIZE {
            return Err(Error::Package(format!(
                "file is too small to be a package ({} bytes)",
                self.record.size()
            )));
        }
        let chain = self.ctx.table().chain(self.record.start_block());
        if chain.is_empty() {
            return Err(Error::MissingChain);
        }
        let mut stream = ChainReader::new(self.ctx.clone(), chain, self.record.size() as u64);
        parser.package_name(&mut stream)
    }

    /// Persists the current record to its directory slot.
    pub(crate) fn write_record(&self) -> Result<()> {
        write_record(&self.ctx, &self.record)
    }
}

/// A read-only, seekable view over a file's block chain.
///
/// Reads resolve positions through the chain, so the view is contiguous even
/// when the underlying blocks are scattered across the data region.
pub struct ChainReader {
    ctx: Arc<PartitionCtx>,
    blocks: Vec<u32>,
    len: u64,
    pos: u64,
}

impl ChainReader {
    pub(crate) fn new(ctx: Arc<PartitionCtx>, blocks: Vec<u32>, len: u64) -> Self {
        Self {
            ctx,
            blocks,
            len,
            pos: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Read for ChainReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.len || buf.is_empty() {
            return Ok(0);
        }
        let block_size = self.ctx.block_size as u64;
        let index = (self.pos / block_size) as usize;
        let Some(&block) = self.blocks.get(index) else {
            return Ok(0);
        };
        let within = self.pos % block_size;
        // Never cross a block boundary in a single read; the next call
        // picks up at the following block.
        let n = (buf.len() as u64)
            .min(block_size - within)
            .min(self.len - self.pos) as usize;

        let offset = self.ctx.block_to_offset(block).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("chain block {block} is outside the data region"),
            )
        })?;
        let mut io = self.ctx.drive.io();
        io.seek(SeekFrom::Start(offset + within))?;
        io.read_exact(&mut buf[..n])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for ChainReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of chain",
            )),
        }
    }
}
