//! The block allocation table.
//!
//! Each partition owns one materialized copy of its FAT region. Entries are
//! fixed-width big-endian integers, 16-bit for small partitions and 32-bit
//! otherwise; entry N holds the index of the block following block N in its
//! chain, the free marker (0), or the width-specific end-of-chain sentinel.
//! Block numbering is 1-based: entry 0 is never addressable.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::structures::raw::constants::{
    BLOCK_FREE, FATX16_BLOCK_THRESHOLD, FATX16_CHAIN_END, FATX32_CHAIN_END,
};

/// Width of one allocation table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableWidth {
    Fatx16,
    Fatx32,
}

impl TableWidth {
    /// Classifies a partition by its total block count.
    pub fn for_block_count(blocks: u32) -> Self {
        if blocks < FATX16_BLOCK_THRESHOLD {
            TableWidth::Fatx16
        } else {
            TableWidth::Fatx32
        }
    }

    pub fn entry_size(self) -> usize {
        match self {
            TableWidth::Fatx16 => 2,
            TableWidth::Fatx32 => 4,
        }
    }

    /// The end-of-chain sentinel for this width, widened to u32.
    pub fn chain_end(self) -> u32 {
        match self {
            TableWidth::Fatx16 => FATX16_CHAIN_END as u32,
            TableWidth::Fatx32 => FATX32_CHAIN_END,
        }
    }
}

/// In-memory copy of one partition's FAT region.
///
/// Chain operations mutate only this buffer; the owning partition flushes it
/// back to the device explicitly after a batch of changes.
pub struct AllocationTable {
    data: Vec<u8>,
    width: TableWidth,
    block_count: u32,
}

impl AllocationTable {
    pub fn new(data: Vec<u8>, block_count: u32, width: TableWidth) -> Self {
        debug_assert!(data.len() >= block_count as usize * width.entry_size());
        Self {
            data,
            width,
            block_count,
        }
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    pub fn width(&self) -> TableWidth {
        self.width
    }

    /// The raw FAT region bytes, as flushed back to the device.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reads the table entry for `block`, widened to u32.
    pub fn entry(&self, block: u32) -> u32 {
        let i = block as usize * self.width.entry_size();
        match self.width {
            TableWidth::Fatx16 => {
                u16::from_be_bytes([self.data[i], self.data[i + 1]]) as u32
            }
            TableWidth::Fatx32 => u32::from_be_bytes([
                self.data[i],
                self.data[i + 1],
                self.data[i + 2],
                self.data[i + 3],
            ]),
        }
    }

    /// Writes the table entry for `block`.
    pub fn set_entry(&mut self, block: u32, value: u32) {
        let i = block as usize * self.width.entry_size();
        match self.width {
            TableWidth::Fatx16 => {
                self.data[i..i + 2].copy_from_slice(&(value as u16).to_be_bytes())
            }
            TableWidth::Fatx32 => self.data[i..i + 4].copy_from_slice(&value.to_be_bytes()),
        }
    }

    fn is_terminal(&self, block: u32) -> bool {
        block == 0 || block >= self.block_count || block == self.width.chain_end()
    }

    /// Follows next-block links from `start` and returns the chain in order.
    ///
    /// Traversal ends at the end-of-chain sentinel, block 0 or an
    /// out-of-range index; a revisited block means a cycle and also ends the
    /// walk. Whatever was collected so far is returned, so a corrupt table
    /// can never loop the caller.
    pub fn chain(&self, start: u32) -> Vec<u32> {
        let mut blocks = Vec::new();
        let mut seen = HashSet::new();
        let mut block = start;
        while !self.is_terminal(block) {
            if !seen.insert(block) {
                break;
            }
            blocks.push(block);
            block = self.entry(block);
        }
        blocks
    }

    /// Scans for `count` free blocks starting at `search_start`.
    ///
    /// Returns the block indices in scan order without marking them; callers
    /// commit the allocation with [`link_chain`](Self::link_chain). If the
    /// remaining range holds fewer than `count` free blocks the whole request
    /// fails and nothing is reserved.
    pub fn allocate_chain(&self, count: u32, search_start: u32) -> Result<Vec<u32>> {
        let mut blocks = Vec::with_capacity(count as usize);
        for block in search_start.max(1)..self.block_count {
            if blocks.len() == count as usize {
                break;
            }
            if self.entry(block) == BLOCK_FREE {
                blocks.push(block);
            }
        }
        if blocks.len() < count as usize {
            return Err(Error::ChainExhausted {
                requested: count,
                found: blocks.len() as u32,
            });
        }
        Ok(blocks)
    }

    /// Links `blocks` into one chain: each entry receives the index of the
    /// next block, and the last entry receives the end-of-chain sentinel.
    pub fn link_chain(&mut self, blocks: &[u32]) {
        for (i, &block) in blocks.iter().enumerate() {
            let next = blocks.get(i + 1).copied().unwrap_or(self.width.chain_end());
            self.set_entry(block, next);
        }
    }

    /// Frees the table entries for `blocks`. Block 0 and out-of-range
    /// indices are skipped silently; releasing is best-effort by design.
    pub fn release_chain(&mut self, blocks: &[u32]) {
        for &block in blocks {
            if block == 0 || block >= self.block_count {
                continue;
            }
            self.set_entry(block, BLOCK_FREE);
        }
    }
}
