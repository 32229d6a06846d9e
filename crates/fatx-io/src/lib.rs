//! I/O traits shared by the fatx crates.
//!
//! The FATX driver only needs a seekable byte stream over a device or image
//! file; everything on disk is big-endian, so the usual `from_le_bytes`
//! helpers do not apply and the accessors here decode big-endian instead.

use std::io::{Read, Result, Seek, SeekFrom, Write};

/// A seekable byte stream over a storage device or image file.
///
/// Blanket-implemented for anything that can read, write and seek; `Send` is
/// required so whole-image copies can run on a worker thread.
pub trait BlockStream: Read + Write + Seek + Send {
    /// Total length of the underlying device or image in bytes.
    ///
    /// The current position is preserved.
    fn stream_len(&mut self) -> Result<u64> {
        let pos = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        if pos != end {
            self.seek(SeekFrom::Start(pos))?;
        }
        Ok(end)
    }
}

impl<T: Read + Write + Seek + Send + ?Sized> BlockStream for T {}

/// A read-only seekable stream, used where a consumer only inspects data
/// (for example a nested-package parser walking a file's block chain).
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Big-endian read accessors.
pub trait ReadBeExt: Read {
    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16_be(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn read_u32_be(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Reads exactly `N` bytes into a fixed-size array.
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<R: Read + ?Sized> ReadBeExt for R {}

/// Big-endian write accessors.
pub trait WriteBeExt: Write {
    fn write_u16_be(&mut self, value: u16) -> Result<()> {
        self.write_all(&value.to_be_bytes())
    }

    fn write_u32_be(&mut self, value: u32) -> Result<()> {
        self.write_all(&value.to_be_bytes())
    }
}

impl<W: Write + ?Sized> WriteBeExt for W {}
