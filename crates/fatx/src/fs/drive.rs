//! Drive detection, fixed partition layouts and whole-image transfer.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use fatx_io::{BlockStream, ReadBeExt};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::structures::raw::constants::SUPERBLOCK_MAGIC;

use super::{DriveCtx, FolderContents, FolderEntry, Partition};

/// The default device sector size.
const SECTOR_SIZE: u32 = 0x200;

/// Copy chunk used by whole-image transfers.
const COPY_CHUNK: usize = 0x1000;

/// Fixed partition offsets per device family. Retail devices carry no
/// partition table; the layout is implied by the device kind.
mod layout {
    /// Hard drive system partition ("System").
    pub const HDD_SYSTEM: u64 = 0x1_18EB_0000;
    /// Hard drive compatibility partition ("Compatibility").
    pub const HDD_COMPAT: u64 = 0x1_20EB_0000;
    /// Hard drive content partition; runs to the end of the device.
    pub const HDD_CONTENT: u64 = 0x1_30EB_0000;

    /// Memory unit cache partition, at the start of the device.
    pub const MU_CACHE: u64 = 0x0;
    /// Memory unit content partition.
    pub const MU_CONTENT: u64 = 0x7F_F000;

    /// USB stick cache partition.
    pub const USB_CACHE: u64 = 0x800_0400;
    /// USB stick cache partition length.
    pub const USB_CACHE_LEN: u64 = 0x47F_F000;
    /// USB stick content partition.
    pub const USB_CONTENT: u64 = 0x2000_0000;

    /// Development kit drives hold a small partition table here: three
    /// (offset, length) sector pairs, big endian.
    pub const DEVKIT_TABLE: u64 = 0x8;
}

/// The device family a stream was detected as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveKind {
    /// Retail hard drive: System, Compatibility and Content partitions at
    /// fixed offsets.
    HardDrive,
    /// Development kit hard drive: partitions listed in a sector table at
    /// the head of the device.
    DevHardDrive,
    /// Memory unit: Cache and Content partitions.
    MemoryUnit,
    /// USB flash stick: Cache and Content partitions.
    UsbFlashDrive,
    /// No known layout produced a valid superblock.
    Unknown,
}

impl DriveKind {
    pub fn name(self) -> &'static str {
        match self {
            DriveKind::HardDrive => "hard drive",
            DriveKind::DevHardDrive => "devkit hard drive",
            DriveKind::MemoryUnit => "memory unit",
            DriveKind::UsbFlashDrive => "USB flash drive",
            DriveKind::Unknown => "unknown",
        }
    }
}

/// A detected FATX device with its parsed partitions.
pub struct Drive {
    ctx: Arc<DriveCtx>,
    partitions: Vec<Partition>,
}

impl Drive {
    /// Opens a device image file for read and write access.
    pub fn open_image<P: AsRef<Path>>(path: P) -> Result<Drive> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::from_stream(Box::new(file))
    }

    /// Detects and parses the device behind `stream`, assuming 512-byte
    /// sectors.
    pub fn from_stream(stream: Box<dyn BlockStream>) -> Result<Drive> {
        Self::with_sector_size(stream, SECTOR_SIZE)
    }

    /// Detects and parses the device behind `stream` with an explicit
    /// sector size.
    pub fn with_sector_size(mut stream: Box<dyn BlockStream>, sector_size: u32) -> Result<Drive> {
        let kind = detect(stream.as_mut(), sector_size)?;
        if kind == DriveKind::Unknown {
            return Err(Error::NotFatx);
        }
        info!(kind = kind.name(), "detected drive");

        let ctx = Arc::new(DriveCtx::new(stream, sector_size, kind));
        let partitions = load_partitions(&ctx)?;
        Ok(Drive { ctx, partitions })
    }

    pub fn kind(&self) -> DriveKind {
        self.ctx.kind
    }

    pub fn sector_size(&self) -> u32 {
        self.ctx.sector_size
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn partitions_mut(&mut self) -> &mut [Partition] {
        &mut self.partitions
    }

    /// Re-reads every partition from the device, discarding all cached
    /// entries and allocation tables.
    pub fn reload(&mut self) -> Result<()> {
        let _guard = self.ctx.begin_op()?;
        self.partitions = load_partitions(&self.ctx)?;
        Ok(())
    }

    /// Streams the entire device image into `out` on a worker thread.
    pub fn extract_image<W: Write + Send>(&self, out: &mut W) -> Result<()> {
        let _guard = self.ctx.begin_op()?;
        let mut io = self.ctx.io();
        let len = io.stream_len()?;
        io.seek(SeekFrom::Start(0))?;
        let src = &mut **io;

        thread::scope(|scope| {
            scope
                .spawn(move || copy_exact(src, out, len))
                .join()
                .unwrap_or_else(|_| Err(worker_panicked()))
        })
    }

    /// Extracts the device image to a new file at `path`.
    pub fn extract_image_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut out = std::fs::File::create(path)?;
        self.extract_image(&mut out)
    }

    /// Overwrites the device from `source` on a worker thread, then reloads
    /// the partitions.
    ///
    /// At most the device's current length is written; a shorter source
    /// leaves the tail of the device untouched.
    pub fn restore_image<R: Read + Send>(&mut self, source: &mut R) -> Result<()> {
        {
            let _guard = self.ctx.begin_op()?;
            let mut io = self.ctx.io();
            let len = io.stream_len()?;
            io.seek(SeekFrom::Start(0))?;
            let dst = &mut **io;

            thread::scope(|scope| {
                scope
                    .spawn(move || copy_up_to(source, dst, len))
                    .join()
                    .unwrap_or_else(|_| Err(worker_panicked()))
            })?;
        }
        self.reload()
    }

    /// Lists the directory at a `/`-separated path.
    ///
    /// The first component names a partition; an optional second component
    /// may name a sub-partition; the rest name folders. A path that stops at
    /// a partition lists its root.
    pub fn read_dir(&self, path: &str) -> Result<FolderContents> {
        let _guard = self.ctx.begin_op()?;
        Ok(self.navigate(path)?.0)
    }

    /// Resolves a `/`-separated path to the folder entry it names.
    pub fn open_folder(&self, path: &str) -> Result<FolderEntry> {
        let _guard = self.ctx.begin_op()?;
        let (_, folder) = self.navigate(path)?;
        folder.ok_or_else(|| Error::NotFound(path.to_owned()))
    }

    fn navigate(&self, path: &str) -> Result<(FolderContents, Option<FolderEntry>)> {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let Some((&partition_name, mut rest)) = components.split_first() else {
            return Err(Error::NotFound(path.to_owned()));
        };

        let mut partition = self
            .partitions
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(partition_name))
            .ok_or_else(|| Error::NotFound(path.to_owned()))?;

        // One optional sub-partition hop.
        if let Some((&name, tail)) = rest.split_first() {
            if let Some(sub) = partition
                .sub_partitions()
                .iter()
                .find(|p| p.name().eq_ignore_ascii_case(name))
            {
                partition = sub;
                rest = tail;
            }
        }

        let Some((&first_folder, tail)) = rest.split_first() else {
            return Ok((
                FolderContents {
                    files: partition.files().to_vec(),
                    folders: partition.folders().to_vec(),
                },
                None,
            ));
        };

        let mut folder = partition
            .folders()
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(first_folder))
            .ok_or_else(|| Error::NotFound(path.to_owned()))?
            .clone();
        let mut contents = folder.read_contents_internal()?;
        for &name in tail {
            folder = contents
                .folders
                .into_iter()
                .find(|f| f.name().eq_ignore_ascii_case(name))
                .ok_or_else(|| Error::NotFound(path.to_owned()))?;
            contents = folder.read_contents_internal()?;
        }
        Ok((contents, Some(folder)))
    }
}

fn worker_panicked() -> Error {
    Error::Io(std::io::Error::other("image copy worker panicked"))
}

/// Probes the stream for a superblock at each known layout's anchor offset.
///
/// Probe order puts the cheap fixed offsets first and the devkit table scan
/// last; a read failure at any probe point just means "not this layout".
fn detect(io: &mut dyn BlockStream, sector_size: u32) -> Result<DriveKind> {
    fn probe(io: &mut dyn BlockStream, offset: u64) -> bool {
        io.seek(SeekFrom::Start(offset)).is_ok()
            && matches!(io.read_u32_be(), Ok(m) if m == SUPERBLOCK_MAGIC)
    }

    if probe(io, layout::MU_CONTENT) {
        return Ok(DriveKind::MemoryUnit);
    }
    if probe(io, layout::USB_CACHE) {
        return Ok(DriveKind::UsbFlashDrive);
    }
    if probe(io, layout::HDD_CONTENT) {
        return Ok(DriveKind::HardDrive);
    }

    // Devkit drives anchor their first partition through the sector table.
    if io.seek(SeekFrom::Start(layout::DEVKIT_TABLE)).is_ok() {
        if let Ok(sector) = io.read_u32_be() {
            if sector != 0 && probe(io, sector as u64 * sector_size as u64) {
                return Ok(DriveKind::DevHardDrive);
            }
        }
    }

    Ok(DriveKind::Unknown)
}

/// Builds the partition list for the detected kind. Regions that do not
/// parse as FATX are skipped rather than failing the whole drive.
fn load_partitions(ctx: &Arc<DriveCtx>) -> Result<Vec<Partition>> {
    let len = ctx.io().stream_len()?;

    let mut specs: Vec<(u64, u64, &str)> = Vec::new();
    match ctx.kind {
        DriveKind::HardDrive => {
            specs.push((
                layout::HDD_SYSTEM,
                layout::HDD_COMPAT - layout::HDD_SYSTEM,
                "System",
            ));
            specs.push((
                layout::HDD_COMPAT,
                layout::HDD_CONTENT - layout::HDD_COMPAT,
                "Compatibility",
            ));
            specs.push((
                layout::HDD_CONTENT,
                len.saturating_sub(layout::HDD_CONTENT),
                "Content",
            ));
        }
        DriveKind::MemoryUnit => {
            specs.push((layout::MU_CACHE, layout::MU_CONTENT, "Cache"));
            specs.push((
                layout::MU_CONTENT,
                len.saturating_sub(layout::MU_CONTENT),
                "Content",
            ));
        }
        DriveKind::UsbFlashDrive => {
            specs.push((layout::USB_CACHE, layout::USB_CACHE_LEN, "Cache"));
            specs.push((
                layout::USB_CONTENT,
                len.saturating_sub(layout::USB_CONTENT),
                "Content",
            ));
        }
        DriveKind::DevHardDrive => {
            let sector_size = ctx.sector_size as u64;
            let mut io = ctx.io();
            for i in 0..3u64 {
                io.seek(SeekFrom::Start(layout::DEVKIT_TABLE + i * 8))?;
                let offset = io.read_u32_be()? as u64;
                let length = io.read_u32_be()? as u64;
                if offset == 0 || length == 0 {
                    break;
                }
                let name = match i {
                    0 => "System",
                    2 => "Compatibility",
                    _ => "Content",
                };
                specs.push((offset * sector_size, length * sector_size, name));
            }
        }
        DriveKind::Unknown => {}
    }

    let mut partitions = Vec::new();
    for (base, size, name) in specs {
        if let Some(partition) = Partition::parse(ctx, base, size, name)? {
            debug!(name, base, size, "loaded partition");
            partitions.push(partition);
        }
    }
    Ok(partitions)
}

/// Copies exactly `len` bytes between streams in fixed chunks.
fn copy_exact<R: Read + ?Sized, W: Write + ?Sized>(
    src: &mut R,
    dst: &mut W,
    len: u64,
) -> Result<()> {
    let mut buf = [0u8; COPY_CHUNK];
    let mut copied = 0u64;
    while copied < len {
        let n = ((len - copied) as usize).min(COPY_CHUNK);
        src.read_exact(&mut buf[..n])?;
        dst.write_all(&buf[..n])?;
        copied += n as u64;
    }
    dst.flush()?;
    Ok(())
}

/// Copies from `src` until it is drained or `max` bytes are written.
fn copy_up_to<R: Read + ?Sized, W: Write + ?Sized>(
    src: &mut R,
    dst: &mut W,
    max: u64,
) -> Result<()> {
    let mut buf = [0u8; COPY_CHUNK];
    let mut copied = 0u64;
    while copied < max {
        let want = ((max - copied) as usize).min(COPY_CHUNK);
        let n = src.read(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n])?;
        copied += n as u64;
    }
    dst.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn operations_are_single_flight() {
        let ctx = DriveCtx::new(
            Box::new(Cursor::new(vec![0u8; 64])),
            SECTOR_SIZE,
            DriveKind::MemoryUnit,
        );
        let guard = ctx.begin_op().unwrap();
        assert!(matches!(ctx.begin_op(), Err(Error::Busy)));
        drop(guard);
        assert!(ctx.begin_op().is_ok());
    }

    #[test]
    fn guard_releases_on_early_exit() {
        let ctx = DriveCtx::new(
            Box::new(Cursor::new(vec![0u8; 64])),
            SECTOR_SIZE,
            DriveKind::MemoryUnit,
        );
        let failing = || -> Result<()> {
            let _guard = ctx.begin_op()?;
            Err(Error::MissingChain)
        };
        assert!(failing().is_err());
        // The flag must be clear again after the error path.
        assert!(ctx.begin_op().is_ok());
    }

    #[test]
    fn unknown_streams_are_rejected() {
        let result = Drive::from_stream(Box::new(Cursor::new(vec![0u8; 0x1000])));
        assert!(matches!(result, Err(Error::NotFatx)));
    }
}
