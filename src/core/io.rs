//! Sector-addressed image and disk helpers
//!
//! The whole container lives in memory as one flat byte image. Sector `n`
//! starts at byte `(n + 1) * sector_size`: the header region occupies the
//! first sector-sized slot.

use crate::error::{CompoundError, Result};
use crate::options::SectorSize;
use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// In-memory sector image
#[derive(Debug, Clone)]
pub struct ByteSource {
    data: Vec<u8>,
    sector_size: SectorSize,
}

impl ByteSource {
    /// Empty image holding only a zeroed header region
    pub fn new(sector_size: SectorSize) -> Self {
        ByteSource {
            data: vec![0u8; sector_size.bytes()],
            sector_size,
        }
    }

    /// Wrap an existing file image
    pub fn from_bytes(data: Vec<u8>, sector_size: SectorSize) -> Self {
        ByteSource { data, sector_size }
    }

    pub fn sector_size(&self) -> SectorSize {
        self.sector_size
    }

    /// Length of the image in bytes
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of sectors at least partially present in the image
    pub fn physical_sectors(&self) -> u32 {
        let bs = self.sector_size.bytes();
        let body = self.data.len().saturating_sub(bs);
        ((body + bs - 1) / bs) as u32
    }

    fn sector_offset(&self, sector: u32) -> u64 {
        (sector as u64 + 1) * self.sector_size.bytes() as u64
    }

    /// Borrow a sector's bytes
    ///
    /// A final sector cut short by the end of the image is zero-padded;
    /// a sector wholly past the end is a truncation error.
    pub fn sector(&self, sector: u32) -> Result<Cow<'_, [u8]>> {
        let bs = self.sector_size.bytes();
        let start = self.sector_offset(sector);
        if start >= self.len() {
            return Err(CompoundError::Truncated {
                sector,
                offset: self.len(),
            });
        }

        let start = start as usize;
        let end = start + bs;
        if end <= self.data.len() {
            Ok(Cow::Borrowed(&self.data[start..end]))
        } else {
            tracing::warn!(
                "Sector {} is cut short at byte {}; padding with zeros",
                sector,
                self.data.len()
            );
            let mut padded = vec![0u8; bs];
            let present = self.data.len() - start;
            padded[..present].copy_from_slice(&self.data[start..]);
            Ok(Cow::Owned(padded))
        }
    }

    /// Write `bytes` at `offset` within a sector, growing the image as needed
    pub fn write_within(&mut self, sector: u32, offset: usize, bytes: &[u8]) {
        let start = self.sector_offset(sector) as usize + offset;
        let end = start + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(bytes);
    }

    /// Replace a whole sector; short input is zero-padded
    pub fn write_sector(&mut self, sector: u32, bytes: &[u8]) {
        let bs = self.sector_size.bytes();
        debug_assert!(bytes.len() <= bs);
        self.write_within(sector, 0, bytes);
        if bytes.len() < bs {
            let zeros = vec![0u8; bs - bytes.len()];
            self.write_within(sector, bytes.len(), &zeros);
        }
    }

    /// Overwrite the header region
    pub fn write_header(&mut self, bytes: &[u8]) {
        let region = self.sector_size.bytes().min(bytes.len());
        if self.data.len() < region {
            self.data.resize(region, 0);
        }
        self.data[..region].copy_from_slice(&bytes[..region]);
    }

    /// Round the image length up to a whole number of sectors
    pub fn pad_to_sector(&mut self) {
        let bs = self.sector_size.bytes();
        let rounded = ((self.data.len() + bs - 1) / bs).max(1) * bs;
        self.data.resize(rounded, 0);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

/// Read a whole container file into memory
pub fn read_container<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let mut file = File::open(&path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Create (or truncate) a container file and hand a buffered writer to `write`
pub fn write_container<P, F>(path: P, write: F) -> Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut BufWriter<&File>) -> Result<()>,
{
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)?;

    {
        let mut writer = BufWriter::new(&file);
        write(&mut writer)?;
        writer.flush()?;
    }
    file.sync_all()?;

    Ok(())
}
