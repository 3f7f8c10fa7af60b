//! Compound file header (the leading 512 bytes)
//!
//! ```text
//! offset  size  field
//!      0     8  signature D0 CF 11 E0 A1 B1 1A E1
//!      8    16  header CLSID (zero)
//!     24     2  minor version (0x003E)
//!     26     2  major version (3 or 4)
//!     28     2  byte order mark (0xFFFE)
//!     30     2  sector shift (9 or 12)
//!     32     2  mini sector shift (6)
//!     34     6  reserved
//!     40     4  directory sector count (version 4 only)
//!     44     4  allocation table sector count
//!     48     4  first directory sector
//!     52     4  transaction signature
//!     56     4  mini stream cutoff (4096)
//!     60     4  first mini table sector
//!     64     4  mini table sector count
//!     68     4  first indirect (DIFAT) sector
//!     72     4  indirect sector count
//!     76   436  109 inline allocation table locators
//! ```

use crate::allocator::{END_OF_CHAIN, FREE_SECTOR, MAX_REGULAR_SECTOR};
use crate::error::{CompoundError, Result};
use crate::magic::{FileMagic, COMPOUND_SIGNATURE};
use crate::options::SectorSize;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Seek, SeekFrom};

/// Size of the header structure; version 4 files pad it to a full sector
pub const HEADER_SIZE: usize = 512;

/// Allocation table locators stored inline in the header
pub const INLINE_LOCATORS: usize = 109;

pub const MINI_SECTOR_SHIFT: u16 = 6;
pub const MINI_SECTOR_SIZE: usize = 1 << MINI_SECTOR_SHIFT;

/// Documents at or above this size live in the big store
pub const MINI_CUTOFF: u32 = 4096;

pub const MINOR_VERSION: u16 = 0x003E;
pub const BYTE_ORDER_MARK: u16 = 0xFFFE;

const LOCATORS_OFFSET: u64 = 76;

/// Decoded header fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub sector_size: SectorSize,

    pub minor_version: u16,

    /// Number of directory sectors (written for version 4 only)
    pub entry_tree_count: u32,

    /// Total number of allocation table sectors
    pub table_count: u32,

    /// First sector of the directory stream
    pub entry_tree_start: u32,

    pub transaction_signature: u32,

    /// First sector of the mini allocation table
    pub mini_table_start: u32,

    pub mini_table_count: u32,

    /// First indirect (DIFAT) sector
    pub indirect_start: u32,

    pub indirect_count: u32,

    /// Inline allocation table locators (at most 109, in table order)
    pub table_locators: Vec<u32>,
}

impl Header {
    /// Header for an empty container
    pub fn new(sector_size: SectorSize) -> Self {
        Header {
            sector_size,
            minor_version: MINOR_VERSION,
            entry_tree_count: 0,
            table_count: 0,
            entry_tree_start: END_OF_CHAIN,
            transaction_signature: 0,
            mini_table_start: END_OF_CHAIN,
            mini_table_count: 0,
            indirect_start: END_OF_CHAIN,
            indirect_count: 0,
            table_locators: Vec::new(),
        }
    }

    /// Size of the header region at the front of the file
    pub fn region_size(&self) -> usize {
        self.sector_size.bytes()
    }

    /// Decode a header from the first bytes of a file
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < COMPOUND_SIGNATURE.len() || bytes[..8] != COMPOUND_SIGNATURE {
            return Err(CompoundError::NotCompoundFile {
                detected: FileMagic::detect(bytes),
            });
        }
        if bytes.len() < HEADER_SIZE {
            return Err(CompoundError::InvalidHeader(format!(
                "header is truncated: {} of {} bytes present",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let mut cursor = Cursor::new(&bytes[..HEADER_SIZE]);
        cursor.seek(SeekFrom::Start(24))?;

        let minor_version = cursor.read_u16::<LittleEndian>()?;
        let major_version = cursor.read_u16::<LittleEndian>()?;
        let byte_order = cursor.read_u16::<LittleEndian>()?;
        if byte_order != BYTE_ORDER_MARK {
            return Err(CompoundError::InvalidHeader(format!(
                "byte order mark is {:#06x}, expected {:#06x}",
                byte_order, BYTE_ORDER_MARK
            )));
        }

        let sector_size = SectorSize::from_shift(cursor.read_u16::<LittleEndian>()?)?;
        if major_version != sector_size.major_version() {
            tracing::warn!(
                "Major version {} does not match {}-byte sectors; trusting the sector shift",
                major_version,
                sector_size.bytes()
            );
        }
        if minor_version != MINOR_VERSION {
            tracing::warn!("Unexpected minor version {:#06x}", minor_version);
        }

        let mini_shift = cursor.read_u16::<LittleEndian>()?;
        if mini_shift != MINI_SECTOR_SHIFT {
            return Err(CompoundError::InvalidHeader(format!(
                "mini sector shift is {}, expected {}",
                mini_shift, MINI_SECTOR_SHIFT
            )));
        }

        cursor.seek(SeekFrom::Start(40))?;
        let entry_tree_count = cursor.read_u32::<LittleEndian>()?;
        let table_count = cursor.read_u32::<LittleEndian>()?;
        let entry_tree_start = cursor.read_u32::<LittleEndian>()?;
        let transaction_signature = cursor.read_u32::<LittleEndian>()?;
        let mini_cutoff = cursor.read_u32::<LittleEndian>()?;
        if mini_cutoff != MINI_CUTOFF {
            return Err(CompoundError::InvalidHeader(format!(
                "mini stream cutoff is {}, expected {}",
                mini_cutoff, MINI_CUTOFF
            )));
        }
        let mini_table_start = cursor.read_u32::<LittleEndian>()?;
        let mini_table_count = cursor.read_u32::<LittleEndian>()?;
        let indirect_start = cursor.read_u32::<LittleEndian>()?;
        let indirect_count = cursor.read_u32::<LittleEndian>()?;

        cursor.seek(SeekFrom::Start(LOCATORS_OFFSET))?;
        let inline = (table_count as usize).min(INLINE_LOCATORS);
        let mut table_locators = Vec::with_capacity(inline);
        for slot in 0..inline {
            let locator = cursor.read_u32::<LittleEndian>()?;
            if locator > MAX_REGULAR_SECTOR {
                return Err(CompoundError::InvalidHeader(format!(
                    "inline table locator {} holds sentinel {:#010x}",
                    slot, locator
                )));
            }
            table_locators.push(locator);
        }

        Ok(Header {
            sector_size,
            minor_version,
            entry_tree_count,
            table_count,
            entry_tree_start,
            transaction_signature,
            mini_table_start,
            mini_table_count,
            indirect_start,
            indirect_count,
            table_locators,
        })
    }

    /// Encode the header, padded to a full sector
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.region_size());

        bytes.extend_from_slice(&COMPOUND_SIGNATURE);
        bytes.extend_from_slice(&[0u8; 16]);

        // Vec<u8> writes cannot fail
        let _ = bytes.write_u16::<LittleEndian>(self.minor_version);
        let _ = bytes.write_u16::<LittleEndian>(self.sector_size.major_version());
        let _ = bytes.write_u16::<LittleEndian>(BYTE_ORDER_MARK);
        let _ = bytes.write_u16::<LittleEndian>(self.sector_size.shift());
        let _ = bytes.write_u16::<LittleEndian>(MINI_SECTOR_SHIFT);
        bytes.extend_from_slice(&[0u8; 6]);

        let entry_tree_count = match self.sector_size {
            SectorSize::V3 => 0,
            SectorSize::V4 => self.entry_tree_count,
        };
        for value in [
            entry_tree_count,
            self.table_count,
            self.entry_tree_start,
            self.transaction_signature,
            MINI_CUTOFF,
            self.mini_table_start,
            self.mini_table_count,
            self.indirect_start,
            self.indirect_count,
        ] {
            let _ = bytes.write_u32::<LittleEndian>(value);
        }

        for slot in 0..INLINE_LOCATORS {
            let locator = self.table_locators.get(slot).copied().unwrap_or(FREE_SECTOR);
            let _ = bytes.write_u32::<LittleEndian>(locator);
        }

        debug_assert_eq!(bytes.len(), HEADER_SIZE);
        bytes.resize(self.region_size(), 0);
        bytes
    }
}
