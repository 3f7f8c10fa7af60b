//! 128-byte directory records
//!
//! ```text
//! offset  size  field
//!      0    64  name, UTF-16LE, null terminated
//!     64     2  name length in bytes, including the terminator
//!     66     1  type (0 empty, 1 storage, 2 stream, 5 root)
//!     67     1  node colour (0 red, 1 black)
//!     68     4  left sibling
//!     72     4  right sibling
//!     76     4  child
//!     80    16  CLSID
//!     96     4  state bits
//!    100     8  creation FILETIME
//!    108     8  modification FILETIME
//!    116     4  start sector
//!    120     8  size
//! ```

use crate::catalog::metadata::EntryMetadata;
use byteorder::{ByteOrder, LittleEndian};
use uuid::Uuid;

pub const RECORD_SIZE: usize = 128;

/// Sibling/child link meaning "none"
pub const NO_STREAM: u32 = 0xFFFF_FFFF;

const NAME_FIELD: usize = 64;

pub const COLOR_RED: u8 = 0;
pub const COLOR_BLACK: u8 = 1;

/// Record type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Empty,
    Storage,
    Stream,
    Root,
    /// Lock bytes, property or anything else; never loaded
    Other(u8),
}

impl RecordType {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => RecordType::Empty,
            1 => RecordType::Storage,
            2 => RecordType::Stream,
            5 => RecordType::Root,
            other => RecordType::Other(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            RecordType::Empty => 0,
            RecordType::Storage => 1,
            RecordType::Stream => 2,
            RecordType::Root => 5,
            RecordType::Other(byte) => byte,
        }
    }
}

/// One decoded directory record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub name: String,
    pub record_type: RecordType,
    pub color: u8,
    pub left: u32,
    pub right: u32,
    pub child: u32,
    pub metadata: EntryMetadata,
    pub start: u32,
    pub size: u64,
}

impl RawRecord {
    /// Unused record
    pub fn empty() -> Self {
        RawRecord {
            name: String::new(),
            record_type: RecordType::Empty,
            color: COLOR_RED,
            left: NO_STREAM,
            right: NO_STREAM,
            child: NO_STREAM,
            metadata: EntryMetadata::default(),
            start: 0,
            size: 0,
        }
    }

    /// Decode a record; fails only when the name field is malformed
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        debug_assert!(bytes.len() >= RECORD_SIZE);

        let name_len = LittleEndian::read_u16(&bytes[64..66]) as usize;
        if name_len > NAME_FIELD || name_len % 2 != 0 {
            return Err(format!("name length {} is invalid", name_len));
        }
        let units: Vec<u16> = bytes[..name_len]
            .chunks_exact(2)
            .map(LittleEndian::read_u16)
            .take_while(|&unit| unit != 0)
            .collect();
        let name = String::from_utf16_lossy(&units);

        let mut clsid = [0u8; 16];
        clsid.copy_from_slice(&bytes[80..96]);

        Ok(RawRecord {
            name,
            record_type: RecordType::from_byte(bytes[66]),
            color: bytes[67],
            left: LittleEndian::read_u32(&bytes[68..72]),
            right: LittleEndian::read_u32(&bytes[72..76]),
            child: LittleEndian::read_u32(&bytes[76..80]),
            metadata: EntryMetadata {
                clsid: Uuid::from_bytes_le(clsid),
                state_bits: LittleEndian::read_u32(&bytes[96..100]),
                created_raw: LittleEndian::read_u64(&bytes[100..108]),
                modified_raw: LittleEndian::read_u64(&bytes[108..116]),
            },
            start: LittleEndian::read_u32(&bytes[116..120]),
            size: LittleEndian::read_u64(&bytes[120..128]),
        })
    }

    /// Encode to exactly 128 bytes; names are cut at 31 UTF-16 units
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];

        let units: Vec<u16> = self.name.encode_utf16().take(NAME_FIELD / 2 - 1).collect();
        for (index, &unit) in units.iter().enumerate() {
            LittleEndian::write_u16(&mut bytes[index * 2..index * 2 + 2], unit);
        }
        let name_len = if units.is_empty() {
            0
        } else {
            (units.len() + 1) * 2
        };
        LittleEndian::write_u16(&mut bytes[64..66], name_len as u16);

        bytes[66] = self.record_type.to_byte();
        bytes[67] = self.color;
        LittleEndian::write_u32(&mut bytes[68..72], self.left);
        LittleEndian::write_u32(&mut bytes[72..76], self.right);
        LittleEndian::write_u32(&mut bytes[76..80], self.child);
        bytes[80..96].copy_from_slice(&self.metadata.clsid.to_bytes_le());
        LittleEndian::write_u32(&mut bytes[96..100], self.metadata.state_bits);
        LittleEndian::write_u64(&mut bytes[100..108], self.metadata.created_raw);
        LittleEndian::write_u64(&mut bytes[108..116], self.metadata.modified_raw);
        LittleEndian::write_u32(&mut bytes[116..120], self.start);
        LittleEndian::write_u64(&mut bytes[120..128], self.size);

        bytes
    }
}
