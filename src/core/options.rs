//! Creation and load options
//!
//! Options can be built in code or read from a TOML document:
//!
//! ```toml
//! sector_size = 4096
//! strict_directory = true
//! ```

use crate::error::{CompoundError, Result};
use serde::{Deserialize, Serialize};

/// Big-sector size of a container
///
/// Fixed when a container is created. Version 3 files use 512-byte sectors,
/// version 4 files use 4096-byte sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u32", into = "u32")]
pub enum SectorSize {
    #[default]
    V3,
    V4,
}

impl SectorSize {
    /// Sector size in bytes
    pub const fn bytes(self) -> usize {
        match self {
            SectorSize::V3 => 512,
            SectorSize::V4 => 4096,
        }
    }

    /// log2 of the sector size, as stored in the header
    pub const fn shift(self) -> u16 {
        match self {
            SectorSize::V3 => 9,
            SectorSize::V4 => 12,
        }
    }

    /// Major format version that goes with this sector size
    pub const fn major_version(self) -> u16 {
        match self {
            SectorSize::V3 => 3,
            SectorSize::V4 => 4,
        }
    }

    /// Number of 32-bit allocation-table slots per sector
    pub const fn slots_per_sector(self) -> usize {
        self.bytes() / 4
    }

    /// Number of 128-byte directory records per sector
    pub const fn records_per_sector(self) -> usize {
        self.bytes() / 128
    }

    pub fn from_shift(shift: u16) -> Result<Self> {
        match shift {
            9 => Ok(SectorSize::V3),
            12 => Ok(SectorSize::V4),
            _ => Err(CompoundError::UnsupportedSectorShift { shift }),
        }
    }
}

impl TryFrom<u32> for SectorSize {
    type Error = String;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        match value {
            512 => Ok(SectorSize::V3),
            4096 => Ok(SectorSize::V4),
            other => Err(format!("sector size must be 512 or 4096, got {}", other)),
        }
    }
}

impl From<SectorSize> for u32 {
    fn from(size: SectorSize) -> u32 {
        size.bytes() as u32
    }
}

/// Options for creating and loading containers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Sector size for newly created containers (ignored on load)
    pub sector_size: SectorSize,

    /// Fail the load when any directory record has to be skipped
    pub strict_directory: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn with_sector_size(mut self, sector_size: SectorSize) -> Self {
        self.sector_size = sector_size;
        self
    }

    pub fn with_strict_directory(mut self, strict: bool) -> Self {
        self.strict_directory = strict;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sector_size_constants() {
        assert_eq!(SectorSize::V3.bytes(), 512);
        assert_eq!(SectorSize::V3.slots_per_sector(), 128);
        assert_eq!(SectorSize::V3.records_per_sector(), 4);
        assert_eq!(SectorSize::V4.bytes(), 4096);
        assert_eq!(SectorSize::V4.shift(), 12);
        assert_eq!(SectorSize::V4.major_version(), 4);
    }

    #[test]
    fn test_from_shift_rejects_absurd_values() {
        assert_eq!(SectorSize::from_shift(9).unwrap(), SectorSize::V3);
        assert!(matches!(
            SectorSize::from_shift(30),
            Err(CompoundError::UnsupportedSectorShift { shift: 30 })
        ));
    }

    #[test]
    fn test_options_from_toml() {
        let options = Options::from_toml_str("sector_size = 4096\nstrict_directory = true\n").unwrap();
        assert_eq!(options.sector_size, SectorSize::V4);
        assert!(options.strict_directory);
    }

    #[test]
    fn test_options_toml_defaults() {
        let options = Options::from_toml_str("").unwrap();
        assert_eq!(options, Options::default());
    }

    #[test]
    fn test_options_reject_bad_sector_size() {
        let result = Options::from_toml_str("sector_size = 1024\n");
        assert!(matches!(result, Err(CompoundError::Config(_))));
    }
}
