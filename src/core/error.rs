use crate::catalog::EntryId;
use crate::magic::FileMagic;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompoundError {
    #[error("Not a compound file: leading bytes look like {detected}")]
    NotCompoundFile { detected: FileMagic },

    #[error("Unsupported sector shift: {shift} (expected 9 or 12)")]
    UnsupportedSectorShift { shift: u16 },

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Sector {sector} is out of bounds (limit {limit})")]
    SectorOutOfBounds { sector: u32, limit: u32 },

    #[error("Sector {sector} is truncated: image ends at byte offset {offset}")]
    Truncated { sector: u32, offset: u64 },

    #[error("Chain loop detected: sector {sector} was visited twice")]
    ChainLoop { sector: u32 },

    #[error("Invalid chain link at sector {sector}: {value:#010x} is not a chain successor")]
    InvalidChainLink { sector: u32, value: u32 },

    #[error("Entry already exists: {name}")]
    NameConflict { name: String },

    #[error("Directory not empty: {name}")]
    DirectoryNotEmpty { name: String },

    #[error("The root entry cannot be deleted or renamed")]
    RootImmutable,

    #[error("Entry not found: {name}")]
    NotFound { name: String },

    #[error("Not a directory: {name}")]
    NotADirectory { name: String },

    #[error("Not a document: {name}")]
    NotADocument { name: String },

    #[error("Invalid entry name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Entry handle {0} no longer refers to a live entry")]
    StaleEntry(EntryId),

    #[error("Corrupt directory: {0}")]
    CorruptDirectory(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CompoundError {
    /// The input is not this format, or uses a layout this engine rejects.
    pub fn is_format_mismatch(&self) -> bool {
        matches!(
            self,
            CompoundError::NotCompoundFile { .. }
                | CompoundError::UnsupportedSectorShift { .. }
                | CompoundError::InvalidHeader(_)
        )
    }

    /// Bounds, truncation and chain errors: the file itself is damaged.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            CompoundError::SectorOutOfBounds { .. }
                | CompoundError::Truncated { .. }
                | CompoundError::ChainLoop { .. }
                | CompoundError::InvalidChainLink { .. }
                | CompoundError::CorruptDirectory(_)
        )
    }

    /// Precondition failures on structural operations.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CompoundError::NameConflict { .. }
                | CompoundError::DirectoryNotEmpty { .. }
                | CompoundError::RootImmutable
                | CompoundError::NotADirectory { .. }
                | CompoundError::NotADocument { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CompoundError>;
