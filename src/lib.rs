//! # compound-rs - Compound File Binary storage engine
//!
//! `compound-rs` reads and writes Compound File Binary containers (the
//! OLE2 structured storage used by legacy Office documents, MSI packages and
//! many other producers). A container is a small filesystem inside one file:
//!
//! - **Directories and documents** addressed by slash paths
//! - **Two stores**: large documents live in whole sectors, small ones in
//!   64-byte mini sectors packed inside a single stream
//! - **Tolerant loading**: damaged directory records are skipped and
//!   reported instead of failing the whole file
//! - **Compacting save**: [`CompoundFile::save`] writes every chain
//!   contiguously with no free sectors
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use compound_rs::{CompoundFile, Result};
//!
//! # fn main() -> Result<()> {
//! let mut file = CompoundFile::create("report.cfb")?;
//!
//! // Parents are created as needed
//! file.write("Workbook/Sheet1", b"Hello, World!")?;
//! let content = file.read("Workbook/Sheet1")?;
//!
//! for entry in file.list_children("Workbook")? {
//!     println!("{} ({:?} bytes)", entry.name, entry.size);
//! }
//!
//! file.save()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Lower-level access
//!
//! [`Filesystem`] works with [`EntryId`] handles instead of paths and
//! exposes streaming reads, integrity checks and statistics:
//!
//! ```rust,no_run
//! use compound_rs::{Filesystem, Result};
//!
//! # fn main() -> Result<()> {
//! let mut fs = Filesystem::new()?;
//! let root = fs.root();
//! let id = fs.create_document(root, "Data", &[0u8; 5000])?;
//! assert_eq!(fs.read_document(id)?.len(), 5000);
//! assert!(fs.check_integrity()?.is_clean());
//! # Ok(())
//! # }
//! ```

// Engine
pub mod core;

// Short crate:: paths for the engine modules
#[allow(unused_imports)]
pub(crate) use crate::core::{
    allocator, catalog, error, filesystem, header, integrity, io, layout, magic, ministore,
    options, stream, validation,
};

pub use crate::core::{
    catalog::{Entry, EntryId, EntryKind, EntryMetadata, LoadWarning},
    error::{CompoundError, Result},
    filesystem::{EntrySummary, Filesystem, FilesystemStats, Loaded},
    integrity::{IntegrityIssue, IntegrityReport},
    magic::{has_compound_header, FileMagic},
    options::{Options, SectorSize},
    stream::{DocumentReader, StoreKind},
};

use crate::validation::split_path;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Metadata about one entry, addressed by path
///
/// # Examples
///
/// ```rust,no_run
/// use compound_rs::CompoundFile;
///
/// # fn main() -> compound_rs::Result<()> {
/// let file = CompoundFile::open("legacy.doc")?;
/// for entry in file.list_children("")? {
///     if entry.is_dir {
///         println!("[dir] {}", entry.path);
///     } else {
///         println!("{} ({} bytes)", entry.path, entry.size.unwrap_or(0));
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryInfo {
    /// Full path from the root (e.g. "Workbook/Sheet1")
    pub path: String,

    /// Last path component
    pub name: String,

    /// Path of the parent; empty for entries directly under the root
    pub parent: String,

    /// True for directories and the root
    pub is_dir: bool,

    /// Document size in bytes (None for directories)
    pub size: Option<u64>,

    /// Store holding the document content (None for directories)
    pub store: Option<StoreKind>,

    /// Creation time as Unix epoch seconds (None if unset)
    pub created: Option<i64>,

    /// Modification time as Unix epoch seconds (None if unset)
    pub modified: Option<i64>,

    pub clsid: Uuid,

    pub kind: EntryKind,
}

impl EntryInfo {
    fn from_entry(path: String, entry: &Entry) -> Self {
        let path = path.trim_start_matches('/').to_string();
        let name = entry.name().to_string();
        let parent = match path.rfind('/') {
            Some(idx) => path[..idx].to_string(),
            None => String::new(),
        };
        let is_document = entry.kind() == EntryKind::Document;
        EntryInfo {
            path,
            name,
            parent,
            is_dir: !is_document,
            size: is_document.then(|| entry.size()),
            store: is_document.then(|| StoreKind::for_size(entry.size())),
            created: entry.metadata().created().map(|time| time.timestamp()),
            modified: entry.metadata().modified().map(|time| time.timestamp()),
            clsid: entry.metadata().clsid,
            kind: entry.kind(),
        }
    }
}

/// Path-addressed compound file
///
/// Wraps a [`Filesystem`] and optionally the path it was opened from or
/// will be saved to.
///
/// # Examples
///
/// ```rust,no_run
/// use compound_rs::{CompoundFile, Result};
///
/// # fn main() -> Result<()> {
/// let mut file = CompoundFile::in_memory()?;
/// file.write("Stream", b"content")?;
/// let bytes = file.into_bytes()?;
/// let file = CompoundFile::from_bytes(bytes)?;
/// assert_eq!(file.read("Stream")?, b"content");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CompoundFile {
    inner: Filesystem,
    path: Option<PathBuf>,
    warnings: Vec<LoadWarning>,
}

impl CompoundFile {
    /// Create an empty compound file at `path` and write it to disk
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        CompoundFileBuilder::new().path(path.as_ref()).build()
    }

    /// Empty compound file that lives only in memory until [`save_as`]
    ///
    /// [`save_as`]: CompoundFile::save_as
    pub fn in_memory() -> Result<Self> {
        CompoundFileBuilder::new().build()
    }

    /// Open an existing compound file from disk
    ///
    /// Damaged directory records are skipped; see [`CompoundFile::warnings`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        CompoundFileBuilder::new().path(path.as_ref()).open()
    }

    /// Parse an in-memory image
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let loaded = Filesystem::load(bytes, Options::default())?;
        Ok(Self::from_loaded(loaded, None))
    }

    fn from_loaded(loaded: Loaded, path: Option<PathBuf>) -> Self {
        if !loaded.warnings.is_empty() {
            warn!(
                "Loaded with {} skipped directory records",
                loaded.warnings.len()
            );
        }
        CompoundFile {
            inner: loaded.filesystem,
            path,
            warnings: loaded.warnings,
        }
    }

    /// Directory records skipped while loading
    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    /// Path this file is saved to, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the full content of a document
    pub fn read<P: AsRef<str>>(&self, path: P) -> Result<Vec<u8>> {
        let id = self.inner.resolve(path.as_ref())?;
        self.inner.read_document(id)
    }

    /// Streaming reader over a document
    pub fn reader<P: AsRef<str>>(&self, path: P) -> Result<DocumentReader<'_>> {
        let id = self.inner.resolve(path.as_ref())?;
        self.inner.document_reader(id)
    }

    /// Write a document, replacing it if it exists
    ///
    /// Missing parent directories are created.
    pub fn write<P: AsRef<str>>(&mut self, path: P, content: &[u8]) -> Result<()> {
        let path = path.as_ref();
        let components = split_path(path);
        let (name, parents) = components.split_last().ok_or(CompoundError::RootImmutable)?;
        let parent = self.ensure_dirs(parents)?;

        match self.inner.lookup(parent, name)? {
            Some(id) => self.inner.update_document(id, content)?,
            None => {
                self.inner.create_document(parent, name, content)?;
            }
        }
        debug!("Wrote {} ({} bytes)", path, content.len());
        Ok(())
    }

    /// Delete a document or an empty directory
    pub fn delete<P: AsRef<str>>(&mut self, path: P) -> Result<()> {
        let id = self.inner.resolve(path.as_ref())?;
        self.inner.delete(id)
    }

    /// Delete an entry and everything below it
    pub fn delete_all<P: AsRef<str>>(&mut self, path: P) -> Result<()> {
        let id = self.inner.resolve(path.as_ref())?;
        self.inner.delete_recursive(id)
    }

    /// Create a directory and any missing parents
    ///
    /// Succeeds if the directory already exists.
    pub fn create_dir<P: AsRef<str>>(&mut self, path: P) -> Result<()> {
        let components = split_path(path.as_ref());
        self.ensure_dirs(&components)?;
        Ok(())
    }

    fn ensure_dirs(&mut self, components: &[&str]) -> Result<EntryId> {
        let mut cursor = self.inner.root();
        for name in components {
            cursor = match self.inner.lookup(cursor, name)? {
                Some(id) if self.inner.entry(id)?.is_container() => id,
                Some(_) => {
                    return Err(CompoundError::NotADirectory {
                        name: name.to_string(),
                    })
                }
                None => self.inner.create_directory(cursor, name)?,
            };
        }
        Ok(cursor)
    }

    /// Immediate children of a directory, directories first then by name
    pub fn list_children<P: AsRef<str>>(&self, parent: P) -> Result<Vec<EntryInfo>> {
        let parent = self.inner.resolve(parent.as_ref())?;
        let mut entries = Vec::new();
        for &child in self.inner.children(parent)? {
            let path = self.inner.path_of(child)?;
            entries.push(EntryInfo::from_entry(path, self.inner.entry(child)?));
        }

        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });
        Ok(entries)
    }

    /// Metadata for a single entry
    pub fn metadata<P: AsRef<str>>(&self, path: P) -> Result<EntryInfo> {
        let id = self.inner.resolve(path.as_ref())?;
        let path = self.inner.path_of(id)?;
        Ok(EntryInfo::from_entry(path, self.inner.entry(id)?))
    }

    pub fn exists<P: AsRef<str>>(&self, path: P) -> Result<bool> {
        match self.inner.resolve(path.as_ref()) {
            Ok(_) => Ok(true),
            Err(CompoundError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// True for directories and the root; false for documents and missing paths
    pub fn is_dir<P: AsRef<str>>(&self, path: P) -> Result<bool> {
        match self.inner.resolve(path.as_ref()) {
            Ok(id) => Ok(self.inner.entry(id)?.is_container()),
            Err(CompoundError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Rename an entry in place; `new_name` is a single component
    pub fn rename<P: AsRef<str>>(&mut self, path: P, new_name: &str) -> Result<()> {
        let id = self.inner.resolve(path.as_ref())?;
        self.inner.rename(id, new_name)
    }

    /// Persist allocation state into the image and, if the file has a
    /// path, write the image there without re-layout
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        if let Some(path) = &self.path {
            let image = self.inner.big_store().source.as_bytes();
            io::write_container(path, |writer| {
                std::io::Write::write_all(writer, image)?;
                Ok(())
            })?;
            debug!("Flushed image to {}", path.display());
        }
        Ok(())
    }

    /// Write a compacted copy to the file's path
    pub fn save(&self) -> Result<()> {
        let path = self.path.as_ref().ok_or_else(|| {
            CompoundError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "compound file has no path; use save_as",
            ))
        })?;
        self.inner.save_to_path(path)
    }

    /// Write a compacted copy to `path` and remember it for later saves
    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.inner.save_to_path(&path)?;
        self.path = Some(path.as_ref().to_path_buf());
        Ok(())
    }

    /// Flush and return the in-place image
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        self.inner.into_bytes()
    }

    pub fn stats(&self) -> FilesystemStats {
        self.inner.stats()
    }

    pub fn check_integrity(&self) -> Result<IntegrityReport> {
        self.inner.check_integrity()
    }

    /// Get a reference to the underlying filesystem
    pub fn filesystem(&self) -> &Filesystem {
        &self.inner
    }

    /// Get mutable access to the underlying filesystem
    pub fn filesystem_mut(&mut self) -> &mut Filesystem {
        &mut self.inner
    }
}

/// Builder for creating or opening compound files with custom options
///
/// # Examples
///
/// ```rust,no_run
/// use compound_rs::{CompoundFileBuilder, SectorSize};
///
/// # fn main() -> compound_rs::Result<()> {
/// let file = CompoundFileBuilder::new()
///     .path("large.cfb")
///     .sector_size(SectorSize::V4)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CompoundFileBuilder {
    path: Option<PathBuf>,
    options: Options,
}

impl CompoundFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the on-disk path
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sector size for new files; ignored when opening
    pub fn sector_size(mut self, sector_size: SectorSize) -> Self {
        self.options = self.options.with_sector_size(sector_size);
        self
    }

    /// Fail the load on any damaged directory record
    pub fn strict_directory(mut self, strict: bool) -> Self {
        self.options = self.options.with_strict_directory(strict);
        self
    }

    /// Replace all options at once
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Load options from a TOML document
    pub fn options_toml(mut self, source: &str) -> Result<Self> {
        self.options = Options::from_toml_str(source)?;
        Ok(self)
    }

    /// Create an empty file; written to disk right away when a path is set
    pub fn build(self) -> Result<CompoundFile> {
        let inner = Filesystem::create_empty(self.options)?;
        if let Some(path) = &self.path {
            inner.save_to_path(path)?;
            info!("Created compound file at {}", path.display());
        }
        Ok(CompoundFile {
            inner,
            path: self.path,
            warnings: Vec::new(),
        })
    }

    /// Open the file at the configured path
    pub fn open(self) -> Result<CompoundFile> {
        let path = self.path.ok_or_else(|| {
            CompoundError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path must be set",
            ))
        })?;
        let loaded = Filesystem::open_path(&path, self.options)?;
        info!("Opened compound file {}", path.display());
        Ok(CompoundFile::from_loaded(loaded, Some(path)))
    }
}

/// Path-addressed storage interface
///
/// Lets callers treat a compound file like any other hierarchical store.
///
/// # Examples
///
/// ```rust,no_run
/// use compound_rs::{CompoundFile, Storage};
///
/// fn total_size<S: Storage>(storage: &S, dir: &str) -> compound_rs::Result<u64> {
///     let mut total = 0;
///     for entry in storage.list_children(dir)? {
///         total += if entry.is_dir {
///             total_size(storage, &entry.path)?
///         } else {
///             entry.size.unwrap_or(0)
///         };
///     }
///     Ok(total)
/// }
///
/// let file = CompoundFile::open("legacy.doc")?;
/// println!("{} bytes", total_size(&file, "")?);
/// # Ok::<(), compound_rs::CompoundError>(())
/// ```
pub trait Storage {
    /// Immediate children of a directory
    fn list_children(&self, parent: &str) -> Result<Vec<EntryInfo>>;

    /// Full content of a document
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Create or replace a document, creating missing parents
    fn write(&mut self, path: &str, data: &[u8]) -> Result<()>;

    /// Delete an entry and everything below it
    fn delete(&mut self, path: &str) -> Result<()>;

    fn exists(&self, path: &str) -> Result<bool>;

    fn is_dir(&self, path: &str) -> Result<bool>;
}

impl Storage for CompoundFile {
    fn list_children(&self, parent: &str) -> Result<Vec<EntryInfo>> {
        CompoundFile::list_children(self, parent)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        CompoundFile::read(self, path)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<()> {
        CompoundFile::write(self, path, data)
    }

    fn delete(&mut self, path: &str) -> Result<()> {
        CompoundFile::delete_all(self, path)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        CompoundFile::exists(self, path)
    }

    fn is_dir(&self, path: &str) -> Result<bool> {
        CompoundFile::is_dir(self, path)
    }
}
