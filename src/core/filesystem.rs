//! Filesystem facade
//!
//! Owns every piece of allocation state (header, allocation table, mini
//! store, entry tree) and the in-memory sector image, and routes each
//! operation to the entry tree for structure and to the stream engine for
//! content.
//!
//! A `Filesystem` is not synchronised. Shared references may read
//! concurrently; any mutation needs `&mut self`, so stream handles borrowed
//! from it cannot outlive a structural change.

use crate::allocator::table::{AllocationTable, BigStore};
use crate::allocator::{collect_chain, SectorRef};
use crate::catalog::{
    Catalog, Entry, EntryId, EntryKind, EntryMetadata, LoadWarning, Node, RawRecord, RECORD_SIZE,
};
use crate::error::{CompoundError, Result};
use crate::header::Header;
use crate::integrity::{self, IntegrityReport};
use crate::io::{self, ByteSource};
use crate::layout;
use crate::ministore::MiniState;
use crate::options::{Options, SectorSize};
use crate::stream::{BlockStream, DocumentReader, StoreKind};
use crate::validation::{split_path, validate_entry_name};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of a tolerant load
#[derive(Debug)]
pub struct Loaded {
    pub filesystem: Filesystem,

    /// Directory records that were skipped
    pub warnings: Vec<LoadWarning>,
}

/// Occupancy counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemStats {
    pub sector_size: usize,
    /// Sectors addressable through the allocation table
    pub total_sectors: u32,
    pub free_sectors: usize,
    pub table_sectors: usize,
    pub indirect_sectors: usize,
    pub mini_sectors_used: usize,
    pub mini_sectors_free: usize,
    pub mini_stream_size: u64,
    pub document_count: usize,
    pub directory_count: usize,
    /// Length of the in-memory image in bytes
    pub image_len: u64,
}

/// Serializable view of the entry tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreKind>,
    #[serde(default, skip_serializing_if = "Uuid::is_nil")]
    pub clsid: Uuid,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<EntrySummary>,
}

/// An open compound file
#[derive(Debug, Clone)]
pub struct Filesystem {
    header: Header,
    big: BigStore,
    mini: MiniState,
    catalog: Catalog,
    directory: BlockStream,
    options: Options,
}

impl Filesystem {
    /// Empty container: header, one allocation table sector, a root entry
    /// and no mini stream until the first small document is written
    pub fn create_empty(options: Options) -> Result<Self> {
        let sector_size = options.sector_size;
        let mut filesystem = Filesystem {
            header: Header::new(sector_size),
            big: BigStore::new(
                ByteSource::new(sector_size),
                AllocationTable::new(sector_size),
            ),
            mini: MiniState::new(),
            catalog: Catalog::new(),
            directory: BlockStream::empty(),
            options,
        };
        filesystem.flush()?;

        info!(
            "Created compound file ({} byte sectors)",
            sector_size.bytes()
        );
        Ok(filesystem)
    }

    /// Empty container with default options
    pub fn new() -> Result<Self> {
        Self::create_empty(Options::default())
    }

    /// Parse a file image, skipping directory records that fail validation
    pub fn load(bytes: Vec<u8>, options: Options) -> Result<Loaded> {
        let header = Header::from_bytes(&bytes)?;
        let source = ByteSource::from_bytes(bytes, header.sector_size);
        let table = AllocationTable::load(&header, &source)?;
        let big = BigStore::new(source, table);

        let directory = BlockStream::new(header.entry_tree_start);
        let mut records = Vec::new();
        for block in directory.blocks(&big) {
            let block = block?;
            records.extend(block.chunks_exact(RECORD_SIZE).map(RawRecord::decode));
        }

        let decoded = Catalog::from_records(&records, header.sector_size)?;
        for warning in &decoded.warnings {
            warn!("Skipped {}", warning);
        }
        if options.strict_directory {
            if let Some(first) = decoded.warnings.first() {
                return Err(CompoundError::CorruptDirectory(first.to_string()));
            }
        }

        let mini = MiniState::load(
            &big,
            &header,
            decoded.mini_stream_start,
            decoded.mini_stream_size,
        )?;

        info!(
            "Opened compound file: {} entries, {} sectors, {} skipped records",
            decoded.catalog.len(),
            big.table.slot_count(),
            decoded.warnings.len()
        );

        Ok(Loaded {
            filesystem: Filesystem {
                header,
                big,
                mini,
                catalog: decoded.catalog,
                directory,
                options,
            },
            warnings: decoded.warnings,
        })
    }

    /// Parse a file image with default options
    pub fn open(bytes: Vec<u8>) -> Result<Self> {
        Ok(Self::load(bytes, Options::default())?.filesystem)
    }

    /// Read and parse a file from disk
    pub fn open_path<P: AsRef<Path>>(path: P, options: Options) -> Result<Loaded> {
        let bytes = io::read_container(&path)?;
        debug!("Read {} bytes from {}", bytes.len(), path.as_ref().display());
        Self::load(bytes, options)
    }

    pub fn sector_size(&self) -> SectorSize {
        self.header.sector_size
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub(crate) fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub(crate) fn big_store(&self) -> &BigStore {
        &self.big
    }

    pub(crate) fn mini_state(&self) -> &MiniState {
        &self.mini
    }

    pub(crate) fn directory_start(&self) -> u32 {
        self.directory.start()
    }

    pub fn root(&self) -> EntryId {
        self.catalog.root()
    }

    pub fn entry(&self, id: EntryId) -> Result<&Entry> {
        self.catalog.get(id)
    }

    /// Byte size of an entry; for the root this is the mini stream length
    pub fn entry_size(&self, id: EntryId) -> Result<u64> {
        let entry = self.catalog.get(id)?;
        Ok(match entry.kind() {
            EntryKind::Root => self.mini.stream_size(),
            _ => entry.size(),
        })
    }

    /// Slash-separated path of an entry
    pub fn path_of(&self, id: EntryId) -> Result<String> {
        self.catalog.path(id)
    }

    /// Children of a container, in sibling order
    pub fn children(&self, id: EntryId) -> Result<&[EntryId]> {
        self.catalog.children(id)
    }

    /// Case-insensitive lookup of a child; `Ok(None)` when absent
    pub fn lookup(&self, parent: EntryId, name: &str) -> Result<Option<EntryId>> {
        self.catalog.lookup(parent, name)
    }

    /// Resolve a slash path from the root
    pub fn resolve(&self, path: &str) -> Result<EntryId> {
        self.resolve_components(&split_path(path))
    }

    /// Resolve a sequence of names from the root
    pub fn resolve_components<S: AsRef<str>>(&self, components: &[S]) -> Result<EntryId> {
        let mut cursor = self.root();
        for (depth, name) in components.iter().enumerate() {
            let name = name.as_ref();
            cursor = self.catalog.lookup(cursor, name)?.ok_or_else(|| {
                let walked: Vec<&str> = components[..=depth].iter().map(|c| c.as_ref()).collect();
                CompoundError::NotFound {
                    name: format!("/{}", walked.join("/")),
                }
            })?;
        }
        Ok(cursor)
    }

    /// Store a new document under `parent`
    pub fn create_document(&mut self, parent: EntryId, name: &str, data: &[u8]) -> Result<EntryId> {
        validate_entry_name(name)?;
        if self.catalog.lookup(parent, name)?.is_some() {
            return Err(CompoundError::NameConflict {
                name: name.to_string(),
            });
        }

        let kind = StoreKind::for_size(data.len() as u64);
        let stream = self.write_content(kind, BlockStream::empty(), data)?;
        let node = Node::Document {
            start: stream.start(),
            size: data.len() as u64,
        };

        match self.catalog.insert(parent, name, node, EntryMetadata::default()) {
            Ok(id) => {
                self.touch_container(parent)?;
                debug!(
                    "Created document {} ({} bytes, {:?} store)",
                    name,
                    data.len(),
                    kind
                );
                Ok(id)
            }
            Err(err) => {
                self.free_content(kind, stream)?;
                Err(err)
            }
        }
    }

    /// Add an empty directory under `parent`
    pub fn create_directory(&mut self, parent: EntryId, name: &str) -> Result<EntryId> {
        let node = Node::Directory {
            children: Vec::new(),
        };
        let id = self.catalog.insert(parent, name, node, EntryMetadata::now())?;
        self.touch_container(parent)?;
        debug!("Created directory {}", name);
        Ok(id)
    }

    /// Delete a document or an empty directory
    pub fn delete(&mut self, id: EntryId) -> Result<()> {
        self.catalog.check_removable(id)?;
        let entry = self.catalog.get(id)?;
        if let Node::Document { start, size } = *entry.node() {
            self.free_content(StoreKind::for_size(size), BlockStream::new(start))?;
        }
        let removed = self.catalog.remove(id)?;
        if let Some(parent) = removed.parent() {
            self.touch_container(parent)?;
        }
        debug!("Deleted {}", removed.name());
        Ok(())
    }

    /// Delete an entry and everything below it, deepest entries first
    pub fn delete_recursive(&mut self, id: EntryId) -> Result<()> {
        if self.catalog.get(id)?.kind() == EntryKind::Root {
            return Err(CompoundError::RootImmutable);
        }
        for victim in self.catalog.post_order(id)? {
            self.delete(victim)?;
        }
        Ok(())
    }

    pub fn rename(&mut self, id: EntryId, new_name: &str) -> Result<()> {
        let old_name = self.catalog.get(id)?.name().to_string();
        self.catalog.rename(id, new_name)?;
        if let Some(parent) = self.catalog.get(id)?.parent() {
            self.touch_container(parent)?;
        }
        debug!("Renamed {} to {}", old_name, new_name);
        Ok(())
    }

    /// Stamp a storage's modification time after its children change.
    /// Root and document stamps stay as they are.
    fn touch_container(&mut self, id: EntryId) -> Result<()> {
        if self.catalog.get(id)?.kind() == EntryKind::Directory {
            self.catalog.metadata_mut(id)?.touch();
        }
        Ok(())
    }

    /// Whole content of a document
    pub fn read_document(&self, id: EntryId) -> Result<Vec<u8>> {
        let (start, size) = self.document_extent(id)?;
        let stream = BlockStream::new(start);
        match StoreKind::for_size(size) {
            StoreKind::Big => stream.read_to_vec(&self.big, size),
            StoreKind::Mini => stream.read_to_vec(self.mini.view(&self.big), size),
        }
    }

    /// Streaming reader over a document; reopen to seek back
    pub fn document_reader(&self, id: EntryId) -> Result<DocumentReader<'_>> {
        let (start, size) = self.document_extent(id)?;
        let stream = BlockStream::new(start);
        Ok(match StoreKind::for_size(size) {
            StoreKind::Big => DocumentReader::new(stream.blocks(&self.big), size),
            StoreKind::Mini => DocumentReader::new(stream.blocks(self.mini.view(&self.big)), size),
        })
    }

    /// Replace a document's content, moving it between stores when its size
    /// crosses the mini cutoff
    pub fn update_document(&mut self, id: EntryId, data: &[u8]) -> Result<()> {
        let (start, size) = self.document_extent(id)?;
        let old_kind = StoreKind::for_size(size);
        let new_kind = StoreKind::for_size(data.len() as u64);

        let stream = if old_kind == new_kind {
            self.write_content(new_kind, BlockStream::new(start), data)?
        } else {
            self.free_content(old_kind, BlockStream::new(start))?;
            debug!(
                "Moving {} from {:?} store to {:?} store",
                id, old_kind, new_kind
            );
            self.write_content(new_kind, BlockStream::empty(), data)?
        };

        self.catalog
            .set_document(id, stream.start(), data.len() as u64)?;
        debug!("Updated document {} ({} bytes)", id, data.len());
        Ok(())
    }

    /// Store and sector chain holding a document's content
    pub fn document_chain(&self, id: EntryId) -> Result<(StoreKind, Vec<u32>)> {
        let (start, size) = self.document_extent(id)?;
        let kind = StoreKind::for_size(size);
        let chain = match kind {
            StoreKind::Big => collect_chain(&self.big, start)?,
            StoreKind::Mini => collect_chain(&self.mini.view(&self.big), start)?,
        };
        Ok((kind, chain))
    }

    fn document_extent(&self, id: EntryId) -> Result<(u32, u64)> {
        let entry = self.catalog.get(id)?;
        match *entry.node() {
            Node::Document { start, size } => Ok((start, size)),
            _ => Err(CompoundError::NotADocument {
                name: entry.name().to_string(),
            }),
        }
    }

    fn write_content(
        &mut self,
        kind: StoreKind,
        mut stream: BlockStream,
        data: &[u8],
    ) -> Result<BlockStream> {
        match kind {
            StoreKind::Big => stream.update_contents(&mut self.big, data)?,
            StoreKind::Mini => {
                let mut store = self.mini.store_mut(&mut self.big);
                stream.update_contents(&mut store, data)?
            }
        }
        Ok(stream)
    }

    fn free_content(&mut self, kind: StoreKind, mut stream: BlockStream) -> Result<()> {
        match kind {
            StoreKind::Big => stream.free(&mut self.big),
            StoreKind::Mini => {
                let mut store = self.mini.store_mut(&mut self.big);
                stream.free(&mut store)
            }
        }
    }

    /// Persist allocation state into the image without moving any sector
    ///
    /// Writes the mini table, the directory stream, every dirty allocation
    /// table sector, the indirect sectors and finally the header.
    pub fn flush(&mut self) -> Result<()> {
        self.mini.flush_into(&mut self.big)?;

        let records = self.catalog.to_records(
            self.mini.stream_start(),
            self.mini.stream_size(),
            |_, entry| (entry.start(), entry.size()),
        )?;
        let bytes = encode_directory(&records, self.sector_size());
        self.directory.update_contents(&mut self.big, &bytes)?;

        self.big.flush_table();

        let mut header = self.header.clone();
        self.big.table.update_header(&mut header);
        header.entry_tree_start = self.directory.start();
        header.entry_tree_count = (bytes.len() / self.sector_size().bytes()) as u32;
        header.mini_table_start = self.mini.table_start();
        header.mini_table_count = self.mini.table_chain().len() as u32;
        self.big.source.write_header(&header.to_bytes());
        self.big.source.pad_to_sector();
        self.header = header;

        info!(
            "Flushed compound file: {} entries, {} bytes",
            self.catalog.len(),
            self.big.source.len()
        );
        Ok(())
    }

    /// Flush and hand back the image
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        self.flush()?;
        Ok(self.big.source.into_inner())
    }

    /// Serialize a compacted copy: every chain contiguous, no free sectors
    pub fn write_to<W: std::io::Write>(&self, sink: &mut W) -> Result<()> {
        layout::write_compact(self, sink)
    }

    /// Compacted copy written to disk
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        io::write_container(&path, |writer| self.write_to(writer))?;
        info!("Saved compound file to {}", path.as_ref().display());
        Ok(())
    }

    /// Release the filesystem
    pub fn close(self) -> Result<()> {
        info!("Closed compound file ({} entries)", self.catalog.len());
        Ok(())
    }

    /// Verify chain ownership and lengths in both stores
    pub fn check_integrity(&self) -> Result<IntegrityReport> {
        integrity::check(self)
    }

    pub fn stats(&self) -> FilesystemStats {
        let table = &self.big.table;
        let mini_slots = self.mini.slots().len();
        let mini_used = self.mini.used_sectors();
        let (mut document_count, mut directory_count) = (0, 0);
        for (_, entry) in self.catalog.iter() {
            match entry.kind() {
                EntryKind::Document => document_count += 1,
                EntryKind::Directory => directory_count += 1,
                EntryKind::Root => {}
            }
        }

        FilesystemStats {
            sector_size: self.sector_size().bytes(),
            total_sectors: table.slot_count(),
            free_sectors: table.count(SectorRef::Free),
            table_sectors: table.table_sectors().len(),
            indirect_sectors: table.indirect_sectors().len(),
            mini_sectors_used: mini_used,
            mini_sectors_free: mini_slots - mini_used,
            mini_stream_size: self.mini.stream_size(),
            document_count,
            directory_count,
            image_len: self.big.source.len(),
        }
    }

    /// Tree view of every entry
    pub fn describe(&self) -> Result<EntrySummary> {
        self.summarize(self.root())
    }

    fn summarize(&self, id: EntryId) -> Result<EntrySummary> {
        let entry = self.catalog.get(id)?;
        let store = match entry.kind() {
            EntryKind::Document => Some(StoreKind::for_size(entry.size())),
            _ => None,
        };
        let children = entry
            .children()
            .iter()
            .map(|&child| self.summarize(child))
            .collect::<Result<Vec<_>>>()?;

        Ok(EntrySummary {
            name: entry.name().to_string(),
            kind: entry.kind(),
            size: self.entry_size(id)?,
            store,
            clsid: entry.metadata().clsid,
            children,
        })
    }

    /// Tree view rendered as pretty JSON
    pub fn describe_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.describe()?)?)
    }
}

/// Encode records, padded with empty records to a whole number of sectors
pub(crate) fn encode_directory(records: &[RawRecord], sector_size: SectorSize) -> Vec<u8> {
    let per_sector = sector_size.records_per_sector();
    let total = ((records.len() + per_sector - 1) / per_sector).max(1) * per_sector;

    let mut bytes = Vec::with_capacity(total * RECORD_SIZE);
    for record in records {
        bytes.extend_from_slice(&record.encode());
    }
    let empty = RawRecord::empty().encode();
    for _ in records.len()..total {
        bytes.extend_from_slice(&empty);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::MINI_CUTOFF;
    use std::io::Read;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    fn reopen(fs: Filesystem) -> Filesystem {
        Filesystem::open(fs.into_bytes().unwrap()).unwrap()
    }

    #[test]
    fn test_create_empty() {
        let fs = Filesystem::new().unwrap();
        assert_eq!(fs.sector_size(), SectorSize::V3);
        assert!(fs.children(fs.root()).unwrap().is_empty());
        assert_eq!(fs.entry_size(fs.root()).unwrap(), 0);

        let stats = fs.stats();
        assert_eq!(stats.table_sectors, 1);
        assert_eq!(stats.mini_stream_size, 0);
        assert_eq!(stats.image_len, 512 * 3);
    }

    #[test]
    fn test_empty_round_trip() {
        let fs = reopen(Filesystem::new().unwrap());
        assert!(fs.children(fs.root()).unwrap().is_empty());
        assert!(fs.check_integrity().unwrap().is_clean());
    }

    #[test]
    fn test_mini_and_big_documents() {
        let mut fs = Filesystem::new().unwrap();
        let root = fs.root();
        let small = fs.create_document(root, "Small", &pattern(512, 1)).unwrap();
        let large = fs.create_document(root, "Large", &pattern(5000, 2)).unwrap();

        assert_eq!(fs.read_document(small).unwrap(), pattern(512, 1));
        assert_eq!(fs.read_document(large).unwrap(), pattern(5000, 2));
        assert_eq!(fs.stats().mini_sectors_used, 8);

        let fs = reopen(fs);
        let small = fs.resolve("/Small").unwrap();
        let large = fs.resolve("Large").unwrap();
        assert_eq!(fs.read_document(small).unwrap(), pattern(512, 1));
        assert_eq!(fs.read_document(large).unwrap(), pattern(5000, 2));
        assert!(fs.check_integrity().unwrap().is_clean());
    }

    #[test]
    fn test_update_migrates_between_stores() {
        let mut fs = Filesystem::new().unwrap();
        let root = fs.root();
        let id = fs.create_document(root, "Doc", &pattern(100, 3)).unwrap();

        fs.update_document(id, &pattern(MINI_CUTOFF as usize, 4)).unwrap();
        assert_eq!(fs.stats().mini_sectors_used, 0);
        assert_eq!(fs.read_document(id).unwrap(), pattern(4096, 4));

        fs.update_document(id, &pattern(10, 5)).unwrap();
        assert_eq!(fs.stats().mini_sectors_used, 1);
        assert_eq!(fs.read_document(id).unwrap(), pattern(10, 5));
        assert!(fs.check_integrity().unwrap().is_clean());
    }

    #[test]
    fn test_empty_document() {
        let mut fs = Filesystem::new().unwrap();
        let root = fs.root();
        let id = fs.create_document(root, "Empty", &[]).unwrap();
        assert!(fs.read_document(id).unwrap().is_empty());
        assert_eq!(fs.stats().mini_stream_size, 0);

        let fs = reopen(fs);
        let id = fs.resolve("Empty").unwrap();
        assert_eq!(fs.entry_size(id).unwrap(), 0);
    }

    #[test]
    fn test_structural_conflicts() {
        let mut fs = Filesystem::new().unwrap();
        let root = fs.root();
        let dir = fs.create_directory(root, "Dir").unwrap();
        fs.create_document(dir, "Doc", b"x").unwrap();

        assert!(matches!(
            fs.create_document(root, "dir", b"y"),
            Err(CompoundError::NameConflict { .. })
        ));
        assert!(matches!(
            fs.delete(dir),
            Err(CompoundError::DirectoryNotEmpty { .. })
        ));
        assert!(matches!(fs.delete(root), Err(CompoundError::RootImmutable)));
        assert!(matches!(
            fs.rename(root, "Other"),
            Err(CompoundError::RootImmutable)
        ));
        assert!(matches!(
            fs.read_document(dir),
            Err(CompoundError::NotADocument { .. })
        ));
    }

    #[test]
    fn test_storage_stamped_when_children_change() {
        let mut fs = Filesystem::new().unwrap();
        let root = fs.root();
        let dir = fs.create_directory(root, "Storage").unwrap();

        let clear = |fs: &mut Filesystem| fs.catalog.metadata_mut(dir).unwrap().modified_raw = 0;
        let stamped = |fs: &Filesystem| fs.entry(dir).unwrap().metadata().modified().is_some();

        clear(&mut fs);
        let doc = fs.create_document(dir, "Doc", b"body").unwrap();
        assert!(stamped(&fs));

        clear(&mut fs);
        fs.rename(doc, "Renamed").unwrap();
        assert!(stamped(&fs));

        clear(&mut fs);
        fs.delete(doc).unwrap();
        assert!(stamped(&fs));

        // Root keeps its unset stamps; documents carry none
        let other = fs.create_document(root, "Top", b"x").unwrap();
        assert!(fs.entry(root).unwrap().metadata().modified().is_none());
        assert_eq!(fs.entry(other).unwrap().metadata().modified_raw, 0);
    }

    #[test]
    fn test_delete_recursive_frees_everything() {
        let mut fs = Filesystem::new().unwrap();
        let root = fs.root();
        let dir = fs.create_directory(root, "Dir").unwrap();
        let inner = fs.create_directory(dir, "Inner").unwrap();
        fs.create_document(inner, "Big", &pattern(6000, 6)).unwrap();
        fs.create_document(dir, "Small", &pattern(70, 7)).unwrap();

        fs.delete_recursive(dir).unwrap();
        assert!(fs.children(root).unwrap().is_empty());
        assert_eq!(fs.stats().mini_sectors_used, 0);
        assert!(fs.check_integrity().unwrap().is_clean());
        assert!(matches!(
            fs.delete_recursive(root),
            Err(CompoundError::RootImmutable)
        ));
    }

    #[test]
    fn test_resolve_reports_missing_path() {
        let mut fs = Filesystem::new().unwrap();
        let root = fs.root();
        fs.create_directory(root, "Dir").unwrap();

        match fs.resolve("/Dir/Missing") {
            Err(CompoundError::NotFound { name }) => assert_eq!(name, "/Dir/Missing"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(fs.lookup(root, "missing").unwrap(), None);
    }

    #[test]
    fn test_document_reader_streams_content() {
        let mut fs = Filesystem::new().unwrap();
        let root = fs.root();
        let id = fs.create_document(root, "Doc", &pattern(9000, 8)).unwrap();

        let mut reader = fs.document_reader(id).unwrap();
        let mut head = [0u8; 10];
        reader.read_exact(&mut head).unwrap();
        assert_eq!(&head[..], &pattern(9000, 8)[..10]);

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest.len(), 8990);
    }

    #[test]
    fn test_v4_sectors() {
        let options = Options::new().with_sector_size(SectorSize::V4);
        let mut fs = Filesystem::create_empty(options).unwrap();
        let root = fs.root();
        fs.create_document(root, "Doc", &pattern(10_000, 9)).unwrap();

        let bytes = fs.into_bytes().unwrap();
        assert_eq!(bytes.len() % 4096, 0);
        let fs = Filesystem::open(bytes).unwrap();
        assert_eq!(fs.sector_size(), SectorSize::V4);
        let id = fs.resolve("Doc").unwrap();
        assert_eq!(fs.read_document(id).unwrap(), pattern(10_000, 9));
    }

    #[test]
    fn test_describe_json() {
        let mut fs = Filesystem::new().unwrap();
        let root = fs.root();
        let dir = fs.create_directory(root, "Dir").unwrap();
        fs.create_document(dir, "Doc", b"hello").unwrap();

        let summary = fs.describe().unwrap();
        assert_eq!(summary.kind, EntryKind::Root);
        assert_eq!(summary.children[0].children[0].size, 5);
        assert_eq!(summary.children[0].children[0].store, Some(StoreKind::Mini));

        let json = fs.describe_json().unwrap();
        assert!(json.contains("\"Doc\""));
    }

    #[test]
    fn test_strict_directory_load() {
        let mut fs = Filesystem::new().unwrap();
        let root = fs.root();
        fs.create_document(root, "Doc", b"content").unwrap();
        fs.flush().unwrap();

        // Corrupt record 1's type byte
        let directory = fs.directory_start();
        let mut bytes = fs.into_bytes().unwrap();
        let offset = (directory as usize + 1) * 512 + RECORD_SIZE + 66;
        bytes[offset] = 9;

        let loaded = Filesystem::load(bytes.clone(), Options::default()).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.filesystem.children(EntryId::ROOT).unwrap().is_empty());

        let strict = Options::new().with_strict_directory(true);
        assert!(matches!(
            Filesystem::load(bytes, strict),
            Err(CompoundError::CorruptDirectory(_))
        ));
    }
}
