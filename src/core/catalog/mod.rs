//! Entry tree for compound files
//!
//! The tree is held in an arena: entries are addressed by [`EntryId`] and
//! parents are plain ids, so there are no owning back-pointers. Freed slots
//! are reused by later inserts.
//!
//! On disk the tree is a stream of 128-byte records. Each storage points at
//! one child, and siblings hang off each other in a binary search tree
//! ordered by name length first, then by the uppercased names. That order is
//! what other producers expect, so it is fixed.

pub mod metadata;
pub mod record;

pub use metadata::{EntryKind, EntryMetadata};
pub use record::{RawRecord, RecordType, COLOR_BLACK, NO_STREAM, RECORD_SIZE};

use crate::allocator::bitmap::ClaimMap;
use crate::allocator::END_OF_CHAIN;
use crate::error::{CompoundError, Result};
use crate::options::SectorSize;
use crate::validation::validate_entry_name;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Name of the root entry as written by other producers
pub const ROOT_NAME: &str = "Root Entry";

/// Arena handle for an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(u32);

impl EntryId {
    pub const ROOT: EntryId = EntryId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind-specific part of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Children are kept in sibling order
    Root { children: Vec<EntryId> },
    Directory { children: Vec<EntryId> },
    Document { start: u32, size: u64 },
}

/// One live entry
#[derive(Debug, Clone)]
pub struct Entry {
    name: String,
    parent: Option<EntryId>,
    node: Node,
    metadata: EntryMetadata,
}

impl Entry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` only for the root
    pub fn parent(&self) -> Option<EntryId> {
        self.parent
    }

    pub fn kind(&self) -> EntryKind {
        match self.node {
            Node::Root { .. } => EntryKind::Root,
            Node::Directory { .. } => EntryKind::Directory,
            Node::Document { .. } => EntryKind::Document,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn metadata(&self) -> &EntryMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut EntryMetadata {
        &mut self.metadata
    }

    /// Children in sibling order; empty for documents
    pub fn children(&self) -> &[EntryId] {
        match &self.node {
            Node::Root { children } | Node::Directory { children } => children,
            Node::Document { .. } => &[],
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<EntryId>> {
        match &mut self.node {
            Node::Root { children } | Node::Directory { children } => Some(children),
            Node::Document { .. } => None,
        }
    }

    /// Content size for documents, zero otherwise
    pub fn size(&self) -> u64 {
        match self.node {
            Node::Document { size, .. } => size,
            _ => 0,
        }
    }

    /// Content start for documents, end-of-chain otherwise
    pub fn start(&self) -> u32 {
        match self.node {
            Node::Document { start, .. } => start,
            _ => END_OF_CHAIN,
        }
    }

    pub fn is_container(&self) -> bool {
        self.kind().is_container()
    }
}

/// Sibling ordering: UTF-16 length, then uppercased code units
pub fn sibling_order(a: &str, b: &str) -> Ordering {
    let a_len = a.encode_utf16().count();
    let b_len = b.encode_utf16().count();
    a_len
        .cmp(&b_len)
        .then_with(|| fold_case(a).encode_utf16().cmp(fold_case(b).encode_utf16()))
}

/// Case-insensitive name equality
pub fn same_name(a: &str, b: &str) -> bool {
    a.chars().map(upper_char).eq(b.chars().map(upper_char))
}

fn fold_case(name: &str) -> String {
    name.chars().map(upper_char).collect()
}

/// Simple uppercase mapping; multi-char expansions such as 'ß' -> "SS" keep
/// the original char
fn upper_char(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(single), None) => single,
        _ => c,
    }
}

/// A record skipped while loading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadWarning {
    /// Record index in the directory stream
    pub record: u32,
    pub reason: String,
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "directory record {}: {}", self.record, self.reason)
    }
}

/// Directory record as read from disk, or the reason it could not be decoded
pub type RecordSlot = std::result::Result<RawRecord, String>;

/// Result of rebuilding the tree from records
#[derive(Debug)]
pub struct DecodedTree {
    pub catalog: Catalog,
    pub mini_stream_start: u32,
    pub mini_stream_size: u64,
    pub warnings: Vec<LoadWarning>,
}

/// Arena of entries rooted at [`EntryId::ROOT`]
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<Option<Entry>>,
    vacant: Vec<EntryId>,
}

impl Catalog {
    /// Catalog holding only an empty root
    pub fn new() -> Self {
        Self::with_root(ROOT_NAME.to_string(), EntryMetadata::default())
    }

    fn with_root(name: String, metadata: EntryMetadata) -> Self {
        Catalog {
            entries: vec![Some(Entry {
                name,
                parent: None,
                node: Node::Root {
                    children: Vec::new(),
                },
                metadata,
            })],
            vacant: Vec::new(),
        }
    }

    pub fn root(&self) -> EntryId {
        EntryId::ROOT
    }

    /// Number of live entries, root included
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: EntryId) -> Result<&Entry> {
        self.entries
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(CompoundError::StaleEntry(id))
    }

    fn get_mut(&mut self, id: EntryId) -> Result<&mut Entry> {
        self.entries
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(CompoundError::StaleEntry(id))
    }

    pub fn metadata_mut(&mut self, id: EntryId) -> Result<&mut EntryMetadata> {
        Ok(self.get_mut(id)?.metadata_mut())
    }

    /// Live entries in arena order
    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &Entry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|entry| (EntryId(index as u32), entry)))
    }

    /// Children of a container
    pub fn children(&self, id: EntryId) -> Result<&[EntryId]> {
        let entry = self.get(id)?;
        if !entry.is_container() {
            return Err(CompoundError::NotADirectory {
                name: entry.name.clone(),
            });
        }
        Ok(entry.children())
    }

    /// Case-insensitive child lookup; `Ok(None)` when absent
    pub fn lookup(&self, parent: EntryId, name: &str) -> Result<Option<EntryId>> {
        let children = self.children(parent)?;
        for &child in children {
            if same_name(&self.get(child)?.name, name) {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Slash-separated path of an entry (the root is `/`)
    pub fn path(&self, id: EntryId) -> Result<String> {
        let mut parts = Vec::new();
        let mut cursor = id;
        loop {
            let entry = self.get(cursor)?;
            match entry.parent {
                Some(parent) => {
                    parts.push(entry.name.as_str());
                    cursor = parent;
                }
                None => break,
            }
        }
        parts.reverse();
        Ok(format!("/{}", parts.join("/")))
    }

    /// Add a validated entry under `parent`
    pub fn insert(
        &mut self,
        parent: EntryId,
        name: &str,
        node: Node,
        metadata: EntryMetadata,
    ) -> Result<EntryId> {
        validate_entry_name(name)?;
        if matches!(node, Node::Root { .. }) {
            return Err(CompoundError::RootImmutable);
        }
        if self.lookup(parent, name)?.is_some() {
            return Err(CompoundError::NameConflict {
                name: name.to_string(),
            });
        }
        self.attach(parent, name.to_string(), node, metadata)
    }

    /// Add an entry without name checks (load path)
    fn attach(
        &mut self,
        parent: EntryId,
        name: String,
        node: Node,
        metadata: EntryMetadata,
    ) -> Result<EntryId> {
        let entry = Entry {
            name,
            parent: Some(parent),
            node,
            metadata,
        };
        let id = match self.vacant.pop() {
            Some(id) => {
                self.entries[id.index()] = Some(entry);
                id
            }
            None => {
                self.entries.push(Some(entry));
                EntryId((self.entries.len() - 1) as u32)
            }
        };
        self.link_child(parent, id)?;
        Ok(id)
    }

    /// Insert `child` into `parent`'s children at its sibling position
    fn link_child(&mut self, parent: EntryId, child: EntryId) -> Result<()> {
        let child_name = self.get(child)?.name.clone();
        let position = {
            let siblings = self.get(parent)?.children();
            let mut position = siblings.len();
            for (index, &sibling) in siblings.iter().enumerate() {
                if sibling_order(&child_name, &self.get(sibling)?.name) == Ordering::Less {
                    position = index;
                    break;
                }
            }
            position
        };

        let parent_entry = self.get_mut(parent)?;
        let parent_name = parent_entry.name.clone();
        match parent_entry.children_mut() {
            Some(children) => {
                children.insert(position, child);
                Ok(())
            }
            None => Err(CompoundError::NotADirectory { name: parent_name }),
        }
    }

    fn unlink_child(&mut self, parent: EntryId, child: EntryId) -> Result<()> {
        if let Some(children) = self.get_mut(parent)?.children_mut() {
            children.retain(|&id| id != child);
        }
        Ok(())
    }

    /// Fail unless `id` can be deleted: not the root, no children
    pub fn check_removable(&self, id: EntryId) -> Result<()> {
        let entry = self.get(id)?;
        match &entry.node {
            Node::Root { .. } => Err(CompoundError::RootImmutable),
            Node::Directory { children } if !children.is_empty() => {
                Err(CompoundError::DirectoryNotEmpty {
                    name: entry.name.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Unlink an entry and free its slot
    pub fn remove(&mut self, id: EntryId) -> Result<Entry> {
        self.check_removable(id)?;
        let parent = self.get(id)?.parent.ok_or(CompoundError::RootImmutable)?;
        self.unlink_child(parent, id)?;
        let entry = self.entries[id.index()]
            .take()
            .ok_or(CompoundError::StaleEntry(id))?;
        self.vacant.push(id);
        Ok(entry)
    }

    /// Rename an entry; a change of case only is always allowed
    pub fn rename(&mut self, id: EntryId, new_name: &str) -> Result<()> {
        validate_entry_name(new_name)?;
        let parent = self.get(id)?.parent.ok_or(CompoundError::RootImmutable)?;
        if let Some(existing) = self.lookup(parent, new_name)? {
            if existing != id {
                return Err(CompoundError::NameConflict {
                    name: new_name.to_string(),
                });
            }
        }

        self.unlink_child(parent, id)?;
        self.get_mut(id)?.name = new_name.to_string();
        self.link_child(parent, id)
    }

    /// Point a document at new content
    pub fn set_document(&mut self, id: EntryId, new_start: u32, new_size: u64) -> Result<()> {
        let entry = self.get_mut(id)?;
        match &mut entry.node {
            Node::Document { start, size } => {
                *start = new_start;
                *size = new_size;
                Ok(())
            }
            _ => Err(CompoundError::NotADocument {
                name: entry.name.clone(),
            }),
        }
    }

    /// `id` and everything below it, children before parents
    pub fn post_order(&self, id: EntryId) -> Result<Vec<EntryId>> {
        let mut order = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                order.push(current);
                continue;
            }
            stack.push((current, true));
            for &child in self.get(current)?.children().iter().rev() {
                stack.push((child, false));
            }
        }
        Ok(order)
    }

    /// Rebuild the tree from directory records
    ///
    /// Records that fail validation are skipped together with everything
    /// reachable through them, and reported as warnings. Only an unusable
    /// root record is a hard error.
    pub fn from_records(records: &[RecordSlot], sector_size: SectorSize) -> Result<DecodedTree> {
        let root = match records.first() {
            Some(Ok(record)) if record.record_type == RecordType::Root => record,
            Some(Ok(record)) => {
                return Err(CompoundError::CorruptDirectory(format!(
                    "record 0 has type {:?}, expected the root",
                    record.record_type
                )))
            }
            Some(Err(reason)) => {
                return Err(CompoundError::CorruptDirectory(format!(
                    "root record is unreadable: {}",
                    reason
                )))
            }
            None => {
                return Err(CompoundError::CorruptDirectory(
                    "directory stream is empty".to_string(),
                ))
            }
        };

        let mask_size = |size: u64| match sector_size {
            // Version 3 writers may leave garbage in the high half
            SectorSize::V3 => size & 0xFFFF_FFFF,
            SectorSize::V4 => size,
        };

        let root_name = if root.name.is_empty() {
            ROOT_NAME.to_string()
        } else {
            root.name.clone()
        };
        let mut catalog = Catalog::with_root(root_name, root.metadata);
        let mut warnings = Vec::new();
        let mut claims = ClaimMap::with_capacity(records.len());
        claims.claim(0);

        let mut stack = Vec::new();
        if root.child != NO_STREAM {
            stack.push((root.child, EntryId::ROOT));
        }

        while let Some((index, parent)) = stack.pop() {
            let mut skip = |reason: String| {
                warnings.push(LoadWarning {
                    record: index,
                    reason,
                })
            };

            let record = match records.get(index as usize) {
                Some(Ok(record)) => record,
                Some(Err(reason)) => {
                    skip(reason.clone());
                    continue;
                }
                None => {
                    skip(format!(
                        "link points past the last record ({})",
                        records.len()
                    ));
                    continue;
                }
            };
            if !claims.claim(index) {
                skip("record is linked more than once".to_string());
                continue;
            }

            let node = match record.record_type {
                RecordType::Storage => Node::Directory {
                    children: Vec::new(),
                },
                RecordType::Stream => Node::Document {
                    start: record.start,
                    size: mask_size(record.size),
                },
                other => {
                    skip(format!("record type {:?} cannot appear here", other));
                    continue;
                }
            };
            if record.name.is_empty() {
                skip("record has an empty name".to_string());
                continue;
            }
            if catalog.lookup(parent, &record.name)?.is_some() {
                skip(format!("duplicate sibling name {:?}", record.name));
                continue;
            }

            let id = catalog.attach(parent, record.name.clone(), node, record.metadata)?;
            for sibling in [record.left, record.right] {
                if sibling != NO_STREAM {
                    stack.push((sibling, parent));
                }
            }
            if record.record_type == RecordType::Storage && record.child != NO_STREAM {
                stack.push((record.child, id));
            }
        }

        Ok(DecodedTree {
            catalog,
            mini_stream_start: root.start,
            mini_stream_size: mask_size(root.size),
            warnings,
        })
    }

    /// Flatten the tree into directory records
    ///
    /// The root is record 0. Each container's children are written as a
    /// balanced binary search tree over their sibling order. `placement`
    /// supplies the start sector and size recorded for each document.
    pub fn to_records<F>(
        &self,
        root_start: u32,
        root_size: u64,
        placement: F,
    ) -> Result<Vec<RawRecord>>
    where
        F: Fn(EntryId, &Entry) -> (u32, u64),
    {
        let mut order = Vec::with_capacity(self.entries.len());
        let mut index_of = vec![NO_STREAM; self.entries.len()];
        let mut stack = vec![EntryId::ROOT];
        while let Some(id) = stack.pop() {
            index_of[id.index()] = order.len() as u32;
            order.push(id);
            for &child in self.get(id)?.children().iter().rev() {
                stack.push(child);
            }
        }

        let mut records = Vec::with_capacity(order.len());
        for &id in &order {
            let entry = self.get(id)?;
            let (record_type, start, size) = match entry.node {
                Node::Root { .. } => (RecordType::Root, root_start, root_size),
                Node::Directory { .. } => (RecordType::Storage, 0, 0),
                Node::Document { .. } => {
                    let (start, size) = placement(id, entry);
                    let start = if size == 0 { END_OF_CHAIN } else { start };
                    (RecordType::Stream, start, size)
                }
            };
            records.push(RawRecord {
                name: entry.name.clone(),
                record_type,
                color: COLOR_BLACK,
                left: NO_STREAM,
                right: NO_STREAM,
                child: NO_STREAM,
                metadata: entry.metadata,
                start,
                size,
            });
        }

        for &id in &order {
            let children = self.get(id)?.children();
            let child = link_balanced(children, &index_of, &mut records);
            records[index_of[id.index()] as usize].child = child;
        }

        Ok(records)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Link `sorted` as a balanced sibling tree; returns the subtree root record
fn link_balanced(sorted: &[EntryId], index_of: &[u32], records: &mut [RawRecord]) -> u32 {
    if sorted.is_empty() {
        return NO_STREAM;
    }
    let mid = sorted.len() / 2;
    let record = index_of[sorted[mid].index()];
    let left = link_balanced(&sorted[..mid], index_of, records);
    let right = link_balanced(&sorted[mid + 1..], index_of, records);
    records[record as usize].left = left;
    records[record as usize].right = right;
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> Node {
        Node::Document {
            start: END_OF_CHAIN,
            size: 0,
        }
    }

    fn directory() -> Node {
        Node::Directory {
            children: Vec::new(),
        }
    }

    fn names(catalog: &Catalog, parent: EntryId) -> Vec<String> {
        catalog
            .children(parent)
            .unwrap()
            .iter()
            .map(|&id| catalog.get(id).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_new_catalog_has_root() {
        let catalog = Catalog::new();
        let root = catalog.get(catalog.root()).unwrap();
        assert_eq!(root.name(), ROOT_NAME);
        assert_eq!(root.kind(), EntryKind::Root);
        assert!(root.parent().is_none());
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_sibling_order_is_length_first() {
        assert_eq!(sibling_order("Zz", "aaa"), Ordering::Less);
        assert_eq!(sibling_order("abc", "ABD"), Ordering::Less);
        assert_eq!(sibling_order("abc", "ABC"), Ordering::Equal);
        assert_eq!(sibling_order("ßb", "SS"), Ordering::Greater);
    }

    #[test]
    fn test_case_folding_keeps_length() {
        assert!(same_name("Straße", "STRAßE"));
        assert!(!same_name("ß", "SS"));
        assert!(!same_name("straße", "STRASSE"));

        let mut catalog = Catalog::new();
        let root = catalog.root();
        catalog
            .insert(root, "ß", document(), EntryMetadata::default())
            .unwrap();
        catalog
            .insert(root, "SS", document(), EntryMetadata::default())
            .unwrap();
        assert_eq!(catalog.children(root).unwrap().len(), 2);
    }

    #[test]
    fn test_children_kept_in_sibling_order() {
        let mut catalog = Catalog::new();
        let root = catalog.root();
        for name in ["Workbook", "b", "Ab", "aa", "SummaryInfo"] {
            catalog
                .insert(root, name, document(), EntryMetadata::default())
                .unwrap();
        }
        assert_eq!(
            names(&catalog, root),
            vec!["b", "aa", "Ab", "Workbook", "SummaryInfo"]
        );
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut catalog = Catalog::new();
        let root = catalog.root();
        let id = catalog
            .insert(root, "WordDocument", document(), EntryMetadata::default())
            .unwrap();
        assert_eq!(catalog.lookup(root, "worddocument").unwrap(), Some(id));
        assert_eq!(catalog.lookup(root, "Missing").unwrap(), None);
    }

    #[test]
    fn test_sibling_collision() {
        let mut catalog = Catalog::new();
        let root = catalog.root();
        catalog
            .insert(root, "Data", document(), EntryMetadata::default())
            .unwrap();
        let result = catalog.insert(root, "DATA", directory(), EntryMetadata::default());
        assert!(matches!(result, Err(CompoundError::NameConflict { .. })));
    }

    #[test]
    fn test_document_cannot_have_children() {
        let mut catalog = Catalog::new();
        let root = catalog.root();
        let doc = catalog
            .insert(root, "Doc", document(), EntryMetadata::default())
            .unwrap();
        let result = catalog.insert(doc, "Child", document(), EntryMetadata::default());
        assert!(matches!(result, Err(CompoundError::NotADirectory { .. })));
    }

    #[test]
    fn test_remove_rules() {
        let mut catalog = Catalog::new();
        let root = catalog.root();
        let dir = catalog
            .insert(root, "Dir", directory(), EntryMetadata::default())
            .unwrap();
        let doc = catalog
            .insert(dir, "Doc", document(), EntryMetadata::default())
            .unwrap();

        assert!(matches!(catalog.remove(root), Err(CompoundError::RootImmutable)));
        assert!(matches!(
            catalog.remove(dir),
            Err(CompoundError::DirectoryNotEmpty { .. })
        ));

        catalog.remove(doc).unwrap();
        assert!(matches!(catalog.get(doc), Err(CompoundError::StaleEntry(_))));
        catalog.remove(dir).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_freed_slot_is_reused() {
        let mut catalog = Catalog::new();
        let root = catalog.root();
        let a = catalog
            .insert(root, "A", document(), EntryMetadata::default())
            .unwrap();
        catalog.remove(a).unwrap();
        let b = catalog
            .insert(root, "B", document(), EntryMetadata::default())
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rename() {
        let mut catalog = Catalog::new();
        let root = catalog.root();
        let a = catalog
            .insert(root, "Alpha", document(), EntryMetadata::default())
            .unwrap();
        catalog
            .insert(root, "Beta", document(), EntryMetadata::default())
            .unwrap();

        assert!(matches!(
            catalog.rename(a, "BETA"),
            Err(CompoundError::NameConflict { .. })
        ));
        catalog.rename(a, "ALPHA").unwrap();
        catalog.rename(a, "Z").unwrap();
        assert_eq!(names(&catalog, root), vec!["Z", "Beta"]);
        assert!(matches!(
            catalog.rename(root, "Other"),
            Err(CompoundError::RootImmutable)
        ));
    }

    #[test]
    fn test_path_and_post_order() {
        let mut catalog = Catalog::new();
        let root = catalog.root();
        let dir = catalog
            .insert(root, "Dir", directory(), EntryMetadata::default())
            .unwrap();
        let doc = catalog
            .insert(dir, "Doc", document(), EntryMetadata::default())
            .unwrap();

        assert_eq!(catalog.path(doc).unwrap(), "/Dir/Doc");
        assert_eq!(catalog.path(root).unwrap(), "/");
        assert_eq!(catalog.post_order(dir).unwrap(), vec![doc, dir]);
    }

    fn sample_catalog() -> Catalog {
        let mut catalog = Catalog::new();
        let root = catalog.root();
        for name in ["A", "B", "C", "D", "E"] {
            catalog
                .insert(root, name, document(), EntryMetadata::default())
                .unwrap();
        }
        let dir = catalog
            .insert(root, "Storage", directory(), EntryMetadata::default())
            .unwrap();
        catalog
            .insert(dir, "Inner", document(), EntryMetadata::default())
            .unwrap();
        catalog
    }

    #[test]
    fn test_records_form_balanced_tree() {
        let catalog = sample_catalog();
        let records = catalog
            .to_records(END_OF_CHAIN, 0, |_, entry| (entry.start(), entry.size()))
            .unwrap();

        assert_eq!(records.len(), 8);
        assert_eq!(records[0].record_type, RecordType::Root);
        // Root children in order: A B C D E Storage; middle element is D
        let top = &records[records[0].child as usize];
        assert_eq!(top.name, "D");
        assert_eq!(records[top.left as usize].name, "B");
        assert_eq!(records[top.right as usize].name, "Storage");
        assert!(records.iter().all(|record| record.color == COLOR_BLACK));
    }

    #[test]
    fn test_records_round_trip() {
        let catalog = sample_catalog();
        let records: Vec<RecordSlot> = catalog
            .to_records(END_OF_CHAIN, 0, |_, entry| (entry.start(), entry.size()))
            .unwrap()
            .into_iter()
            .map(Ok)
            .collect();

        let decoded = Catalog::from_records(&records, SectorSize::V3).unwrap();
        assert!(decoded.warnings.is_empty());
        assert_eq!(decoded.catalog.len(), catalog.len());
        assert_eq!(
            names(&decoded.catalog, EntryId::ROOT),
            names(&catalog, EntryId::ROOT)
        );
    }

    #[test]
    fn test_degraded_records_are_skipped() {
        let catalog = sample_catalog();
        let mut records: Vec<RecordSlot> = catalog
            .to_records(END_OF_CHAIN, 0, |_, entry| (entry.start(), entry.size()))
            .unwrap()
            .into_iter()
            .map(Ok)
            .collect();

        // Point the storage's child at itself
        let storage = records
            .iter()
            .position(|r| r.as_ref().map(|r| r.name == "Storage").unwrap_or(false))
            .unwrap();
        if let Ok(record) = &mut records[storage] {
            record.child = storage as u32;
        }

        let decoded = Catalog::from_records(&records, SectorSize::V3).unwrap();
        assert_eq!(decoded.warnings.len(), 1);
        assert_eq!(decoded.warnings[0].record, storage as u32);
        // Everything except "Inner" survives
        assert_eq!(decoded.catalog.len(), catalog.len() - 1);
    }

    #[test]
    fn test_out_of_range_link_is_skipped() {
        let mut root = RawRecord::empty();
        root.name = ROOT_NAME.to_string();
        root.record_type = RecordType::Root;
        root.child = 40;

        let decoded = Catalog::from_records(&[Ok(root)], SectorSize::V3).unwrap();
        assert_eq!(decoded.warnings.len(), 1);
        assert_eq!(decoded.catalog.len(), 1);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let result = Catalog::from_records(&[Ok(RawRecord::empty())], SectorSize::V3);
        assert!(matches!(result, Err(CompoundError::CorruptDirectory(_))));
    }
}
