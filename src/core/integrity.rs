//! Whole-file integrity verification
//!
//! Every sector of each store must belong to exactly one owner (a chain,
//! the allocation table itself, or the indirect table) or be free, and
//! every chain must be exactly as long as its owner's size requires.

use crate::allocator::bitmap::ClaimMap;
use crate::allocator::{blocks_for, BlockRead, ChainIter, SectorRef};
use crate::catalog::EntryKind;
use crate::error::Result;
use crate::filesystem::Filesystem;
use crate::header::MINI_SECTOR_SIZE;
use crate::stream::StoreKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One problem found by [`check`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrityIssue {
    /// A sector is claimed by more than one owner
    Overlap {
        store: StoreKind,
        sector: u32,
        owner: String,
    },
    /// A sector is marked in use but nothing reaches it
    Orphan { store: StoreKind, sector: u32 },
    /// A table or indirect sector is not marked as such
    Unmarked { sector: u32, expected: u32 },
    /// A chain could not be walked
    BrokenChain { owner: String, error: String },
    /// A chain is not as long as its owner's size requires
    LengthMismatch {
        owner: String,
        expected: usize,
        actual: usize,
    },
    /// A mini sector lies past the end of the mini stream
    Unbacked { sector: u32 },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::Overlap {
                store,
                sector,
                owner,
            } => write!(f, "{:?} sector {} reused by {}", store, sector, owner),
            IntegrityIssue::Orphan { store, sector } => {
                write!(f, "{:?} sector {} is allocated but unreachable", store, sector)
            }
            IntegrityIssue::Unmarked { sector, expected } => {
                write!(f, "sector {} should be marked {:#010x}", sector, expected)
            }
            IntegrityIssue::BrokenChain { owner, error } => write!(f, "{}: {}", owner, error),
            IntegrityIssue::LengthMismatch {
                owner,
                expected,
                actual,
            } => write!(
                f,
                "{} has {} sectors, expected {}",
                owner, actual, expected
            ),
            IntegrityIssue::Unbacked { sector } => {
                write!(f, "mini sector {} lies past the mini stream", sector)
            }
        }
    }
}

/// Result of an integrity pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub issues: Vec<IntegrityIssue>,
    pub big_sectors_checked: u32,
    pub mini_sectors_checked: u32,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Claims chains of one store and collects issues
struct Tracker {
    store: StoreKind,
    claims: ClaimMap,
    issues: Vec<IntegrityIssue>,
}

impl Tracker {
    fn new(store: StoreKind, capacity: usize) -> Self {
        Tracker {
            store,
            claims: ClaimMap::with_capacity(capacity),
            issues: Vec::new(),
        }
    }

    fn claim(&mut self, sector: u32, owner: &str) {
        if !self.claims.claim(sector) {
            self.issues.push(IntegrityIssue::Overlap {
                store: self.store,
                sector,
                owner: owner.to_string(),
            });
        }
    }

    /// Walk a chain, claiming each sector; returns the sectors visited
    fn walk<S: BlockRead>(&mut self, store: S, start: u32, owner: &str) -> Vec<u32> {
        let mut visited = Vec::new();
        for step in ChainIter::new(store, start) {
            match step {
                Ok(sector) => {
                    self.claim(sector, owner);
                    visited.push(sector);
                }
                Err(err) => {
                    self.issues.push(IntegrityIssue::BrokenChain {
                        owner: owner.to_string(),
                        error: err.to_string(),
                    });
                    break;
                }
            }
        }
        visited
    }

    fn expect_len(&mut self, owner: &str, expected: usize, actual: usize) {
        if expected != actual {
            self.issues.push(IntegrityIssue::LengthMismatch {
                owner: owner.to_string(),
                expected,
                actual,
            });
        }
    }

    /// Report every in-use slot that no owner claimed
    fn orphans(&mut self, slots: &[u32]) {
        for (index, &slot) in slots.iter().enumerate() {
            if SectorRef::from_raw(slot) != SectorRef::Free && !self.claims.is_claimed(index as u32)
            {
                self.issues.push(IntegrityIssue::Orphan {
                    store: self.store,
                    sector: index as u32,
                });
            }
        }
    }
}

/// Check both stores of `fs`
pub fn check(fs: &Filesystem) -> Result<IntegrityReport> {
    let big = fs.big_store();
    let mini = fs.mini_state();
    let catalog = fs.catalog();
    let bs = big.block_size();

    let mut big_tracker = Tracker::new(StoreKind::Big, big.table.slot_count() as usize);
    for &sector in big.table.table_sectors() {
        big_tracker.claim(sector, "allocation table");
        if big.table.next(sector).ok() != Some(SectorRef::Table) {
            big_tracker.issues.push(IntegrityIssue::Unmarked {
                sector,
                expected: SectorRef::Table.to_raw(),
            });
        }
    }
    for &sector in big.table.indirect_sectors() {
        big_tracker.claim(sector, "indirect table");
        if big.table.next(sector).ok() != Some(SectorRef::Indirect) {
            big_tracker.issues.push(IntegrityIssue::Unmarked {
                sector,
                expected: SectorRef::Indirect.to_raw(),
            });
        }
    }

    big_tracker.walk(big, fs.directory_start(), "directory");

    let table_chain = big_tracker.walk(big, mini.table_start(), "mini table");
    big_tracker.expect_len("mini table", mini.table_chain().len(), table_chain.len());

    let stream_chain = big_tracker.walk(big, mini.stream_start(), "mini stream");
    big_tracker.expect_len(
        "mini stream",
        blocks_for(mini.stream_size(), bs),
        stream_chain.len(),
    );

    let mut mini_tracker = Tracker::new(StoreKind::Mini, mini.slots().len());
    let mini_capacity = (stream_chain.len() * bs / MINI_SECTOR_SIZE) as u32;
    let view = mini.view(big);

    for (id, entry) in catalog.iter() {
        if entry.kind() != EntryKind::Document {
            continue;
        }
        let owner = catalog.path(id)?;
        match StoreKind::for_size(entry.size()) {
            StoreKind::Big => {
                let chain = big_tracker.walk(big, entry.start(), &owner);
                big_tracker.expect_len(&owner, blocks_for(entry.size(), bs), chain.len());
            }
            StoreKind::Mini => {
                let chain = mini_tracker.walk(view, entry.start(), &owner);
                mini_tracker.expect_len(
                    &owner,
                    blocks_for(entry.size(), MINI_SECTOR_SIZE),
                    chain.len(),
                );
                for sector in chain {
                    if sector >= mini_capacity {
                        mini_tracker
                            .issues
                            .push(IntegrityIssue::Unbacked { sector });
                    }
                }
            }
        }
    }

    big_tracker.orphans(big.table.slots());
    mini_tracker.orphans(mini.slots());

    let mut issues = big_tracker.issues;
    issues.extend(mini_tracker.issues);
    for issue in &issues {
        tracing::warn!("Integrity: {}", issue);
    }

    Ok(IntegrityReport {
        issues,
        big_sectors_checked: big.table.slot_count(),
        mini_sectors_checked: mini.slots().len() as u32,
    })
}
