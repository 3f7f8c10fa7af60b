//! Sector allocation for compound files
//!
//! Two stores share the same chain semantics:
//! - the big store, tracked by the allocation table ([`table`])
//! - the mini store, tracked by the mini table (see [`crate::ministore`])
//!
//! Both implement [`BlockRead`] / [`BlockWrite`], so the stream engine can
//! walk, grow and shrink chains without knowing which one it is talking to.

pub mod bitmap;
pub mod table;

use crate::allocator::bitmap::ClaimMap;
use crate::error::{CompoundError, Result};
use std::borrow::Cow;

/// Slot value: sector is unused
pub const FREE_SECTOR: u32 = 0xFFFF_FFFF;
/// Slot value: last sector of a chain
pub const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
/// Slot value: sector holds allocation table slots
pub const TABLE_SECTOR: u32 = 0xFFFF_FFFD;
/// Slot value: sector holds indirect (DIFAT) locators
pub const INDIRECT_SECTOR: u32 = 0xFFFF_FFFC;
/// Largest index that addresses a real sector
pub const MAX_REGULAR_SECTOR: u32 = 0xFFFF_FFFA;

/// Decoded allocation table slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorRef {
    Next(u32),
    EndOfChain,
    Free,
    Table,
    Indirect,
}

impl SectorRef {
    pub fn from_raw(value: u32) -> Self {
        match value {
            FREE_SECTOR => SectorRef::Free,
            END_OF_CHAIN => SectorRef::EndOfChain,
            TABLE_SECTOR => SectorRef::Table,
            INDIRECT_SECTOR => SectorRef::Indirect,
            next => SectorRef::Next(next),
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            SectorRef::Next(next) => next,
            SectorRef::EndOfChain => END_OF_CHAIN,
            SectorRef::Free => FREE_SECTOR,
            SectorRef::Table => TABLE_SECTOR,
            SectorRef::Indirect => INDIRECT_SECTOR,
        }
    }

    pub fn is_free(self) -> bool {
        self == SectorRef::Free
    }
}

/// Read side of a block store
pub trait BlockRead {
    /// Block size in bytes
    fn block_size(&self) -> usize;

    /// Number of addressable blocks (table slots)
    fn block_count(&self) -> u32;

    /// Successor of `block` in its chain
    fn next_block(&self, block: u32) -> Result<SectorRef>;

    /// Contents of one block
    fn read_block(&self, block: u32) -> Result<Cow<'_, [u8]>>;
}

impl<T: BlockRead + ?Sized> BlockRead for &T {
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn block_count(&self) -> u32 {
        (**self).block_count()
    }

    fn next_block(&self, block: u32) -> Result<SectorRef> {
        (**self).next_block(block)
    }

    fn read_block(&self, block: u32) -> Result<Cow<'_, [u8]>> {
        (**self).read_block(block)
    }
}

/// Write side of a block store
pub trait BlockWrite: BlockRead {
    fn set_next_block(&mut self, block: u32, next: SectorRef) -> Result<()>;

    /// Find a free block, extending the store if none is left
    ///
    /// The returned block is still marked free; callers link it immediately.
    fn allocate_block(&mut self) -> Result<u32>;

    /// Replace a block's contents; short data is zero-padded
    fn write_block(&mut self, block: u32, data: &[u8]) -> Result<()>;
}

/// Lazy walk over a chain's block indices
///
/// Forward-only and not restartable. Every visited block is claimed in a
/// bitmap, so a revisit surfaces as [`CompoundError::ChainLoop`] instead of
/// an endless walk.
pub struct ChainIter<S: BlockRead> {
    store: S,
    cursor: Option<u32>,
    claims: ClaimMap,
    pending: Option<CompoundError>,
    done: bool,
}

impl<S: BlockRead> ChainIter<S> {
    pub fn new(store: S, start: u32) -> Self {
        let mut iter = ChainIter {
            store,
            cursor: None,
            claims: ClaimMap::new(),
            pending: None,
            done: false,
        };
        match SectorRef::from_raw(start) {
            SectorRef::Next(block) => iter.cursor = Some(block),
            SectorRef::EndOfChain | SectorRef::Free => {}
            other => {
                iter.pending = Some(CompoundError::InvalidChainLink {
                    sector: start,
                    value: other.to_raw(),
                })
            }
        }
        iter
    }

    /// Store being walked
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: BlockRead> Iterator for ChainIter<S> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(err) = self.pending.take() {
            self.done = true;
            return Some(Err(err));
        }

        let block = match self.cursor.take() {
            Some(block) => block,
            None => {
                self.done = true;
                return None;
            }
        };

        let limit = self.store.block_count();
        if block >= limit {
            self.done = true;
            return Some(Err(CompoundError::SectorOutOfBounds {
                sector: block,
                limit,
            }));
        }
        if !self.claims.claim(block) {
            self.done = true;
            return Some(Err(CompoundError::ChainLoop { sector: block }));
        }

        match self.store.next_block(block) {
            Ok(SectorRef::Next(next)) => self.cursor = Some(next),
            Ok(SectorRef::EndOfChain) => {}
            Ok(other) => {
                self.pending = Some(CompoundError::InvalidChainLink {
                    sector: block,
                    value: other.to_raw(),
                })
            }
            Err(err) => self.pending = Some(err),
        }

        Some(Ok(block))
    }
}

/// Walk a whole chain into a vector of block indices
pub fn collect_chain<S: BlockRead + ?Sized>(store: &S, start: u32) -> Result<Vec<u32>> {
    ChainIter::new(store, start).collect()
}

/// Number of blocks needed for `len` bytes, saturating at `usize::MAX`
pub fn blocks_for(len: u64, block_size: usize) -> usize {
    usize::try_from(len.div_ceil(block_size as u64)).unwrap_or(usize::MAX)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Flat in-memory store for exercising chain logic in isolation
    #[derive(Debug, Clone)]
    pub struct VecStore {
        pub slots: Vec<u32>,
        pub blocks: Vec<Vec<u8>>,
        pub block_size: usize,
    }

    impl VecStore {
        pub fn new(block_size: usize, count: usize) -> Self {
            VecStore {
                slots: vec![FREE_SECTOR; count],
                blocks: vec![vec![0u8; block_size]; count],
                block_size,
            }
        }
    }

    impl BlockRead for VecStore {
        fn block_size(&self) -> usize {
            self.block_size
        }

        fn block_count(&self) -> u32 {
            self.slots.len() as u32
        }

        fn next_block(&self, block: u32) -> Result<SectorRef> {
            self.slots
                .get(block as usize)
                .map(|&raw| SectorRef::from_raw(raw))
                .ok_or(CompoundError::SectorOutOfBounds {
                    sector: block,
                    limit: self.slots.len() as u32,
                })
        }

        fn read_block(&self, block: u32) -> Result<Cow<'_, [u8]>> {
            Ok(Cow::Borrowed(&self.blocks[block as usize]))
        }
    }

    impl BlockWrite for VecStore {
        fn set_next_block(&mut self, block: u32, next: SectorRef) -> Result<()> {
            self.slots[block as usize] = next.to_raw();
            Ok(())
        }

        fn allocate_block(&mut self) -> Result<u32> {
            if let Some(free) = self.slots.iter().position(|&s| s == FREE_SECTOR) {
                return Ok(free as u32);
            }
            self.slots.push(FREE_SECTOR);
            self.blocks.push(vec![0u8; self.block_size]);
            Ok((self.slots.len() - 1) as u32)
        }

        fn write_block(&mut self, block: u32, data: &[u8]) -> Result<()> {
            let target = &mut self.blocks[block as usize];
            target.fill(0);
            target[..data.len()].copy_from_slice(data);
            Ok(())
        }
    }
}
