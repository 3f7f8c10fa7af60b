//! Mini store: 64-byte sectors for small documents
//!
//! Documents below the 4096-byte cutoff live in the mini stream, a regular
//! big-store chain rooted at the root entry. The mini table maps each mini
//! sector to its successor with the same slot values as the big table, and
//! is itself stored in a big-store chain.
//!
//! Reading goes through [`MiniView`] and never changes anything. Writing
//! goes through [`MiniStoreMut`], which grows the mini table and the mini
//! stream on demand. The two growths are separate big-store allocations.

use crate::allocator::table::{encode_slots, BigStore};
use crate::allocator::{
    collect_chain, BlockRead, BlockWrite, SectorRef, END_OF_CHAIN, FREE_SECTOR,
};
use crate::error::{CompoundError, Result};
use crate::header::{Header, MINI_SECTOR_SIZE};
use byteorder::{ByteOrder, LittleEndian};
use std::borrow::Cow;

/// Mini table and mini stream bookkeeping
#[derive(Debug, Clone, Default)]
pub struct MiniState {
    /// Mini table slots, one per mini sector
    slots: Vec<u32>,

    /// Big sectors holding the mini table
    table_chain: Vec<u32>,

    /// Big sectors backing the mini stream
    stream_chain: Vec<u32>,

    /// Mini stream length in bytes (recorded as the root entry's size)
    stream_size: u64,

    search_from: usize,
}

impl MiniState {
    /// No mini table and no mini stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the mini table from the header and the mini stream from the
    /// root entry's start sector and size
    pub fn load(
        big: &BigStore,
        header: &Header,
        stream_start: u32,
        stream_size: u64,
    ) -> Result<Self> {
        let table_chain = collect_chain(big, header.mini_table_start)?;
        if table_chain.len() != header.mini_table_count as usize {
            tracing::warn!(
                "Header lists {} mini table sectors, chain holds {}",
                header.mini_table_count,
                table_chain.len()
            );
        }

        let mut slots = Vec::with_capacity(table_chain.len() * big.block_size() / 4);
        for &sector in &table_chain {
            let bytes = big.read_block(sector)?;
            slots.extend(bytes.chunks_exact(4).map(LittleEndian::read_u32));
        }

        let stream_chain = collect_chain(big, stream_start)?;
        let capacity = (stream_chain.len() * big.block_size()) as u64;
        let stream_size = if stream_size > capacity {
            tracing::warn!(
                "Mini stream claims {} bytes but its chain holds {}; clamping",
                stream_size,
                capacity
            );
            capacity
        } else {
            stream_size
        };

        tracing::debug!(
            "Loaded mini store: {} slots, {} stream sectors, {} bytes",
            slots.len(),
            stream_chain.len(),
            stream_size
        );

        Ok(MiniState {
            slots,
            table_chain,
            stream_chain,
            stream_size,
            search_from: 0,
        })
    }

    pub fn slots(&self) -> &[u32] {
        &self.slots
    }

    pub fn table_chain(&self) -> &[u32] {
        &self.table_chain
    }

    pub fn stream_chain(&self) -> &[u32] {
        &self.stream_chain
    }

    /// First big sector of the mini table, or end-of-chain when absent
    pub fn table_start(&self) -> u32 {
        self.table_chain.first().copied().unwrap_or(END_OF_CHAIN)
    }

    /// First big sector of the mini stream, or end-of-chain when absent
    pub fn stream_start(&self) -> u32 {
        self.stream_chain.first().copied().unwrap_or(END_OF_CHAIN)
    }

    pub fn stream_size(&self) -> u64 {
        self.stream_size
    }

    /// Mini sectors in use
    pub fn used_sectors(&self) -> usize {
        self.slots.iter().filter(|&&slot| slot != FREE_SECTOR).count()
    }

    /// Write the mini table into its big sectors
    pub fn flush_into(&self, big: &mut BigStore) -> Result<()> {
        let per = big.block_size() / 4;
        for (index, &sector) in self.table_chain.iter().enumerate() {
            let chunk = &self.slots[index * per..(index + 1) * per];
            big.write_block(sector, &encode_slots(chunk))?;
        }
        Ok(())
    }

    /// Read-only view over the mini store
    pub fn view<'a>(&'a self, big: &'a BigStore) -> MiniView<'a> {
        MiniView { state: self, big }
    }

    /// Writable view over the mini store
    pub fn store_mut<'a>(&'a mut self, big: &'a mut BigStore) -> MiniStoreMut<'a> {
        MiniStoreMut { state: self, big }
    }

    fn next(&self, block: u32) -> Result<SectorRef> {
        self.slots
            .get(block as usize)
            .map(|&raw| SectorRef::from_raw(raw))
            .ok_or(CompoundError::SectorOutOfBounds {
                sector: block,
                limit: self.slots.len() as u32,
            })
    }

    /// Big sector and offset holding mini sector `index`, without growing
    fn locate(&self, index: u32, big_size: usize) -> Result<(u32, usize)> {
        let offset = index as usize * MINI_SECTOR_SIZE;
        let big_index = offset / big_size;
        match self.stream_chain.get(big_index) {
            Some(&sector) => Ok((sector, offset % big_size)),
            None => Err(CompoundError::SectorOutOfBounds {
                sector: index,
                limit: (self.stream_chain.len() * big_size / MINI_SECTOR_SIZE) as u32,
            }),
        }
    }
}

/// Shared view: mini table plus the big store holding the mini stream
#[derive(Debug, Clone, Copy)]
pub struct MiniView<'a> {
    state: &'a MiniState,
    big: &'a BigStore,
}

impl<'a> BlockRead for MiniView<'a> {
    fn block_size(&self) -> usize {
        MINI_SECTOR_SIZE
    }

    fn block_count(&self) -> u32 {
        self.state.slots.len() as u32
    }

    fn next_block(&self, block: u32) -> Result<SectorRef> {
        self.state.next(block)
    }

    fn read_block(&self, block: u32) -> Result<Cow<'_, [u8]>> {
        let (sector, offset) = self.state.locate(block, self.big.block_size())?;
        let range = offset..offset + MINI_SECTOR_SIZE;
        Ok(match self.big.read_block(sector)? {
            Cow::Borrowed(bytes) => Cow::Borrowed(&bytes[range]),
            Cow::Owned(bytes) => Cow::Owned(bytes[range].to_vec()),
        })
    }
}

/// Exclusive view that can allocate mini sectors and grow the mini stream
#[derive(Debug)]
pub struct MiniStoreMut<'a> {
    state: &'a mut MiniState,
    big: &'a mut BigStore,
}

impl<'a> MiniStoreMut<'a> {
    /// Big sector and offset holding mini sector `index`, growing the mini
    /// stream's chain when `index` lies beyond it
    pub fn get_mini_sector(&mut self, index: u32) -> Result<(u32, usize)> {
        let big_size = self.big.block_size();
        let needed = index as usize * MINI_SECTOR_SIZE / big_size + 1;
        while self.state.stream_chain.len() < needed {
            let sector = self.append_big_sector(ChainKind::Stream)?;
            self.big.write_block(sector, &[])?;
            tracing::debug!("Mini stream grew into big sector {}", sector);
        }
        self.state.locate(index, big_size)
    }

    /// Allocate a big sector and link it to the end of the mini table or
    /// mini stream chain
    fn append_big_sector(&mut self, kind: ChainKind) -> Result<u32> {
        let sector = self.big.allocate_block()?;
        self.big.set_next_block(sector, SectorRef::EndOfChain)?;
        let chain = match kind {
            ChainKind::Table => &mut self.state.table_chain,
            ChainKind::Stream => &mut self.state.stream_chain,
        };
        if let Some(&last) = chain.last() {
            self.big.set_next_block(last, SectorRef::Next(sector))?;
        }
        chain.push(sector);
        Ok(sector)
    }

    fn first_free(&mut self) -> Option<u32> {
        let start = self.state.search_from.min(self.state.slots.len());
        let found = self.state.slots[start..]
            .iter()
            .position(|&slot| slot == FREE_SECTOR)
            .map(|offset| start + offset);
        self.state.search_from = found.unwrap_or(self.state.slots.len());
        found.map(|index| index as u32)
    }
}

enum ChainKind {
    Table,
    Stream,
}

impl<'a> BlockRead for MiniStoreMut<'a> {
    fn block_size(&self) -> usize {
        MINI_SECTOR_SIZE
    }

    fn block_count(&self) -> u32 {
        self.state.slots.len() as u32
    }

    fn next_block(&self, block: u32) -> Result<SectorRef> {
        self.state.next(block)
    }

    fn read_block(&self, block: u32) -> Result<Cow<'_, [u8]>> {
        MiniView {
            state: &*self.state,
            big: &*self.big,
        }
        .read_block(block)
        .map(|bytes| Cow::Owned(bytes.into_owned()))
    }
}

impl<'a> BlockWrite for MiniStoreMut<'a> {
    fn set_next_block(&mut self, block: u32, next: SectorRef) -> Result<()> {
        let limit = self.state.slots.len() as u32;
        let slot = self
            .state
            .slots
            .get_mut(block as usize)
            .ok_or(CompoundError::SectorOutOfBounds { sector: block, limit })?;
        *slot = next.to_raw();
        if next.is_free() {
            self.state.search_from = self.state.search_from.min(block as usize);
        }
        Ok(())
    }

    fn allocate_block(&mut self) -> Result<u32> {
        if let Some(free) = self.first_free() {
            return Ok(free);
        }

        let sector = self.append_big_sector(ChainKind::Table)?;
        let per = self.big.block_size() / 4;
        self.big
            .write_block(sector, &encode_slots(&vec![FREE_SECTOR; per]))?;
        self.state.slots.resize(self.state.slots.len() + per, FREE_SECTOR);
        tracing::debug!(
            "Mini table grew into big sector {} ({} slots)",
            sector,
            self.state.slots.len()
        );

        self.first_free().ok_or(CompoundError::SectorOutOfBounds {
            sector: self.state.slots.len() as u32,
            limit: self.state.slots.len() as u32,
        })
    }

    fn write_block(&mut self, block: u32, data: &[u8]) -> Result<()> {
        let limit = self.state.slots.len() as u32;
        if block >= limit {
            return Err(CompoundError::SectorOutOfBounds { sector: block, limit });
        }

        let (sector, offset) = self.get_mini_sector(block)?;
        let mut padded = [0u8; MINI_SECTOR_SIZE];
        padded[..data.len()].copy_from_slice(data);
        self.big.source.write_within(sector, offset, &padded);

        let end = (block as u64 + 1) * MINI_SECTOR_SIZE as u64;
        self.state.stream_size = self.state.stream_size.max(end);
        Ok(())
    }
}
