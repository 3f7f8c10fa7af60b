//! Big-store allocation table (FAT) and its indirect locator table (DIFAT)
//!
//! The table is kept in memory as one flat vector of slots. Table sector
//! `k` holds slots `k * slots_per_sector ..`. The first 109 table sector
//! locations live in the header; the rest live in a chain of indirect
//! sectors, each holding `slots_per_sector - 1` locators followed by the
//! location of the next indirect sector.
//!
//! Extension is lazy: a new table sector is only added when no free slot
//! remains, and it is placed at the first sector it describes.

use crate::allocator::bitmap::ClaimMap;
use crate::allocator::{
    BlockRead, BlockWrite, SectorRef, END_OF_CHAIN, FREE_SECTOR, INDIRECT_SECTOR,
    MAX_REGULAR_SECTOR, TABLE_SECTOR,
};
use crate::error::{CompoundError, Result};
use crate::header::{Header, INLINE_LOCATORS};
use crate::io::ByteSource;
use crate::options::SectorSize;
use byteorder::{ByteOrder, LittleEndian};
use std::borrow::Cow;
use std::collections::BTreeSet;

/// In-memory allocation table
#[derive(Debug, Clone)]
pub struct AllocationTable {
    sector_size: SectorSize,

    /// Next-sector slots, one per sector
    slots: Vec<u32>,

    /// Location of each table sector, in table order
    table_sectors: Vec<u32>,

    /// Location of each indirect sector, in chain order
    indirect_sectors: Vec<u32>,

    /// Table sectors (by ordinal) changed since the last flush
    dirty: BTreeSet<usize>,

    /// No free slot exists below this index
    search_from: usize,
}

impl AllocationTable {
    /// Empty table with no table sectors
    pub fn new(sector_size: SectorSize) -> Self {
        AllocationTable {
            sector_size,
            slots: Vec::new(),
            table_sectors: Vec::new(),
            indirect_sectors: Vec::new(),
            dirty: BTreeSet::new(),
            search_from: 0,
        }
    }

    /// Read the table described by `header` out of `source`
    ///
    /// Every table and indirect sector is claimed while loading; a sector
    /// listed twice is reported as a chain loop.
    pub fn load(header: &Header, source: &ByteSource) -> Result<Self> {
        let sector_size = header.sector_size;
        let per = sector_size.slots_per_sector();
        let mut claims = ClaimMap::with_capacity(source.physical_sectors() as usize);

        let mut table_sectors = header.table_locators.clone();
        let mut indirect_sectors = Vec::new();

        let mut cursor = header.indirect_start;
        let mut remaining = (header.table_count as usize).saturating_sub(table_sectors.len());
        while remaining > 0 {
            if cursor == END_OF_CHAIN || cursor == FREE_SECTOR {
                return Err(CompoundError::InvalidHeader(format!(
                    "indirect table ends with {} table sector locations missing",
                    remaining
                )));
            }
            if cursor > MAX_REGULAR_SECTOR {
                return Err(CompoundError::InvalidChainLink {
                    sector: cursor,
                    value: cursor,
                });
            }
            if !claims.claim(cursor) {
                return Err(CompoundError::ChainLoop { sector: cursor });
            }

            let sector = source.sector(cursor)?;
            indirect_sectors.push(cursor);
            for slot in 0..per - 1 {
                if remaining == 0 {
                    break;
                }
                table_sectors.push(LittleEndian::read_u32(&sector[slot * 4..slot * 4 + 4]));
                remaining -= 1;
            }
            cursor = LittleEndian::read_u32(&sector[(per - 1) * 4..per * 4]);
        }

        if indirect_sectors.len() != header.indirect_count as usize {
            tracing::warn!(
                "Header lists {} indirect sectors, chain holds {}",
                header.indirect_count,
                indirect_sectors.len()
            );
        }

        let mut slots = Vec::with_capacity(table_sectors.len() * per);
        for &location in &table_sectors {
            if location > MAX_REGULAR_SECTOR {
                return Err(CompoundError::InvalidChainLink {
                    sector: location,
                    value: location,
                });
            }
            if !claims.claim(location) {
                return Err(CompoundError::ChainLoop { sector: location });
            }
            let sector = source.sector(location)?;
            slots.extend(sector.chunks_exact(4).map(LittleEndian::read_u32));
        }

        tracing::debug!(
            "Loaded allocation table: {} table sectors, {} indirect sectors, {} slots",
            table_sectors.len(),
            indirect_sectors.len(),
            slots.len()
        );

        Ok(AllocationTable {
            sector_size,
            slots,
            table_sectors,
            indirect_sectors,
            dirty: BTreeSet::new(),
            search_from: 0,
        })
    }

    pub fn sector_size(&self) -> SectorSize {
        self.sector_size
    }

    /// Number of addressable sectors
    pub fn slot_count(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn slots(&self) -> &[u32] {
        &self.slots
    }

    /// Successor of `sector` (out of range is an error, never a panic)
    pub fn next(&self, sector: u32) -> Result<SectorRef> {
        self.slots
            .get(sector as usize)
            .map(|&raw| SectorRef::from_raw(raw))
            .ok_or(CompoundError::SectorOutOfBounds {
                sector,
                limit: self.slot_count(),
            })
    }

    /// Change a slot and mark its table sector dirty
    pub fn set_next(&mut self, sector: u32, next: SectorRef) -> Result<()> {
        let limit = self.slot_count();
        let slot = self
            .slots
            .get_mut(sector as usize)
            .ok_or(CompoundError::SectorOutOfBounds { sector, limit })?;
        *slot = next.to_raw();
        if next.is_free() {
            self.search_from = self.search_from.min(sector as usize);
        }
        self.dirty
            .insert(sector as usize / self.sector_size.slots_per_sector());
        Ok(())
    }

    /// First free slot in table order, extending the table when none is left
    pub fn alloc_free_sector(&mut self) -> Result<u32> {
        if let Some(free) = self.first_free() {
            return Ok(free);
        }
        self.extend()?;
        self.first_free().ok_or(CompoundError::SectorOutOfBounds {
            sector: self.slot_count(),
            limit: MAX_REGULAR_SECTOR,
        })
    }

    fn first_free(&mut self) -> Option<u32> {
        let found = self.slots[self.search_from..]
            .iter()
            .position(|&slot| slot == FREE_SECTOR)
            .map(|offset| self.search_from + offset);
        match found {
            Some(index) => {
                self.search_from = index;
                Some(index as u32)
            }
            None => {
                self.search_from = self.slots.len();
                None
            }
        }
    }

    /// Append one table sector, plus an indirect sector once the inline
    /// locators are exhausted
    fn extend(&mut self) -> Result<()> {
        let per = self.sector_size.slots_per_sector();
        let location = self.slots.len() as u32;
        if location as u64 + per as u64 > MAX_REGULAR_SECTOR as u64 {
            return Err(CompoundError::SectorOutOfBounds {
                sector: location,
                limit: MAX_REGULAR_SECTOR,
            });
        }

        self.slots.resize(self.slots.len() + per, FREE_SECTOR);
        self.slots[location as usize] = TABLE_SECTOR;
        self.table_sectors.push(location);
        self.dirty.insert(self.table_sectors.len() - 1);

        let overflow = self.table_sectors.len().saturating_sub(INLINE_LOCATORS);
        let capacity = self.indirect_sectors.len() * (per - 1);
        if overflow > capacity {
            let indirect = location + 1;
            self.slots[indirect as usize] = INDIRECT_SECTOR;
            self.indirect_sectors.push(indirect);
            tracing::debug!("Added indirect table sector at {}", indirect);
        }

        tracing::debug!(
            "Extended allocation table: table sector {} at {} ({} slots)",
            self.table_sectors.len() - 1,
            location,
            self.slots.len()
        );
        Ok(())
    }

    /// Locations of all table sectors
    pub fn table_sectors(&self) -> &[u32] {
        &self.table_sectors
    }

    /// Locations of all indirect sectors
    pub fn indirect_sectors(&self) -> &[u32] {
        &self.indirect_sectors
    }

    /// Count slots holding `kind`
    pub fn count(&self, kind: SectorRef) -> usize {
        let raw = kind.to_raw();
        self.slots.iter().filter(|&&slot| slot == raw).count()
    }

    /// Write dirty table sectors and every indirect sector into `source`
    pub fn flush_into(&mut self, source: &mut ByteSource) {
        let per = self.sector_size.slots_per_sector();
        let dirty = std::mem::take(&mut self.dirty);
        for ordinal in dirty {
            let location = self.table_sectors[ordinal];
            let chunk = &self.slots[ordinal * per..(ordinal + 1) * per];
            source.write_sector(location, &encode_slots(chunk));
        }

        for (sector, bytes) in self.encode_indirect() {
            source.write_sector(sector, &bytes);
        }
    }

    /// Encode each indirect sector as `(location, bytes)`
    pub fn encode_indirect(&self) -> Vec<(u32, Vec<u8>)> {
        encode_indirect_chain(
            self.sector_size,
            &self.table_sectors,
            &self.indirect_sectors,
        )
    }

    /// Record table and indirect locations in `header`
    pub fn update_header(&self, header: &mut Header) {
        header.table_count = self.table_sectors.len() as u32;
        header.table_locators = self
            .table_sectors
            .iter()
            .take(INLINE_LOCATORS)
            .copied()
            .collect();
        header.indirect_count = self.indirect_sectors.len() as u32;
        header.indirect_start = self
            .indirect_sectors
            .first()
            .copied()
            .unwrap_or(END_OF_CHAIN);
    }
}

/// Little-endian encoding of a run of slots
pub fn encode_slots(slots: &[u32]) -> Vec<u8> {
    let mut bytes = vec![0u8; slots.len() * 4];
    LittleEndian::write_u32_into(slots, &mut bytes);
    bytes
}

/// Encode the indirect chain holding table locations past the inline 109
pub fn encode_indirect_chain(
    sector_size: SectorSize,
    table_sectors: &[u32],
    indirect_sectors: &[u32],
) -> Vec<(u32, Vec<u8>)> {
    let per = sector_size.slots_per_sector();
    let overflow: &[u32] = table_sectors.get(INLINE_LOCATORS..).unwrap_or(&[]);
    let mut chunks = overflow.chunks(per - 1);

    indirect_sectors
        .iter()
        .enumerate()
        .map(|(index, &location)| {
            let mut slots = vec![FREE_SECTOR; per];
            if let Some(chunk) = chunks.next() {
                slots[..chunk.len()].copy_from_slice(chunk);
            }
            slots[per - 1] = indirect_sectors
                .get(index + 1)
                .copied()
                .unwrap_or(END_OF_CHAIN);
            (location, encode_slots(&slots))
        })
        .collect()
}

/// Big store: the allocation table paired with the sector image
#[derive(Debug, Clone)]
pub struct BigStore {
    pub source: ByteSource,
    pub table: AllocationTable,
}

impl BigStore {
    pub fn new(source: ByteSource, table: AllocationTable) -> Self {
        BigStore { source, table }
    }

    /// Persist the table into the image
    pub fn flush_table(&mut self) {
        self.table.flush_into(&mut self.source);
    }
}

impl BlockRead for BigStore {
    fn block_size(&self) -> usize {
        self.table.sector_size().bytes()
    }

    fn block_count(&self) -> u32 {
        self.table.slot_count()
    }

    fn next_block(&self, block: u32) -> Result<SectorRef> {
        self.table.next(block)
    }

    fn read_block(&self, block: u32) -> Result<Cow<'_, [u8]>> {
        self.source.sector(block)
    }
}

impl BlockWrite for BigStore {
    fn set_next_block(&mut self, block: u32, next: SectorRef) -> Result<()> {
        self.table.set_next(block, next)
    }

    fn allocate_block(&mut self) -> Result<u32> {
        self.table.alloc_free_sector()
    }

    fn write_block(&mut self, block: u32, data: &[u8]) -> Result<()> {
        let limit = self.table.slot_count();
        if block >= limit {
            return Err(CompoundError::SectorOutOfBounds {
                sector: block,
                limit,
            });
        }
        self.source.write_sector(block, data);
        Ok(())
    }
}
