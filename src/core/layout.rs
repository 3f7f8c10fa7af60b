//! Compacting serializer
//!
//! Writes a fresh file in which every chain is contiguous and no sector is
//! free, in this order:
//!
//! ```text
//! header | big documents | mini stream | mini table | directory | table | indirect
//! ```
//!
//! The live image is not touched.

use crate::allocator::table::{encode_indirect_chain, encode_slots};
use crate::allocator::{blocks_for, END_OF_CHAIN, FREE_SECTOR, INDIRECT_SECTOR, TABLE_SECTOR};
use crate::catalog::{EntryId, EntryKind};
use crate::error::Result;
use crate::filesystem::{encode_directory, Filesystem};
use crate::header::{Header, INLINE_LOCATORS, MINI_SECTOR_SIZE};
use crate::stream::StoreKind;
use std::collections::HashMap;
use std::io::Write;

/// Contiguous run of sectors forming one chain
#[derive(Debug, Clone, Copy)]
struct Run {
    start: u32,
    len: u32,
}

/// Sector plan for a compacted file
#[derive(Debug, Default)]
struct Plan {
    runs: Vec<Run>,
    next: u32,
}

impl Plan {
    fn reserve(&mut self, len: usize) -> u32 {
        if len == 0 {
            return END_OF_CHAIN;
        }
        let start = self.next;
        self.runs.push(Run {
            start,
            len: len as u32,
        });
        self.next += len as u32;
        start
    }
}

/// Table and indirect sector counts for `data` sectors of payload
fn table_counts(data: u32, slots_per_sector: usize) -> (u32, u32) {
    let per = slots_per_sector as u64;
    let (mut tables, mut indirect) = (0u64, 0u64);
    loop {
        let total = data as u64 + tables + indirect;
        let new_tables = ((total + per - 1) / per).max(1);
        let overflow = new_tables.saturating_sub(INLINE_LOCATORS as u64);
        let new_indirect = (overflow + per - 2) / (per - 1);
        if new_tables == tables && new_indirect == indirect {
            return (tables as u32, indirect as u32);
        }
        tables = new_tables;
        indirect = new_indirect;
    }
}

/// Write a compacted copy of `fs` to `sink`
pub fn write_compact<W: Write>(fs: &Filesystem, sink: &mut W) -> Result<()> {
    let sector_size = fs.sector_size();
    let bs = sector_size.bytes();
    let per = sector_size.slots_per_sector();
    let catalog = fs.catalog();

    let mut plan = Plan::default();
    let mut placement: HashMap<EntryId, (u32, u64)> = HashMap::new();
    let mut big_payload = Vec::new();
    let mut mini_stream = Vec::new();
    let mut mini_slots: Vec<u32> = Vec::new();

    for (id, entry) in catalog.iter() {
        if entry.kind() != EntryKind::Document || entry.size() == 0 {
            continue;
        }
        let data = fs.read_document(id)?;
        match StoreKind::for_size(entry.size()) {
            StoreKind::Big => {
                let start = plan.reserve(blocks_for(data.len() as u64, bs));
                placement.insert(id, (start, entry.size()));
                big_payload.push(data);
            }
            StoreKind::Mini => {
                let count = blocks_for(data.len() as u64, MINI_SECTOR_SIZE);
                let start = mini_slots.len() as u32;
                mini_slots.extend((1..count as u32).map(|offset| start + offset));
                mini_slots.push(END_OF_CHAIN);
                placement.insert(id, (start, entry.size()));

                mini_stream.extend_from_slice(&data);
                mini_stream.resize((start as usize + count) * MINI_SECTOR_SIZE, 0);
            }
        }
    }

    let mini_start = plan.reserve(blocks_for(mini_stream.len() as u64, bs));
    if !mini_slots.is_empty() {
        mini_slots.resize(blocks_for(mini_slots.len() as u64, per) * per, FREE_SECTOR);
    }
    let mini_table_len = mini_slots.len() / per;
    let mini_table_start = plan.reserve(mini_table_len);

    let records = catalog.to_records(mini_start, mini_stream.len() as u64, |id, entry| {
        placement
            .get(&id)
            .copied()
            .unwrap_or((END_OF_CHAIN, entry.size()))
    })?;
    let directory = encode_directory(&records, sector_size);
    let directory_len = directory.len() / bs;
    let directory_start = plan.reserve(directory_len);

    let (tables, indirect) = table_counts(plan.next, per);
    let table_start = plan.next;
    let indirect_start = table_start + tables;
    let total = indirect_start + indirect;

    let mut slots = vec![FREE_SECTOR; tables as usize * per];
    for run in &plan.runs {
        for offset in 0..run.len {
            let sector = run.start + offset;
            slots[sector as usize] = if offset + 1 == run.len {
                END_OF_CHAIN
            } else {
                sector + 1
            };
        }
    }
    for sector in table_start..indirect_start {
        slots[sector as usize] = TABLE_SECTOR;
    }
    for sector in indirect_start..total {
        slots[sector as usize] = INDIRECT_SECTOR;
    }

    let table_sectors: Vec<u32> = (table_start..indirect_start).collect();
    let indirect_sectors: Vec<u32> = (indirect_start..total).collect();

    let mut header = Header::new(sector_size);
    header.table_count = tables;
    header.table_locators = table_sectors.iter().take(INLINE_LOCATORS).copied().collect();
    header.indirect_start = indirect_sectors.first().copied().unwrap_or(END_OF_CHAIN);
    header.indirect_count = indirect;
    header.entry_tree_start = directory_start;
    header.entry_tree_count = directory_len as u32;
    header.mini_table_start = mini_table_start;
    header.mini_table_count = mini_table_len as u32;

    sink.write_all(&header.to_bytes())?;
    for data in &big_payload {
        write_padded(sink, data, bs)?;
    }
    write_padded(sink, &mini_stream, bs)?;
    sink.write_all(&encode_slots(&mini_slots))?;
    sink.write_all(&directory)?;
    sink.write_all(&encode_slots(&slots))?;
    for (_, bytes) in encode_indirect_chain(sector_size, &table_sectors, &indirect_sectors) {
        sink.write_all(&bytes)?;
    }

    tracing::debug!(
        "Wrote compacted file: {} sectors ({} table, {} indirect, {} directory)",
        total,
        tables,
        indirect,
        directory_len
    );
    Ok(())
}

fn write_padded<W: Write>(sink: &mut W, data: &[u8], bs: usize) -> Result<()> {
    sink.write_all(data)?;
    let tail = data.len() % bs;
    if tail != 0 {
        sink.write_all(&vec![0u8; bs - tail])?;
    }
    Ok(())
}
