//! Stream engine
//!
//! A [`BlockStream`] is nothing more than the start of a chain. Content is
//! read by walking the chain lazily and replaced in place: the existing
//! chain is reused, its tail freed or extended one block at a time, and the
//! last block zero-padded.
//!
//! Which store holds a stream follows from its size: below the mini cutoff
//! it lives in the mini store, otherwise in the big store.

use crate::allocator::{
    blocks_for, collect_chain, BlockRead, BlockWrite, ChainIter, SectorRef, END_OF_CHAIN,
};
use crate::error::{CompoundError, Result};
use crate::header::MINI_CUTOFF;
use serde::{Deserialize, Serialize};
use std::io::{self, Read};

/// Store a stream lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreKind {
    Big,
    Mini,
}

impl StoreKind {
    /// Store for a document of `size` bytes
    pub fn for_size(size: u64) -> Self {
        if size < MINI_CUTOFF as u64 {
            StoreKind::Mini
        } else {
            StoreKind::Big
        }
    }
}

/// Handle to one chain of blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockStream {
    start: u32,
}

impl BlockStream {
    pub fn new(start: u32) -> Self {
        BlockStream { start }
    }

    /// Stream with no blocks
    pub fn empty() -> Self {
        BlockStream { start: END_OF_CHAIN }
    }

    /// First block, or end-of-chain for an empty stream
    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == END_OF_CHAIN
    }

    /// Lazy walk over the stream's blocks
    ///
    /// Each buffer is a fresh copy owned by the caller. The sequence is
    /// finite and forward-only; reopen the stream to start over.
    pub fn blocks<S: BlockRead>(&self, store: S) -> Blocks<S> {
        Blocks {
            chain: ChainIter::new(store, self.start),
        }
    }

    /// Replace the stream's contents with `data`
    ///
    /// The chain is truncated or extended to exactly `ceil(len / block)`
    /// blocks. Empty data frees the whole chain. A looped chain is rejected
    /// before anything is written.
    pub fn update_contents<S: BlockWrite>(&mut self, store: &mut S, data: &[u8]) -> Result<()> {
        let block_size = store.block_size();
        let needed = blocks_for(data.len() as u64, block_size);
        if needed == 0 {
            return self.free(store);
        }

        let mut chain = collect_chain(&*store, self.start)?;

        if chain.len() > needed {
            for &block in &chain[needed..] {
                store.set_next_block(block, SectorRef::Free)?;
            }
            chain.truncate(needed);
            store.set_next_block(chain[needed - 1], SectorRef::EndOfChain)?;
        }

        while chain.len() < needed {
            let block = store.allocate_block()?;
            store.set_next_block(block, SectorRef::EndOfChain)?;
            match chain.last() {
                Some(&last) => store.set_next_block(last, SectorRef::Next(block))?,
                None => self.start = block,
            }
            chain.push(block);
        }

        for (&block, chunk) in chain.iter().zip(data.chunks(block_size)) {
            store.write_block(block, chunk)?;
        }

        Ok(())
    }

    /// Release every block of the chain
    pub fn free<S: BlockWrite>(&mut self, store: &mut S) -> Result<()> {
        let chain = collect_chain(&*store, self.start)?;
        for block in chain {
            store.set_next_block(block, SectorRef::Free)?;
        }
        self.start = END_OF_CHAIN;
        Ok(())
    }

    /// Read exactly `size` bytes of content
    ///
    /// The chain is walked before anything is buffered, so a recorded size
    /// larger than the chain can hold fails without allocating for it.
    pub fn read_to_vec<S: BlockRead>(&self, store: S, size: u64) -> Result<Vec<u8>> {
        let chain = collect_chain(&store, self.start)?;
        let held = chain.len() as u64 * store.block_size() as u64;
        if held < size {
            return Err(CompoundError::CorruptDirectory(format!(
                "stream starting at {} holds {} of {} bytes",
                self.start, held, size
            )));
        }

        let mut out = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        for block in chain {
            let remaining = size - out.len() as u64;
            if remaining == 0 {
                break;
            }
            let data = store.read_block(block)?;
            let take = usize::try_from(remaining).unwrap_or(usize::MAX).min(data.len());
            out.extend_from_slice(&data[..take]);
        }

        if (out.len() as u64) < size {
            return Err(CompoundError::CorruptDirectory(format!(
                "stream starting at {} holds {} of {} bytes",
                self.start,
                out.len(),
                size
            )));
        }
        Ok(out)
    }
}

/// Lazy sequence of block buffers
pub struct Blocks<S: BlockRead> {
    chain: ChainIter<S>,
}

impl<S: BlockRead> Iterator for Blocks<S> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let block = match self.chain.next()? {
            Ok(block) => block,
            Err(err) => return Some(Err(err)),
        };
        Some(
            self.chain
                .store()
                .read_block(block)
                .map(|bytes| bytes.into_owned()),
        )
    }
}

/// `std::io::Read` over a document's blocks, bounded by its size
pub struct DocumentReader<'a> {
    blocks: Box<dyn Iterator<Item = Result<Vec<u8>>> + 'a>,
    current: Vec<u8>,
    position: usize,
    remaining: u64,
}

impl<'a> DocumentReader<'a> {
    pub fn new<S: BlockRead + 'a>(blocks: Blocks<S>, size: u64) -> Self {
        DocumentReader {
            blocks: Box::new(blocks),
            current: Vec::new(),
            position: 0,
            remaining: size,
        }
    }

    /// Bytes not yet read
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<'a> Read for DocumentReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        if self.position == self.current.len() {
            match self.blocks.next() {
                Some(Ok(block)) => {
                    self.current = block;
                    self.position = 0;
                }
                Some(Err(err)) => return Err(io::Error::new(io::ErrorKind::InvalidData, err)),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("chain ended with {} bytes still expected", self.remaining),
                    ))
                }
            }
        }

        let available = (self.current.len() - self.position) as u64;
        let count = (buf.len() as u64).min(available).min(self.remaining) as usize;
        buf[..count].copy_from_slice(&self.current[self.position..self.position + count]);
        self.position += count;
        self.remaining -= count as u64;
        Ok(count)
    }
}
