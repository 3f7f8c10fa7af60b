//! Claim bitmap for chain walks
//!
//! One bit per sector: 0 = not yet seen, 1 = claimed. Used to detect loops
//! while following a chain and to detect sectors shared between chains.

/// Growable bitmap of claimed sector indices
#[derive(Debug, Clone, Default)]
pub struct ClaimMap {
    /// Bitmap words (each word = 64 sectors)
    words: Vec<u64>,

    /// Number of claimed sectors
    claimed: usize,
}

impl ClaimMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bitmap pre-sized for `capacity` sectors
    pub fn with_capacity(capacity: usize) -> Self {
        ClaimMap {
            words: vec![0u64; (capacity + 63) / 64],
            claimed: 0,
        }
    }

    /// Claim a sector; returns `false` if it was already claimed
    pub fn claim(&mut self, index: u32) -> bool {
        let word_idx = (index / 64) as usize;
        let bit_idx = index % 64;

        if word_idx >= self.words.len() {
            self.words.resize(word_idx + 1, 0);
        }

        let mask = 1u64 << bit_idx;
        if self.words[word_idx] & mask != 0 {
            return false;
        }

        self.words[word_idx] |= mask;
        self.claimed += 1;
        true
    }

    pub fn is_claimed(&self, index: u32) -> bool {
        let word_idx = (index / 64) as usize;
        match self.words.get(word_idx) {
            Some(word) => word & (1u64 << (index % 64)) != 0,
            None => false,
        }
    }

    /// Number of claimed sectors
    pub fn count(&self) -> usize {
        self.claimed
    }
}
