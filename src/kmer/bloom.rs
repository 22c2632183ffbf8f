// src/kmer/bloom.rs
//! Bloom filters over read r-mers.
//!
//! `KmerBloomFilter` answers how many of a query's sliding windows were seen
//! in the read set. `SpacedSeedsFilter` is its companion for the single-SNP
//! correction path: each window is additionally indexed under a small family
//! of spaced seeds, each masking one quarter of the window, so a window that
//! misses the vanilla filter can report which quarters could hide the
//! mismatch.

use ahash::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};

use crate::graph::contig_graph::revcomp;
use crate::kmer::nthash::{derived_hash, NtMultiHash};

/// Number of spaced seeds; one per masked quarter of the window.
pub const SPACED_SEEDS: usize = 4;

#[derive(Clone)]
struct BitVector {
    bits: Vec<u64>,
    num_bits: usize,
}

impl BitVector {
    fn new(num_bits: usize) -> Self {
        let num_bits = num_bits.max(64).div_ceil(64) * 64;
        BitVector {
            bits: vec![0; num_bits / 64],
            num_bits,
        }
    }

    #[inline]
    fn set(&mut self, hash: u64) {
        let idx = (hash % self.num_bits as u64) as usize;
        self.bits[idx / 64] |= 1 << (idx % 64);
    }

    #[inline]
    fn get(&self, hash: u64) -> bool {
        let idx = (hash % self.num_bits as u64) as usize;
        self.bits[idx / 64] & (1 << (idx % 64)) != 0
    }

    fn merge(&mut self, other: &BitVector) {
        assert_eq!(self.num_bits, other.num_bits);
        for (a, b) in self.bits.iter_mut().zip(other.bits.iter()) {
            *a |= *b;
        }
    }

    fn pop_count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// Bloom filter keyed by canonical r-mer hashes.
pub struct KmerBloomFilter {
    bits: BitVector,
    k: usize,
    hash_num: usize,
}

impl KmerBloomFilter {
    /// Allocate a filter of roughly `bytes` bytes for `k`-mers.
    pub fn with_memory(bytes: usize, k: usize, hash_num: usize) -> Self {
        KmerBloomFilter {
            bits: BitVector::new(bytes * 8),
            k,
            hash_num: hash_num.max(1),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn hash_num(&self) -> usize {
        self.hash_num
    }

    pub fn insert_hashes(&mut self, hashes: &[u64]) {
        for &h in hashes {
            self.bits.set(h);
        }
    }

    pub fn contains_hashes(&self, hashes: &[u64]) -> bool {
        hashes.iter().all(|&h| self.bits.get(h))
    }

    /// Insert every window of `seq`.
    pub fn insert_seq(&mut self, seq: &[u8]) {
        let mut hasher = NtMultiHash::new(seq, self.hash_num, self.k);
        while hasher.roll() {
            self.insert_hashes(hasher.hashes());
        }
    }

    /// Count how many windows of `seq` hit the filter.
    pub fn contains(&self, seq: &[u8]) -> usize {
        let mut found = 0;
        let mut hasher = NtMultiHash::new(seq, self.hash_num, self.k);
        while hasher.roll() {
            if self.contains_hashes(hasher.hashes()) {
                found += 1;
            }
        }
        found
    }

    pub fn merge(&mut self, other: &KmerBloomFilter) {
        assert_eq!(self.k, other.k);
        assert_eq!(self.hash_num, other.hash_num);
        self.bits.merge(&other.bits);
    }

    /// Fraction of bits set; a quick saturation diagnostic.
    pub fn occupancy(&self) -> f64 {
        self.bits.pop_count() as f64 / self.bits.num_bits as f64
    }
}

/// Companion filter indexing windows under spaced seeds.
pub struct SpacedSeedsFilter {
    bits: BitVector,
    k: usize,
    hash_num: usize,
    /// Per seed, the masked (don't-care) positions, ascending.
    parsed_seeds: Vec<Vec<usize>>,
    /// Per seed, the hashed (care) positions, ascending.
    care_positions: Vec<Vec<usize>>,
    state: RandomState,
}

impl SpacedSeedsFilter {
    pub fn with_memory(bytes: usize, k: usize, hash_num: usize) -> Self {
        assert!(k >= SPACED_SEEDS, "window too small for spaced seeds");
        let quarter = k / SPACED_SEEDS;
        let mut parsed_seeds = Vec::with_capacity(SPACED_SEEDS);
        let mut care_positions = Vec::with_capacity(SPACED_SEEDS);
        for s in 0..SPACED_SEEDS {
            let start = s * quarter;
            let end = if s == SPACED_SEEDS - 1 {
                k
            } else {
                start + quarter
            };
            parsed_seeds.push((start..end).collect());
            let care: Vec<usize> = (0..k).filter(|p| *p < start || *p >= end).collect();
            care_positions.push(care);
        }
        SpacedSeedsFilter {
            bits: BitVector::new(bytes * 8),
            k,
            hash_num: hash_num.max(1),
            parsed_seeds,
            care_positions,
            state: RandomState::with_seeds(
                0x243f6a8885a308d3,
                0x13198a2e03707344,
                0xa4093822299f31d0,
                0x082efa98ec4e6c89,
            ),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn hash_num(&self) -> usize {
        self.hash_num
    }

    /// The masked positions of each seed; candidate SNP sites for the
    /// correction loop.
    pub fn parsed_seeds(&self) -> &[Vec<usize>] {
        &self.parsed_seeds
    }

    fn seed_hashes(&self, window: &[u8], seed: usize) -> Vec<u64> {
        let mut hasher = self.state.build_hasher();
        seed.hash(&mut hasher);
        for &p in &self.care_positions[seed] {
            window[p].hash(&mut hasher);
        }
        let base = hasher.finish();
        (0..self.hash_num)
            .map(|i| {
                if i == 0 {
                    base
                } else {
                    derived_hash(base, i, self.k)
                }
            })
            .collect()
    }

    /// Index one window under every seed, both orientations, so queries can
    /// stay forward-only.
    pub fn insert_window(&mut self, window: &[u8]) {
        assert_eq!(window.len(), self.k);
        let rc = revcomp(std::str::from_utf8(window).unwrap_or(""));
        for seed in 0..SPACED_SEEDS {
            for h in self.seed_hashes(window, seed) {
                self.bits.set(h);
            }
            for h in self.seed_hashes(rc.as_bytes(), seed) {
                self.bits.set(h);
            }
        }
    }

    /// For each window offset of `seq`, the indices of the seeds that hit.
    pub fn contains(&self, seq: &[u8]) -> Vec<Vec<usize>> {
        if seq.len() < self.k {
            return Vec::new();
        }
        let mut result = Vec::with_capacity(seq.len() - self.k + 1);
        for offset in 0..=seq.len() - self.k {
            let window = &seq[offset..offset + self.k];
            let mut hits = Vec::new();
            for seed in 0..SPACED_SEEDS {
                let hashes = self.seed_hashes(window, seed);
                if hashes.iter().all(|&h| self.bits.get(h)) {
                    hits.push(seed);
                }
            }
            result.push(hits);
        }
        result
    }

    pub fn merge(&mut self, other: &SpacedSeedsFilter) {
        assert_eq!(self.k, other.k);
        assert_eq!(self.hash_num, other.hash_num);
        self.bits.merge(&other.bits);
    }
}
