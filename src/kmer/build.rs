// src/kmer/build.rs
//! Per-(batch, r) Bloom filter construction from the read set.

use std::collections::BTreeSet;
use std::io;

use rayon::prelude::*;
use tracing::info;

use crate::io::fastq::{open_reads, stream_reads};
use crate::kmer::bloom::{KmerBloomFilter, SpacedSeedsFilter};
use crate::kmer::nthash::window_hashes;

/// Hash functions per filter.
pub const BLOOM_HASH_NUM: usize = 4;

pub struct FilterBuild {
    pub vanilla: KmerBloomFilter,
    pub spaced: Option<SpacedSeedsFilter>,
}

/// Window start offsets for extracting `extract` evenly spaced r-mers from a
/// read with `windows` possible positions, first and last included.
fn extraction_offsets(windows: usize, extract: usize) -> Vec<usize> {
    if extract == 0 || extract >= windows {
        return (0..windows).collect();
    }
    if extract == 1 {
        return vec![0];
    }
    let mut offsets: Vec<usize> = (0..extract)
        .map(|j| j * (windows - 1) / (extract - 1))
        .collect();
    offsets.dedup();
    offsets
}

/// Build the vanilla (and, with error correction, spaced-seeds) filters for
/// one `(batch, r)` cycle.
///
/// Only reads whose length belongs to the current batch contribute; `extract`
/// r-mers are taken per read. Files are ingested in parallel into per-file
/// filters which are then merged.
pub fn build_filters(
    read_files: &[String],
    accepted_sizes: &BTreeSet<usize>,
    r: usize,
    bytes: usize,
    extract: usize,
    error_correction: bool,
) -> io::Result<FilterBuild> {
    info!(r, bytes, "building read k-mer filters");

    let per_file: Vec<io::Result<FilterBuild>> = read_files
        .par_iter()
        .map(|path| {
            let mut vanilla = KmerBloomFilter::with_memory(bytes, r, BLOOM_HASH_NUM);
            let mut spaced = if error_correction {
                Some(SpacedSeedsFilter::with_memory(bytes, r, BLOOM_HASH_NUM))
            } else {
                None
            };

            let reader = open_reads(path)?;
            for record in stream_reads(reader) {
                let seq = record.seq.as_bytes();
                if seq.len() < r || !accepted_sizes.contains(&seq.len()) {
                    continue;
                }
                let windows = seq.len() - r + 1;
                for offset in extraction_offsets(windows, extract) {
                    let window = &seq[offset..offset + r];
                    vanilla.insert_hashes(&window_hashes(window, BLOOM_HASH_NUM));
                    if let Some(sf) = spaced.as_mut() {
                        sf.insert_window(window);
                    }
                }
            }
            Ok(FilterBuild { vanilla, spaced })
        })
        .collect();

    let mut merged: Option<FilterBuild> = None;
    for build in per_file {
        let build = build?;
        match merged.as_mut() {
            None => merged = Some(build),
            Some(acc) => {
                acc.vanilla.merge(&build.vanilla);
                if let (Some(a), Some(b)) = (acc.spaced.as_mut(), build.spaced.as_ref()) {
                    a.merge(b);
                }
            }
        }
    }

    let build = merged.expect("at least one read file");
    info!(
        occupancy = format!("{:.4}", build.vanilla.occupancy()).as_str(),
        "filters built"
    );
    Ok(build)
}
