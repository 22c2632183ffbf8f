// src/resolve/path_support.rs
//! Support testing for one in -> repeat -> out traversal.
//!
//! The engine derives how many sliding-window tests the read coverage should
//! allow, generates the possible flanking sequences on both sides of the
//! repeat, and counts Bloom filter hits across every head/tail combination,
//! keeping the best-supported one. Any combination that cannot be tested
//! makes the whole traversal unknown and aborts the remaining combinations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use rand::seq::SliceRandom;

use crate::graph::contig_graph::{ContigGraph, ContigNode};
use crate::graph::tree_walk::{head_sequences, tail_sequences};
use crate::kmer::bloom::{KmerBloomFilter, SpacedSeedsFilter};
use crate::kmer::nthash::NtMultiHash;
use crate::resolve::read_stats::{ReadBatch, ReadBatches};
use crate::resolve::support::{Support, UnknownReason};
use crate::resolve::window::{margin, window_long_enough};
use crate::resolve::{
    ResolverOptions, MIN_MARGIN, PATH_COMBINATIONS_MULTITHREAD_THRESHOLD,
    SPACED_SEEDS_SNP_FRACTION,
};

/// Asymptotic path length for the spacing estimate.
const NOTIONAL_PATH_LENGTH: f64 = 1_000_000.0;

const BASES: [u8; 4] = [b'A', b'C', b'T', b'G'];

/// Everything the support engine needs for one (batch, r) cycle.
pub struct SupportContext<'a> {
    pub graph: &'a ContigGraph,
    pub vanilla: &'a KmerBloomFilter,
    pub spaced: Option<&'a SpacedSeedsFilter>,
    pub batches: &'a ReadBatches,
    /// Index of the batch this cycle runs for.
    pub current: usize,
    pub opts: &'a ResolverOptions,
}

impl<'a> SupportContext<'a> {
    pub fn current_batch(&self) -> &ReadBatch {
        &self.batches.batches[self.current]
    }
}

/// Count filter hits across the sliding windows of `seq`.
///
/// With error correction, a window that misses the vanilla filter is
/// retried with each alternate base substituted at the candidate SNP sites
/// flagged by the spaced-seeds filter; the first recovered hit counts.
pub fn test_sequence(ctx: &SupportContext, seq: &[u8]) -> (u32, u32) {
    let r = ctx.vanilla.k();
    assert!(seq.len() >= r);
    let tests = (seq.len() - r + 1) as u32;
    let mut found = 0;

    let spaced = match ctx.spaced {
        None => return (ctx.vanilla.contains(seq) as u32, tests),
        Some(spaced) => spaced,
    };

    let mut nthash = NtMultiHash::new(seq, ctx.vanilla.hash_num(), r);
    for (offset, hit_seeds) in spaced.contains(seq).iter().enumerate() {
        let rolled = nthash.roll();
        debug_assert!(rolled);
        if hit_seeds.is_empty() {
            continue;
        }
        nthash.sub(&[], &[]);
        if ctx.vanilla.contains_hashes(nthash.hashes()) {
            found += 1;
            continue;
        }
        'seeds: for &hit_seed in hit_seeds {
            let seed = &spaced.parsed_seeds()[hit_seed];
            let tail_start =
                (seed.len() as f64 * (1.00 - SPACED_SEEDS_SNP_FRACTION)).round() as usize;
            for &pos in &seed[tail_start..] {
                for &base in &BASES {
                    if base == seq[offset + pos] {
                        continue;
                    }
                    nthash.sub(&[pos], &[base]);
                    if ctx.vanilla.contains_hashes(nthash.hashes()) {
                        found += 1;
                        break 'seeds;
                    }
                }
            }
        }
    }
    (found, tests)
}

/// Test one head/repeat/tail combination with `requested_tests` windows.
pub fn test_combination(
    ctx: &SupportContext,
    head: &str,
    repeat: &str,
    tail: &str,
    requested_tests: u32,
) -> Result<(u32, u32), UnknownReason> {
    let window_size = ctx.vanilla.k();
    let planned = requested_tests.max(ctx.opts.min_tests) as usize;

    let possible =
        (head.len() + repeat.len() + tail.len()) as isize - window_size as isize + 1;
    if possible < planned as isize {
        return Err(UnknownReason::PossibleTestsLtPlanned);
    }
    if planned as u32 > ctx.opts.max_tests {
        return Err(UnknownReason::OverMaxTests);
    }

    let margin = margin(window_size, planned, repeat.len(), MIN_MARGIN);
    if head.len() < margin {
        return Err(UnknownReason::HeadShorterThanMargin);
    }
    if tail.len() < margin {
        return Err(UnknownReason::TailShorterThanMargin);
    }

    // With surplus sequence, trim both flanks to the margin so the planned
    // number of tests is what actually runs.
    let sequence = if possible > planned as isize + 1 {
        assert!(head.len() > margin || tail.len() > margin);
        format!("{}{}{}", &head[head.len() - margin..], repeat, &tail[..margin])
    } else {
        format!("{}{}{}", head, repeat, tail)
    };

    let possible = sequence.len() - window_size + 1;
    assert!(planned <= possible);
    assert!(possible <= planned + 1);
    assert!(sequence.len() >= MIN_MARGIN + repeat.len() + MIN_MARGIN);
    assert!(sequence.len() < window_size * 2);

    Ok(test_sequence(ctx, sequence.as_bytes()))
}

/// Expected spacing between read start positions over a notional long path
/// at this path's coverage, given the current batch's share of the reads.
fn expected_spacing_between_reads(ctx: &SupportContext, path: &[ContigNode; 3]) -> f64 {
    let k = ctx.opts.k;
    let path_base_coverage = path
        .iter()
        .map(|&node| ctx.graph.base_coverage(node, k))
        .fold(f64::INFINITY, f64::min);
    let path_bases = path_base_coverage * NOTIONAL_PATH_LENGTH;

    let mut mean_read_kmer_contribution = 0.0;
    for (i, batch) in ctx.batches.batches.iter().enumerate() {
        mean_read_kmer_contribution += ctx.batches.fraction(i) * (batch.size as f64 - k as f64 + 1.0);
    }
    let current = ctx.current_batch();
    let current_contribution =
        ctx.batches.fraction(ctx.current) * (current.size as f64 - k as f64 + 1.0);
    let base_contribution_ratio = current_contribution / mean_read_kmer_contribution;

    let approx_num_of_reads = path_bases * base_contribution_ratio
        / (k as f64 * (current.size as f64 - k as f64 + 1.0));
    assert!(approx_num_of_reads > 2.0);

    ((NOTIONAL_PATH_LENGTH - current.size as f64 + 1.0) / approx_num_of_reads).max(1.0)
}

#[derive(Debug, Default)]
struct Fold {
    found: u32,
    tests: u32,
    unknown: Option<UnknownReason>,
}

impl Fold {
    /// Merge one combination result. Returns true when folding must stop.
    fn add(&mut self, probe: Result<(u32, u32), UnknownReason>) -> bool {
        match probe {
            Err(reason) => {
                self.unknown = Some(reason);
                true
            }
            Ok((found, tests)) => {
                if found > self.found {
                    self.found = found;
                    self.tests = tests;
                } else if self.found == 0 && tests > self.tests {
                    // Keep the most informative zero.
                    self.tests = tests;
                }
                false
            }
        }
    }
}

/// Determine the support for a 3-node traversal.
pub fn determine_path_support(ctx: &SupportContext, path: &[ContigNode; 3]) -> Support {
    let [intig, repeat, outig] = *path;
    let repeat_seq = ctx.graph.seq(repeat).to_string();
    let repeat_size = repeat_seq.len();
    assert!(repeat_size >= 2);

    let spacing = expected_spacing_between_reads(ctx, path);
    let calculated =
        (spacing * ctx.current_batch().cov_approx_factor + ctx.opts.threshold as f64).round();
    assert!(calculated >= 0.0);
    let calculated_tests = calculated as u32;

    let unknown = |reason| Support::Unknown {
        reason,
        calculated_tests,
    };

    let required_tests = calculated_tests.max(ctx.opts.min_tests);
    if required_tests > ctx.opts.max_tests {
        return unknown(UnknownReason::OverMaxTests);
    }

    let window_size = ctx.vanilla.k();
    assert!(window_size >= 4);
    if !window_long_enough(window_size, required_tests as usize, repeat_size, MIN_MARGIN) {
        return unknown(UnknownReason::WindowNotLongEnough);
    }

    let left_distance = ctx
        .graph
        .distance(intig, repeat)
        .expect("in-edge lost its distance");
    let right_distance = ctx
        .graph
        .distance(repeat, outig)
        .expect("out-edge lost its distance");

    let margin = margin(window_size, required_tests as usize, repeat_size, MIN_MARGIN);

    let max_leaves = 2 * ctx.opts.branching;
    let mut heads =
        match head_sequences(ctx.graph, intig, -left_distance, margin, max_leaves) {
            Ok(heads) => heads,
            Err(_) => return unknown(UnknownReason::TooManyCombinations),
        };
    let mut tails =
        match tail_sequences(ctx.graph, outig, -right_distance, margin, max_leaves) {
            Ok(tails) => tails,
            Err(_) => return unknown(UnknownReason::TooManyCombinations),
        };

    let branching = ctx.opts.branching;
    let mut combinations = heads.len() * tails.len();
    assert!(combinations > 0);
    if combinations > branching * branching {
        // Decimate at random so the kept sample is unbiased; cap the cross
        // product at branching^2, letting the smaller side keep its surplus.
        let mut rng = rand::thread_rng();
        heads.shuffle(&mut rng);
        tails.shuffle(&mut rng);
        if heads.len() > branching && tails.len() > branching {
            heads.truncate(branching);
            tails.truncate(branching);
        } else if tails.len() <= branching {
            let budget = branching * branching / tails.len();
            if budget < heads.len() {
                heads.truncate(budget);
            }
        } else {
            let budget = branching * branching / heads.len();
            if budget < tails.len() {
                tails.truncate(budget);
            }
        }
        combinations = heads.len() * tails.len();
        assert!(combinations > 0);
    }

    if heads.iter().any(|h| h.len() < margin) {
        return unknown(UnknownReason::HeadShorterThanMargin);
    }
    if tails.iter().any(|t| t.len() < margin) {
        return unknown(UnknownReason::TailShorterThanMargin);
    }

    let fold = if combinations >= PATH_COMBINATIONS_MULTITHREAD_THRESHOLD {
        let best: Mutex<Fold> = Mutex::new(Fold::default());
        let stop = AtomicBool::new(false);
        rayon::scope(|scope| {
            for head in &heads {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                let best = &best;
                let stop = &stop;
                let tails = &tails;
                let repeat_seq = &repeat_seq;
                scope.spawn(move |_| {
                    for tail in tails {
                        if stop.load(Ordering::Relaxed) {
                            break;
                        }
                        let probe =
                            test_combination(ctx, head, repeat_seq, tail, required_tests);
                        let mut fold = best.lock().unwrap();
                        if fold.unknown.is_some() {
                            break;
                        }
                        if fold.add(probe) {
                            stop.store(true, Ordering::Relaxed);
                            break;
                        }
                    }
                });
            }
        });
        best.into_inner().unwrap()
    } else {
        let mut fold = Fold::default();
        'heads: for head in &heads {
            for tail in &tails {
                let probe = test_combination(ctx, head, &repeat_seq, tail, required_tests);
                if fold.add(probe) {
                    break 'heads;
                }
            }
        }
        fold
    };

    match fold.unknown {
        Some(reason) => unknown(reason),
        None => Support::Known {
            found: fold.found,
            tests: fold.tests,
            calculated_tests,
        },
    }
}
