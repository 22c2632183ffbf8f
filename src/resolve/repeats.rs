// src/resolve/repeats.rs
//! Small-repeat classification and the per-repeat support sweep.
//!
//! A small repeat is a contig short enough that a single test window can
//! span it with margins, sitting at a junction with more than one way in or
//! out. Every in/out pair of such a repeat is tested; if any pair comes back
//! unknown the whole repeat's map is poisoned, because unresolved ambiguity
//! at one branch contaminates inference at its siblings.

use std::collections::BTreeMap;
use std::sync::Mutex;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::graph::contig_graph::ContigNode;
use crate::histogram::{FractionHistogram, Histogram};
use crate::resolve::path_support::{determine_path_support, SupportContext};
use crate::resolve::support::{Support, UnknownReason};
use crate::resolve::window::window_long_enough;
use crate::resolve::{HIST_SAMPLE_SIZE, MIN_MARGIN, REPEAT_CASES_LIMIT, SUPPORTED_PATHS_MIN};

/// `in-edge index -> out-edge index -> support` for one repeat.
pub type SupportMap = BTreeMap<u32, BTreeMap<u32, Support>>;
/// `repeat index -> SupportMap`.
pub type RepeatSupportMap = BTreeMap<u32, SupportMap>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionStats {
    pub repeats: u64,
    pub repeat_candidates_total: u64,
    pub paths_known: u64,
    pub paths_unknown: u64,
    pub paths_supported: u64,
    pub paths_unsupported: u64,
    pub unknown_reason_counts: [u64; 8],
}

/// The outcome of one resolution sweep at a fixed (batch, r).
pub struct Resolution {
    pub repeat_support_map: RepeatSupportMap,
    pub read_size: usize,
    pub r: usize,
    pub finds_histogram: Histogram,
    pub fraction_finds_histogram: FractionHistogram,
    pub calculated_tests_histogram: Histogram,
    pub stats: ResolutionStats,
    pub failed: bool,
}

impl Resolution {
    fn new(read_size: usize, r: usize) -> Self {
        Resolution {
            repeat_support_map: RepeatSupportMap::new(),
            read_size,
            r,
            finds_histogram: Histogram::new(),
            fraction_finds_histogram: FractionHistogram::new(),
            calculated_tests_histogram: Histogram::new(),
            stats: ResolutionStats::default(),
            failed: false,
        }
    }
}

/// Is this vertex a junction the resolver should try to split?
pub fn is_small_repeat(ctx: &SupportContext, node: ContigNode) -> bool {
    let r = ctx.vanilla.k();
    !ctx.graph.is_removed(node)
        && !node.sense()
        && window_long_enough(
            r,
            ctx.opts.min_tests as usize,
            ctx.graph.contig_len(node),
            MIN_MARGIN,
        )
        && (ctx.graph.in_degree(node) > 0 && ctx.graph.out_degree(node) > 0)
        && (ctx.graph.in_degree(node) > 1 || ctx.graph.out_degree(node) > 1)
}

/// Test every in/out pair of one repeat, then poison the map if any pair
/// was unknown.
pub fn build_repeat_support_map(ctx: &SupportContext, repeat: ContigNode) -> SupportMap {
    let mut support_map = SupportMap::new();
    let mut unknown = false;

    for &(intig, _) in ctx.graph.in_edges(repeat) {
        for &(outig, _) in ctx.graph.out_edges(repeat) {
            let support = determine_path_support(ctx, &[intig, repeat, outig]);
            if support.unknown() {
                unknown = true;
            }
            support_map
                .entry(intig.index())
                .or_default()
                .insert(outig.index(), support);
        }
    }

    if unknown {
        for outigs in support_map.values_mut() {
            for support in outigs.values_mut() {
                support.poison();
            }
        }
    }

    support_map
}

/// Sweep the graph for small repeats and build the resolution.
pub fn resolve_repeats(ctx: &SupportContext) -> Resolution {
    let total = (ctx.graph.num_pairs() - ctx.graph.num_pairs_removed()) as u64;
    info!(r = ctx.vanilla.k(), "path resolution");

    let resolution = Mutex::new(Resolution::new(ctx.current_batch().size, ctx.vanilla.k()));
    let supports: Mutex<Vec<Support>> = Mutex::new(Vec::new());

    let candidates: Vec<ContigNode> = ctx
        .graph
        .nodes()
        .filter(|&node| is_small_repeat(ctx, node))
        .collect();

    candidates.par_iter().for_each(|&node| {
        let (in_hist_sample, skip) = {
            let mut res = resolution.lock().unwrap();
            res.stats.repeats += 1;
            (
                res.stats.repeats <= HIST_SAMPLE_SIZE,
                res.stats.repeats > REPEAT_CASES_LIMIT,
            )
        };
        if skip {
            return;
        }

        let support_map = build_repeat_support_map(ctx, node);

        let mut res = resolution.lock().unwrap();
        let mut sup = supports.lock().unwrap();
        for outigs in support_map.values() {
            for support in outigs.values() {
                sup.push(*support);
                if in_hist_sample {
                    if let Support::Known { found, tests, .. } = *support {
                        res.finds_histogram.insert(found as i64);
                        res.fraction_finds_histogram
                            .insert(found as f64 / tests as f64);
                    }
                    res.calculated_tests_histogram
                        .insert(support.calculated_tests() as i64);
                }
            }
        }
        res.repeat_support_map.insert(node.index(), support_map);
    });

    let mut resolution = resolution.into_inner().unwrap();
    let supports = supports.into_inner().unwrap();
    resolution.stats.repeat_candidates_total = total;

    for support in &supports {
        match support.reason() {
            Some(reason) => {
                resolution.stats.paths_unknown += 1;
                resolution.stats.unknown_reason_counts[reason.index()] += 1;
            }
            None => resolution.stats.paths_known += 1,
        }
    }

    let stats = &mut resolution.stats;
    if stats.repeats > 0 && stats.paths_known > 0 {
        let mut supported = 0u64;
        let mut unsupported = 0u64;
        for (finds, count) in resolution.finds_histogram.iter() {
            if finds >= ctx.opts.threshold as i64 {
                supported += count;
            } else {
                unsupported += count;
            }
        }
        // Histograms only sample; rescale to the full known count.
        let sample_factor = stats.paths_known as f64 / (supported + unsupported) as f64;
        stats.paths_supported = (supported as f64 * sample_factor) as u64;
        stats.paths_unsupported = (unsupported as f64 * sample_factor) as u64;

        info!(
            repeats = stats.repeats,
            total,
            known = stats.paths_known,
            unknown = stats.paths_unknown,
            supported = stats.paths_supported,
            unsupported = stats.paths_unsupported,
            "support sweep done"
        );
        for reason in UnknownReason::ALL {
            let count = stats.unknown_reason_counts[reason.index()];
            if count > 0 {
                info!("  {}: {}", reason.label(), count);
            }
        }

        if (stats.paths_supported as f64) < SUPPORTED_PATHS_MIN * stats.paths_known as f64 {
            warn!("Insufficient support found. Is something wrong with the data?");
            resolution.failed = true;
        }
    } else {
        warn!("No small resolveable junctions were found!");
        resolution.failed = true;
    }

    resolution
}
