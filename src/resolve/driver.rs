// src/resolve/driver.rs
//! The outer resolution loop: for every read batch and every r, build the
//! filters and run resolve/rewrite/reassemble subiterations until no new
//! unsupported paths turn up.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, Write};

use serde::Serialize;
use tracing::{info, warn};

use crate::graph::assemble::assemble_contigs;
use crate::graph::contig_graph::{ContigGraph, ImaginaryContigPath};
use crate::graph::rewrite::process_graph;
use crate::kmer::build::build_filters;
use crate::resolve::path_support::SupportContext;
use crate::resolve::read_stats::determine_read_batches;
use crate::resolve::repeats::{resolve_repeats, Resolution, ResolutionStats};
use crate::resolve::{ResolverOptions, MAX_SUBITERATIONS};

#[derive(Debug, Clone, Serialize)]
pub struct SubiterationSummary {
    pub read_size: usize,
    pub r: usize,
    pub subiteration: usize,
    pub failed: bool,
    pub stats: ResolutionStats,
}

#[derive(Debug)]
pub struct ResolveOutcome {
    pub supported_paths: BTreeSet<ImaginaryContigPath>,
    pub unsupported_paths: BTreeSet<ImaginaryContigPath>,
    pub summaries: Vec<SubiterationSummary>,
}

/// Run the whole short-read resolution over the graph.
pub fn resolve_short(
    graph: &mut ContigGraph,
    read_files: &[String],
    opts: &ResolverOptions,
) -> Result<ResolveOutcome, String> {
    let batches = determine_read_batches(read_files, opts)?;

    info!("running resolution algorithm");
    let mut supported_paths: BTreeSet<ImaginaryContigPath> = BTreeSet::new();
    let mut unsupported_paths: BTreeSet<ImaginaryContigPath> = BTreeSet::new();
    let mut summaries: Vec<SubiterationSummary> = Vec::new();

    for current in 0..batches.batches.len() {
        let r_values = batches.batches[current].r_values.clone();
        let read_size = batches.batches[current].size;

        for r in r_values {
            if r < opts.k {
                warn!("r value {} ({}) is too short - skipping", r, read_size);
                continue;
            }

            let bytes = (opts.bf_mem_factor * opts.bloom_size as f64) as usize;
            let build = build_filters(
                read_files,
                &batches.batches[current].size_and_merged_sizes,
                r,
                bytes,
                opts.extract,
                opts.error_correction,
            )
            .map_err(|e| e.to_string())?;

            for subiteration in 0..MAX_SUBITERATIONS {
                info!(
                    read_size,
                    r,
                    subiteration = subiteration + 1,
                    "subiteration"
                );
                let unsupported_before = unsupported_paths.len();

                let resolution = {
                    let ctx = SupportContext {
                        graph,
                        vanilla: &build.vanilla,
                        spaced: build.spaced.as_ref(),
                        batches: &batches,
                        current,
                        opts,
                    };
                    resolve_repeats(&ctx)
                };

                summaries.push(SubiterationSummary {
                    read_size,
                    r,
                    subiteration: subiteration + 1,
                    failed: resolution.failed,
                    stats: resolution.stats.clone(),
                });

                if !resolution.failed {
                    process_graph(
                        graph,
                        &resolution,
                        opts.threshold,
                        &mut supported_paths,
                        &mut unsupported_paths,
                    );
                    assemble_contigs(graph);
                    if let Some(prefix) = &opts.hist_prefix {
                        write_histograms(&resolution, prefix, subiteration)
                            .map_err(|e| e.to_string())?;
                    }
                }

                assert!(unsupported_paths.len() >= unsupported_before);
                if unsupported_paths.len() == unsupported_before {
                    break;
                }
            }
        }
    }

    info!("resolution algorithm done");
    Ok(ResolveOutcome {
        supported_paths,
        unsupported_paths,
        summaries,
    })
}

fn write_histograms(resolution: &Resolution, prefix: &str, subiteration: usize) -> io::Result<()> {
    let finds = format!("{}-r{}-{}-finds.tsv", prefix, resolution.r, subiteration + 1);
    File::create(finds)?.write_all(resolution.finds_histogram.to_string().as_bytes())?;

    let fraction = format!(
        "{}-r{}-{}-percent-finds.tsv",
        prefix,
        resolution.r,
        subiteration + 1
    );
    File::create(fraction)?
        .write_all(resolution.fraction_finds_histogram.to_string().as_bytes())?;

    let calculated = format!(
        "{}-r{}-{}-calculated-tests.tsv",
        prefix,
        resolution.r,
        subiteration + 1
    );
    File::create(calculated)?
        .write_all(resolution.calculated_tests_histogram.to_string().as_bytes())?;

    Ok(())
}
