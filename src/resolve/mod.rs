// src/resolve/mod.rs
//! The repeat-resolution core: read-length batching, path support testing,
//! repeat iteration and the driver loop.

pub mod driver;
pub mod path_support;
pub mod read_stats;
pub mod repeats;
pub mod support;
pub mod window;

pub use support::{Support, UnknownReason};

/// Minimum flank length on either side of a repeat inside a test window.
pub const MIN_MARGIN: usize = 2;
/// Default gap between `min_tests` and `max_tests`.
pub const MAX_TESTS_OFFSET: u32 = 16;
/// Resolution passes per (batch, r) cycle.
pub const MAX_SUBITERATIONS: usize = 2;
/// Repeats contributing to histograms.
pub const HIST_SAMPLE_SIZE: u64 = u64::MAX;
/// Repeats processed before the iterator starts counting only.
pub const REPEAT_CASES_LIMIT: u64 = u64::MAX;
/// Reads sampled per input file for length statistics.
pub const READ_STATS_SAMPLE_SIZE: u64 = 100_000;
/// Minimum fraction of sampled reads a length batch must hold.
pub const READ_BATCH_FRACTION_THRESHOLD: f64 = 0.30;
/// Head×tail combination count above which a path is tested in parallel.
pub const PATH_COMBINATIONS_MULTITHREAD_THRESHOLD: usize = 5_000;
/// Minimum supported fraction of known paths for a usable resolution.
pub const SUPPORTED_PATHS_MIN: f64 = 0.15;
/// Default coverage approximation factor.
pub const COV_APPROX_FORMULA_FACTOR: f64 = 4.0;
/// Fraction of a spaced seed's masked positions scanned for a SNP.
pub const SPACED_SEEDS_SNP_FRACTION: f64 = 1.00;
/// Default cap on accepted read length.
pub const MAX_READ_SIZE: usize = 300;

// r heuristic: r = min(k + R_HEURISTIC,
//                      size * R_HEURISTIC_A + R_HEURISTIC_B,
//                      size - extract + 1)
pub const R_HEURISTIC: usize = 45;
pub const R_HEURISTIC_A: f64 = 0.49;
pub const R_HEURISTIC_B: f64 = 13.5;

/// Tunables threaded through the whole resolver.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Read Bloom filter size in bytes.
    pub bloom_size: usize,
    pub threads: usize,
    /// k-mer hits required for a path to count as supported.
    pub threshold: u32,
    /// Minimum sliding window moves per combination.
    pub min_tests: u32,
    /// Maximum planned tests before a path is given up on.
    pub max_tests: u32,
    /// Maximum branching paths per junction side.
    pub branching: usize,
    /// Explicitly chosen r values; empty selects heuristically.
    pub r_values: Vec<usize>,
    /// Per-batch coverage approximation factors.
    pub cov_approx_factors: Vec<f64>,
    /// Dormant; accepted for compatibility, nothing consumes it.
    pub read_quality_threshold: u8,
    pub error_correction: bool,
    /// Assembly k-mer size.
    pub k: usize,
    /// r-mers extracted per read when building the filters.
    pub extract: usize,
    /// Multiplier applied to `bloom_size` per filter.
    pub bf_mem_factor: f64,
    /// Prefix for histogram TSV files; `None` disables them.
    pub hist_prefix: Option<String>,
    pub max_read_size: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        let min_tests = 20;
        ResolverOptions {
            bloom_size: 100 << 20,
            threads: 1,
            threshold: 5,
            min_tests,
            max_tests: min_tests + MAX_TESTS_OFFSET,
            branching: 75,
            r_values: Vec::new(),
            cov_approx_factors: Vec::new(),
            read_quality_threshold: 0,
            error_correction: true,
            k: 32,
            extract: 4,
            bf_mem_factor: 1.0,
            hist_prefix: None,
            max_read_size: MAX_READ_SIZE,
        }
    }
}
