// src/cli_main.rs
use clap::Parser;

use crate::resolve::{ResolverOptions, MAX_TESTS_OFFSET};

/// Parse a byte size with an optional k/M/G suffix.
pub fn parse_mem(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let (digits, factor) = match s.chars().last() {
        Some('k') | Some('K') => (&s[..s.len() - 1], 1usize << 10),
        Some('M') | Some('m') => (&s[..s.len() - 1], 1usize << 20),
        Some('G') | Some('g') => (&s[..s.len() - 1], 1usize << 30),
        _ => (s, 1),
    };
    digits
        .parse::<usize>()
        .map(|n| n * factor)
        .map_err(|_| format!("invalid size: {}", s))
}

#[derive(Parser, Debug)]
#[command(
    name = "unravel",
    version,
    about = "Resolve short repeats in a draft assembly using read k-mer evidence",
    long_about = None
)]
pub struct Cli {
    /// Draft assembly graph (GFA)
    pub graph: String,

    /// Short-read files, FASTQ or FASTA, optionally gzipped
    #[arg(required = true)]
    pub reads: Vec<String>,

    /// Contig sequences (FASTA); needed when the GFA omits sequences
    #[arg(short = 'c', long)]
    pub contigs: Option<String>,

    /// Assembly k-mer size
    #[arg(short, long)]
    pub k: usize,

    /// Read Bloom filter memory budget (k/M/G suffix accepted)
    #[arg(short = 'b', long, default_value = "100M", value_parser = parse_mem)]
    pub bloom_size: usize,

    /// Number of parallel threads
    #[arg(short = 'j', long, default_value_t = num_cpus::get())]
    pub threads: usize,

    /// K-mers required to be found for a path to be supported
    #[arg(short = 'x', long, default_value_t = 5)]
    pub threshold: u32,

    /// Minimum number of sliding window moves
    #[arg(long, default_value_t = 20)]
    pub min_tests: u32,

    /// Maximum number of planned tests (default: min-tests + 16)
    #[arg(long)]
    pub max_tests: Option<u32>,

    /// Maximum number of branching paths per junction side
    #[arg(long, default_value_t = 75)]
    pub branching: usize,

    /// Explicitly specified r values
    #[arg(long, value_delimiter = ',')]
    pub r_values: Vec<usize>,

    /// Per-batch coverage approximation factors
    #[arg(long, value_delimiter = ',')]
    pub cov_approx_factors: Vec<f64>,

    /// Minimum base quality inside large k-mers (reserved)
    #[arg(long, default_value_t = 0)]
    pub read_quality_threshold: u8,

    /// Disable single-SNP error correction
    #[arg(long)]
    pub no_error_correction: bool,

    /// r-mers extracted per read when building the filters
    #[arg(long, default_value_t = 4)]
    pub extract: usize,

    /// Memory multiplier applied to the Bloom filter budget
    #[arg(long, default_value_t = 1.0)]
    pub bf_mem_factor: f64,

    /// Prefix for the per-(r, subiteration) histogram files
    #[arg(long)]
    pub hist_prefix: Option<String>,

    /// Longest read length accepted
    #[arg(long, default_value_t = 300)]
    pub max_read_size: usize,

    /// Write the resolved graph here (GFA)
    #[arg(short = 'g', long)]
    pub output_graph: Option<String>,

    /// Write the resolved contigs here (FASTA)
    #[arg(short = 'o', long)]
    pub output_contigs: Option<String>,

    /// Write supported paths here
    #[arg(long)]
    pub supported_paths: Option<String>,

    /// Write unsupported paths here
    #[arg(long)]
    pub unsupported_paths: Option<String>,

    /// Write a JSON run summary here
    #[arg(long)]
    pub json_summary: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            bloom_size: self.bloom_size,
            threads: self.threads,
            threshold: self.threshold,
            min_tests: self.min_tests,
            max_tests: self.max_tests.unwrap_or(self.min_tests + MAX_TESTS_OFFSET),
            branching: self.branching,
            r_values: self.r_values.clone(),
            cov_approx_factors: self.cov_approx_factors.clone(),
            read_quality_threshold: self.read_quality_threshold,
            error_correction: !self.no_error_correction,
            k: self.k,
            extract: self.extract,
            bf_mem_factor: self.bf_mem_factor,
            hist_prefix: self.hist_prefix.clone(),
            max_read_size: self.max_read_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mem() {
        assert_eq!(parse_mem("1024"), Ok(1024));
        assert_eq!(parse_mem("4k"), Ok(4096));
        assert_eq!(parse_mem("100M"), Ok(100 << 20));
        assert_eq!(parse_mem("2G"), Ok(2 << 30));
        assert!(parse_mem("abc").is_err());
    }

    #[test]
    fn test_options_derivation() {
        let cli = Cli::parse_from([
            "unravel",
            "-k",
            "48",
            "--min-tests",
            "10",
            "--no-error-correction",
            "graph.gfa",
            "reads.fq.gz",
        ]);
        let opts = cli.resolver_options();
        assert_eq!(opts.k, 48);
        assert_eq!(opts.min_tests, 10);
        assert_eq!(opts.max_tests, 26);
        assert!(!opts.error_correction);
        assert_eq!(cli.reads, vec!["reads.fq.gz".to_string()]);
    }
}
