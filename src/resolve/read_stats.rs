// src/resolve/read_stats.rs
//! Read-length batching and r-value selection.
//!
//! Read lengths are sampled per input file, clustered into batches of
//! near-identical lengths, and each surviving batch is assigned the k-mer
//! sizes (r values) its reads can support.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use rayon::prelude::*;
use tracing::info;

use crate::io::fastq::{open_reads, stream_reads};
use crate::resolve::{
    ResolverOptions, COV_APPROX_FORMULA_FACTOR, READ_BATCH_FRACTION_THRESHOLD,
    READ_STATS_SAMPLE_SIZE, R_HEURISTIC, R_HEURISTIC_A, R_HEURISTIC_B,
};

/// A cluster of reads whose lengths differ by at most 2 bp.
#[derive(Debug, Clone)]
pub struct ReadBatch {
    /// Representative length: the most populous member of the cluster.
    pub size: usize,
    pub r_values: Vec<usize>,
    pub sample_count: u64,
    pub cov_approx_factor: f64,
    /// Every length merged into this batch, the representative included.
    pub size_and_merged_sizes: BTreeSet<usize>,
}

impl ReadBatch {
    fn new(size: usize, sample_count: u64) -> Self {
        ReadBatch {
            size,
            r_values: Vec::new(),
            sample_count,
            cov_approx_factor: COV_APPROX_FORMULA_FACTOR,
            size_and_merged_sizes: BTreeSet::new(),
        }
    }

    pub fn fraction_of_total(&self, total_sample_count: u64) -> f64 {
        self.sample_count as f64 / total_sample_count as f64
    }
}

/// The batch registry for one run, sorted by read size ascending.
#[derive(Debug, Clone)]
pub struct ReadBatches {
    pub batches: Vec<ReadBatch>,
    pub total_sample_count: u64,
}

impl ReadBatches {
    pub fn fraction(&self, index: usize) -> f64 {
        self.batches[index].fraction_of_total(self.total_sample_count)
    }
}

/// Sample the read files and derive the batch registry.
pub fn determine_read_batches(
    read_files: &[String],
    opts: &ResolverOptions,
) -> Result<ReadBatches, String> {
    info!("determining read stats");

    let length_counts: Mutex<BTreeMap<usize, u64>> = Mutex::new(BTreeMap::new());
    let errors: Vec<String> = read_files
        .par_iter()
        .filter_map(|path| {
            let reader = match open_reads(path) {
                Ok(r) => r,
                Err(e) => return Some(format!("{}: {}", path, e)),
            };
            let mut local: BTreeMap<usize, u64> = BTreeMap::new();
            for record in stream_reads(reader) {
                if record.num >= READ_STATS_SAMPLE_SIZE {
                    break;
                }
                if record.seq.len() > opts.max_read_size {
                    continue;
                }
                *local.entry(record.seq.len()).or_insert(0) += 1;
            }
            let mut global = length_counts.lock().unwrap();
            for (size, count) in local {
                *global.entry(size).or_insert(0) += count;
            }
            None
        })
        .collect();
    if let Some(err) = errors.into_iter().next() {
        return Err(err);
    }

    let length_counts = length_counts.into_inner().unwrap();
    if length_counts.is_empty() {
        return Err("Insufficient number of short reads".to_string());
    }

    // Lengths ascending, then cluster spans of <= 2 bp. The representative
    // length follows the most populous member; a seed absorbs at most 3
    // neighbours.
    let mut batches: Vec<ReadBatch> = length_counts
        .iter()
        .map(|(&size, &count)| ReadBatch::new(size, count))
        .collect();
    let total_sample_count: u64 = batches.iter().map(|b| b.sample_count).sum();

    let mut merged: Vec<ReadBatch> = Vec::new();
    let mut consumed = vec![false; batches.len()];
    for i in 0..batches.len() {
        if consumed[i] {
            continue;
        }
        let mut batch = batches[i].clone();
        batch.size_and_merged_sizes.insert(batch.size);
        let mut merge_count = 0;
        for j in i + 1..batches.len() {
            if consumed[j] {
                continue;
            }
            if batches[j].size - batch.size <= 2 {
                batch.size_and_merged_sizes.insert(batches[j].size);
                if batch.sample_count <= batches[j].sample_count {
                    batch.size = batches[j].size;
                }
                batch.sample_count += batches[j].sample_count;
                consumed[j] = true;
                merge_count += 1;
                if merge_count >= 3 {
                    break;
                }
            }
        }
        merged.push(batch);
    }
    batches = merged;

    batches.sort_by(|a, b| b.sample_count.cmp(&a.sample_count));
    if batches[0].fraction_of_total(total_sample_count) < READ_BATCH_FRACTION_THRESHOLD {
        return Err("Insufficient reads of same size".to_string());
    }
    batches.retain(|b| b.fraction_of_total(total_sample_count) >= READ_BATCH_FRACTION_THRESHOLD);
    batches.sort_by_key(|b| b.size);

    info!(
        "read lengths determined to be: {}",
        batches
            .iter()
            .map(|b| format!(
                "{} ({:.1}%)",
                b.size,
                b.fraction_of_total(total_sample_count) * 100.0
            ))
            .collect::<Vec<_>>()
            .join(", ")
    );

    assign_r_values(&mut batches, opts)?;
    info!(
        "using r values: {}",
        batches
            .iter()
            .flat_map(|b| b.r_values.iter().map(move |r| format!("{} ({})", r, b.size)))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut factors = opts.cov_approx_factors.clone();
    factors.sort_by(|a, b| a.partial_cmp(b).unwrap());
    for (batch, &factor) in batches.iter_mut().zip(factors.iter()) {
        batch.cov_approx_factor = factor;
    }

    Ok(ReadBatches {
        batches,
        total_sample_count,
    })
}

fn assign_r_values(batches: &mut [ReadBatch], opts: &ResolverOptions) -> Result<(), String> {
    if !opts.r_values.is_empty() {
        if opts.r_values.len() < batches.len() {
            return Err(format!(
                "{} r values provided, {} needed",
                opts.r_values.len(),
                batches.len()
            ));
        }
        let mut r_values = opts.r_values.clone();
        r_values.sort_unstable();
        // The last `batches.len()` values map onto the batches ascending.
        let skip = r_values.len() - batches.len();
        for (batch, &r) in batches.iter_mut().zip(r_values[skip..].iter()) {
            if r <= opts.k {
                return Err(format!(
                    "r size ({}) must be larger than assembly k ({})",
                    r, opts.k
                ));
            }
            if r > batch.size - opts.extract + 1 {
                return Err(format!(
                    "r size ({}) must be smaller than or equal to read size - extract + 1 ({})",
                    r,
                    batch.size - opts.extract + 1
                ));
            }
            batch.r_values.push(r);
        }
    } else {
        for batch in batches.iter_mut() {
            let r = (opts.k + R_HEURISTIC)
                .min((batch.size as f64 * R_HEURISTIC_A + R_HEURISTIC_B) as usize)
                .min(batch.size - opts.extract + 1);
            if r > opts.k {
                batch.r_values.push(r);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn write_reads(dir: &tempfile::TempDir, name: &str, lengths: &[(usize, usize)]) -> String {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        let mut n = 0;
        for &(len, count) in lengths {
            for _ in 0..count {
                writeln!(f, "@r{}", n).unwrap();
                writeln!(f, "{}", "A".repeat(len)).unwrap();
                writeln!(f, "+").unwrap();
                writeln!(f, "{}", "I".repeat(len)).unwrap();
                n += 1;
            }
        }
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_single_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_reads(&dir, "r.fq", &[(100, 50)]);
        let opts = ResolverOptions {
            k: 32,
            extract: 4,
            ..Default::default()
        };

        let batches = determine_read_batches(&[path], &opts).unwrap();
        assert_eq!(batches.batches.len(), 1);
        let b = &batches.batches[0];
        assert_eq!(b.size, 100);
        assert_eq!(b.sample_count, 50);
        assert_eq!(batches.fraction(0), 1.0);
        // Heuristic r: min(32 + 45, 100 * 0.49 + 13.5, 100 - 4 + 1) = 62.
        assert_eq!(b.r_values, vec![62]);
        assert_eq!(b.cov_approx_factor, COV_APPROX_FORMULA_FACTOR);
    }

    #[test]
    fn test_adjacent_lengths_merge_to_most_populous() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_reads(&dir, "r.fq", &[(99, 10), (100, 60), (148, 25), (150, 30)]);
        let opts = ResolverOptions::default();

        let batches = determine_read_batches(&[path], &opts).unwrap();
        assert_eq!(batches.batches.len(), 2);
        assert_eq!(batches.batches[0].size, 100);
        assert_eq!(batches.batches[0].sample_count, 70);
        assert!(batches.batches[0].size_and_merged_sizes.contains(&99));
        assert_eq!(batches.batches[1].size, 150);
        assert_eq!(batches.batches[1].sample_count, 55);

        // Kept batches are separated by more than the merge span.
        for pair in batches.batches.windows(2) {
            assert!(pair[1].size - pair[0].size > 2);
        }
    }

    #[test]
    fn test_minor_batch_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_reads(&dir, "r.fq", &[(100, 80), (200, 20)]);
        let opts = ResolverOptions::default();

        let batches = determine_read_batches(&[path], &opts).unwrap();
        assert_eq!(batches.batches.len(), 1);
        assert_eq!(batches.batches[0].size, 100);
        // The dropped batch still counts towards the total.
        assert_eq!(batches.total_sample_count, 100);
    }

    #[test]
    fn test_insufficient_same_size() {
        let dir = tempfile::tempdir().unwrap();
        // Four scattered lengths, each 25%: the top batch is under 30%.
        let path = write_reads(&dir, "r.fq", &[(50, 25), (100, 25), (150, 25), (200, 25)]);
        let opts = ResolverOptions::default();

        let err = determine_read_batches(&[path], &opts).unwrap_err();
        assert!(err.contains("Insufficient reads of same size"));
    }

    #[test]
    fn test_explicit_r_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_reads(&dir, "r.fq", &[(100, 40), (150, 60)]);
        let opts = ResolverOptions {
            r_values: vec![90, 70],
            ..Default::default()
        };

        let batches = determine_read_batches(&[path], &opts).unwrap();
        assert_eq!(batches.batches[0].r_values, vec![70]);
        assert_eq!(batches.batches[1].r_values, vec![90]);
    }

    #[test]
    fn test_explicit_r_value_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_reads(&dir, "r.fq", &[(100, 100)]);
        let opts = ResolverOptions {
            r_values: vec![20],
            k: 32,
            ..Default::default()
        };
        let err = determine_read_batches(&[path.clone()], &opts).unwrap_err();
        assert!(err.contains("must be larger than assembly k"));

        let opts = ResolverOptions {
            r_values: vec![99],
            k: 32,
            extract: 4,
            ..Default::default()
        };
        let err = determine_read_batches(&[path], &opts).unwrap_err();
        assert!(err.contains("read size - extract + 1"));
    }

    #[test]
    fn test_too_few_r_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_reads(&dir, "r.fq", &[(100, 40), (150, 60)]);
        let opts = ResolverOptions {
            r_values: vec![70],
            ..Default::default()
        };
        let err = determine_read_batches(&[path], &opts).unwrap_err();
        assert!(err.contains("1 r values provided, 2 needed"));
    }

    #[test]
    fn test_cov_approx_factors_assigned() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_reads(&dir, "r.fq", &[(100, 40), (150, 60)]);
        let opts = ResolverOptions {
            cov_approx_factors: vec![3.0, 1.5],
            ..Default::default()
        };

        let batches = determine_read_batches(&[path], &opts).unwrap();
        assert_eq!(batches.batches[0].cov_approx_factor, 1.5);
        assert_eq!(batches.batches[1].cov_approx_factor, 3.0);
    }

    #[test]
    fn test_overlong_reads_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_reads(&dir, "r.fq", &[(100, 50), (400, 50)]);
        let opts = ResolverOptions::default();

        let batches = determine_read_batches(&[path], &opts).unwrap();
        assert_eq!(batches.total_sample_count, 50);
        assert_eq!(batches.batches[0].size, 100);
    }
}
