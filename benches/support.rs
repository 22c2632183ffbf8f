// benches/support.rs
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;

use unravel::kmer::bloom::{KmerBloomFilter, SpacedSeedsFilter};
use unravel::kmer::nthash::NtMultiHash;

/// Generate a random DNA sequence for benchmarking
fn generate_sequence(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let bases = ['A', 'C', 'G', 'T'];
    (0..len).map(|_| bases[rng.gen_range(0..4)]).collect()
}

/// Benchmark rolling multi-hash against per-window recomputation
fn bench_rolling_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("rolling_hash");

    let sequence = generate_sequence(10_000);
    let bytes = sequence.as_bytes();
    let r = 60;
    group.throughput(Throughput::Bytes(sequence.len() as u64));

    group.bench_function("roll", |b| {
        b.iter(|| {
            let mut hasher = NtMultiHash::new(bytes, 4, r);
            let mut acc = 0u64;
            while hasher.roll() {
                acc ^= hasher.hashes()[0];
            }
            black_box(acc)
        });
    });

    group.bench_function("recompute", |b| {
        b.iter(|| {
            let mut acc = 0u64;
            for i in 0..=bytes.len() - r {
                acc ^= unravel::kmer::nthash::window_hashes(&bytes[i..i + r], 4)[0];
            }
            black_box(acc)
        });
    });

    group.finish();
}

/// Benchmark window counting against the filters
fn bench_filter_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_queries");

    let r = 60;
    let reads: Vec<String> = (0..1000).map(|_| generate_sequence(150)).collect();
    let mut vanilla = KmerBloomFilter::with_memory(1 << 22, r, 4);
    let mut spaced = SpacedSeedsFilter::with_memory(1 << 22, r, 4);
    for read in &reads {
        vanilla.insert_seq(read.as_bytes());
        for start in 0..=read.len() - r {
            spaced.insert_window(&read.as_bytes()[start..start + r]);
        }
    }

    for query_len in [90, 119] {
        let query = generate_sequence(query_len);
        group.throughput(Throughput::Bytes(query_len as u64));

        group.bench_with_input(
            BenchmarkId::new("vanilla_contains", query_len),
            &query,
            |b, q| {
                b.iter(|| black_box(vanilla.contains(q.as_bytes())));
            },
        );

        group.bench_with_input(
            BenchmarkId::new("spaced_contains", query_len),
            &query,
            |b, q| {
                b.iter(|| black_box(spaced.contains(q.as_bytes())));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_rolling_hash, bench_filter_queries);
criterion_main!(benches);
