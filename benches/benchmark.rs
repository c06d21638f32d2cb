//! Performance benchmarks for FastPileup
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fast_pileup::core::{
    flags, sample_bucket, AlignmentRecord, Bucket, CacheConfig, CachingReader, CancellationToken, MateInfo, Strand,
};
use fast_pileup::formats::MemorySource;
use fast_pileup::layout::{GroupBy, RowPacker};
use fast_pileup::PackingOptions;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;

/// Start-sorted paired reads over `span` bp
fn synthetic_reads(count: usize, span: u64) -> Vec<AlignmentRecord> {
    let mut rng = StdRng::seed_from_u64(7);
    let mut records: Vec<AlignmentRecord> = (0..count)
        .map(|i| {
            let start = rng.gen_range(0..span);
            let reverse = rng.gen_bool(0.5);
            AlignmentRecord::new(format!("read{}", i / 2), "chr1", start, start + 100)
                .with_flags(flags::PAIRED | flags::PROPER_PAIR | if reverse { flags::REVERSE } else { 0 })
                .with_mate(MateInfo { chrom: "chr1".into(), start: start + 250, mapped: true, strand: Strand::Minus })
                .with_sequence(vec![b'A'; 100])
        })
        .collect();
    records.sort_by_key(|r| r.start);
    records
}

/// Benchmark row packing
fn bench_packing(c: &mut Criterion) {
    let mut group = c.benchmark_group("packing");

    for size in [1_000usize, 10_000, 50_000].iter() {
        let alignments: Vec<Arc<AlignmentRecord>> =
            synthetic_reads(*size, 30_000).into_iter().map(Arc::new).collect();
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("plain", size), &alignments, |b, alignments| {
            let packer = RowPacker::default();
            b.iter(|| black_box(packer.pack(black_box(alignments), 30_000)))
        });
        group.bench_with_input(BenchmarkId::new("paired_strand", size), &alignments, |b, alignments| {
            let packer = RowPacker::new(PackingOptions::default().paired(true).group_by(GroupBy::Strand));
            b.iter(|| black_box(packer.pack(black_box(alignments), 30_000)))
        });
    }

    group.finish();
}

/// Benchmark downsampling a single deep bucket
fn bench_bucket_sampling(c: &mut Criterion) {
    let records: Vec<Arc<AlignmentRecord>> = (0..5_000)
        .map(|i| Arc::new(AlignmentRecord::new(format!("r{}", i), "chr1", 1_000, 1_100)))
        .collect();

    c.bench_function("sample_bucket_5000_to_100", |b| {
        let mut rng = StdRng::seed_from_u64(1);
        b.iter(|| {
            let mut bucket = Bucket::new();
            for record in &records {
                bucket.add(Arc::clone(record));
            }
            let mut pending = HashSet::new();
            black_box(sample_bucket(bucket, &mut pending, 100, 100, &mut rng))
        })
    });
}

/// Benchmark a cold query: one scan filling every tile in range
fn bench_tile_load(c: &mut Criterion) {
    let records = synthetic_reads(20_000, 30_000);
    let mut group = c.benchmark_group("tile_load");
    group.throughput(Throughput::Elements(records.len() as u64));

    for depth in [50usize, 500].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            b.iter(|| {
                let source = MemorySource::new(records.clone());
                let mut reader = CachingReader::new(source, CacheConfig::default().seed(3));
                let result = reader
                    .query("chr1", 0, 29_999, depth, None, &CancellationToken::new())
                    .unwrap();
                black_box(result.alignments.count())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_packing, bench_bucket_sampling, bench_tile_load);

criterion_main!(benches);
