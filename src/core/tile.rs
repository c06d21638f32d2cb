//! Depth-bounded alignment tiles
//!
//! A [`Tile`] holds the sampled alignments of one fixed-size sub-range of a
//! chromosome. Records arrive in start order while a load scans the source
//! and are grouped into transient [`Bucket`]s: a bucket is a run of records
//! whose starts all fall before the smallest end seen so far in the bucket,
//! i.e. a cluster of mutually overlapping reads. When the next record starts
//! past that end the bucket is closed, downsampled to the target depth, and
//! its survivors are filed into the tile's permanent lists.
//!
//! Downsampling is pair aware. A read whose mate lands in a later bucket is
//! remembered in a pending set so the later bucket admits the mate first.

use crate::core::counts::AlignmentCounts;
use crate::core::record::AlignmentRecord;
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Transient per-locus grouping of records used during a load
#[derive(Debug, Default)]
pub struct Bucket {
    primary_order: Vec<String>,
    primary: HashMap<String, Arc<AlignmentRecord>>,
    mates_order: Vec<String>,
    mates: HashMap<String, Arc<AlignmentRecord>>,
    overflow: Vec<Arc<AlignmentRecord>>,
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// File a record by read name: first sighting, second sighting, or overflow
    pub fn add(&mut self, record: Arc<AlignmentRecord>) {
        let name = &record.read_name;
        if !self.primary.contains_key(name) {
            self.primary_order.push(name.clone());
            self.primary.insert(name.clone(), record);
        } else if !self.mates.contains_key(name) {
            self.mates_order.push(name.clone());
            self.mates.insert(name.clone(), record);
        } else {
            self.overflow.push(record);
        }
    }

    pub fn len(&self) -> usize {
        self.primary.len() + self.mates.len() + self.overflow.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of sampling one bucket
#[derive(Debug)]
pub struct SampledBucket {
    /// Kept records, sorted by start
    pub records: Vec<Arc<AlignmentRecord>>,
    /// Number of records dropped
    pub dropped: usize,
}

fn waits_for_mate(record: &AlignmentRecord) -> bool {
    record.is_paired() && record.is_mate_mapped()
}

/// Downsample a bucket to roughly `max_depth` records
///
/// Buckets of at most `keep_all_below` records are kept whole. Otherwise
/// names waiting in `pending` are admitted first, then random primary reads
/// together with their mates, then random overflow reads.
pub fn sample_bucket<R: Rng + ?Sized>(
    bucket: Bucket,
    pending: &mut HashSet<String>,
    max_depth: usize,
    keep_all_below: usize,
    rng: &mut R,
) -> SampledBucket {
    let input_size = bucket.len();
    let Bucket { primary_order, mut primary, mates_order, mut mates, mut overflow } = bucket;

    let mut kept: Vec<Arc<AlignmentRecord>> = Vec::with_capacity(input_size.min(max_depth + 1));

    if input_size <= keep_all_below {
        for name in primary_order {
            pending.remove(&name);
            if let Some(record) = primary.remove(&name) {
                kept.push(record);
            }
        }
        // Arrival order, so equal starts keep a stable order under one seed
        kept.extend(mates_order.iter().filter_map(|name| mates.remove(name)));
        kept.append(&mut overflow);
        kept.sort_by_key(|r| r.start);
        return SampledBucket { records: kept, dropped: 0 };
    }

    // Complete pairs started in an earlier bucket
    let mut remaining = Vec::with_capacity(primary_order.len());
    for name in primary_order {
        if pending.remove(&name) {
            if let Some(record) = primary.remove(&name) {
                kept.push(record);
            }
        } else {
            remaining.push(name);
        }
    }

    while kept.len() < max_depth && !remaining.is_empty() {
        let name = remaining.swap_remove(rng.gen_range(0..remaining.len()));
        let Some(record) = primary.remove(&name) else { continue };
        let wants_mate = waits_for_mate(&record);
        kept.push(record);
        match mates.remove(&name) {
            Some(mate) => kept.push(mate),
            None if wants_mate => {
                pending.insert(name);
            }
            None => {}
        }
    }

    while kept.len() < max_depth && !overflow.is_empty() {
        kept.push(overflow.swap_remove(rng.gen_range(0..overflow.len())));
    }

    kept.sort_by_key(|r| r.start);
    let dropped = input_size - kept.len();
    SampledBucket { records: kept, dropped }
}

/// Span where a bucket was thinned out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownsampledInterval {
    pub start: u64,
    pub end: u64,
    pub dropped: usize,
}

#[derive(Debug)]
struct LoadState {
    bucket: Bucket,
    bucket_end: Option<u64>,
    bucket_start: u64,
    bucket_max_end: u64,
    pending_pairs: HashSet<String>,
    max_depth: usize,
    keep_all_below: usize,
    rng: StdRng,
}

/// Cached, depth-bounded alignments for one tile of one chromosome
#[derive(Debug)]
pub struct Tile {
    chrom: String,
    index: u64,
    start: u64,
    end: u64,
    loaded: bool,
    contained_records: Vec<Arc<AlignmentRecord>>,
    overlapping_records: Vec<Arc<AlignmentRecord>>,
    downsampled: Vec<DownsampledInterval>,
    counts: Arc<AlignmentCounts>,
    state: Option<LoadState>,
}

impl Tile {
    /// Create an empty, not yet loaded tile covering
    /// `[index * tile_size, (index + 1) * tile_size)`
    pub fn new(
        chrom: impl Into<String>,
        index: u64,
        tile_size: u64,
        max_depth: usize,
        keep_all_below: usize,
        rng: StdRng,
    ) -> Self {
        let start = index * tile_size;
        let end = start + tile_size;
        Self {
            chrom: chrom.into(),
            index,
            start,
            end,
            loaded: false,
            contained_records: Vec::new(),
            overlapping_records: Vec::new(),
            downsampled: Vec::new(),
            counts: Arc::new(AlignmentCounts::new(start, end)),
            state: Some(LoadState {
                bucket: Bucket::new(),
                bucket_end: None,
                bucket_start: 0,
                bucket_max_end: 0,
                pending_pairs: HashSet::new(),
                max_depth,
                keep_all_below: keep_all_below.max(max_depth),
                rng,
            }),
        }
    }

    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Records whose start lies in `[start, end)`
    pub fn contained_records(&self) -> &[Arc<AlignmentRecord>] {
        &self.contained_records
    }

    /// Records that start before this tile and reach into it
    pub fn overlapping_records(&self) -> &[Arc<AlignmentRecord>] {
        &self.overlapping_records
    }

    pub fn counts(&self) -> &Arc<AlignmentCounts> {
        &self.counts
    }

    pub fn downsampled_intervals(&self) -> &[DownsampledInterval] {
        &self.downsampled
    }

    /// Feed one record of the load scan into this tile
    ///
    /// Records must arrive sorted by start. Has no effect once loaded.
    pub fn add_record(&mut self, record: Arc<AlignmentRecord>) {
        if self.loaded {
            return;
        }
        Arc::make_mut(&mut self.counts).inc_counts(&record);

        let close = match self.state.as_ref().and_then(|s| s.bucket_end) {
            Some(e1) => record.start > e1,
            None => false,
        };
        if close {
            self.close_bucket();
        }

        let Some(state) = self.state.as_mut() else { return };
        match state.bucket_end {
            Some(e1) => {
                state.bucket_end = Some(e1.min(record.end));
                state.bucket_max_end = state.bucket_max_end.max(record.end);
            }
            None => {
                state.bucket_end = Some(record.end);
                state.bucket_start = record.start;
                state.bucket_max_end = record.end;
            }
        }
        state.bucket.add(record);
    }

    fn close_bucket(&mut self) {
        let Some(state) = self.state.as_mut() else { return };
        let bucket = std::mem::take(&mut state.bucket);
        let span = (state.bucket_start, state.bucket_max_end);
        state.bucket_end = None;
        if bucket.is_empty() {
            return;
        }
        let sampled = sample_bucket(
            bucket,
            &mut state.pending_pairs,
            state.max_depth,
            state.keep_all_below,
            &mut state.rng,
        );
        if sampled.dropped > 0 {
            self.downsampled.push(DownsampledInterval {
                start: span.0,
                end: span.1,
                dropped: sampled.dropped,
            });
        }
        for record in sampled.records {
            if record.start >= self.start && record.start < self.end {
                self.contained_records.push(record);
            } else if record.start < self.start && record.end >= self.start {
                self.overlapping_records.push(record);
            }
        }
    }

    /// Sample the last open bucket and freeze the tile
    pub fn finish_loading(&mut self) {
        if self.loaded {
            return;
        }
        self.close_bucket();
        self.state = None;
        self.loaded = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{flags, MateInfo, Strand};
    use rand::SeedableRng;

    fn rec(name: &str, start: u64, end: u64) -> Arc<AlignmentRecord> {
        Arc::new(AlignmentRecord::new(name, "chr1", start, end))
    }

    fn paired(name: &str, start: u64, end: u64, mate_start: u64) -> Arc<AlignmentRecord> {
        Arc::new(
            AlignmentRecord::new(name, "chr1", start, end)
                .with_flags(flags::PAIRED | flags::PROPER_PAIR)
                .with_mate(MateInfo {
                    chrom: "chr1".to_string(),
                    start: mate_start,
                    mapped: true,
                    strand: Strand::Minus,
                }),
        )
    }

    fn tile(max_depth: usize) -> Tile {
        Tile::new("chr1", 1, 1000, max_depth, max_depth, StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_bucket_filing() {
        let mut bucket = Bucket::new();
        bucket.add(rec("a", 0, 10));
        bucket.add(rec("a", 5, 15));
        bucket.add(rec("a", 6, 16));
        bucket.add(rec("b", 7, 17));
        assert_eq!(bucket.primary.len(), 2);
        assert_eq!(bucket.mates.len(), 1);
        assert_eq!(bucket.overflow.len(), 1);
        assert_eq!(bucket.len(), 4);
    }

    #[test]
    fn test_sample_keeps_small_bucket() {
        let mut bucket = Bucket::new();
        for i in 0..5 {
            bucket.add(rec(&format!("r{}", i), 10 - i, 20));
        }
        let mut pending = HashSet::new();
        let mut rng = StdRng::seed_from_u64(1);
        let sampled = sample_bucket(bucket, &mut pending, 10, 10, &mut rng);
        assert_eq!(sampled.records.len(), 5);
        assert_eq!(sampled.dropped, 0);
        assert!(sampled.records.windows(2).all(|w| w[0].start <= w[1].start));
    }

    #[test]
    fn test_sample_bounds_depth() {
        let mut bucket = Bucket::new();
        for i in 0..100 {
            bucket.add(rec(&format!("r{}", i), i, 500));
        }
        let mut pending = HashSet::new();
        let mut rng = StdRng::seed_from_u64(1);
        let sampled = sample_bucket(bucket, &mut pending, 20, 20, &mut rng);
        assert_eq!(sampled.records.len(), 20);
        assert_eq!(sampled.dropped, 80);
        // unpaired reads never wait for a mate
        assert!(pending.is_empty());
    }

    #[test]
    fn test_kept_mates_follow_arrival_order() {
        let build = || {
            let mut bucket = Bucket::new();
            for i in 0..20 {
                bucket.add(paired(&format!("p{:02}", i), 100 + i, 400, 300));
            }
            for i in (0..20).rev() {
                bucket.add(paired(&format!("p{:02}", i), 300, 350, 100 + i));
            }
            bucket
        };
        let names = |bucket| {
            let mut pending = HashSet::new();
            let mut rng = StdRng::seed_from_u64(5);
            sample_bucket(bucket, &mut pending, 100, 100, &mut rng)
                .records
                .iter()
                .map(|r| r.read_name.clone())
                .collect::<Vec<_>>()
        };
        let first = names(build());
        assert_eq!(first.len(), 40);
        assert_eq!(first, names(build()));
        let expected: Vec<String> = (0..20).rev().map(|i| format!("p{:02}", i)).collect();
        assert_eq!(&first[20..], &expected[..]);
    }

    #[test]
    fn test_sample_keeps_mates_together() {
        let mut bucket = Bucket::new();
        for i in 0..50 {
            bucket.add(paired(&format!("p{}", i), i, 300, i + 10));
        }
        for i in 0..50 {
            bucket.add(paired(&format!("p{}", i), i + 10, 310, i));
        }
        let mut pending = HashSet::new();
        let mut rng = StdRng::seed_from_u64(3);
        let sampled = sample_bucket(bucket, &mut pending, 10, 10, &mut rng);
        assert_eq!(sampled.records.len(), 10);
        let mut names: HashMap<&str, usize> = HashMap::new();
        for r in &sampled.records {
            *names.entry(r.read_name.as_str()).or_default() += 1;
        }
        assert!(names.values().all(|&n| n == 2));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_pending_pair_admitted_in_next_bucket() {
        let mut first = Bucket::new();
        for i in 0..30 {
            first.add(paired(&format!("p{}", i), i, 100, 1000));
        }
        let mut pending = HashSet::new();
        let mut rng = StdRng::seed_from_u64(11);
        let sampled = sample_bucket(first, &mut pending, 5, 5, &mut rng);
        assert_eq!(pending.len(), 5);
        let admitted: HashSet<String> = sampled.records.iter().map(|r| r.read_name.clone()).collect();

        let mut second = Bucket::new();
        for i in 0..30 {
            second.add(paired(&format!("p{}", i), 1000 + i, 1100, i));
        }
        let sampled = sample_bucket(second, &mut pending, 5, 5, &mut rng);
        let names: Vec<&str> = sampled.records.iter().map(|r| r.read_name.as_str()).collect();
        for name in &admitted {
            assert_eq!(names.iter().filter(|n| **n == name.as_str()).count(), 1);
        }
    }

    #[test]
    fn test_tile_partitions_records() {
        let mut t = tile(100);
        t.add_record(rec("before", 900, 1010));
        t.add_record(rec("inside", 1005, 1050));
        t.add_record(rec("later", 1500, 1600));
        t.finish_loading();
        assert!(t.is_loaded());
        assert_eq!(t.overlapping_records().len(), 1);
        assert_eq!(t.overlapping_records()[0].read_name, "before");
        let names: Vec<_> = t.contained_records().iter().map(|r| r.read_name.as_str()).collect();
        assert_eq!(names, vec!["inside", "later"]);
        assert_eq!(t.counts().coverage_at(1000), 1);
        assert_eq!(t.counts().coverage_at(1010), 1);
    }

    #[test]
    fn test_tile_downsamples_deep_locus() {
        let mut t = tile(10);
        for i in 0..200 {
            t.add_record(rec(&format!("r{}", i), 1100, 1200));
        }
        t.add_record(rec("tail", 1300, 1400));
        t.finish_loading();
        assert_eq!(t.contained_records().len(), 11);
        assert_eq!(t.downsampled_intervals().len(), 1);
        assert_eq!(t.downsampled_intervals()[0].dropped, 190);
        // counts see every record, sampled or not
        assert_eq!(t.counts().coverage_at(1150), 200);
    }

    #[test]
    fn test_loaded_tile_is_frozen() {
        let mut t = tile(10);
        t.finish_loading();
        t.add_record(rec("late", 1100, 1200));
        assert!(t.contained_records().is_empty());
        assert!(t.counts().is_empty());
    }
}
