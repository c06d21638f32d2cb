//! Range queries over the tile cache
//!
//! [`CachingReader`] maps a coordinate range onto tile indexes, has the
//! [`TileCache`] materialize them, and returns a lazy iterator clipped to
//! the requested range.

use crate::core::cache::{LoadStatus, TileCache};
use crate::core::cancel::CancellationToken;
use crate::core::config::CacheConfig;
use crate::core::counts::AlignmentCounts;
use crate::core::error::Result;
use crate::core::record::AlignmentRecord;
use crate::core::stats::PeStatsTable;
use crate::formats::AlignmentSource;
use std::sync::Arc;

/// Padding applied to the requested depth to absorb sampling variance
pub const DEPTH_PADDING: f64 = 1.1;

/// Forward-only iterator over merged tile contents, clipped to a range
///
/// Skips records ending at or before `start` and stops at the first record
/// starting after `end`. Not restartable.
#[derive(Debug, Clone)]
pub struct ClippedAlignments {
    records: std::vec::IntoIter<Arc<AlignmentRecord>>,
    start: u64,
    end: u64,
    done: bool,
}

impl ClippedAlignments {
    fn new(records: Vec<Arc<AlignmentRecord>>, start: u64, end: u64) -> Self {
        Self {
            records: records.into_iter(),
            start,
            end,
            done: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), 0, 0)
    }
}

impl Iterator for ClippedAlignments {
    type Item = Arc<AlignmentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        for record in self.records.by_ref() {
            if record.end <= self.start {
                continue;
            }
            if record.start > self.end {
                self.done = true;
                return None;
            }
            return Some(record);
        }
        self.done = true;
        None
    }
}

/// Output of [`CachingReader::query`]
#[derive(Debug)]
pub struct QueryResult {
    pub status: LoadStatus,
    pub alignments: ClippedAlignments,
    /// Coverage of each touched tile that saw any record
    pub counts: Vec<Arc<AlignmentCounts>>,
}

impl QueryResult {
    fn empty(status: LoadStatus) -> Self {
        Self {
            status,
            alignments: ClippedAlignments::empty(),
            counts: Vec::new(),
        }
    }
}

/// Query coordinator in front of a [`TileCache`]
pub struct CachingReader<S: AlignmentSource> {
    cache: TileCache<S>,
}

impl<S: AlignmentSource> CachingReader<S> {
    pub fn new(source: S, config: CacheConfig) -> Self {
        Self {
            cache: TileCache::new(source, config),
        }
    }

    pub fn from_cache(cache: TileCache<S>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &TileCache<S> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut TileCache<S> {
        &mut self.cache
    }

    /// Alignments overlapping `[start, end]` on `chrom`
    pub fn query(
        &mut self,
        chrom: &str,
        start: u64,
        end: u64,
        max_read_depth: usize,
        pe_stats: Option<&mut PeStatsTable>,
        token: &CancellationToken,
    ) -> Result<QueryResult> {
        let end = end.max(start);
        let tile_size = self.cache.tile_size_for(chrom);
        let start_index = start / tile_size;
        let end_index = end / tile_size;
        let depth = ((max_read_depth as f64) * DEPTH_PADDING).ceil() as usize;

        let fetch = self.cache.get_tiles(chrom, start_index, end_index, depth.max(1), pe_stats, token)?;
        if !fetch.status.is_complete() {
            return Ok(QueryResult::empty(fetch.status));
        }
        let Some(first) = fetch.tiles.first() else {
            return Ok(QueryResult::empty(LoadStatus::Complete));
        };

        let size: usize = first.overlapping_records().len()
            + fetch.tiles.iter().map(|t| t.contained_records().len()).sum::<usize>();
        let mut merged = Vec::with_capacity(size);
        merged.extend(first.overlapping_records().iter().cloned());
        let mut counts = Vec::with_capacity(fetch.tiles.len());
        for tile in &fetch.tiles {
            merged.extend(tile.contained_records().iter().cloned());
            if !tile.counts().is_empty() {
                counts.push(Arc::clone(tile.counts()));
            }
        }

        Ok(QueryResult {
            status: LoadStatus::Complete,
            alignments: ClippedAlignments::new(merged, start, end),
            counts,
        })
    }
}
