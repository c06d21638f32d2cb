//! Alignment source abstraction
//!
//! The cache only needs forward, range-restricted scans over start-sorted
//! records. Every file adapter implements [`AlignmentSource`].

use crate::core::error::SourceResult;
use crate::core::record::AlignmentRecord;

/// Boxed record stream returned by a range query
pub type RecordIter<'a> = Box<dyn Iterator<Item = SourceResult<AlignmentRecord>> + 'a>;

/// Sequentially scannable, range-queryable alignment data
pub trait AlignmentSource {
    /// Records overlapping `[start, end)` on `chrom`, in start order
    fn query(&mut self, chrom: &str, start: u64, end: u64) -> SourceResult<RecordIter<'_>>;

    /// Sequence names known to the source
    fn sequence_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// True when a record touches `[start, end)`; zero-length placements count
/// as covering their start base
pub(crate) fn overlaps(record: &AlignmentRecord, start: u64, end: u64) -> bool {
    record.start < end && record.end.max(record.start + 1) > start
}

/// Records held in memory, sorted by chromosome and start
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    records: Vec<AlignmentRecord>,
    queries: usize,
}

impl MemorySource {
    pub fn new(mut records: Vec<AlignmentRecord>) -> Self {
        records.sort_by(|a, b| a.chrom.cmp(&b.chrom).then(a.start.cmp(&b.start)));
        Self { records, queries: 0 }
    }

    /// Number of range queries served so far
    pub fn query_count(&self) -> usize {
        self.queries
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl AlignmentSource for MemorySource {
    fn query(&mut self, chrom: &str, start: u64, end: u64) -> SourceResult<RecordIter<'_>> {
        self.queries += 1;
        let chrom = chrom.to_string();
        let iter = self
            .records
            .iter()
            .filter(move |r| r.chrom == chrom && overlaps(r, start, end))
            .cloned()
            .map(Ok);
        Ok(Box::new(iter))
    }

    fn sequence_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.iter().map(|r| r.chrom.clone()).collect();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_query() -> SourceResult<()> {
        let mut source = MemorySource::new(vec![
            AlignmentRecord::new("b", "chr1", 200, 300),
            AlignmentRecord::new("a", "chr1", 100, 150),
            AlignmentRecord::new("c", "chr2", 100, 150),
        ]);
        let names: Vec<String> = source
            .query("chr1", 140, 250)?
            .map(|r| r.map(|r| r.read_name))
            .collect::<SourceResult<_>>()?;
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(source.query_count(), 1);
        assert_eq!(source.sequence_names(), vec!["chr1", "chr2"]);
        Ok(())
    }

    #[test]
    fn test_overlaps_zero_length() {
        let placed = AlignmentRecord::new("u", "chr1", 100, 100);
        assert!(overlaps(&placed, 100, 101));
        assert!(!overlaps(&placed, 101, 200));
        assert!(!overlaps(&AlignmentRecord::new("r", "chr1", 0, 100), 100, 200));
    }
}
