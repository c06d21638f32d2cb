//! Per-base coverage and allele counts for one tile

use crate::core::record::{AlignmentRecord, CigarOp, Strand};

/// Allele columns: A, C, G, T, N
pub const NUM_ALLELES: usize = 5;

fn allele_index(base: u8) -> usize {
    match base {
        b'A' | b'a' => 0,
        b'C' | b'c' => 1,
        b'G' | b'g' => 2,
        b'T' | b't' => 3,
        _ => 4,
    }
}

/// Aggregated counts over the half-open span `[start, end)`
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentCounts {
    pub start: u64,
    pub end: u64,
    /// Read depth per position (aligned bases and deletions)
    coverage: Vec<u32>,
    /// Base observations per position, indexed by [`allele_index`]
    alleles: Vec<[u32; NUM_ALLELES]>,
    deletions: Vec<u32>,
    plus_records: u64,
    minus_records: u64,
}

impl AlignmentCounts {
    pub fn new(start: u64, end: u64) -> Self {
        let len = end.saturating_sub(start) as usize;
        Self {
            start,
            end,
            coverage: vec![0; len],
            alleles: vec![[0; NUM_ALLELES]; len],
            deletions: vec![0; len],
            plus_records: 0,
            minus_records: 0,
        }
    }

    /// Add one record's contribution, clipped to this span
    pub fn inc_counts(&mut self, record: &AlignmentRecord) {
        if record.end <= self.start || record.start >= self.end {
            return;
        }
        match record.strand() {
            Strand::Plus => self.plus_records += 1,
            Strand::Minus => self.minus_records += 1,
        }
        let has_bases = !record.sequence.is_empty();
        for (ref_start, read_offset, op) in record.blocks() {
            match op {
                CigarOp::Deletion(len) => {
                    for i in 0..len as u64 {
                        if let Some(idx) = self.index(ref_start + i) {
                            self.coverage[idx] += 1;
                            self.deletions[idx] += 1;
                        }
                    }
                }
                op if op.is_aligned() => {
                    for i in 0..op.len() as u64 {
                        let Some(idx) = self.index(ref_start + i) else { continue };
                        self.coverage[idx] += 1;
                        let base = if has_bases {
                            record.sequence.get(read_offset + i as usize).copied().unwrap_or(b'N')
                        } else {
                            b'N'
                        };
                        self.alleles[idx][allele_index(base)] += 1;
                    }
                }
                _ => {}
            }
        }
    }

    fn index(&self, pos: u64) -> Option<usize> {
        if pos >= self.start && pos < self.end {
            Some((pos - self.start) as usize)
        } else {
            None
        }
    }

    /// Depth at a reference position, 0 outside the span
    pub fn coverage_at(&self, pos: u64) -> u32 {
        self.index(pos).map(|i| self.coverage[i]).unwrap_or(0)
    }

    /// Count of a given base at a reference position
    pub fn base_count(&self, pos: u64, base: u8) -> u32 {
        self.index(pos).map(|i| self.alleles[i][allele_index(base)]).unwrap_or(0)
    }

    pub fn deletion_count(&self, pos: u64) -> u32 {
        self.index(pos).map(|i| self.deletions[i]).unwrap_or(0)
    }

    pub fn max_coverage(&self) -> u32 {
        self.coverage.iter().copied().max().unwrap_or(0)
    }

    pub fn total_coverage(&self) -> u64 {
        self.coverage.iter().map(|&c| c as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.plus_records == 0 && self.minus_records == 0
    }

    /// Records counted, split by strand
    pub fn record_counts(&self) -> (u64, u64) {
        (self.plus_records, self.minus_records)
    }
}
