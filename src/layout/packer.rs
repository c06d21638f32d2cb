//! Greedy row packing for pileup display
//!
//! Alignments are bucketed by their offset from the first alignment's start.
//! A row is built by repeatedly taking the longest alignment from the next
//! non-empty bucket at or past the scan pointer and moving the pointer past
//! its end plus the minimum spacing. When nothing else fits the row is
//! closed and the scan restarts at the left edge. Buckets are a sparse
//! ordered map because most offsets hold nothing.

use crate::core::config::PackingOptions;
use crate::core::record::AlignmentRecord;
use crate::layout::row::{PackedAlignment, PairedAlignment, Row};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Category that keeps alignments in separate rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupBy {
    Strand,
    /// Strand of the first read of the pair
    FirstOfPairStrand,
    Sample,
    ReadGroup,
    Library,
}

impl GroupBy {
    /// Group key for a record; `None` sorts after every keyed group
    pub fn key(&self, record: &AlignmentRecord) -> Option<String> {
        match self {
            GroupBy::Strand => Some(record.strand().to_string()),
            GroupBy::FirstOfPairStrand => {
                if !record.is_paired() {
                    return None;
                }
                let strand = if record.is_first_of_pair() {
                    record.strand()
                } else {
                    record.mate.as_ref()?.strand
                };
                Some(strand.to_string())
            }
            GroupBy::Sample => record.sample.clone(),
            GroupBy::ReadGroup => record.read_group.clone(),
            GroupBy::Library => record.library.clone(),
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "strand" => Some(GroupBy::Strand),
            "first-of-pair-strand" | "first_of_pair_strand" => Some(GroupBy::FirstOfPairStrand),
            "sample" => Some(GroupBy::Sample),
            "read-group" | "read_group" | "readgroup" => Some(GroupBy::ReadGroup),
            "library" => Some(GroupBy::Library),
            _ => None,
        }
    }
}

fn pairs_with_mate(record: &AlignmentRecord) -> bool {
    record.is_paired()
        && record.is_proper_pair()
        && record.is_mapped()
        && record.mate.as_ref().map_or(false, |m| m.mapped && m.chrom == record.chrom)
}

/// Stateless row packer
#[derive(Debug, Clone, Default)]
pub struct RowPacker {
    options: PackingOptions,
}

impl RowPacker {
    pub fn new(options: PackingOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PackingOptions {
        &self.options
    }

    /// Lay out `alignments` (sorted by start) into rows
    ///
    /// `end` is the right edge of the loaded interval. Alignments starting
    /// past it are still placed.
    pub fn pack(&self, alignments: &[Arc<AlignmentRecord>], end: u64) -> Vec<Row> {
        if alignments.is_empty() {
            return Vec::new();
        }
        let units = if self.options.pair_alignments {
            pair_alignments(alignments)
        } else {
            alignments.iter().cloned().map(PackedAlignment::Single).collect()
        };

        let groups = match self.options.group_by {
            Some(group_by) => split_groups(units, group_by),
            None => vec![units],
        };

        let spacing = self.options.min_spacing;
        let packed: Vec<Vec<Row>> = groups
            .into_par_iter()
            .map(|group| pack_group(group, end, spacing))
            .collect();

        let mut rows: Vec<Row> = packed.into_iter().flatten().collect();
        if let Some(max_rows) = self.options.max_rows {
            if rows.len() > max_rows {
                log::debug!("Row cap {} reached, dropping {} rows", max_rows, rows.len() - max_rows);
                rows.truncate(max_rows);
            }
        }
        rows
    }
}

/// Join mates into pairs; the second sighting of a name completes the pair
fn pair_alignments(alignments: &[Arc<AlignmentRecord>]) -> Vec<PackedAlignment> {
    let mut units: Vec<PackedAlignment> = Vec::with_capacity(alignments.len());
    let mut open_pairs: HashMap<&str, usize> = HashMap::new();

    for record in alignments {
        if !pairs_with_mate(record) {
            units.push(PackedAlignment::Single(Arc::clone(record)));
            continue;
        }
        if let Some(idx) = open_pairs.remove(record.read_name.as_str()) {
            if let PackedAlignment::Pair(pair) = &mut units[idx] {
                pair.second = Some(Arc::clone(record));
                continue;
            }
        }
        open_pairs.insert(record.read_name.as_str(), units.len());
        units.push(PackedAlignment::Pair(PairedAlignment::new(Arc::clone(record))));
    }
    units
}

/// Keyed groups in lexicographic key order, unkeyed remainder last
fn split_groups(units: Vec<PackedAlignment>, group_by: GroupBy) -> Vec<Vec<PackedAlignment>> {
    let mut keyed: BTreeMap<String, Vec<PackedAlignment>> = BTreeMap::new();
    let mut unkeyed = Vec::new();
    for unit in units {
        match group_by.key(unit.primary()) {
            Some(key) => keyed.entry(key).or_default().push(unit),
            None => unkeyed.push(unit),
        }
    }
    let mut groups: Vec<Vec<PackedAlignment>> = keyed.into_values().collect();
    if !unkeyed.is_empty() {
        groups.push(unkeyed);
    }
    groups
}

fn pack_group(units: Vec<PackedAlignment>, end: u64, spacing: u64) -> Vec<Row> {
    let Some(global_start) = units.first().map(|u| u.start()) else {
        return Vec::new();
    };

    // Offsets before the first start come from soft-clip skew; clamp to 0
    let mut buckets: BTreeMap<u64, Vec<PackedAlignment>> = BTreeMap::new();
    for unit in units {
        let offset = unit.start().saturating_sub(global_start);
        buckets.entry(offset).or_default().push(unit);
    }
    // Longest at the back, equal lengths in arrival order
    for bucket in buckets.values_mut() {
        bucket.reverse();
        bucket.sort_by_key(|u| u.length());
    }

    let last_offset = buckets
        .keys()
        .next_back()
        .copied()
        .unwrap_or(0)
        .max(end.saturating_sub(global_start));

    let mut rows = Vec::new();
    while !buckets.is_empty() {
        let mut row = Row::new();
        let mut next = 0u64;
        while next <= last_offset {
            let Some(offset) = buckets.range(next..).next().map(|(k, _)| *k) else {
                break;
            };
            let Some(bucket) = buckets.get_mut(&offset) else { break };
            let Some(unit) = bucket.pop() else {
                buckets.remove(&offset);
                continue;
            };
            if bucket.is_empty() {
                buckets.remove(&offset);
            }
            next = (unit.end() + spacing).saturating_sub(global_start).max(1);
            row.push(unit, spacing);
        }
        if !row.is_empty() {
            rows.push(row);
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{flags, MateInfo, Strand};

    fn rec(name: &str, start: u64, end: u64) -> Arc<AlignmentRecord> {
        Arc::new(AlignmentRecord::new(name, "chr1", start, end))
    }

    fn names(row: &Row) -> Vec<String> {
        row.alignments().iter().map(|a| a.primary().read_name.clone()).collect()
    }

    #[test]
    fn test_three_alignment_layout() {
        let packer = RowPacker::default();
        let rows = packer.pack(&[rec("A", 100, 150), rec("B", 120, 160), rec("C", 155, 200)], 200);
        assert_eq!(rows.len(), 2);
        assert_eq!(names(&rows[0]), vec!["A", "C"]);
        assert_eq!(names(&rows[1]), vec!["B"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(RowPacker::default().pack(&[], 1000).is_empty());
    }

    #[test]
    fn test_longest_first_in_bucket() {
        let rows = RowPacker::default().pack(&[rec("short", 100, 120), rec("long", 100, 300)], 300);
        assert_eq!(names(&rows[0]), vec!["long"]);
        assert_eq!(names(&rows[1]), vec!["short"]);
    }

    #[test]
    fn test_equal_lengths_keep_arrival_order() {
        let rows = RowPacker::default().pack(&[rec("x", 100, 200), rec("y", 100, 200)], 200);
        assert_eq!(names(&rows[0]), vec!["x"]);
        assert_eq!(names(&rows[1]), vec!["y"]);
    }

    #[test]
    fn test_skewed_start_is_clamped() {
        let rows = RowPacker::default().pack(&[rec("a", 100, 150), rec("early", 95, 140), rec("b", 160, 170)], 200);
        let total: usize = rows.iter().map(|r| r.len()).sum();
        assert_eq!(total, 3);
        for row in &rows {
            for pair in row.alignments().windows(2) {
                assert!(pair[0].end() + 5 <= pair[1].start());
            }
        }
    }

    #[test]
    fn test_alignments_past_end_are_placed() {
        let rows = RowPacker::default().pack(&[rec("a", 100, 150), rec("b", 500, 550)], 200);
        assert_eq!(rows.len(), 1);
        assert_eq!(names(&rows[0]), vec!["a", "b"]);
    }

    fn mate(name: &str, start: u64, end: u64, mate_start: u64) -> Arc<AlignmentRecord> {
        Arc::new(
            AlignmentRecord::new(name, "chr1", start, end)
                .with_flags(flags::PAIRED | flags::PROPER_PAIR)
                .with_mate(MateInfo { chrom: "chr1".into(), start: mate_start, mapped: true, strand: Strand::Minus }),
        )
    }

    #[test]
    fn test_pairing_joins_mates() {
        let packer = RowPacker::new(PackingOptions::default().paired(true));
        let input = [mate("p", 100, 150, 300), rec("solo", 200, 250), mate("p", 300, 350, 100)];
        let rows = packer.pack(&input, 400);
        assert_eq!(rows.len(), 2);
        match &rows[0].alignments()[0] {
            PackedAlignment::Pair(pair) => {
                assert!(pair.is_complete());
                assert_eq!((pair.start(), pair.end()), (100, 350));
            }
            other => panic!("expected pair, got {:?}", other),
        }
        assert_eq!(names(&rows[1]), vec!["solo"]);
    }

    #[test]
    fn test_grouping_by_strand() {
        let plus = rec("plus", 100, 150);
        let minus = Arc::new(AlignmentRecord::new("minus", "chr1", 200, 250).with_flags(flags::REVERSE));
        let packer = RowPacker::new(PackingOptions::default().group_by(GroupBy::Strand));
        let rows = packer.pack(&[plus, minus], 300);
        // "+" sorts before "-"
        assert_eq!(rows.len(), 2);
        assert_eq!(names(&rows[0]), vec!["plus"]);
        assert_eq!(names(&rows[1]), vec!["minus"]);
    }

    #[test]
    fn test_unkeyed_group_last() {
        let tagged = Arc::new(AlignmentRecord::new("tagged", "chr1", 200, 250).with_sample("s1"));
        let packer = RowPacker::new(PackingOptions::default().group_by(GroupBy::Sample));
        let rows = packer.pack(&[rec("plain", 100, 150), tagged], 300);
        assert_eq!(names(&rows[0]), vec!["tagged"]);
        assert_eq!(names(&rows[1]), vec!["plain"]);
    }

    #[test]
    fn test_row_cap() {
        let input: Vec<_> = (0..10).map(|i| rec(&format!("r{}", i), 100, 200)).collect();
        let capped = RowPacker::new(PackingOptions::default().max_rows(3)).pack(&input, 200);
        assert_eq!(capped.len(), 3);
        let uncapped = RowPacker::default().pack(&input, 200);
        assert_eq!(uncapped.len(), 10);
    }

    #[test]
    fn test_group_by_from_str() {
        assert_eq!(GroupBy::from_str("STRAND"), Some(GroupBy::Strand));
        assert_eq!(GroupBy::from_str("read-group"), Some(GroupBy::ReadGroup));
        assert_eq!(GroupBy::from_str("nope"), None);
    }
}
