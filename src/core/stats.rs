//! Paired-end insert size statistics
//!
//! Running per-library statistics collected during a tile load. Insert sizes
//! are accumulated while the scan runs; [`PeStatsTable::finalize`] computes
//! the percentile thresholds once the pass completes.

use crate::core::record::{AlignmentRecord, Strand};
use std::collections::HashMap;

/// Library key used when a record carries no library
pub const DEFAULT_LIBRARY: &str = "null";

/// Relative orientation of the two reads of a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairOrientation {
    /// Forward read upstream of reverse read (standard Illumina)
    FR,
    /// Reverse read upstream of forward read
    RF,
    /// Both reads on the same strand
    Tandem,
}

impl PairOrientation {
    /// Infer the orientation from a record and its mate
    pub fn of(record: &AlignmentRecord) -> Option<Self> {
        let mate = record.mate.as_ref()?;
        let strand = record.strand();
        if strand == mate.strand {
            return Some(PairOrientation::Tandem);
        }
        let upstream_is_self = record.start <= mate.start;
        let upstream_strand = if upstream_is_self { strand } else { mate.strand };
        Some(match upstream_strand {
            Strand::Plus => PairOrientation::FR,
            Strand::Minus => PairOrientation::RF,
        })
    }
}

/// Insert size statistics for one library
#[derive(Debug, Clone, Default)]
pub struct PeStats {
    insert_sizes: Vec<u64>,
    fr_count: u64,
    rf_count: u64,
    tandem_count: u64,
    min_threshold: Option<u64>,
    max_threshold: Option<u64>,
}

impl PeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, record: &AlignmentRecord) {
        let insert_size = record.insert_size.unsigned_abs();
        if insert_size > 0 {
            self.insert_sizes.push(insert_size);
        }
        match PairOrientation::of(record) {
            Some(PairOrientation::FR) => self.fr_count += 1,
            Some(PairOrientation::RF) => self.rf_count += 1,
            Some(PairOrientation::Tandem) => self.tandem_count += 1,
            None => {}
        }
    }

    /// Compute the percentile thresholds from the collected insert sizes
    pub fn compute(&mut self, min_percentile: f64, max_percentile: f64) {
        if self.insert_sizes.is_empty() {
            return;
        }
        self.insert_sizes.sort_unstable();
        self.min_threshold = Some(percentile(&self.insert_sizes, min_percentile));
        self.max_threshold = Some(percentile(&self.insert_sizes, max_percentile));
    }

    pub fn sample_count(&self) -> usize {
        self.insert_sizes.len()
    }

    pub fn min_threshold(&self) -> Option<u64> {
        self.min_threshold
    }

    pub fn max_threshold(&self) -> Option<u64> {
        self.max_threshold
    }

    /// Most common orientation, `None` before any pair was seen
    pub fn dominant_orientation(&self) -> Option<PairOrientation> {
        let counts = [
            (PairOrientation::FR, self.fr_count),
            (PairOrientation::RF, self.rf_count),
            (PairOrientation::Tandem, self.tandem_count),
        ];
        counts
            .iter()
            .filter(|(_, n)| *n > 0)
            .max_by_key(|(_, n)| *n)
            .map(|(o, _)| *o)
    }

    pub fn orientation_counts(&self) -> (u64, u64, u64) {
        (self.fr_count, self.rf_count, self.tandem_count)
    }
}

/// Nearest-rank percentile over sorted values
fn percentile(sorted: &[u64], pct: f64) -> u64 {
    let pct = pct.clamp(0.0, 100.0);
    let rank = (pct * sorted.len() as f64 / 100.0).ceil() as usize;
    let idx = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[idx]
}

/// Statistics keyed by library
#[derive(Debug, Clone)]
pub struct PeStatsTable {
    libraries: HashMap<String, PeStats>,
    min_percentile: f64,
    max_percentile: f64,
}

impl PeStatsTable {
    pub fn new(min_percentile: f64, max_percentile: f64) -> Self {
        Self {
            libraries: HashMap::new(),
            min_percentile,
            max_percentile,
        }
    }

    /// Record one properly paired, mapped record
    pub fn update(&mut self, record: &AlignmentRecord) {
        let library = record.library.as_deref().unwrap_or(DEFAULT_LIBRARY);
        self.libraries.entry(library.to_string()).or_default().update(record);
    }

    pub fn finalize(&mut self) {
        for stats in self.libraries.values_mut() {
            stats.compute(self.min_percentile, self.max_percentile);
        }
    }

    pub fn get(&self, library: &str) -> Option<&PeStats> {
        self.libraries.get(library)
    }

    pub fn libraries(&self) -> impl Iterator<Item = (&str, &PeStats)> {
        self.libraries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

impl Default for PeStatsTable {
    fn default() -> Self {
        Self::new(0.5, 99.5)
    }
}
