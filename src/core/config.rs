//! Cache and layout configuration

use crate::core::error::ConfigError;
use crate::core::filter::ReadFilter;
use crate::layout::GroupBy;

/// Default tile span in base pairs
pub const DEFAULT_TILE_SIZE: u64 = 16_000;

/// Tile span used for mitochondrial sequences
pub const MITOCHONDRIA_TILE_SIZE: u64 = 1_000;

/// Minimum gap kept between two alignments in one row
pub const MIN_ALIGNMENT_SPACING: u64 = 5;

/// Names treated as mitochondrial
pub const MITOCHONDRIA_NAMES: [&str; 4] = ["M", "chrM", "MT", "chrMT"];

pub fn is_mitochondrial(chrom: &str) -> bool {
    MITOCHONDRIA_NAMES.contains(&chrom)
}

/// Settings for [`TileCache`](crate::core::TileCache)
#[derive(Debug)]
pub struct CacheConfig {
    pub tile_size: u64,
    /// Maximum visible range in kilobases; tiles never exceed it
    pub visibility_window_kb: f64,
    pub mito_tile_size: u64,
    pub max_tiles: usize,
    pub max_read_depth: usize,
    /// Buckets up to `max_read_depth * sampling_slack` are kept whole
    pub sampling_slack: f64,
    pub filter: ReadFilter,
    pub compute_pe_stats: bool,
    pub min_insert_percentile: f64,
    pub max_insert_percentile: f64,
    /// Loads abort when the available memory fraction stays below this
    pub min_available_memory: f64,
    /// Records between cancellation / memory checks
    pub check_interval: usize,
    /// Seed for downsampling; `None` draws from entropy
    pub seed: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            visibility_window_kb: 30.0,
            mito_tile_size: MITOCHONDRIA_TILE_SIZE,
            max_tiles: 2,
            max_read_depth: 100,
            sampling_slack: 1.0,
            filter: ReadFilter::default(),
            compute_pe_stats: true,
            min_insert_percentile: 0.5,
            max_insert_percentile: 99.5,
            min_available_memory: 0.2,
            check_interval: 1000,
            seed: None,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tile_size(mut self, bp: u64) -> Self {
        self.tile_size = bp;
        self
    }

    pub fn visibility_window_kb(mut self, kb: f64) -> Self {
        self.visibility_window_kb = kb;
        self
    }

    pub fn max_tiles(mut self, n: usize) -> Self {
        self.max_tiles = n;
        self
    }

    pub fn max_read_depth(mut self, depth: usize) -> Self {
        self.max_read_depth = depth;
        self
    }

    pub fn sampling_slack(mut self, slack: f64) -> Self {
        self.sampling_slack = slack;
        self
    }

    pub fn filter(mut self, filter: ReadFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn compute_pe_stats(mut self, enabled: bool) -> Self {
        self.compute_pe_stats = enabled;
        self
    }

    pub fn min_available_memory(mut self, fraction: f64) -> Self {
        self.min_available_memory = fraction;
        self
    }

    pub fn check_interval(mut self, records: usize) -> Self {
        self.check_interval = records;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Tile span for a chromosome
    ///
    /// Mitochondrial sequences use their own span; everything else uses the
    /// default span clamped to the visibility window.
    pub fn tile_size_for(&self, chrom: &str) -> u64 {
        if is_mitochondrial(chrom) {
            return self.mito_tile_size.max(1);
        }
        let window_bp = (self.visibility_window_kb * 1000.0) as u64;
        let size = if window_bp > 0 { self.tile_size.min(window_bp) } else { self.tile_size };
        size.max(1)
    }

    /// Buckets up to this size skip downsampling
    pub fn keep_all_below(&self, max_depth: usize) -> usize {
        ((max_depth as f64) * self.sampling_slack.max(1.0)) as usize
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_size == 0 {
            return Err(ConfigError::NotPositive { name: "tile_size" });
        }
        if self.mito_tile_size == 0 {
            return Err(ConfigError::NotPositive { name: "mito_tile_size" });
        }
        if self.max_tiles == 0 {
            return Err(ConfigError::NotPositive { name: "max_tiles" });
        }
        if self.max_read_depth == 0 {
            return Err(ConfigError::NotPositive { name: "max_read_depth" });
        }
        if self.check_interval == 0 {
            return Err(ConfigError::NotPositive { name: "check_interval" });
        }
        check_range("min_available_memory", self.min_available_memory, 0.0, 1.0)?;
        check_range("min_insert_percentile", self.min_insert_percentile, 0.0, 100.0)?;
        check_range("max_insert_percentile", self.max_insert_percentile, 0.0, 100.0)?;
        Ok(())
    }
}

fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value < min || value > max || value.is_nan() {
        return Err(ConfigError::OutOfRange { name, value, min, max });
    }
    Ok(())
}

/// Settings for [`RowPacker`](crate::layout::RowPacker)
#[derive(Debug, Clone, PartialEq)]
pub struct PackingOptions {
    pub pair_alignments: bool,
    pub group_by: Option<GroupBy>,
    /// Row cap; `None` packs every alignment
    pub max_rows: Option<usize>,
    pub min_spacing: u64,
}

impl Default for PackingOptions {
    fn default() -> Self {
        Self {
            pair_alignments: false,
            group_by: None,
            max_rows: None,
            min_spacing: MIN_ALIGNMENT_SPACING,
        }
    }
}

impl PackingOptions {
    pub fn paired(mut self, enabled: bool) -> Self {
        self.pair_alignments = enabled;
        self
    }

    pub fn group_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = Some(group_by);
        self
    }

    pub fn max_rows(mut self, rows: usize) -> Self {
        self.max_rows = Some(rows);
        self
    }
}
