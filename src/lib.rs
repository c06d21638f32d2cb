//! FastPileup - tiled alignment cache and row packing for pileup display
//!
//! Loads alignments from a range-queryable source into fixed-size tiles,
//! bounding depth with pair-aware downsampling, and lays the result out
//! into non-overlapping display rows.
//!
//! # Features
//!
//! - LRU tile cache with one sequential scan per contiguous run of tiles
//! - Reproducible downsampling with a seedable RNG
//! - Cooperative cancellation and a memory-pressure floor
//! - Greedy row packing with optional pairing and grouping
//!
//! # Example
//!
//! ```ignore
//! use fast_pileup::core::{CacheConfig, CachingReader, CancellationToken};
//! use fast_pileup::formats::SamSource;
//! use fast_pileup::layout::RowPacker;
//!
//! let source = SamSource::open("reads.sam")?;
//! let mut reader = CachingReader::new(source, CacheConfig::default());
//! let result = reader.query("chr1", 10_000, 12_000, 100, None, &CancellationToken::new())?;
//! let alignments: Vec<_> = result.alignments.collect();
//! let rows = RowPacker::default().pack(&alignments, 12_000);
//! ```

pub mod core;
pub mod formats;
pub mod layout;

pub use crate::core::{
    AlignmentRecord, CacheConfig, CachingReader, CancellationToken, FastPileupError, LoadStatus,
    Locus, PackingOptions, Result,
};
pub use crate::layout::{GroupBy, Row, RowPacker};
