//! Tiled alignment cache
//!
//! Alignment records, per-tile downsampling and coverage, the LRU tile
//! cache with its query coordinator, and background loading.

pub mod cache;
pub mod cancel;
pub mod config;
pub mod counts;
pub mod error;
pub mod filter;
pub mod io;
pub mod locus;
pub mod query;
pub mod record;
pub mod stats;
pub mod tile;
pub mod worker;

pub use cache::{LoadStatus, TileCache, TileFetch};
pub use cancel::{CancellationToken, LoadRegistry, MemoryProbe, SystemMemoryProbe, UnlimitedMemory};
pub use config::{
    is_mitochondrial, CacheConfig, PackingOptions, DEFAULT_TILE_SIZE, MIN_ALIGNMENT_SPACING,
    MITOCHONDRIA_TILE_SIZE,
};
pub use counts::AlignmentCounts;
pub use error::{
    ConfigError, ErrorDebouncer, FastPileupError, LocusError, Result, SourceError, SourceResult,
    DEFAULT_DEBOUNCE_WINDOW,
};
pub use filter::{ReadFilter, ReadGroupFilter};
pub use io::{open_text, ByteLineIterator, CompressionFormat, DEFAULT_BUFFER_SIZE, MMAP_THRESHOLD};
pub use locus::Locus;
pub use query::{CachingReader, ClippedAlignments, QueryResult, DEPTH_PADDING};
pub use record::{flags, AlignmentRecord, CigarOp, MateInfo, Strand};
pub use stats::{PairOrientation, PeStats, PeStatsTable};
pub use tile::{sample_bucket, Bucket, DownsampledInterval, SampledBucket, Tile};
pub use worker::{BackgroundLoader, LoadHandle};
