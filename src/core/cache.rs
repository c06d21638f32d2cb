//! Tiled alignment cache
//!
//! Converts arbitrary range queries into a small number of sequential scans
//! of the underlying [`AlignmentSource`]. Each scan fills a contiguous run of
//! missing tiles in one pass; finished tiles are kept in a small LRU keyed by
//! tile index. The cache holds tiles of a single chromosome at a time.
//!
//! The cache has no internal locking. Callers serialize loads.

use crate::core::cancel::{CancellationToken, MemoryProbe, UnlimitedMemory};
use crate::core::config::CacheConfig;
use crate::core::error::Result;
use crate::core::record::AlignmentRecord;
use crate::core::stats::PeStatsTable;
use crate::core::tile::Tile;
use crate::formats::AlignmentSource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

/// How a load pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Complete,
    /// The cancellation token was set
    Cancelled,
    /// Available memory stayed below the floor after releasing caches
    LowMemory,
}

impl LoadStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, LoadStatus::Complete)
    }
}

/// Tiles produced by [`TileCache::get_tiles`] or [`TileCache::load_tiles`]
#[derive(Debug, Clone)]
pub struct TileFetch {
    pub status: LoadStatus,
    /// Tiles in index order; empty unless `status` is complete
    pub tiles: Vec<Arc<Tile>>,
}

impl TileFetch {
    fn aborted(status: LoadStatus) -> Self {
        Self { status, tiles: Vec::new() }
    }
}

/// Least-recently-used map from tile index to tile
///
/// Recency is a monotonically increasing stamp; `order` maps stamps back to
/// indexes, so touch and evict are logarithmic in `capacity`.
#[derive(Debug)]
struct TileLru {
    capacity: usize,
    tiles: HashMap<u64, (Arc<Tile>, u64)>,
    order: BTreeMap<u64, u64>,
    clock: u64,
}

impl TileLru {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tiles: HashMap::new(),
            order: BTreeMap::new(),
            clock: 0,
        }
    }

    fn next_stamp(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn get(&mut self, index: u64) -> Option<Arc<Tile>> {
        let stamp = self.next_stamp();
        let (tile, last_used) = self.tiles.get_mut(&index)?;
        self.order.remove(&*last_used);
        *last_used = stamp;
        self.order.insert(stamp, index);
        Some(Arc::clone(tile))
    }

    fn insert(&mut self, index: u64, tile: Arc<Tile>) {
        let stamp = self.next_stamp();
        if let Some((_, previous)) = self.tiles.insert(index, (tile, stamp)) {
            self.order.remove(&previous);
        }
        self.order.insert(stamp, index);
        while self.tiles.len() > self.capacity {
            let Some((_, evicted)) = self.order.pop_first() else { break };
            self.tiles.remove(&evicted);
            log::debug!("Evicted tile {}", evicted);
        }
    }

    fn contains(&self, index: u64) -> bool {
        self.tiles.contains_key(&index)
    }

    fn clear(&mut self) {
        self.tiles.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.tiles.len()
    }
}

/// Copies an unmapped mate's bases onto its mapped partner
#[derive(Debug, Default)]
struct MateSequences {
    awaiting_mate: HashMap<String, Arc<AlignmentRecord>>,
    unmapped_bases: HashMap<String, Vec<u8>>,
}

impl MateSequences {
    fn track(&mut self, record: &Arc<AlignmentRecord>) {
        if !record.is_paired() || record.mate.is_none() {
            return;
        }
        let name = &record.read_name;
        if record.is_mapped() && !record.is_mate_mapped() {
            match self.unmapped_bases.remove(name) {
                Some(bases) => {
                    record.set_mate_sequence(bases);
                }
                None => {
                    self.awaiting_mate.insert(name.clone(), Arc::clone(record));
                }
            }
        } else if !record.is_mapped() && record.is_mate_mapped() && !record.sequence.is_empty() {
            match self.awaiting_mate.remove(name) {
                Some(mapped) => {
                    mapped.set_mate_sequence(record.sequence.clone());
                }
                None => {
                    self.unmapped_bases.insert(name.clone(), record.sequence.clone());
                }
            }
        }
    }

    /// Match whatever is still waiting; returns the number of mates filled in
    fn reconcile(&mut self) -> usize {
        let mut filled = 0;
        for (name, mapped) in self.awaiting_mate.drain() {
            if let Some(bases) = self.unmapped_bases.remove(&name) {
                if mapped.set_mate_sequence(bases) {
                    filled += 1;
                }
            }
        }
        filled
    }
}

fn memory_too_low(memory: &dyn MemoryProbe, floor: f64) -> bool {
    if memory.available_fraction() >= floor {
        return false;
    }
    memory.release_caches();
    memory.available_fraction() < floor
}

/// LRU tile cache over one alignment source
pub struct TileCache<S: AlignmentSource> {
    source: S,
    config: CacheConfig,
    chrom: Option<String>,
    tiles: TileLru,
    rng: StdRng,
    memory: Arc<dyn MemoryProbe>,
}

impl<S: AlignmentSource> TileCache<S> {
    pub fn new(source: S, config: CacheConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            source,
            tiles: TileLru::new(config.max_tiles),
            config,
            chrom: None,
            rng,
            memory: Arc::new(UnlimitedMemory),
        }
    }

    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.memory = probe;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Chromosome whose tiles are currently resident
    pub fn current_chrom(&self) -> Option<&str> {
        self.chrom.as_deref()
    }

    pub fn tile_size_for(&self, chrom: &str) -> u64 {
        self.config.tile_size_for(chrom)
    }

    pub fn cached_tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn contains_tile(&self, index: u64) -> bool {
        self.tiles.contains(index)
    }

    pub fn clear(&mut self) {
        self.tiles.clear();
        self.chrom = None;
    }

    fn new_tile(&mut self, chrom: &str, index: u64, tile_size: u64, max_depth: usize) -> Tile {
        let rng = StdRng::seed_from_u64(self.rng.gen());
        let keep_all_below = self.config.keep_all_below(max_depth);
        Tile::new(chrom, index, tile_size, max_depth, keep_all_below, rng)
    }

    /// Tiles `start_index..=end_index` of `chrom`, loading missing runs
    ///
    /// Every contiguous run of missing tiles is filled by exactly one scan.
    /// Switching chromosome drops all resident tiles first.
    pub fn get_tiles(
        &mut self,
        chrom: &str,
        start_index: u64,
        end_index: u64,
        max_depth: usize,
        mut pe_stats: Option<&mut PeStatsTable>,
        token: &CancellationToken,
    ) -> Result<TileFetch> {
        if self.chrom.as_deref() != Some(chrom) {
            if let Some(previous) = &self.chrom {
                log::debug!("Switching from {} to {}, clearing tile cache", previous, chrom);
            }
            self.tiles.clear();
            self.chrom = Some(chrom.to_string());
        }

        let tile_size = self.config.tile_size_for(chrom);
        let mut tiles = Vec::with_capacity((end_index.saturating_sub(start_index) + 1) as usize);
        let mut to_load: Vec<Tile> = Vec::new();

        for index in start_index..=end_index {
            match self.tiles.get(index) {
                Some(tile) if tile.is_loaded() => {
                    if !to_load.is_empty() {
                        let batch = std::mem::take(&mut to_load);
                        let fetch = self.load_tiles(chrom, batch, pe_stats.as_deref_mut(), token)?;
                        if !fetch.status.is_complete() {
                            return Ok(fetch);
                        }
                        tiles.extend(fetch.tiles);
                    }
                    tiles.push(tile);
                }
                _ => {
                    let tile = self.new_tile(chrom, index, tile_size, max_depth);
                    to_load.push(tile);
                }
            }
        }

        if !to_load.is_empty() {
            let fetch = self.load_tiles(chrom, to_load, pe_stats, token)?;
            if !fetch.status.is_complete() {
                return Ok(fetch);
            }
            tiles.extend(fetch.tiles);
        }

        Ok(TileFetch { status: LoadStatus::Complete, tiles })
    }

    /// Fill a contiguous run of tiles with one sequential scan
    ///
    /// On success the tiles are frozen and inserted into the cache. A
    /// cancelled or memory-starved load returns its status and leaves the
    /// cache untouched. Source failures propagate as
    /// [`FastPileupError::DataLoad`](crate::core::FastPileupError::DataLoad).
    pub fn load_tiles(
        &mut self,
        chrom: &str,
        mut tiles: Vec<Tile>,
        mut pe_stats: Option<&mut PeStatsTable>,
        token: &CancellationToken,
    ) -> Result<TileFetch> {
        let (Some(first), Some(last)) = (tiles.first(), tiles.last()) else {
            return Ok(TileFetch { status: LoadStatus::Complete, tiles: Vec::new() });
        };
        let (scan_start, scan_end) = (first.start(), last.end());
        let (first_index, last_index) = (first.index(), last.index());
        let tile_size = first.end() - first.start();
        let timer = Instant::now();

        let config = &self.config;
        let memory = Arc::clone(&self.memory);
        if !config.compute_pe_stats {
            pe_stats = None;
        }
        let mut mates = MateSequences::default();
        let mut scanned = 0usize;
        let mut kept = 0usize;
        let check_interval = config.check_interval.max(1);

        log::debug!("Loading {}:{}-{} ({} tiles)", chrom, scan_start, scan_end, tiles.len());
        let records = self.source.query(chrom, scan_start, scan_end)?;

        for result in records {
            let record = Arc::new(result?);
            scanned += 1;

            // Runs ahead of filtering, so a filtered read's bases can still
            // reach its mapped mate.
            mates.track(&record);

            if !config.filter.rejects(&record) {
                let lo = (record.start / tile_size).max(first_index);
                let hi = (record.end / tile_size).min(last_index);
                if lo <= hi {
                    for index in lo..=hi {
                        tiles[(index - first_index) as usize].add_record(Arc::clone(&record));
                    }
                    kept += 1;
                }
                if record.is_paired() && record.is_proper_pair() {
                    if let Some(stats) = pe_stats.as_deref_mut() {
                        stats.update(&record);
                    }
                }
            }

            if scanned % check_interval == 0 {
                if token.is_cancelled() {
                    log::warn!("Load of {}:{}-{} cancelled after {} records", chrom, scan_start, scan_end, scanned);
                    return Ok(TileFetch::aborted(LoadStatus::Cancelled));
                }
                if memory_too_low(memory.as_ref(), config.min_available_memory) {
                    log::warn!(
                        "Memory is low, aborting load of {}:{}-{} after {} records",
                        chrom, scan_start, scan_end, scanned
                    );
                    return Ok(TileFetch::aborted(LoadStatus::LowMemory));
                }
            }
        }

        if let Some(stats) = pe_stats {
            stats.finalize();
        }
        let filled = mates.reconcile();
        if filled > 0 {
            log::debug!("Filled {} mate sequences after scan", filled);
        }

        let mut loaded = Vec::with_capacity(tiles.len());
        for mut tile in tiles {
            tile.finish_loading();
            let tile = Arc::new(tile);
            self.tiles.insert(tile.index(), Arc::clone(&tile));
            loaded.push(tile);
        }

        log::info!(
            "Loaded {}:{}-{}: {} records scanned, {} kept in {:.2}s",
            chrom, scan_start, scan_end, scanned, kept, timer.elapsed().as_secs_f64()
        );
        Ok(TileFetch { status: LoadStatus::Complete, tiles: loaded })
    }
}
