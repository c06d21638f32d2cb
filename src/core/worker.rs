//! Background tile loading
//!
//! Each load request runs on its own named worker thread. At most one load
//! per loader is in flight; a request made while another is running is
//! refused rather than queued.

use crate::core::cancel::{CancellationToken, LoadRegistry};
use crate::core::error::{ErrorDebouncer, FastPileupError, Result};
use crate::core::query::{CachingReader, QueryResult};
use crate::core::stats::PeStatsTable;
use crate::formats::AlignmentSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Clears the loading flag when the worker finishes, even on panic
struct LoadingGuard(Arc<AtomicBool>);

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to one in-flight load
pub struct LoadHandle {
    token: CancellationToken,
    handle: JoinHandle<Result<QueryResult>>,
}

impl LoadHandle {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and take its result
    pub fn join(self) -> Result<QueryResult> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(FastPileupError::DataLoad {
                message: "load worker panicked".to_string(),
            }),
        }
    }
}

/// Runs [`CachingReader::query`] off the calling thread
pub struct BackgroundLoader<S: AlignmentSource + Send + 'static> {
    reader: Arc<Mutex<CachingReader<S>>>,
    pe_stats: Arc<Mutex<PeStatsTable>>,
    is_loading: Arc<AtomicBool>,
    registry: &'static LoadRegistry,
    debouncer: Arc<Mutex<ErrorDebouncer>>,
}

impl<S: AlignmentSource + Send + 'static> BackgroundLoader<S> {
    pub fn new(reader: CachingReader<S>) -> Self {
        let config = reader.cache().config();
        let pe_stats = PeStatsTable::new(config.min_insert_percentile, config.max_insert_percentile);
        Self {
            reader: Arc::new(Mutex::new(reader)),
            pe_stats: Arc::new(Mutex::new(pe_stats)),
            is_loading: Arc::new(AtomicBool::new(false)),
            registry: LoadRegistry::global(),
            debouncer: Arc::new(Mutex::new(ErrorDebouncer::default())),
        }
    }

    /// Register tokens with `registry` instead of the process-wide one
    pub fn with_registry(mut self, registry: &'static LoadRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_debouncer(mut self, debouncer: ErrorDebouncer) -> Self {
        self.debouncer = Arc::new(Mutex::new(debouncer));
        self
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading.load(Ordering::SeqCst)
    }

    /// Shared reader, for synchronous access between loads
    pub fn reader(&self) -> Arc<Mutex<CachingReader<S>>> {
        Arc::clone(&self.reader)
    }

    /// Snapshot of the paired-end statistics gathered so far
    pub fn pe_stats(&self) -> PeStatsTable {
        lock(&self.pe_stats).clone()
    }

    /// Start loading `[start, end]` on `chrom`
    ///
    /// Returns `Ok(None)` when another load from this loader is still running.
    pub fn request(&self, chrom: &str, start: u64, end: u64, max_read_depth: usize) -> Result<Option<LoadHandle>> {
        if self
            .is_loading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("Load of {}:{}-{} refused, another load is running", chrom, start, end);
            return Ok(None);
        }
        let guard = LoadingGuard(Arc::clone(&self.is_loading));

        let token = CancellationToken::new();
        self.registry.register(&token);

        let reader = Arc::clone(&self.reader);
        let pe_stats = Arc::clone(&self.pe_stats);
        let debouncer = Arc::clone(&self.debouncer);
        let worker_token = token.clone();
        let chrom_owned = chrom.to_string();

        let spawned = std::thread::Builder::new()
            .name(format!("tile-load-{}", chrom))
            .spawn(move || {
                let _guard = guard;
                let mut reader = lock(&reader);
                let stats_enabled = reader.cache().config().compute_pe_stats;
                let mut stats = lock(&pe_stats);
                let result = reader.query(
                    &chrom_owned,
                    start,
                    end,
                    max_read_depth,
                    stats_enabled.then_some(&mut *stats),
                    &worker_token,
                );
                if let Err(e) = &result {
                    let message = e.to_string();
                    if lock(&debouncer).should_report(&message, Instant::now()) {
                        log::error!("{}", message);
                    }
                }
                result
            });

        match spawned {
            Ok(handle) => Ok(Some(LoadHandle { token, handle })),
            // The closure and its guard were dropped, so the flag is already clear
            Err(e) => Err(FastPileupError::Io(e)),
        }
    }
}
