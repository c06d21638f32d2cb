//! Cooperative cancellation and memory-pressure probing
//!
//! A [`CancellationToken`] is threaded through every load call and polled at
//! a fixed record interval. The [`LoadRegistry`] only keeps weak references
//! to active tokens, so a finished load drops out without unregistering.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

/// Shared cancel flag for one load request
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Broadcast target for cancelling every active load
#[derive(Debug, Default)]
pub struct LoadRegistry {
    active: Mutex<Vec<Weak<AtomicBool>>>,
}

impl LoadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry
    pub fn global() -> &'static LoadRegistry {
        static GLOBAL: OnceLock<LoadRegistry> = OnceLock::new();
        GLOBAL.get_or_init(LoadRegistry::new)
    }

    pub fn register(&self, token: &CancellationToken) {
        let mut active = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        active.retain(|w| w.strong_count() > 0);
        active.push(Arc::downgrade(&token.flag));
    }

    /// Flip the cancel flag of every live token; returns how many were reached
    pub fn cancel_all(&self) -> usize {
        let mut active = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut reached = 0;
        active.retain(|w| match w.upgrade() {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                reached += 1;
                true
            }
            None => false,
        });
        if reached > 0 {
            log::warn!("Cancelled {} active alignment load(s)", reached);
        }
        reached
    }

    pub fn active_count(&self) -> usize {
        let active = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        active.iter().filter(|w| w.strong_count() > 0).count()
    }
}

/// Reports how much memory is left for cached alignments
pub trait MemoryProbe: Send + Sync {
    /// Fraction of memory still available, in `[0, 1]`
    fn available_fraction(&self) -> f64;

    /// Drop unrelated caches and give the allocator a chance to return memory
    fn release_caches(&self) {}
}

/// Probe that never reports pressure
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlimitedMemory;

impl MemoryProbe for UnlimitedMemory {
    fn available_fraction(&self) -> f64 {
        1.0
    }
}

/// Host memory probe
///
/// Reads `MemAvailable` / `MemTotal` from `/proc/meminfo` where it exists and
/// falls back to sysinfo elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMemoryProbe;

impl SystemMemoryProbe {
    pub fn new() -> Self {
        Self
    }

    fn parse_meminfo(text: &str) -> Option<f64> {
        let mut total = None;
        let mut available = None;
        for line in text.lines() {
            let mut parts = line.split_whitespace();
            match parts.next() {
                Some("MemTotal:") => total = parts.next().and_then(|v| v.parse::<u64>().ok()),
                Some("MemAvailable:") => available = parts.next().and_then(|v| v.parse::<u64>().ok()),
                _ => {}
            }
        }
        fraction(available?, total?)
    }

    fn sysinfo_fraction() -> Option<f64> {
        use sysinfo::{MemoryRefreshKind, RefreshKind, System};

        static SYSTEM: OnceLock<Mutex<System>> = OnceLock::new();
        let system = SYSTEM.get_or_init(|| {
            Mutex::new(System::new_with_specifics(
                RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram()),
            ))
        });
        let mut system = system.lock().ok()?;
        system.refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());
        fraction(system.available_memory(), system.total_memory())
    }
}

fn fraction(available: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| (available as f64 / total as f64).clamp(0.0, 1.0))
}

impl MemoryProbe for SystemMemoryProbe {
    fn available_fraction(&self) -> f64 {
        let from_proc = std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|text| Self::parse_meminfo(&text));
        match from_proc.or_else(Self::sysinfo_fraction) {
            Some(fraction) => fraction,
            None => {
                log::debug!("Available memory is unknown, skipping the memory floor");
                1.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_clone_shares_flag() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_registry_cancels_live_tokens_only() {
        let registry = LoadRegistry::new();
        let live = CancellationToken::new();
        registry.register(&live);
        {
            let finished = CancellationToken::new();
            registry.register(&finished);
        }
        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.cancel_all(), 1);
        assert!(live.is_cancelled());
    }

    #[test]
    fn test_parse_meminfo() {
        let text = "MemTotal:       16000000 kB\nMemFree:  100 kB\nMemAvailable:    4000000 kB\n";
        assert_eq!(SystemMemoryProbe::parse_meminfo(text), Some(0.25));
        assert_eq!(SystemMemoryProbe::parse_meminfo("garbage"), None);
    }

    #[test]
    fn test_system_probe_reports_fraction() {
        let available = SystemMemoryProbe::new().available_fraction();
        assert!(available > 0.0 && available <= 1.0);
        if let Some(fallback) = SystemMemoryProbe::sysinfo_fraction() {
            assert!((0.0..=1.0).contains(&fallback));
        }
    }

    #[test]
    fn test_unlimited_memory() {
        assert_eq!(UnlimitedMemory.available_fraction(), 1.0);
    }
}
