//! Cache statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for directory lookups and table registrations
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Lookups answered from the directory
    hits: AtomicU64,
    /// Lookups for names that were never cached
    misses: AtomicU64,
    /// Tables bound in the store and the directory
    registrations: AtomicU64,
    /// Publishes rejected by the store
    failed_registrations: AtomicU64,
    /// Tables currently cached
    entry_count: AtomicU64,
    /// Approximate memory usage in bytes
    memory_bytes: AtomicU64,
}

impl CacheStats {
    /// Create new cache statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a directory hit
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a directory miss
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a table published to the store and the directory
    pub fn record_registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a publish the store rejected
    pub fn record_failed_registration(&self) {
        self.failed_registrations.fetch_add(1, Ordering::Relaxed);
    }

    /// Update entry count
    pub fn set_entry_count(&self, count: u64) {
        self.entry_count.store(count, Ordering::Relaxed);
    }

    /// Update memory usage
    pub fn set_memory_bytes(&self, bytes: u64) {
        self.memory_bytes.store(bytes, Ordering::Relaxed);
    }

    /// Get hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get successful registration count
    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }

    /// Get failed registration count
    pub fn failed_registrations(&self) -> u64 {
        self.failed_registrations.load(Ordering::Relaxed)
    }

    /// Get current entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count.load(Ordering::Relaxed)
    }

    /// Get memory usage in bytes
    pub fn memory_bytes(&self) -> u64 {
        self.memory_bytes.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Get total lookups (hits + misses)
    pub fn total_requests(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Reset the event counters. Gauges keep their values.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.registrations.store(0, Ordering::Relaxed);
        self.failed_registrations.store(0, Ordering::Relaxed);
    }
}

impl Clone for CacheStats {
    fn clone(&self) -> Self {
        Self {
            hits: AtomicU64::new(self.hits()),
            misses: AtomicU64::new(self.misses()),
            registrations: AtomicU64::new(self.registrations()),
            failed_registrations: AtomicU64::new(self.failed_registrations()),
            entry_count: AtomicU64::new(self.entry_count()),
            memory_bytes: AtomicU64::new(self.memory_bytes()),
        }
    }
}
