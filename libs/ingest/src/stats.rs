use std::sync::atomic::{AtomicU64, Ordering};

/// Общие для всех claim'ов счётчики ingestor'а.
#[derive(Debug, Default)]
pub struct IngestStats {
    batches: AtomicU64,
    records: AtomicU64,
    decode_errors: AtomicU64,
    store_errors: AtomicU64,
    conflicts: AtomicU64,
    cache_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStatsSnapshot {
    pub batches: u64,
    pub records: u64,
    pub decode_errors: u64,
    pub store_errors: u64,
    pub conflicts: u64,
    pub cache_errors: u64,
}

impl IngestStats {
    pub(crate) fn batch(&self, records: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.records.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn conflicts(&self, n: usize) {
        self.conflicts.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn cache_errors(&self, n: usize) {
        self.cache_errors.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
        }
    }
}
