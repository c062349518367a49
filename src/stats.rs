use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct Stats {
    start_ms: AtomicU64,
    last_log_ms: AtomicU64,

    pages_served: AtomicU64,
    entities_emitted: AtomicU64,

    source_queries: AtomicU64,
    sources_skipped: AtomicU64,
    source_failures: AtomicU64,
}

impl Stats {
    pub fn new(now_ms: u64) -> Arc<Self> {
        let s = Arc::new(Self::default());
        s.start_ms.store(now_ms, Ordering::Relaxed);
        s.last_log_ms.store(now_ms, Ordering::Relaxed);
        s
    }

    pub fn inc_page(&self, entities: u64) {
        self.pages_served.fetch_add(1, Ordering::Relaxed);
        self.entities_emitted.fetch_add(entities, Ordering::Relaxed);
    }

    pub fn inc_source_query(&self) {
        self.source_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_source_skipped(&self) {
        self.sources_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_source_failure(&self) {
        self.source_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn should_log(&self, now_ms: u64, every_sec: u64) -> bool {
        if every_sec == 0 { return false; }
        let last = self.last_log_ms.load(Ordering::Relaxed);
        now_ms.saturating_sub(last) >= every_sec.saturating_mul(1000)
    }

    pub fn mark_logged(&self, now_ms: u64) {
        self.last_log_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self, now_ms: u64) -> StatsSnapshot {
        let start = self.start_ms.load(Ordering::Relaxed);
        StatsSnapshot {
            now_ms,
            up_sec: now_ms.saturating_sub(start) / 1000,
            pages_served: self.pages_served.load(Ordering::Relaxed),
            entities_emitted: self.entities_emitted.load(Ordering::Relaxed),
            source_queries: self.source_queries.load(Ordering::Relaxed),
            sources_skipped: self.sources_skipped.load(Ordering::Relaxed),
            source_failures: self.source_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub now_ms: u64,
    pub up_sec: u64,
    pub pages_served: u64,
    pub entities_emitted: u64,
    pub source_queries: u64,
    pub sources_skipped: u64,
    pub source_failures: u64,
}
