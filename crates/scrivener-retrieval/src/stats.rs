use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub searches: u64,
    pub stage_a: u64,
    pub stage_b: u64,
    pub stage_c: u64,
    pub lexical_queries: u64,
    pub rewrite_calls: u64,
    pub rewrite_failures: u64,
    pub empty_results: u64,
    pub cancelled: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub searches: AtomicU64,
    pub stage_a: AtomicU64,
    pub stage_b: AtomicU64,
    pub stage_c: AtomicU64,
    pub lexical_queries: AtomicU64,
    pub rewrite_calls: AtomicU64,
    pub rewrite_failures: AtomicU64,
    pub empty_results: AtomicU64,
    pub cancelled: AtomicU64,
}

pub(crate) fn bump(c: &AtomicU64) { c.fetch_add(1, Ordering::Relaxed); }

impl Counters {
    pub fn snapshot(&self) -> SearchStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SearchStats {
            searches: get(&self.searches),
            stage_a: get(&self.stage_a),
            stage_b: get(&self.stage_b),
            stage_c: get(&self.stage_c),
            lexical_queries: get(&self.lexical_queries),
            rewrite_calls: get(&self.rewrite_calls),
            rewrite_failures: get(&self.rewrite_failures),
            empty_results: get(&self.empty_results),
            cancelled: get(&self.cancelled),
        }
    }
}
