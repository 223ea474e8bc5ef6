//! Usage tracking for the metered cloud backend.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::Usage;

/// Price of 1000 tokens, in US dollars.
pub const PRICE_PER_1K_TOKENS: f64 = 0.002;

/// Tracks cumulative token usage across generations.
///
/// Cheap to clone; clones share the same counters. Totals only grow.
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
    inner: Arc<RwLock<UsageTrackerInner>>,
}

#[derive(Debug, Default)]
struct UsageTrackerInner {
    total_usage: Usage,
    generation_count: u64,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record usage from a generation and return the new running total.
    pub fn record(&self, usage: &Usage) -> Usage {
        let mut inner = self.inner.write();
        inner.total_usage.merge(usage);
        inner.generation_count += 1;
        inner.total_usage
    }

    pub fn total_usage(&self) -> Usage {
        self.inner.read().total_usage
    }

    pub fn total_tokens(&self) -> u64 {
        self.inner.read().total_usage.total_tokens
    }

    /// Number of generations recorded.
    pub fn generation_count(&self) -> u64 {
        self.inner.read().generation_count
    }

    /// Estimated spend so far.
    pub fn estimated_cost_usd(&self) -> f64 {
        cost_for_tokens(self.total_tokens())
    }
}

pub fn cost_for_tokens(tokens: u64) -> f64 {
    tokens as f64 / 1000.0 * PRICE_PER_1K_TOKENS
}
