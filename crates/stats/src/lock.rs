//! Mutual exclusion for the destructive flush-and-delete phase.

use std::{
    sync::Arc,
    time::Duration,
};

use common::counters::CounterStore;

/// At most one holder per aggregator name, built on the counter store's
/// atomic set-if-absent. No queueing, no fairness, no re-entrancy: a failed
/// acquire is reported to the caller, which skips this cycle. A holder that
/// outlives the TTL silently loses exclusivity, so the TTL must stay
/// comfortably above the expected flush duration.
pub struct SyncLock {
    store: Arc<dyn CounterStore>,
    key: String,
    holder: String,
    ttl: Duration,
}

impl SyncLock {
    pub fn new(store: Arc<dyn CounterStore>, key_prefix: &str, name: &str, ttl: Duration) -> Self {
        Self {
            store,
            key: format!("{key_prefix}:{name}:synclock"),
            holder: std::process::id().to_string(),
            ttl,
        }
    }

    /// True iff this worker now holds the lock.
    pub async fn acquire(&self) -> anyhow::Result<bool> {
        self.store.set_if_absent(&self.key, &self.holder, self.ttl).await
    }

    /// Deletes the lock key unconditionally, whoever holds it.
    pub async fn release(&self) -> anyhow::Result<()> {
        self.store.delete(&self.key).await
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}
