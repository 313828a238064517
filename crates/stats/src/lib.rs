//! Time-windowed statistics aggregation.
//!
//! High-frequency events are buffered in the counter store as per-bucket
//! sorted counters and periodically drained into the durable store. Flushing
//! is purely a side effect of message processing: there is no background
//! timer, so an aggregator that stops receiving messages also stops
//! attempting flushes. Many stateless workers may process messages for the
//! same aggregator concurrently; counter increments interleave safely and
//! the sync lock serializes the destructive drain-and-delete phase.

pub mod bucket;
pub mod lock;
mod metrics;
pub mod pageview;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use async_trait::async_trait;
use common::{
    counters::CounterStore,
    knobs::{
        STATS_DB_SYNC_DELAY,
        STATS_SYNCLOCK_TTL,
    },
    runtime::{
        Runtime,
        UnixTimestamp,
    },
};
use serde_json::Value as JsonValue;

use crate::{
    bucket::BucketIndex,
    lock::SyncLock,
};

/// One aggregation strategy: how to count a message into the counter store,
/// and how to drain aged buckets into the durable store.
#[async_trait]
pub trait Aggregator: Send + Sync {
    /// Instance name, namespacing counter keys, the sync lock, and rows.
    fn name(&self) -> &str;

    /// Key namespace shared by this aggregator's counters and sync lock.
    fn key_prefix(&self) -> &'static str;

    /// Count one message, returning the bucket it landed in. Failures must
    /// be per-message: shared state stays consistent when this errors.
    async fn accumulate(&self, message: &JsonValue) -> anyhow::Result<BucketIndex>;

    /// Drain buckets older than `current_bucket` into the durable store,
    /// deleting each counter key as it completes. An error aborts the
    /// remainder of the attempt; already-drained buckets stay drained.
    async fn flush(&self, current_bucket: BucketIndex) -> anyhow::Result<()>;
}

enum SyncState {
    Idle,
    /// A bucket boundary crossing has been observed; a flush is pending once
    /// the grace period from `since` elapses.
    Armed { since: UnixTimestamp },
}

/// Per-worker orchestration around an [`Aggregator`]: count each message,
/// arm on bucket boundary crossings, and once the grace period passes drain
/// aged buckets under the sync lock so exactly one worker does so.
///
/// Arming state is process-local and not persisted: after a restart the
/// first message re-arms, at the cost of one extra grace period.
pub struct StatsWorker<RT: Runtime, A: Aggregator> {
    runtime: RT,
    aggregator: A,
    sync_lock: SyncLock,
    current_bucket: Option<BucketIndex>,
    sync_state: SyncState,
}

impl<RT: Runtime, A: Aggregator> StatsWorker<RT, A> {
    pub fn new(runtime: RT, counters: Arc<dyn CounterStore>, aggregator: A) -> Self {
        let sync_lock = SyncLock::new(
            counters,
            aggregator.key_prefix(),
            aggregator.name(),
            *STATS_SYNCLOCK_TTL,
        );
        Self {
            runtime,
            aggregator,
            sync_lock,
            current_bucket: None,
            sync_state: SyncState::Idle,
        }
    }

    pub fn aggregator(&self) -> &A {
        &self.aggregator
    }

    /// Process one inbound message. Returns whether the message was counted;
    /// flushing is a best-effort side activity and never affects the result.
    pub async fn process(&mut self, message: &JsonValue) -> bool {
        let name = self.aggregator.name();
        let bucket = match self.aggregator.accumulate(message).await {
            Ok(bucket) => bucket,
            Err(e) => {
                tracing::error!("Failed to accumulate {name} message: {e:#}");
                metrics::log_message_processed(name, false);
                return false;
            },
        };
        metrics::log_message_processed(name, true);

        if self.current_bucket != Some(bucket) {
            self.current_bucket = Some(bucket);
            // (Re-)arm: the just-closed bucket becomes flush-eligible once
            // the grace period lets trailing in-flight writes settle.
            self.sync_state = SyncState::Armed {
                since: self.runtime.unix_timestamp(),
            };
        }

        if self.ready_to_sync() {
            self.try_sync(bucket).await;
        }
        true
    }

    fn ready_to_sync(&self) -> bool {
        match self.sync_state {
            SyncState::Armed { since } => {
                self.runtime.unix_timestamp().duration_since(since) > *STATS_DB_SYNC_DELAY
            },
            SyncState::Idle => false,
        }
    }

    async fn try_sync(&mut self, current_bucket: BucketIndex) {
        let name = self.aggregator.name();
        match self.sync_lock.acquire().await {
            Ok(true) => (),
            Ok(false) => {
                // Another worker is flushing, or a crashed flush's lock has
                // not expired yet. Stay armed: the deadline is already in the
                // past, so every later message retries until the flush
                // happens elsewhere or this worker wins the lock.
                tracing::debug!("Skipping {name} sync: lock is held elsewhere");
                metrics::log_sync_skipped(name);
                return;
            },
            Err(e) => {
                // Counter store unreachable. Stay armed so a later message
                // retries the acquire.
                tracing::error!("Failed to acquire {name} sync lock: {e:#}");
                return;
            },
        }
        let _timer = metrics::sync_timer(name);
        let result = self.aggregator.flush(current_bucket).await;
        if let Err(e) = self.sync_lock.release().await {
            tracing::warn!("Failed to release {name} sync lock: {e:#}");
        }
        match result {
            Ok(()) => metrics::log_sync(name, true),
            Err(e) => {
                // This cycle's remaining rows stay in the counter store until
                // a later bucket crossing re-arms the timer (or their TTL
                // expires first).
                tracing::error!("Failed to sync {name} stats to db: {e:#}");
                metrics::log_sync(name, false);
            },
        }
        self.sync_state = SyncState::Idle;
    }
}
