//! Contract for the fast scratch store that buffers per-bucket counters.
//!
//! Modeled on a Redis sorted set per (aggregator, bucket): member is the
//! entity being counted, score is the accumulated count. Implementations
//! must make `increment_sorted_member` atomic across callers; everything
//! else is a plain command round trip.

use std::time::Duration;

use async_trait::async_trait;

#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    /// Add `delta` to `member` within the sorted mapping at `key`, creating
    /// both as needed, and return the member's new total.
    async fn increment_sorted_member(
        &self,
        key: &str,
        member: &str,
        delta: u64,
    ) -> anyhow::Result<u64>;

    /// Set (or refresh) `key`'s time-to-live.
    async fn set_expiry(&self, key: &str, expire_in: Duration) -> anyhow::Result<()>;

    /// Read up to `count` `(member, total)` entries starting at `offset`,
    /// in the store's sorted order. An absent key reads as empty.
    async fn sorted_range_with_counts(
        &self,
        key: &str,
        offset: usize,
        count: usize,
    ) -> anyhow::Result<Vec<(String, u64)>>;

    /// Number of members in the sorted mapping at `key`; zero when absent.
    async fn cardinality(&self, key: &str) -> anyhow::Result<usize>;

    /// Remove `key` entirely. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Create `key` holding `value` with the given `ttl` iff `key` does not
    /// already exist. Returns true iff this call created it.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<bool>;
}
