//! Page-view counting: one sorted counter per day (or other unit) keyed
//! `stats:pv:{name}:time:{bucket}`, drained into `pageview_logs`.

use std::{
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use common::{
    counters::CounterStore,
    knobs::{
        STATS_COUNTER_TTL,
        STATS_DB_SYNC_MAX_UNITS,
        STATS_DB_SYNC_MIN_VIEWS,
        STATS_FLUSH_PAGE_SIZE,
    },
    sink::{
        DurableSink,
        SinkRow,
        SinkValue,
    },
};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::{
    bucket::BucketIndex,
    metrics,
    Aggregator,
};

pub const PAGEVIEW_TABLE: &str = "pageview_logs";

const KEY_PREFIX: &str = "stats:pv";
const RID_SEPARATOR: char = '-';

/// `page` and `timestamp` are required; a message without them is a caller
/// bug, not a retryable failure.
#[derive(Deserialize)]
struct PageviewMessage {
    page: String,
    timestamp: u64,
    rid: Option<String>,
    #[serde(default = "default_views")]
    views: u64,
}

fn default_views() -> u64 {
    1
}

fn entity_key(page: &str, rid: Option<&str>) -> String {
    match rid {
        Some(rid) => format!("{page}{RID_SEPARATOR}{rid}"),
        None => page.to_owned(),
    }
}

/// Inverse of [`entity_key`]: the rid is the segment after the last
/// separator, if any. A page that itself contains the separator and was
/// counted without a rid is ambiguous; the trailing segment wins.
fn split_entity_key(key: &str) -> (&str, Option<&str>) {
    match key.rsplit_once(RID_SEPARATOR) {
        Some((page, rid)) => (page, Some(rid)),
        None => (key, None),
    }
}

pub struct PageviewStats {
    name: String,
    counters: Arc<dyn CounterStore>,
    sink: Arc<dyn DurableSink>,
    bucket_width: Duration,
}

impl PageviewStats {
    pub fn new(
        name: &str,
        counters: Arc<dyn CounterStore>,
        sink: Arc<dyn DurableSink>,
        bucket_width: Duration,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            bucket_width.as_secs() > 0,
            "Bucket width must be a positive number of seconds"
        );
        Ok(Self {
            name: name.to_owned(),
            counters,
            sink,
            bucket_width,
        })
    }

    // e.g. stats:pv:api:time:2271792, counts within one bucket
    fn time_key(&self, bucket: BucketIndex) -> String {
        format!("{KEY_PREFIX}:{}:time:{bucket}", self.name)
    }

    async fn sync_views_to_db(
        &self,
        entries: &[(String, u64)],
        bucket: BucketIndex,
    ) -> anyhow::Result<()> {
        let viewed_at = bucket.start_timestamp(self.bucket_width);
        let min_views = *STATS_DB_SYNC_MIN_VIEWS;
        let mut rows: Vec<SinkRow> = Vec::new();
        for (member, views) in entries {
            // Strictly greater: a count equal to the threshold is dropped.
            if *views <= min_views {
                continue;
            }
            let (page, rid) = split_entity_key(member);
            tracing::debug!("sync_views_to_db: {member} {views}");
            rows.push(vec![
                SinkValue::from(self.name.as_str()),
                SinkValue::from(page),
                SinkValue::UInt(*views),
                rid.map(SinkValue::from).unwrap_or(SinkValue::Null),
                SinkValue::UInt(viewed_at),
            ]);
        }
        if rows.is_empty() {
            return Ok(());
        }
        metrics::log_rows_synced(&self.name, rows.len());
        self.sink.batch_insert(PAGEVIEW_TABLE, rows).await
    }
}

#[async_trait]
impl Aggregator for PageviewStats {
    fn name(&self) -> &str {
        &self.name
    }

    fn key_prefix(&self) -> &'static str {
        KEY_PREFIX
    }

    async fn accumulate(&self, message: &JsonValue) -> anyhow::Result<BucketIndex> {
        let message: PageviewMessage =
            serde_json::from_value(message.clone()).context("Malformed pageview message")?;
        anyhow::ensure!(message.views >= 1, "Pageview message must have views >= 1");
        let bucket = BucketIndex::of(message.timestamp, self.bucket_width);
        let member = entity_key(&message.page, message.rid.as_deref());
        let key = self.time_key(bucket);
        self.counters
            .increment_sorted_member(&key, &member, message.views)
            .await?;
        // Refreshed on every write: active buckets outlive delayed flush
        // cycles, only abandoned ones age out.
        self.counters.set_expiry(&key, *STATS_COUNTER_TTL).await?;
        Ok(bucket)
    }

    async fn flush(&self, current_bucket: BucketIndex) -> anyhow::Result<()> {
        let page_size = *STATS_FLUSH_PAGE_SIZE;
        let mut buckets_synced = 0;
        for offset in 1..=*STATS_DB_SYNC_MAX_UNITS {
            let Some(bucket) = current_bucket.checked_sub(offset) else {
                // Nothing exists before bucket zero.
                break;
            };
            let key = self.time_key(bucket);
            if self.counters.cardinality(&key).await? == 0 {
                continue;
            }
            let mut start = 0;
            loop {
                let page = self
                    .counters
                    .sorted_range_with_counts(&key, start, page_size)
                    .await?;
                if page.is_empty() {
                    break;
                }
                start += page.len();
                self.sync_views_to_db(&page, bucket).await?;
            }
            self.counters.delete(&key).await?;
            buckets_synced += 1;
        }
        metrics::log_buckets_synced(&self.name, buckets_synced);
        Ok(())
    }
}
