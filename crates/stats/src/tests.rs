use std::{
    sync::Arc,
    time::Duration,
};

use common::{
    counters::CounterStore,
    knobs::{
        STATS_COUNTER_TTL,
        STATS_DB_SYNC_DELAY,
        STATS_DB_SYNC_MIN_VIEWS,
        STATS_FLUSH_PAGE_SIZE,
    },
    runtime::testing::TestRuntime,
    sink::{
        DurableSink,
        SinkValue,
    },
    testing::{
        MemoryCounterStore,
        MemorySink,
    },
};
use serde_json::{
    json,
    Value as JsonValue,
};

use crate::{
    bucket::TIME_UNIT_DAY,
    lock::SyncLock,
    pageview::{
        PageviewStats,
        PAGEVIEW_TABLE,
    },
    StatsWorker,
};

const NAME: &str = "statsname";
const BUCKET0_KEY: &str = "stats:pv:statsname:time:0";
const SYNCLOCK_KEY: &str = "stats:pv:statsname:synclock";

struct Fixture {
    rt: TestRuntime,
    counters: Arc<MemoryCounterStore>,
    sink: Arc<MemorySink>,
    worker: StatsWorker<TestRuntime, PageviewStats>,
}

fn new_worker(
    rt: &TestRuntime,
    counters: &Arc<MemoryCounterStore>,
    sink: &Arc<MemorySink>,
) -> StatsWorker<TestRuntime, PageviewStats> {
    let aggregator = PageviewStats::new(
        NAME,
        counters.clone() as Arc<dyn CounterStore>,
        sink.clone() as Arc<dyn DurableSink>,
        TIME_UNIT_DAY,
    )
    .expect("valid bucket width");
    StatsWorker::new(
        rt.clone(),
        counters.clone() as Arc<dyn CounterStore>,
        aggregator,
    )
}

fn fixture() -> Fixture {
    let rt = TestRuntime::new();
    let counters = Arc::new(MemoryCounterStore::new());
    let sink = Arc::new(MemorySink::new());
    let worker = new_worker(&rt, &counters, &sink);
    Fixture {
        rt,
        counters,
        sink,
        worker,
    }
}

fn pageview(page: &str, timestamp: u64) -> JsonValue {
    json!({ "page": page, "timestamp": timestamp })
}

fn pageview_with(page: &str, timestamp: u64, rid: Option<&str>, views: u64) -> JsonValue {
    let mut message = json!({ "page": page, "timestamp": timestamp, "views": views });
    if let Some(rid) = rid {
        message["rid"] = json!(rid);
    }
    message
}

/// Cross into `timestamp`'s bucket, let the grace period pass, and send one
/// more message in the same bucket so the worker attempts a flush.
async fn trigger_flush(fx: &mut Fixture, timestamp: u64) {
    assert!(fx.worker.process(&pageview("trigger", timestamp)).await);
    fx.rt
        .advance_time(*STATS_DB_SYNC_DELAY + Duration::from_secs(1));
    assert!(fx.worker.process(&pageview("trigger", timestamp + 1)).await);
}

#[tokio::test]
async fn test_counts_accumulate_across_workers() {
    let mut fx = fixture();
    let mut worker2 = new_worker(&fx.rt, &fx.counters, &fx.sink);
    assert!(fx.worker.process(&pageview_with("a", 1000, None, 3)).await);
    assert!(worker2.process(&pageview_with("a", 2000, None, 4)).await);
    assert!(
        fx.worker
            .process(&pageview_with("a", 3000, Some("42"), 2))
            .await
    );
    assert!(worker2.process(&pageview("a", 4000)).await);
    assert_eq!(fx.counters.count(BUCKET0_KEY, "a"), Some(8));
    assert_eq!(fx.counters.count(BUCKET0_KEY, "a-42"), Some(2));
    assert_eq!(fx.counters.expiry(BUCKET0_KEY), Some(*STATS_COUNTER_TTL));
}

#[tokio::test]
async fn test_sync_lock_mutual_exclusion() -> anyhow::Result<()> {
    let counters = Arc::new(MemoryCounterStore::new());
    let ttl = Duration::from_secs(600);
    let lock1 = SyncLock::new(
        counters.clone() as Arc<dyn CounterStore>,
        "stats:pv",
        NAME,
        ttl,
    );
    let lock2 = SyncLock::new(
        counters.clone() as Arc<dyn CounterStore>,
        "stats:pv",
        NAME,
        ttl,
    );
    assert_eq!(lock1.key(), SYNCLOCK_KEY);
    assert!(lock1.acquire().await?);
    assert!(!lock2.acquire().await?);
    // No re-entrancy either.
    assert!(!lock1.acquire().await?);
    lock1.release().await?;
    assert!(lock2.acquire().await?);
    Ok(())
}

#[tokio::test]
async fn test_flush_writes_single_aggregated_row() {
    let mut fx = fixture();
    assert!(fx.worker.process(&pageview_with("a", 1000, None, 3)).await);
    assert!(fx.worker.process(&pageview_with("a", 1000, None, 4)).await);
    trigger_flush(&mut fx, 86400 + 1000).await;
    assert_eq!(
        fx.sink.rows(),
        vec![(
            PAGEVIEW_TABLE.to_owned(),
            vec![
                SinkValue::Text("statsname".to_owned()),
                SinkValue::Text("a".to_owned()),
                SinkValue::UInt(7),
                SinkValue::Null,
                SinkValue::UInt(0),
            ],
        )]
    );
    assert!(!fx.counters.contains_key(BUCKET0_KEY));
    assert!(fx.counters.contains_key("stats:pv:statsname:time:1"));
    assert!(!fx.counters.contains_key(SYNCLOCK_KEY));
}

#[tokio::test]
async fn test_flush_keeps_rid_and_bucket_start() {
    let mut fx = fixture();
    assert!(
        fx.worker
            .process(&pageview_with("b", 86400 + 5, Some("42"), 9))
            .await
    );
    trigger_flush(&mut fx, 2 * 86400 + 5).await;
    assert_eq!(
        fx.sink.rows_for_table(PAGEVIEW_TABLE),
        vec![vec![
            SinkValue::Text("statsname".to_owned()),
            SinkValue::Text("b".to_owned()),
            SinkValue::UInt(9),
            SinkValue::Text("42".to_owned()),
            SinkValue::UInt(86400),
        ]]
    );
}

#[tokio::test]
async fn test_flush_below_threshold_persists_nothing_but_deletes() {
    let mut fx = fixture();
    assert!(
        fx.worker
            .process(&pageview_with("b", 5, Some("42"), 2))
            .await
    );
    trigger_flush(&mut fx, 86400 + 5).await;
    assert!(fx.sink.rows().is_empty());
    assert!(!fx.counters.contains_key(BUCKET0_KEY));
}

#[tokio::test]
async fn test_min_views_threshold_is_strict() {
    let mut fx = fixture();
    for _ in 0..*STATS_DB_SYNC_MIN_VIEWS {
        assert!(fx.worker.process(&pageview("at", 1000)).await);
    }
    for _ in 0..*STATS_DB_SYNC_MIN_VIEWS + 1 {
        assert!(fx.worker.process(&pageview("above", 1000)).await);
    }
    trigger_flush(&mut fx, 86400 + 1000).await;
    let rows = fx.sink.rows_for_table(PAGEVIEW_TABLE);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1], SinkValue::Text("above".to_owned()));
    assert_eq!(rows[0][2], SinkValue::UInt(*STATS_DB_SYNC_MIN_VIEWS + 1));
}

#[tokio::test]
async fn test_reflushing_a_drained_bucket_is_a_noop() {
    let mut fx = fixture();
    assert!(fx.worker.process(&pageview_with("a", 1000, None, 6)).await);
    trigger_flush(&mut fx, 86400 + 1000).await;
    assert_eq!(fx.sink.rows().len(), 1);
    // Another crossing re-arms; bucket 0 is gone and bucket 1 holds only
    // below-threshold trigger counts.
    trigger_flush(&mut fx, 2 * 86400 + 1000).await;
    assert_eq!(fx.sink.rows().len(), 1);
    assert!(!fx.counters.contains_key("stats:pv:statsname:time:1"));
}

#[tokio::test]
async fn test_malformed_message_is_isolated() {
    let mut fx = fixture();
    assert!(fx.worker.process(&pageview_with("a", 1000, None, 3)).await);
    assert!(!fx.worker.process(&json!({ "timestamp": 2000 })).await);
    assert!(!fx.worker.process(&json!({ "page": "a" })).await);
    assert!(
        !fx.worker
            .process(&pageview_with("a", 1000, None, 0))
            .await
    );
    assert_eq!(fx.counters.count(BUCKET0_KEY, "a"), Some(3));
    assert!(fx.sink.rows().is_empty());
    // The worker keeps processing after a bad message.
    assert!(fx.worker.process(&pageview("a", 1000)).await);
    assert_eq!(fx.counters.count(BUCKET0_KEY, "a"), Some(4));
}

#[tokio::test]
async fn test_sync_delay_is_strictly_greater() {
    let mut fx = fixture();
    assert!(fx.worker.process(&pageview_with("a", 1000, None, 6)).await);
    assert!(fx.worker.process(&pageview("trigger", 86400 + 1000)).await);
    fx.rt.advance_time(*STATS_DB_SYNC_DELAY);
    // Exactly the grace period is not enough.
    assert!(fx.worker.process(&pageview("trigger", 86400 + 1001)).await);
    assert!(fx.sink.rows().is_empty());
    fx.rt.advance_time(Duration::from_secs(1));
    assert!(fx.worker.process(&pageview("trigger", 86400 + 1002)).await);
    assert_eq!(fx.sink.rows().len(), 1);
}

#[tokio::test]
async fn test_contended_lock_skips_and_retries() -> anyhow::Result<()> {
    let mut fx = fixture();
    assert!(fx.worker.process(&pageview_with("a", 1000, None, 6)).await);
    // Hold the lock as if another worker were mid-flush.
    let other = SyncLock::new(
        fx.counters.clone() as Arc<dyn CounterStore>,
        "stats:pv",
        NAME,
        Duration::from_secs(600),
    );
    assert!(other.acquire().await?);
    trigger_flush(&mut fx, 86400 + 1000).await;
    assert!(fx.sink.rows().is_empty());
    assert!(fx.counters.contains_key(BUCKET0_KEY));
    other.release().await?;
    // Still armed with an already-past deadline: the very next message
    // wins the lock and flushes.
    assert!(fx.worker.process(&pageview("trigger", 86400 + 1002)).await);
    assert_eq!(fx.sink.rows().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_flush_failure_abandons_cycle_until_next_crossing() {
    let mut fx = fixture();
    assert!(fx.worker.process(&pageview_with("a", 1000, None, 6)).await);
    fx.sink.fail_inserts(true);
    trigger_flush(&mut fx, 86400 + 1000).await;
    assert!(fx.sink.rows().is_empty());
    assert!(fx.counters.contains_key(BUCKET0_KEY));
    // The lock is released even when the flush hook fails.
    assert!(!fx.counters.contains_key(SYNCLOCK_KEY));
    // Back to idle: messages in the same bucket don't re-attempt.
    fx.sink.fail_inserts(false);
    assert!(fx.worker.process(&pageview("trigger", 86400 + 1002)).await);
    assert!(fx.sink.rows().is_empty());
    // The next boundary crossing re-arms and the rows are recovered.
    trigger_flush(&mut fx, 2 * 86400 + 1000).await;
    let rows = fx.sink.rows_for_table(PAGEVIEW_TABLE);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1], SinkValue::Text("a".to_owned()));
    assert_eq!(rows[0][2], SinkValue::UInt(6));
}

#[tokio::test]
async fn test_partial_flush_failure_keeps_remaining_buckets() {
    let mut fx = fixture();
    assert!(fx.worker.process(&pageview_with("a", 1000, None, 6)).await);
    assert!(
        fx.worker
            .process(&pageview_with("b", 86400 + 1000, None, 7))
            .await
    );
    fx.counters.fail_range_reads_matching(":time:0");
    // Offsets run newest-first from the current bucket: bucket 1 drains,
    // then bucket 0 aborts the attempt.
    trigger_flush(&mut fx, 2 * 86400 + 1000).await;
    let rows = fx.sink.rows_for_table(PAGEVIEW_TABLE);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1], SinkValue::Text("b".to_owned()));
    assert!(!fx.counters.contains_key("stats:pv:statsname:time:1"));
    assert!(fx.counters.contains_key(BUCKET0_KEY));
    fx.counters.clear_failpoints();
    trigger_flush(&mut fx, 3 * 86400 + 1000).await;
    let rows = fx.sink.rows_for_table(PAGEVIEW_TABLE);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][1], SinkValue::Text("a".to_owned()));
    assert!(!fx.counters.contains_key(BUCKET0_KEY));
}

#[tokio::test]
async fn test_restart_rearms_from_first_message() {
    let rt = TestRuntime::new();
    let counters = Arc::new(MemoryCounterStore::new());
    let sink = Arc::new(MemorySink::new());
    let mut worker1 = new_worker(&rt, &counters, &sink);
    assert!(worker1.process(&pageview_with("a", 1000, None, 6)).await);
    drop(worker1);
    // A fresh worker has no arming state; its first message re-arms.
    let mut worker2 = new_worker(&rt, &counters, &sink);
    assert!(worker2.process(&pageview("trigger", 86400 + 1000)).await);
    rt.advance_time(*STATS_DB_SYNC_DELAY + Duration::from_secs(1));
    assert!(worker2.process(&pageview("trigger", 86400 + 1001)).await);
    assert_eq!(sink.rows().len(), 1);
}

#[tokio::test]
async fn test_flush_paginates_large_buckets() {
    let mut fx = fixture();
    let num_entities = *STATS_FLUSH_PAGE_SIZE + 50;
    for i in 0..num_entities {
        assert!(
            fx.worker
                .process(&pageview_with(&format!("page{i}"), 1000, None, 6))
                .await
        );
    }
    trigger_flush(&mut fx, 86400 + 1000).await;
    assert_eq!(fx.sink.rows_for_table(PAGEVIEW_TABLE).len(), num_entities);
    assert!(!fx.counters.contains_key(BUCKET0_KEY));
}

#[tokio::test]
async fn test_out_of_order_timestamps_count_into_past_buckets() {
    let mut fx = fixture();
    // A late message for bucket 0 arriving while bucket 1 is current is
    // counted, not rejected.
    assert!(
        fx.worker
            .process(&pageview_with("late", 86400 + 1000, None, 1))
            .await
    );
    assert!(fx.worker.process(&pageview_with("late", 1000, None, 2)).await);
    assert_eq!(fx.counters.count(BUCKET0_KEY, "late"), Some(2));
    assert_eq!(
        fx.counters.count("stats:pv:statsname:time:1", "late"),
        Some(1)
    );
}
