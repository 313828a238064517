use std::sync::LazyLock;

use prometheus::{
    register_histogram_vec,
    register_int_counter_vec,
    HistogramTimer,
    HistogramVec,
    IntCounterVec,
};

const STATUS_OK: &str = "ok";
const STATUS_ERROR: &str = "error";

fn status_label(ok: bool) -> &'static str {
    if ok {
        STATUS_OK
    } else {
        STATUS_ERROR
    }
}

static STATS_MESSAGES_PROCESSED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "stats_messages_processed_total",
        "Messages processed, by aggregator and outcome",
        &["name", "status"]
    )
    .unwrap()
});

pub fn log_message_processed(name: &str, ok: bool) {
    STATS_MESSAGES_PROCESSED_TOTAL
        .with_label_values(&[name, status_label(ok)])
        .inc();
}

static STATS_SYNC_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "stats_sync_total",
        "Completed flush attempts under the sync lock, by outcome",
        &["name", "status"]
    )
    .unwrap()
});

pub fn log_sync(name: &str, ok: bool) {
    STATS_SYNC_TOTAL
        .with_label_values(&[name, status_label(ok)])
        .inc();
}

static STATS_SYNC_SKIPPED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "stats_sync_skipped_total",
        "Flush attempts skipped because the sync lock was held elsewhere",
        &["name"]
    )
    .unwrap()
});

pub fn log_sync_skipped(name: &str) {
    STATS_SYNC_SKIPPED_TOTAL.with_label_values(&[name]).inc();
}

static STATS_SYNC_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "stats_sync_seconds",
        "Time spent flushing aged buckets to the durable store",
        &["name"]
    )
    .unwrap()
});

pub fn sync_timer(name: &str) -> HistogramTimer {
    STATS_SYNC_SECONDS.with_label_values(&[name]).start_timer()
}

static STATS_ROWS_SYNCED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "stats_rows_synced_total",
        "Rows written to the durable store by flushes",
        &["name"]
    )
    .unwrap()
});

pub fn log_rows_synced(name: &str, num_rows: usize) {
    STATS_ROWS_SYNCED_TOTAL
        .with_label_values(&[name])
        .inc_by(num_rows as u64);
}

static STATS_BUCKETS_SYNCED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "stats_buckets_synced_total",
        "Buckets drained and deleted from the counter store by flushes",
        &["name"]
    )
    .unwrap()
});

pub fn log_buckets_synced(name: &str, num_buckets: usize) {
    STATS_BUCKETS_SYNCED_TOTAL
        .with_label_values(&[name])
        .inc_by(num_buckets as u64);
}
