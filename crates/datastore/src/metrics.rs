use std::sync::LazyLock;

use prometheus::{
    register_histogram_vec,
    register_int_counter_vec,
    HistogramTimer,
    HistogramVec,
    IntCounterVec,
};

static MYSQL_GET_CONNECTION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "mysql_get_connection_seconds",
        "Time to acquire a MySQL connection from the pool",
        &["instance"]
    )
    .unwrap()
});

pub fn get_connection_timer(instance: &str) -> HistogramTimer {
    MYSQL_GET_CONNECTION_SECONDS
        .with_label_values(&[instance])
        .start_timer()
}

static MYSQL_BATCH_INSERT_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "mysql_batch_insert_seconds",
        "Time to run one batched INSERT statement",
        &["table"]
    )
    .unwrap()
});

pub fn batch_insert_timer(table: &str) -> HistogramTimer {
    MYSQL_BATCH_INSERT_SECONDS
        .with_label_values(&[table])
        .start_timer()
}

static MYSQL_ROWS_INSERTED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "mysql_rows_inserted_total",
        "Rows written by batched INSERTs",
        &["table"]
    )
    .unwrap()
});

pub fn log_rows_inserted(table: &str, num_rows: usize) {
    MYSQL_ROWS_INSERTED_TOTAL
        .with_label_values(&[table])
        .inc_by(num_rows as u64);
}

static REDIS_COMMANDS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "redis_commands_total",
        "Redis commands issued by the counter store",
        &["command"]
    )
    .unwrap()
});

pub fn log_redis_command(command: &str) {
    REDIS_COMMANDS_TOTAL.with_label_values(&[command]).inc();
}
