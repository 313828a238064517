//! Tunable limits and parameters for the stats pipeline.
//!
//! Every knob here can be overridden with an environment variable of the
//! same name. Each one should have a comment explaining what it's for so an
//! oncall engineer can adjust it safely if needed.
#![deny(missing_docs)]

use std::{
    sync::LazyLock,
    time::Duration,
};

use cmd_util::env::env_config;

/// Grace period between observing a bucket boundary crossing and attempting
/// to flush the closed bucket(s). Gives trailing in-flight writes for the old
/// bucket time to settle before it is read.
pub static STATS_DB_SYNC_DELAY: LazyLock<Duration> =
    LazyLock::new(|| Duration::from_secs(env_config("STATS_DB_SYNC_DELAY_SECONDS", 300)));

/// Expiry on the per-aggregator sync lock. Must be comfortably longer than
/// the expected duration of a flush so a live flusher never loses the lock
/// mid-write; bounds how long a crashed flusher can block others.
pub static STATS_SYNCLOCK_TTL: LazyLock<Duration> =
    LazyLock::new(|| Duration::from_secs(env_config("STATS_SYNCLOCK_TTL_SECONDS", 600)));

/// Expiry on scratch counter buckets. Abandoned buckets (zero-traffic
/// aggregators, repeatedly failed flush cycles) self-delete after this long.
pub static STATS_COUNTER_TTL: LazyLock<Duration> =
    LazyLock::new(|| Duration::from_secs(env_config("STATS_COUNTER_TTL_SECONDS", (72 + 1) * 3600)));

/// How many past buckets a single flush attempts.
pub static STATS_DB_SYNC_MAX_UNITS: LazyLock<u64> =
    LazyLock::new(|| env_config("STATS_DB_SYNC_MAX_UNITS", 5));

/// Entities whose accumulated count does not exceed this are dropped at
/// flush time. Strictly greater-than: a count equal to the threshold is not
/// persisted.
pub static STATS_DB_SYNC_MIN_VIEWS: LazyLock<u64> =
    LazyLock::new(|| env_config("STATS_DB_SYNC_MIN_VIEWS", 5));

/// Page size used when draining a bucket's counters at flush time.
pub static STATS_FLUSH_PAGE_SIZE: LazyLock<usize> =
    LazyLock::new(|| env_config("STATS_FLUSH_PAGE_SIZE", 200));

/// MySQL statement timeout, in seconds.
pub static MYSQL_TIMEOUT: LazyLock<u64> = LazyLock::new(|| env_config("MYSQL_TIMEOUT_SECONDS", 30));

/// Maximum connections per MySQL pool.
pub static MYSQL_MAX_CONNECTIONS: LazyLock<usize> =
    LazyLock::new(|| env_config("MYSQL_MAX_CONNECTIONS", 128));

/// Rows per INSERT statement when batch-writing to MySQL.
pub static MYSQL_CHUNK_SIZE: LazyLock<usize> =
    LazyLock::new(|| env_config("MYSQL_CHUNK_SIZE", 128));

/// How long a MySQL connection can sit idle in the pool before it is closed.
pub static MYSQL_INACTIVE_CONNECTION_LIFETIME: LazyLock<Duration> = LazyLock::new(|| {
    Duration::from_secs(env_config("MYSQL_INACTIVE_CONNECTION_LIFETIME_SECS", 90))
});

/// Hard cap on a MySQL connection's lifetime, so load spreads to new
/// replicas after failovers.
pub static MYSQL_MAX_CONNECTION_LIFETIME: LazyLock<Duration> =
    LazyLock::new(|| Duration::from_secs(env_config("MYSQL_MAX_CONNECTION_LIFETIME_SECS", 600)));

/// Timeout for establishing a Redis connection.
pub static REDIS_CONNECTION_TIMEOUT: LazyLock<Duration> =
    LazyLock::new(|| Duration::from_secs(env_config("REDIS_CONNECTION_TIMEOUT_SECS", 10)));

/// Timeout for a single Redis command round trip.
pub static REDIS_RESPONSE_TIMEOUT: LazyLock<Duration> =
    LazyLock::new(|| Duration::from_secs(env_config("REDIS_RESPONSE_TIMEOUT_SECS", 30)));

/// Debug-log every SQL statement the sink executes.
pub static LOG_DB_QUERY: LazyLock<bool> = LazyLock::new(|| env_config("LOG_DB_QUERY", false));
