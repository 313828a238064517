//! In-process collaborator implementations for tests.

use std::{
    collections::BTreeMap,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    counters::CounterStore,
    sink::{
        DurableSink,
        SinkRow,
    },
};

/// `CounterStore` backed by process-local maps. Single store shared between
/// "workers" via `Arc`, same as a shared Redis. TTLs are recorded but never
/// enforced; tests assert on them directly.
pub struct MemoryCounterStore {
    inner: Mutex<MemoryCounterStoreInner>,
}

#[derive(Default)]
struct MemoryCounterStoreInner {
    sorted: BTreeMap<String, BTreeMap<String, u64>>,
    strings: BTreeMap<String, String>,
    expirations: BTreeMap<String, Duration>,
    fail_range_reads_matching: Option<String>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryCounterStoreInner::default()),
        }
    }

    /// Make `sorted_range_with_counts` fail for keys containing `substr`,
    /// until cleared with `clear_failpoints`.
    pub fn fail_range_reads_matching(&self, substr: impl Into<String>) {
        self.inner.lock().fail_range_reads_matching = Some(substr.into());
    }

    pub fn clear_failpoints(&self) {
        self.inner.lock().fail_range_reads_matching = None;
    }

    pub fn count(&self, key: &str, member: &str) -> Option<u64> {
        self.inner.lock().sorted.get(key)?.get(member).copied()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let inner = self.inner.lock();
        inner.sorted.contains_key(key) || inner.strings.contains_key(key)
    }

    pub fn expiry(&self, key: &str) -> Option<Duration> {
        self.inner.lock().expirations.get(key).copied()
    }

    pub fn holder(&self, key: &str) -> Option<String> {
        self.inner.lock().strings.get(key).cloned()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment_sorted_member(
        &self,
        key: &str,
        member: &str,
        delta: u64,
    ) -> anyhow::Result<u64> {
        let mut inner = self.inner.lock();
        let entry = inner
            .sorted
            .entry(key.to_owned())
            .or_default()
            .entry(member.to_owned())
            .or_insert(0);
        *entry += delta;
        Ok(*entry)
    }

    async fn set_expiry(&self, key: &str, expire_in: Duration) -> anyhow::Result<()> {
        self.inner.lock().expirations.insert(key.to_owned(), expire_in);
        Ok(())
    }

    async fn sorted_range_with_counts(
        &self,
        key: &str,
        offset: usize,
        count: usize,
    ) -> anyhow::Result<Vec<(String, u64)>> {
        let inner = self.inner.lock();
        if let Some(substr) = &inner.fail_range_reads_matching {
            if key.contains(substr.as_str()) {
                anyhow::bail!("injected failure reading {key}");
            }
        }
        let Some(members) = inner.sorted.get(key) else {
            return Ok(vec![]);
        };
        // Score order with member as tiebreak, like a Redis ZRANGE.
        let mut entries: Vec<(String, u64)> =
            members.iter().map(|(m, c)| (m.clone(), *c)).collect();
        entries.sort_by(|a, b| (a.1, &a.0).cmp(&(b.1, &b.0)));
        Ok(entries.into_iter().skip(offset).take(count).collect())
    }

    async fn cardinality(&self, key: &str) -> anyhow::Result<usize> {
        Ok(self
            .inner
            .lock()
            .sorted
            .get(key)
            .map(|members| members.len())
            .unwrap_or(0))
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        inner.sorted.remove(key);
        inner.strings.remove(key);
        inner.expirations.remove(key);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock();
        if inner.strings.contains_key(key) || inner.sorted.contains_key(key) {
            return Ok(false);
        }
        inner.strings.insert(key.to_owned(), value.to_owned());
        inner.expirations.insert(key.to_owned(), ttl);
        Ok(true)
    }
}

/// `DurableSink` that records inserted rows.
pub struct MemorySink {
    inner: Mutex<MemorySinkInner>,
}

#[derive(Default)]
struct MemorySinkInner {
    rows: Vec<(String, SinkRow)>,
    fail_inserts: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemorySinkInner::default()),
        }
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.inner.lock().fail_inserts = fail;
    }

    /// All rows inserted so far, as `(table, row)` pairs.
    pub fn rows(&self) -> Vec<(String, SinkRow)> {
        self.inner.lock().rows.clone()
    }

    pub fn rows_for_table(&self, table: &str) -> Vec<SinkRow> {
        self.inner
            .lock()
            .rows
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, row)| row.clone())
            .collect()
    }
}

#[async_trait]
impl DurableSink for MemorySink {
    async fn batch_insert(&self, table: &str, rows: Vec<SinkRow>) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_inserts {
            anyhow::bail!("injected failure inserting into {table}");
        }
        for row in rows {
            inner.rows.push((table.to_owned(), row));
        }
        Ok(())
    }
}
