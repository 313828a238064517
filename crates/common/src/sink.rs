//! Contract for the durable store that receives aggregated rows.

use async_trait::async_trait;

/// One cell of a row bound for the durable store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkValue {
    Null,
    Int(i64),
    UInt(u64),
    Text(String),
}

impl From<u64> for SinkValue {
    fn from(v: u64) -> Self {
        SinkValue::UInt(v)
    }
}

impl From<String> for SinkValue {
    fn from(v: String) -> Self {
        SinkValue::Text(v)
    }
}

impl From<&str> for SinkValue {
    fn from(v: &str) -> Self {
        SinkValue::Text(v.to_owned())
    }
}

impl From<Option<String>> for SinkValue {
    fn from(v: Option<String>) -> Self {
        match v {
            Some(s) => SinkValue::Text(s),
            None => SinkValue::Null,
        }
    }
}

pub type SinkRow = Vec<SinkValue>;

#[async_trait]
pub trait DurableSink: Send + Sync + 'static {
    /// Append `rows` to `table`. Rows are append-only from the pipeline's
    /// point of view; an error means the caller's current bucket attempt
    /// must be abandoned (some rows may have been written).
    async fn batch_insert(&self, table: &str, rows: Vec<SinkRow>) -> anyhow::Result<()>;
}
