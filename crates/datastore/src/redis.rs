use std::{
    collections::{
        BTreeMap,
        HashMap,
    },
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use common::{
    counters::CounterStore,
    knobs::{
        REDIS_CONNECTION_TIMEOUT,
        REDIS_RESPONSE_TIMEOUT,
    },
};
use redis::{
    aio::{
        ConnectionManager,
        ConnectionManagerConfig,
    },
    AsyncCommands,
    Value as RedisValue,
};
use url::Url;

use crate::{
    metrics::log_redis_command,
    DatastoreError,
};

/// `CounterStore` over one named Redis instance. The connection manager
/// multiplexes one connection and reconnects with backoff, so handles are
/// cheap to clone and share.
pub struct RedisCounterStore {
    manager: ConnectionManager,
    instance_name: String,
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("instance_name", &self.instance_name)
            .finish()
    }
}

impl RedisCounterStore {
    pub async fn connect(instance_name: &str, url: &Url) -> anyhow::Result<Self> {
        let client = redis::Client::open(url.as_str())?;
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(*REDIS_CONNECTION_TIMEOUT)
            .set_response_timeout(*REDIS_RESPONSE_TIMEOUT);
        let manager = client.get_connection_manager_with_config(config).await?;
        tracing::info!("Connected to Redis instance {instance_name}");
        Ok(Self {
            manager,
            instance_name: instance_name.to_owned(),
        })
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_sorted_member(
        &self,
        key: &str,
        member: &str,
        delta: u64,
    ) -> anyhow::Result<u64> {
        log_redis_command("ZINCRBY");
        let mut conn = self.manager.clone();
        let total: f64 = conn.zincr(key, member, delta as i64).await?;
        Ok(total as u64)
    }

    async fn set_expiry(&self, key: &str, expire_in: Duration) -> anyhow::Result<()> {
        log_redis_command("EXPIRE");
        let mut conn = self.manager.clone();
        let _: bool = conn.expire(key, expire_in.as_secs() as i64).await?;
        Ok(())
    }

    async fn sorted_range_with_counts(
        &self,
        key: &str,
        offset: usize,
        count: usize,
    ) -> anyhow::Result<Vec<(String, u64)>> {
        if count == 0 {
            return Ok(vec![]);
        }
        log_redis_command("ZRANGE");
        let mut conn = self.manager.clone();
        let entries: Vec<(String, f64)> = conn
            .zrange_withscores(key, offset as isize, (offset + count - 1) as isize)
            .await?;
        Ok(entries
            .into_iter()
            .map(|(member, count)| (member, count as u64))
            .collect())
    }

    async fn cardinality(&self, key: &str) -> anyhow::Result<usize> {
        log_redis_command("ZCARD");
        let mut conn = self.manager.clone();
        Ok(conn.zcard(key).await?)
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        log_redis_command("DEL");
        let mut conn = self.manager.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<bool> {
        log_redis_command("SET");
        let mut conn = self.manager.clone();
        // EX rejects 0, and a zero-ttl lock would never expire anyway.
        let reply: RedisValue = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(!matches!(reply, RedisValue::Nil))
    }
}

/// Explicit name -> store mapping, built once at process start. Connects
/// eagerly so misconfigured instances fail at startup, not mid-pipeline.
pub struct RedisRegistry {
    stores: HashMap<String, Arc<RedisCounterStore>>,
}

impl RedisRegistry {
    pub async fn connect(instances: &BTreeMap<String, Url>) -> anyhow::Result<Self> {
        let mut stores = HashMap::new();
        for (name, url) in instances {
            let store = RedisCounterStore::connect(name, url).await?;
            stores.insert(name.clone(), Arc::new(store));
        }
        Ok(Self { stores })
    }

    pub fn instance(&self, name: &str) -> Result<Arc<RedisCounterStore>, DatastoreError> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| DatastoreError::UnknownRedisInstance(name.to_owned()))
    }
}
