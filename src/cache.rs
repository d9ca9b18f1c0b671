//! Narrow key/value cache surface.
//!
//! The pricing core treats shared cache entries as ephemeral hints: the only
//! correctness-relevant operation is `rawdel`, used by the master process to
//! force replicas to rebuild adapter state on (re)initialization. Backends
//! stay behind this trait; an in-memory map is always available and a Redis
//! implementation is feature-gated.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

#[async_trait]
pub trait RawCache: Send + Sync {
    async fn rawget(&self, key: &str) -> Result<Option<String>>;
    async fn rawset(&self, key: &str, value: &str) -> Result<()>;
    async fn rawdel(&self, key: &str) -> Result<()>;
}

/// Process-local cache. The default backend for single-process deployments
/// and tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RawCache for MemoryCache {
    async fn rawget(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn rawset(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn rawdel(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Redis-backed cache shared across master and replica processes.
#[cfg(feature = "redis")]
pub struct RedisCache {
    client: redis::Client,
}

#[cfg(feature = "redis")]
impl RedisCache {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
        })
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl RawCache for RedisCache {
    async fn rawget(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.client.get_async_connection().await?;
        Ok(redis::cmd("GET").arg(key).query_async(&mut conn).await?)
    }

    async fn rawset(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.client.get_async_connection().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn rawdel(&self, key: &str) -> Result<()> {
        let mut conn = self.client.get_async_connection().await?;
        let _: () = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_cache_round_trip() {
        let cache = MemoryCache::new();
        cache.rawset("cp-amm_pools_state", "warm").await.unwrap();
        assert_eq!(
            cache.rawget("cp-amm_pools_state").await.unwrap().as_deref(),
            Some("warm")
        );
        cache.rawdel("cp-amm_pools_state").await.unwrap();
        assert_eq!(cache.rawget("cp-amm_pools_state").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rawdel_on_missing_key_is_ok() {
        let cache = MemoryCache::new();
        assert!(cache.rawdel("never-set").await.is_ok());
    }
}
