use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use crate::cache::traits::SharedCache;
use crate::declare_shared_cache_plugin;
use crate::errors::Result;

declare_shared_cache_plugin!("moka", MokaSharedCache);

#[derive(Clone)]
struct CachedUrl {
    value: String,
    ttl: Duration,
}

/// 按条目 TTL 过期
struct PerEntryExpiry;

impl Expiry<String, CachedUrl> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedUrl,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// 进程内 L2，用于单实例部署和测试
pub struct MokaSharedCache {
    inner: Cache<String, CachedUrl>,
}

impl MokaSharedCache {
    pub fn new() -> Result<Self> {
        let inner = Cache::builder()
            .max_capacity(10_000)
            .expire_after(PerEntryExpiry)
            .build();
        Ok(Self { inner })
    }
}

#[async_trait]
impl SharedCache for MokaSharedCache {
    async fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).await.map(|entry| entry.value)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) {
        self.inner
            .insert(
                key.to_string(),
                CachedUrl {
                    value: value.to_string(),
                    ttl: Duration::from_secs(ttl_seconds),
                },
            )
            .await;
    }
}
