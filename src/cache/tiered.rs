//! 两级缓存
//!
//! 热读路径：L1（进程内 LRU）→ L2（共享缓存）→ 经熔断器回源持久存储。
//! L1 命中不做任何 I/O；回源成功后先回填 L2 再回填 L1。
//! 回填是尽力而为，读本身已有值时绝不因回填失败而失败。

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use crate::cache::traits::SharedCache;
use crate::core::CircuitBreaker;
use crate::errors::{ResilinkError, Result};
use crate::storage::UrlStore;

pub struct TieredCache {
    l1: Mutex<LruCache<String, String>>,
    l2: Arc<dyn SharedCache>,
    store: Arc<dyn UrlStore>,
    breaker: Arc<CircuitBreaker>,
    l2_ttl: u64,
    /// 全局缓存开关，关闭后回源不再回填 L2
    cache_enabled: bool,
}

impl TieredCache {
    pub fn new(
        l1_capacity: usize,
        l2: Arc<dyn SharedCache>,
        store: Arc<dyn UrlStore>,
        breaker: Arc<CircuitBreaker>,
        l2_ttl: u64,
        cache_enabled: bool,
    ) -> Self {
        let capacity = NonZeroUsize::new(l1_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            l1: Mutex::new(LruCache::new(capacity)),
            l2,
            store,
            breaker,
            l2_ttl,
            cache_enabled,
        }
    }

    /// 热读路径：短码 -> 目标 URL
    pub async fn resolve(&self, key: &str) -> Result<String> {
        // L1 命中直接返回，不触发任何 I/O
        if let Some(value) = self.l1.lock().get(key).cloned() {
            trace!("L1 hit for key: {}", key);
            return Ok(value);
        }

        // L2 命中则回填 L1
        if let Some(value) = self.l2.get(key).await {
            self.l1.lock().put(key.to_string(), value.clone());
            return Ok(value);
        }

        // 回源持久存储，熔断打开时退化为再读一次 L2
        let store = Arc::clone(&self.store);
        let l2 = Arc::clone(&self.l2);
        let value = self
            .breaker
            .execute_with_fallback(
                || async move { store.get(key).await },
                || async move { Ok(l2.get(key).await) },
            )
            .await?;

        let Some(value) = value else {
            return Err(ResilinkError::not_found(format!(
                "short code not found: {}",
                key
            )));
        };

        // 回填顺序：先 L2 后 L1
        if self.cache_enabled {
            self.l2.set(key, &value, self.l2_ttl).await;
        }
        self.l1.lock().put(key.to_string(), value.clone());

        Ok(value)
    }

    /// 当前 L1 条目数，用于观测
    pub fn l1_len(&self) -> usize {
        self.l1.lock().len()
    }
}
