use async_trait::async_trait;

use crate::cache::traits::SharedCache;
use crate::declare_shared_cache_plugin;
use crate::errors::Result;

declare_shared_cache_plugin!("null", NullSharedCache);

/// 空实现，禁用 L2 时使用
pub struct NullSharedCache;

impl NullSharedCache {
    pub fn new() -> Result<Self> {
        Ok(Self)
    }
}

#[async_trait]
impl SharedCache for NullSharedCache {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_seconds: u64) {}
}
