//! 持久存储客户端
//!
//! 短码 -> URL 映射与点击日志的权威所有者。
//! 这里只约定客户端契约；连接池、复制等由后端自己负责，
//! 失败以普通错误抛给熔断器。

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::StorageConfig;
use crate::errors::{ResilinkError, Result};

pub mod memory;
pub mod redis;
pub mod sharded;

pub use memory::MemoryUrlStore;
pub use redis::RedisUrlStore;
pub use sharded::ShardedUrlStore;

#[async_trait]
pub trait UrlStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn expire(&self, key: &str, seconds: u64) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;

    /// 追加写入有序日志（新条目永远在尾部）
    async fn append_log(&self, list_key: &str, value: &str) -> Result<()>;

    /// 按日志顺序读取 [offset, offset + limit)
    async fn range_log(&self, list_key: &str, offset: usize, limit: usize)
        -> Result<Vec<String>>;
}

/// 按配置构造存储后端
pub fn build_store(config: &StorageConfig) -> Result<Arc<dyn UrlStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryUrlStore::new())),
        "redis" => Ok(Arc::new(RedisUrlStore::new(
            &config.redis_url,
            config.command_timeout_ms,
        )?)),
        "sharded" => {
            if config.nodes.is_empty() {
                return Err(ResilinkError::config(
                    "sharded storage backend requires at least one node",
                ));
            }
            let mut backends: Vec<(String, Arc<dyn UrlStore>)> =
                Vec::with_capacity(config.nodes.len());
            for node in &config.nodes {
                let store = RedisUrlStore::new(&node.url, config.command_timeout_ms)?;
                backends.push((node.name.clone(), Arc::new(store)));
            }
            let virtual_nodes = crate::config::get_config().ring.virtual_nodes_per_node;
            Ok(Arc::new(ShardedUrlStore::new(virtual_nodes, backends)))
        }
        other => Err(ResilinkError::config(format!(
            "unknown storage backend: {}",
            other
        ))),
    }
}
