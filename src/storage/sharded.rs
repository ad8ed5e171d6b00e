//! 分片存储
//!
//! 用一致性哈希环把每个 key 路由到一个命名后端。
//! 点击日志按 list_key 路由，保证同一短码的日志落在同一节点。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::UrlStore;
use crate::core::HashRing;
use crate::errors::{ResilinkError, Result};

pub struct ShardedUrlStore {
    ring: HashRing,
    backends: HashMap<String, Arc<dyn UrlStore>>,
}

impl ShardedUrlStore {
    pub fn new(virtual_nodes_per_node: usize, backends: Vec<(String, Arc<dyn UrlStore>)>) -> Self {
        let names: Vec<String> = backends.iter().map(|(name, _)| name.clone()).collect();
        info!("Sharded store initialized with nodes: {:?}", names);
        Self {
            ring: HashRing::with_nodes(virtual_nodes_per_node, &names),
            backends: backends.into_iter().collect(),
        }
    }

    fn backend_for(&self, key: &str) -> Result<&Arc<dyn UrlStore>> {
        let node = self.ring.node_for(key)?;
        self.backends.get(&node).ok_or_else(|| {
            ResilinkError::no_nodes_available(format!("ring returned unknown node: {}", node))
        })
    }
}

#[async_trait]
impl UrlStore for ShardedUrlStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.backend_for(key)?.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.backend_for(key)?.set(key, value).await
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<()> {
        self.backend_for(key)?.expire(key, seconds).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.backend_for(key)?.exists(key).await
    }

    async fn append_log(&self, list_key: &str, value: &str) -> Result<()> {
        self.backend_for(list_key)?.append_log(list_key, value).await
    }

    async fn range_log(
        &self,
        list_key: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>> {
        self.backend_for(list_key)?
            .range_log(list_key, offset, limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryUrlStore;

    fn sharded(names: &[&str]) -> (ShardedUrlStore, Vec<Arc<MemoryUrlStore>>) {
        let stores: Vec<Arc<MemoryUrlStore>> =
            names.iter().map(|_| Arc::new(MemoryUrlStore::new())).collect();
        let backends = names
            .iter()
            .zip(&stores)
            .map(|(name, store)| {
                (name.to_string(), Arc::clone(store) as Arc<dyn UrlStore>)
            })
            .collect();
        (ShardedUrlStore::new(10, backends), stores)
    }

    #[tokio::test]
    async fn test_key_lands_on_exactly_one_shard() {
        let (store, shards) = sharded(&["a", "b", "c"]);
        store.set("url:code1", "https://example.com").await.unwrap();

        let mut holders = 0;
        for shard in &shards {
            if shard.get("url:code1").await.unwrap().is_some() {
                holders += 1;
            }
        }
        assert_eq!(holders, 1);

        // 读路径走同一个分片
        assert_eq!(
            store.get("url:code1").await.unwrap().as_deref(),
            Some("https://example.com")
        );
    }

    #[tokio::test]
    async fn test_log_routing_is_stable() {
        let (store, _) = sharded(&["a", "b", "c"]);
        for i in 0..5 {
            store
                .append_log("clicks:code1", &format!("event_{}", i))
                .await
                .unwrap();
        }
        let log = store.range_log("clicks:code1", 0, 10).await.unwrap();
        assert_eq!(log.len(), 5);
        assert_eq!(log[0], "event_0");
    }
}
