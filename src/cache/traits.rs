use async_trait::async_trait;

/// L2 共享缓存访问器
///
/// - `get`：命中返回缓存的目标 URL
/// - `set`：带 TTL 写入，尽力而为；失败由实现自行记录日志，不向上传播
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64);
}
