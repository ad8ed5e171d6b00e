use async_trait::async_trait;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use tokio::sync::RwLock;
use tracing::{debug, error, trace};

use crate::cache::traits::SharedCache;
use crate::declare_shared_cache_plugin;
use crate::errors::{ResilinkError, Result};

declare_shared_cache_plugin!("redis", RedisSharedCache);

pub struct RedisSharedCache {
    client: redis::Client,
    /// 持久化连接，使用 RwLock 保护
    connection: RwLock<Option<MultiplexedConnection>>,
    key_prefix: String,
}

impl RedisSharedCache {
    pub fn new() -> Result<Self> {
        let config = crate::config::get_config();
        let cache_config = &config.cache;

        debug!(
            "RedisSharedCache created with prefix: '{}', default TTL: {}s",
            cache_config.key_prefix, cache_config.l2_ttl
        );

        let client = redis::Client::open(cache_config.redis_url.clone())
            .map_err(|e| ResilinkError::config(format!("invalid cache redis url: {}", e)))?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            key_prefix: cache_config.key_prefix.clone(),
        })
    }

    /// 获取或建立持久连接
    async fn get_connection(&self) -> Result<MultiplexedConnection> {
        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

        let mut conn_guard = self.connection.write().await;

        // 双重检查，避免竞态条件
        if let Some(ref conn) = *conn_guard {
            return Ok(conn.clone());
        }

        let new_conn = self.client.get_multiplexed_async_connection().await?;
        *conn_guard = Some(new_conn.clone());
        debug!("Redis cache connection established and cached");

        Ok(new_conn)
    }

    /// 重置连接（在连接错误时调用）
    async fn reset_connection(&self) {
        let mut conn_guard = self.connection.write().await;
        *conn_guard = None;
        debug!("Redis cache connection reset due to error");
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl SharedCache for RedisSharedCache {
    async fn get(&self, key: &str) -> Option<String> {
        let redis_key = self.make_key(key);

        let mut conn = match self.get_connection().await {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to get Redis cache connection: {}", e);
                return None;
            }
        };

        match conn.get::<_, Option<String>>(&redis_key).await {
            Ok(Some(value)) => {
                trace!("L2 hit for key: {}", key);
                Some(value)
            }
            Ok(None) => {
                trace!("L2 miss for key: {}", key);
                None
            }
            Err(e) => {
                error!("Failed to get key '{}' from L2: {}", key, e);
                // 连接可能已断开，重置连接
                self.reset_connection().await;
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) {
        let redis_key = self.make_key(key);

        let mut conn = match self.get_connection().await {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to get Redis cache connection: {}", e);
                return;
            }
        };

        match conn
            .set_ex::<_, _, ()>(redis_key, value, ttl_seconds)
            .await
        {
            Ok(_) => {
                trace!("L2 populated for key: {}", key);
            }
            Err(e) => {
                error!("Failed to populate L2 for key '{}': {}", key, e);
                self.reset_connection().await;
            }
        }
    }
}
