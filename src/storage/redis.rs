//! Redis 存储后端
//!
//! 生产环境的持久存储客户端。连接惰性建立并缓存，
//! 出错时重置，下一次调用重新建立。

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, AsyncConnectionConfig, aio::MultiplexedConnection};
use tokio::sync::RwLock;
use tracing::{debug, error};

use super::UrlStore;
use crate::errors::{ResilinkError, Result};

pub struct RedisUrlStore {
    client: redis::Client,
    /// 持久化连接，使用 RwLock 保护
    connection: RwLock<Option<MultiplexedConnection>>,
    response_timeout: Duration,
}

impl RedisUrlStore {
    pub fn new(url: &str, command_timeout_ms: u64) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| ResilinkError::config(format!("invalid redis url: {}", e)))?;
        Ok(Self {
            client,
            connection: RwLock::new(None),
            response_timeout: Duration::from_millis(command_timeout_ms),
        })
    }

    /// 获取或建立持久连接
    async fn get_connection(&self) -> Result<MultiplexedConnection> {
        // 首先尝试读取现有连接
        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

        // 需要建立新连接
        let mut conn_guard = self.connection.write().await;

        // 双重检查，避免竞态条件
        if let Some(ref conn) = *conn_guard {
            return Ok(conn.clone());
        }

        let conn_config = AsyncConnectionConfig::new()
            .set_connection_timeout(Some(self.response_timeout))
            .set_response_timeout(Some(self.response_timeout));
        let new_conn = self
            .client
            .get_multiplexed_async_connection_with_config(&conn_config)
            .await?;
        *conn_guard = Some(new_conn.clone());
        debug!("Redis store connection established and cached");

        Ok(new_conn)
    }

    /// 重置连接（在连接错误时调用）
    async fn reset_connection(&self) {
        let mut conn_guard = self.connection.write().await;
        *conn_guard = None;
        debug!("Redis store connection reset due to error");
    }

    async fn run<T, C>(&self, command: C) -> Result<T>
    where
        C: AsyncFnOnce(&mut MultiplexedConnection) -> redis::RedisResult<T>,
    {
        let mut conn = self.get_connection().await.inspect_err(|e| {
            error!("Failed to get Redis store connection: {}", e);
        })?;
        match command(&mut conn).await {
            Ok(value) => Ok(value),
            Err(e) => {
                // 连接可能已断开，重置连接
                self.reset_connection().await;
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl UrlStore for RedisUrlStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.run(async |conn| conn.get(key).await).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.run(async |conn| conn.set(key, value).await).await
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<()> {
        self.run(async |conn| conn.expire(key, seconds as i64).await)
            .await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.run(async |conn| conn.exists(key).await).await
    }

    async fn append_log(&self, list_key: &str, value: &str) -> Result<()> {
        self.run(async |conn| conn.rpush(list_key, value).await)
            .await
    }

    async fn range_log(
        &self,
        list_key: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let start = offset as isize;
        let stop = (offset + limit - 1) as isize;
        self.run(async |conn| conn.lrange(list_key, start, stop).await)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_is_config_error() {
        assert!(matches!(
            RedisUrlStore::new("not a redis url", 1000),
            Err(ResilinkError::Config(_))
        ));
    }

    #[test]
    fn test_constructor_does_not_connect() {
        // 连接惰性建立，构造时只校验 URL
        let store = RedisUrlStore::new("redis://127.0.0.1:6379/", 1000).unwrap();
        assert_eq!(store.response_timeout, Duration::from_millis(1000));
    }
}
