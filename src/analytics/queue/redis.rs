//! Redis 点击队列
//!
//! list + processing list 实现的至少一次队列：
//! receive 用 LMOVE 把消息原子转入 processing，ack 用 LREM 删除，
//! 启动时 recover 把上次遗留在 processing 的消息还回主队列。
//! 连接惰性建立，断开后按线性退避做有界重连，
//! 超出预算向上抛致命的 PipelineDegraded。

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{ClickQueue, Delivery};
use crate::analytics::event::ClickEnvelope;
use crate::errors::{ResilinkError, Result};

pub struct RedisClickQueue {
    client: redis::Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    queue_key: String,
    processing_key: String,
    reconnect_attempts: u32,
    reconnect_base_delay: Duration,
}

impl RedisClickQueue {
    pub fn new(
        url: &str,
        queue_key: &str,
        reconnect_attempts: u32,
        reconnect_base_delay: Duration,
    ) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| ResilinkError::config(format!("invalid queue redis url: {}", e)))?;
        Ok(Self {
            client,
            connection: RwLock::new(None),
            queue_key: queue_key.to_string(),
            processing_key: format!("{}:processing", queue_key),
            reconnect_attempts,
            reconnect_base_delay,
        })
    }

    pub fn from_config(config: &crate::config::AnalyticsConfig) -> Result<Self> {
        Self::new(
            &config.redis_url,
            &config.queue_key,
            config.reconnect_attempts,
            Duration::from_millis(config.reconnect_base_delay_ms),
        )
    }

    /// 获取或建立连接，断线后线性退避重连，重连预算有上限
    async fn get_connection(&self) -> Result<MultiplexedConnection> {
        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

        let mut conn_guard = self.connection.write().await;
        if let Some(ref conn) = *conn_guard {
            return Ok(conn.clone());
        }

        let mut last_error = None;
        for attempt in 1..=self.reconnect_attempts {
            match self.client.get_multiplexed_async_connection().await {
                Ok(conn) => {
                    *conn_guard = Some(conn.clone());
                    debug!("Click queue connection established (attempt {})", attempt);
                    return Ok(conn);
                }
                Err(e) => {
                    let delay = self.reconnect_base_delay * attempt;
                    warn!(
                        "Click queue connection attempt {}/{} failed: {}, retrying in {:?}",
                        attempt, self.reconnect_attempts, e, delay
                    );
                    last_error = Some(e);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(ResilinkError::pipeline_degraded(format!(
            "click queue connection failed after {} attempts: {}",
            self.reconnect_attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn reset_connection(&self) {
        let mut conn_guard = self.connection.write().await;
        *conn_guard = None;
        debug!("Click queue connection reset due to error");
    }

    async fn run<T, C>(&self, command: C) -> Result<T>
    where
        C: AsyncFnOnce(&mut MultiplexedConnection) -> redis::RedisResult<T>,
    {
        let mut conn = self.get_connection().await?;
        match command(&mut conn).await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.reset_connection().await;
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl ClickQueue for RedisClickQueue {
    async fn publish(&self, envelopes: &[ClickEnvelope]) -> Result<()> {
        if envelopes.is_empty() {
            return Ok(());
        }
        let mut payloads = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            payloads.push(serde_json::to_string(envelope)?);
        }
        let key = self.queue_key.clone();
        self.run(async |conn| conn.rpush(&key, &payloads).await)
            .await
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>> {
        let queue_key = self.queue_key.clone();
        let processing_key = self.processing_key.clone();
        self.run(async |conn| {
            let mut deliveries = Vec::new();
            while deliveries.len() < max {
                let moved: Option<String> = redis::cmd("LMOVE")
                    .arg(&queue_key)
                    .arg(&processing_key)
                    .arg("LEFT")
                    .arg("RIGHT")
                    .query_async(conn)
                    .await?;
                let Some(payload) = moved else {
                    break;
                };
                deliveries.push(Delivery { payload });
            }
            Ok(deliveries)
        })
        .await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let key = self.processing_key.clone();
        let payload = delivery.payload.clone();
        self.run(async |conn| conn.lrem::<_, _, ()>(&key, 1, &payload).await)
            .await
    }

    async fn requeue(&self, delivery: &Delivery, next: &ClickEnvelope) -> Result<()> {
        let next_payload = serde_json::to_string(next)?;
        let queue_key = self.queue_key.clone();
        let processing_key = self.processing_key.clone();
        let old_payload = delivery.payload.clone();
        self.run(async |conn| {
            conn.rpush::<_, _, ()>(&queue_key, &next_payload).await?;
            conn.lrem::<_, _, ()>(&processing_key, 1, &old_payload).await
        })
        .await
    }

    async fn discard(&self, delivery: &Delivery) -> Result<()> {
        self.ack(delivery).await
    }

    async fn recover(&self) -> Result<usize> {
        let queue_key = self.queue_key.clone();
        let processing_key = self.processing_key.clone();
        let recovered = self
            .run(async |conn| {
                let mut recovered = 0usize;
                loop {
                    let moved: Option<String> = redis::cmd("LMOVE")
                        .arg(&processing_key)
                        .arg(&queue_key)
                        .arg("LEFT")
                        .arg("RIGHT")
                        .query_async(conn)
                        .await?;
                    if moved.is_none() {
                        break;
                    }
                    recovered += 1;
                }
                Ok(recovered)
            })
            .await?;
        if recovered > 0 {
            warn!("Recovered {} stranded click messages into the queue", recovered);
        }
        Ok(recovered)
    }
}
