//! 点击队列消费者
//!
//! 按 prefetch 上限拉取消息并发处理：把解码后的事件追加到
//! 持久存储的 per-code 点击日志，成功后才确认。
//! 处理失败时按重试预算重入队，耗尽预算转死信。
//! 队列层拉取连续失败超限时停止消费，把致命错误交还监督者。

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::analytics::event::ClickEnvelope;
use crate::analytics::queue::{ClickQueue, Delivery};
use crate::analytics::sink::DeadLetterSink;
use crate::errors::{ResilinkError, Result};
use crate::storage::UrlStore;

pub struct ClickConsumer {
    queue: Arc<dyn ClickQueue>,
    store: Arc<dyn UrlStore>,
    dead_letter: Arc<dyn DeadLetterSink>,
    prefetch: usize,
    max_retries: u32,
    poll_interval: Duration,
    receive_failure_budget: u32,
    receive_backoff_base: Duration,
}

impl ClickConsumer {
    pub fn new(
        queue: Arc<dyn ClickQueue>,
        store: Arc<dyn UrlStore>,
        dead_letter: Arc<dyn DeadLetterSink>,
        prefetch: usize,
        max_retries: u32,
    ) -> Self {
        Self {
            queue,
            store,
            dead_letter,
            prefetch: prefetch.max(1),
            max_retries,
            poll_interval: Duration::from_millis(200),
            receive_failure_budget: 5,
            receive_backoff_base: Duration::from_millis(500),
        }
    }

    pub fn from_config(
        config: &crate::config::AnalyticsConfig,
        queue: Arc<dyn ClickQueue>,
        store: Arc<dyn UrlStore>,
        dead_letter: Arc<dyn DeadLetterSink>,
    ) -> Self {
        let mut consumer = Self::new(
            queue,
            store,
            dead_letter,
            config.prefetch,
            config.max_retries,
        );
        consumer.receive_failure_budget = config.reconnect_attempts;
        consumer.receive_backoff_base = Duration::from_millis(config.reconnect_base_delay_ms);
        consumer
    }

    /// 消费循环，正常情况下不返回；队列不可恢复时返回致命错误
    pub async fn run(&self) -> Result<()> {
        // 先把上次进程遗留的在途消息还回队列
        if let Ok(recovered) = self.queue.recover().await
            && recovered > 0
        {
            info!("Click consumer recovered {} in-flight messages", recovered);
        }

        let mut receive_failures: u32 = 0;
        loop {
            match self.queue.receive(self.prefetch).await {
                Ok(deliveries) => {
                    receive_failures = 0;
                    if deliveries.is_empty() {
                        tokio::time::sleep(self.poll_interval).await;
                        continue;
                    }
                    debug!("Click consumer processing {} deliveries", deliveries.len());
                    join_all(deliveries.iter().map(|d| self.process(d))).await;
                }
                Err(e) => {
                    receive_failures += 1;
                    if receive_failures >= self.receive_failure_budget {
                        return Err(ResilinkError::pipeline_degraded(format!(
                            "click consumer giving up after {} receive failures: {}",
                            receive_failures, e
                        )));
                    }
                    let delay = self.receive_backoff_base * receive_failures;
                    warn!(
                        "Click consumer receive failed ({}/{}): {}, backing off {:?}",
                        receive_failures, self.receive_failure_budget, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// 处理一批中的单条消息
    pub async fn process(&self, delivery: &Delivery) {
        let envelope: ClickEnvelope = match serde_json::from_str(&delivery.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                // 无法解码的消息重试没有意义，直接死信
                let _ = self
                    .dead_letter
                    .handle(&delivery.payload, &format!("undecodable payload: {}", e))
                    .await;
                if let Err(e) = self.queue.discard(delivery).await {
                    warn!("Failed to discard undecodable message: {}", e);
                }
                return;
            }
        };

        match self.append_event(&envelope).await {
            Ok(_) => {
                if let Err(e) = self.queue.ack(delivery).await {
                    warn!("Failed to ack click message: {}", e);
                }
            }
            Err(e) => {
                let next_retry = envelope.retry_count + 1;
                if next_retry < self.max_retries {
                    debug!(
                        "Click append failed (retry {}/{}): {}",
                        next_retry, self.max_retries, e
                    );
                    let mut next = envelope;
                    next.retry_count = next_retry;
                    if let Err(e) = self.queue.requeue(delivery, &next).await {
                        warn!("Failed to requeue click message: {}", e);
                    }
                } else {
                    let _ = self
                        .dead_letter
                        .handle(
                            &delivery.payload,
                            &format!("retry budget exhausted after {} attempts", next_retry),
                        )
                        .await;
                    if let Err(e) = self.queue.discard(delivery).await {
                        warn!("Failed to discard dead click message: {}", e);
                    }
                }
            }
        }
    }

    async fn append_event(&self, envelope: &ClickEnvelope) -> Result<()> {
        let list_key = format!("clicks:{}", envelope.event.short_code);
        let payload = serde_json::to_string(&envelope.event)?;
        self.store.append_log(&list_key, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::analytics::event::{ClickEvent, RequestMeta};
    use crate::analytics::queue::MemoryClickQueue;
    use crate::storage::MemoryUrlStore;

    struct RecordingSink {
        dead: Mutex<Vec<(String, String)>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                dead: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DeadLetterSink for RecordingSink {
        async fn handle(&self, payload: &str, reason: &str) -> anyhow::Result<()> {
            self.dead
                .lock()
                .push((payload.to_string(), reason.to_string()));
            Ok(())
        }
    }

    /// append_log 可控失败的存储
    struct FlakyStore {
        inner: MemoryUrlStore,
        failing: AtomicBool,
    }

    #[async_trait]
    impl UrlStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.inner.set(key, value).await
        }
        async fn expire(&self, key: &str, seconds: u64) -> Result<()> {
            self.inner.expire(key, seconds).await
        }
        async fn exists(&self, key: &str) -> Result<bool> {
            self.inner.exists(key).await
        }
        async fn append_log(&self, list_key: &str, value: &str) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ResilinkError::upstream("analytics log unavailable"));
            }
            self.inner.append_log(list_key, value).await
        }
        async fn range_log(
            &self,
            list_key: &str,
            offset: usize,
            limit: usize,
        ) -> Result<Vec<String>> {
            self.inner.range_log(list_key, offset, limit).await
        }
    }

    fn publish_one(queue: &MemoryClickQueue) -> ClickEvent {
        let event = ClickEvent::from_meta("abc1234", &RequestMeta::default());
        let envelope = ClickEnvelope::new(event.clone());
        futures_util::future::FutureExt::now_or_never(queue.publish(&[envelope]))
            .expect("memory queue publish is immediate")
            .unwrap();
        event
    }

    #[tokio::test]
    async fn test_successful_append_acks() {
        let queue = Arc::new(MemoryClickQueue::new());
        let store = Arc::new(MemoryUrlStore::new());
        let sink = Arc::new(RecordingSink::new());
        let consumer = ClickConsumer::new(
            Arc::clone(&queue) as Arc<dyn ClickQueue>,
            Arc::clone(&store) as Arc<dyn UrlStore>,
            Arc::clone(&sink) as Arc<dyn DeadLetterSink>,
            100,
            3,
        );

        let event = publish_one(&queue);
        let delivery = queue.receive(1).await.unwrap().remove(0);
        consumer.process(&delivery).await;

        assert_eq!(queue.processing_len(), 0);
        assert_eq!(queue.queue_len(), 0);
        let log = store.range_log("clicks:abc1234", 0, 10).await.unwrap();
        assert_eq!(log.len(), 1);
        let decoded: ClickEvent = serde_json::from_str(&log[0]).unwrap();
        assert_eq!(decoded.click_id, event.click_id);
        assert!(sink.dead.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failure_requeues_then_dead_letters() {
        let queue = Arc::new(MemoryClickQueue::new());
        let store = Arc::new(FlakyStore {
            inner: MemoryUrlStore::new(),
            failing: AtomicBool::new(true),
        });
        let sink = Arc::new(RecordingSink::new());
        let consumer = ClickConsumer::new(
            Arc::clone(&queue) as Arc<dyn ClickQueue>,
            Arc::clone(&store) as Arc<dyn UrlStore>,
            Arc::clone(&sink) as Arc<dyn DeadLetterSink>,
            100,
            3,
        );

        publish_one(&queue);

        // 第 1 次处理：retry_count 0 -> 1，重入队
        let delivery = queue.receive(1).await.unwrap().remove(0);
        consumer.process(&delivery).await;
        assert_eq!(queue.queue_len(), 1);
        assert!(sink.dead.lock().is_empty());

        // 第 2 次处理：retry_count 1 -> 2，重入队
        let delivery = queue.receive(1).await.unwrap().remove(0);
        consumer.process(&delivery).await;
        assert_eq!(queue.queue_len(), 1);

        // 第 3 次处理：预算耗尽，转死信并从队列消失
        let delivery = queue.receive(1).await.unwrap().remove(0);
        consumer.process(&delivery).await;
        assert_eq!(queue.queue_len(), 0);
        assert_eq!(queue.processing_len(), 0);
        let dead = sink.dead.lock();
        assert_eq!(dead.len(), 1);
        assert!(dead[0].1.contains("retry budget exhausted"));
    }

    /// receive 永远失败的队列，recover 正常返回
    struct DeadQueue {
        receives: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl ClickQueue for DeadQueue {
        async fn publish(&self, _envelopes: &[ClickEnvelope]) -> Result<()> {
            Ok(())
        }
        async fn receive(&self, _max: usize) -> Result<Vec<Delivery>> {
            self.receives.fetch_add(1, Ordering::SeqCst);
            Err(ResilinkError::upstream("queue unreachable"))
        }
        async fn ack(&self, _delivery: &Delivery) -> Result<()> {
            Ok(())
        }
        async fn requeue(&self, _delivery: &Delivery, _next: &ClickEnvelope) -> Result<()> {
            Ok(())
        }
        async fn discard(&self, _delivery: &Delivery) -> Result<()> {
            Ok(())
        }
        async fn recover(&self) -> Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_run_stops_after_receive_failure_budget() {
        let queue = Arc::new(DeadQueue {
            receives: std::sync::atomic::AtomicU32::new(0),
        });
        let mut consumer = ClickConsumer::new(
            Arc::clone(&queue) as Arc<dyn ClickQueue>,
            Arc::new(MemoryUrlStore::new()) as Arc<dyn UrlStore>,
            Arc::new(RecordingSink::new()) as Arc<dyn DeadLetterSink>,
            10,
            3,
        );
        consumer.receive_failure_budget = 3;
        consumer.receive_backoff_base = Duration::from_millis(1);

        let err = consumer.run().await.unwrap_err();
        assert!(matches!(err, ResilinkError::PipelineDegraded(_)));
        // 预算内每次失败都重试过，耗尽后立即返回
        assert_eq!(queue.receives.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_dead_lettered_immediately() {
        let queue = Arc::new(MemoryClickQueue::new());
        let store = Arc::new(MemoryUrlStore::new());
        let sink = Arc::new(RecordingSink::new());
        let consumer = ClickConsumer::new(
            Arc::clone(&queue) as Arc<dyn ClickQueue>,
            Arc::clone(&store) as Arc<dyn UrlStore>,
            Arc::clone(&sink) as Arc<dyn DeadLetterSink>,
            100,
            3,
        );

        let delivery = Delivery {
            payload: "not json at all".to_string(),
        };
        consumer.process(&delivery).await;

        let dead = sink.dead.lock();
        assert_eq!(dead.len(), 1);
        assert!(dead[0].1.contains("undecodable"));
    }
}
