//! 点击事件批量缓冲
//!
//! 请求路径调用 record 后立即返回，绝不等待网络。
//! 缓冲区满（batch_size）或首条事件起 flush_interval 到期时整批发布。
//! 发布失败只记日志，批次不回灌——至少一次语义由队列负责。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::analytics::event::{ClickEnvelope, ClickEvent};
use crate::analytics::queue::ClickQueue;

pub struct ClickBatcher {
    buffer: Mutex<Vec<ClickEvent>>,
    queue: Arc<dyn ClickQueue>,
    batch_size: usize,
    flush_interval: Duration,
    /// 防止阈值触发的发布任务风暴
    flush_pending: AtomicBool,
    /// 缓冲区代数，每次排空 +1；过期定时器据此识别自己那一代已被带走
    generation: AtomicU64,
}

impl ClickBatcher {
    pub fn new(queue: Arc<dyn ClickQueue>, batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(batch_size)),
            queue,
            batch_size: batch_size.max(1),
            flush_interval,
            flush_pending: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// 记录一次点击，永不阻塞在网络 I/O 上
    pub fn record(self: &Arc<Self>, event: ClickEvent) {
        let batch = {
            let mut buffer = self.buffer.lock();
            buffer.push(event);
            trace!("ClickBatcher: buffer size now {}", buffer.len());

            if buffer.len() >= self.batch_size {
                self.generation.fetch_add(1, Ordering::SeqCst);
                Some(std::mem::take(&mut *buffer))
            } else {
                // 首条事件落入空缓冲区时武装一次性定时器
                if buffer.len() == 1 {
                    self.arm_timer(self.generation.load(Ordering::SeqCst));
                }
                None
            }
        };

        if let Some(batch) = batch {
            // 使用 compare_exchange 防止任务风暴：
            // 只有成功将 flush_pending 从 false 设为 true 的线程才 spawn
            if self
                .flush_pending
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    this.publish(batch).await;
                    this.flush_pending.store(false, Ordering::Release);
                });
            } else {
                // 已有发布任务在途，直接在新任务里发这一批，不再竞争标志
                let this = Arc::clone(self);
                tokio::spawn(async move { this.publish(batch).await });
            }
        }
    }

    fn arm_timer(self: &Arc<Self>, generation: u64) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.flush_interval).await;
            let batch = {
                let mut buffer = this.buffer.lock();
                // 定时器对应的那一代已被满批或手动刷新带走，后来的事件走自己的定时器
                if this.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                this.generation.fetch_add(1, Ordering::SeqCst);
                std::mem::take(&mut *buffer)
            };
            if !batch.is_empty() {
                debug!("ClickBatcher: interval flush of {} events", batch.len());
                this.publish(batch).await;
            }
        });
    }

    /// 手动刷新（优雅关闭时调用）
    pub async fn flush(&self) {
        let batch = {
            let mut buffer = self.buffer.lock();
            if buffer.is_empty() {
                return;
            }
            self.generation.fetch_add(1, Ordering::SeqCst);
            std::mem::take(&mut *buffer)
        };
        self.publish(batch).await;
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().len()
    }

    async fn publish(&self, batch: Vec<ClickEvent>) {
        let count = batch.len();
        let envelopes: Vec<ClickEnvelope> =
            batch.into_iter().map(ClickEnvelope::new).collect();
        match self.queue.publish(&envelopes).await {
            Ok(_) => {
                debug!("ClickBatcher: published batch of {} events", count);
            }
            Err(e) => {
                // 批次不回灌，丢弃并记录
                warn!(
                    "ClickBatcher: failed to publish batch of {} events: {}",
                    count, e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::event::RequestMeta;
    use crate::analytics::queue::MemoryClickQueue;

    fn event(code: &str) -> ClickEvent {
        ClickEvent::from_meta(code, &RequestMeta::default())
    }

    #[tokio::test]
    async fn test_size_threshold_triggers_single_flush() {
        let queue = Arc::new(MemoryClickQueue::new());
        let batcher = Arc::new(ClickBatcher::new(
            Arc::clone(&queue) as Arc<dyn ClickQueue>,
            10,
            Duration::from_secs(60),
        ));

        // 连续 11 次点击：恰好触发一次满批发布，第 11 条留在缓冲区
        for i in 0..11 {
            batcher.record(event(&format!("code{}", i)));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let batches = queue.published_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 10);
        assert_eq!(batches[0][0].event.short_code, "code0");
        assert_eq!(batches[0][9].event.short_code, "code9");
        assert_eq!(batcher.buffer_len(), 1);
    }

    #[tokio::test]
    async fn test_interval_flush_of_partial_batch() {
        let queue = Arc::new(MemoryClickQueue::new());
        let batcher = Arc::new(ClickBatcher::new(
            Arc::clone(&queue) as Arc<dyn ClickQueue>,
            10,
            Duration::from_millis(50),
        ));

        batcher.record(event("a"));
        batcher.record(event("b"));
        assert_eq!(batcher.buffer_len(), 2);

        tokio::time::sleep(Duration::from_millis(120)).await;
        let batches = queue.published_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batcher.buffer_len(), 0);
    }

    #[tokio::test]
    async fn test_stale_timer_does_not_flush_next_generation_early() {
        let queue = Arc::new(MemoryClickQueue::new());
        let batcher = Arc::new(ClickBatcher::new(
            Arc::clone(&queue) as Arc<dyn ClickQueue>,
            2,
            Duration::from_millis(200),
        ));

        // 第一条事件武装定时器（第 0 代）
        batcher.record(event("a"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        // 满批刷新带走第 0 代，紧接着的事件属于第 1 代
        batcher.record(event("b"));
        batcher.record(event("c"));

        // 第 0 代定时器此刻到期，不得把 c 提前发走
        tokio::time::sleep(Duration::from_millis(140)).await;
        assert_eq!(queue.published_batches().len(), 1);
        assert_eq!(batcher.buffer_len(), 1);

        // c 自己的定时器按完整间隔刷新
        tokio::time::sleep(Duration::from_millis(140)).await;
        let batches = queue.published_batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].len(), 1);
        assert_eq!(batches[1][0].event.short_code, "c");
    }

    #[tokio::test]
    async fn test_manual_flush() {
        let queue = Arc::new(MemoryClickQueue::new());
        let batcher = Arc::new(ClickBatcher::new(
            Arc::clone(&queue) as Arc<dyn ClickQueue>,
            10,
            Duration::from_secs(60),
        ));

        batcher.record(event("a"));
        batcher.flush().await;
        assert_eq!(queue.published_batches().len(), 1);
        assert_eq!(batcher.buffer_len(), 0);
    }

    #[tokio::test]
    async fn test_record_does_not_block_on_queue() {
        // 队列实现故意失败，record 依旧立即返回且不向调用方传播错误
        struct FailingQueue;

        #[async_trait::async_trait]
        impl ClickQueue for FailingQueue {
            async fn publish(
                &self,
                _envelopes: &[ClickEnvelope],
            ) -> crate::errors::Result<()> {
                Err(crate::errors::ResilinkError::pipeline_degraded("broker down"))
            }
            async fn receive(
                &self,
                _max: usize,
            ) -> crate::errors::Result<Vec<crate::analytics::queue::Delivery>> {
                Ok(Vec::new())
            }
            async fn ack(
                &self,
                _delivery: &crate::analytics::queue::Delivery,
            ) -> crate::errors::Result<()> {
                Ok(())
            }
            async fn requeue(
                &self,
                _delivery: &crate::analytics::queue::Delivery,
                _next: &ClickEnvelope,
            ) -> crate::errors::Result<()> {
                Ok(())
            }
            async fn discard(
                &self,
                _delivery: &crate::analytics::queue::Delivery,
            ) -> crate::errors::Result<()> {
                Ok(())
            }
            async fn recover(&self) -> crate::errors::Result<usize> {
                Ok(0)
            }
        }

        let batcher = Arc::new(ClickBatcher::new(
            Arc::new(FailingQueue),
            2,
            Duration::from_secs(60),
        ));
        batcher.record(event("a"));
        batcher.record(event("b"));
        tokio::time::sleep(Duration::from_millis(30)).await;
        // 发布失败被吞掉，缓冲区已清空，批次不回灌
        assert_eq!(batcher.buffer_len(), 0);
    }
}
