//! 内存点击队列
//!
//! 测试与零依赖开发模式使用。额外记录每次 publish 的批次，
//! 方便测试断言批量刷新行为。

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ClickQueue, Delivery};
use crate::analytics::event::ClickEnvelope;
use crate::errors::Result;

#[derive(Default)]
pub struct MemoryClickQueue {
    queue: Mutex<VecDeque<String>>,
    processing: Mutex<Vec<String>>,
    /// 每次 publish 的批次大小历史
    published_batches: Mutex<Vec<Vec<ClickEnvelope>>>,
}

impl MemoryClickQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已发布批次的快照（测试用）
    pub fn published_batches(&self) -> Vec<Vec<ClickEnvelope>> {
        self.published_batches.lock().clone()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn processing_len(&self) -> usize {
        self.processing.lock().len()
    }
}

#[async_trait]
impl ClickQueue for MemoryClickQueue {
    async fn publish(&self, envelopes: &[ClickEnvelope]) -> Result<()> {
        let mut queue = self.queue.lock();
        for envelope in envelopes {
            queue.push_back(serde_json::to_string(envelope)?);
        }
        self.published_batches.lock().push(envelopes.to_vec());
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>> {
        let mut queue = self.queue.lock();
        let mut processing = self.processing.lock();
        let mut deliveries = Vec::new();
        while deliveries.len() < max {
            let Some(payload) = queue.pop_front() else {
                break;
            };
            processing.push(payload.clone());
            deliveries.push(Delivery { payload });
        }
        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut processing = self.processing.lock();
        if let Some(pos) = processing.iter().position(|p| *p == delivery.payload) {
            processing.remove(pos);
        }
        Ok(())
    }

    async fn requeue(&self, delivery: &Delivery, next: &ClickEnvelope) -> Result<()> {
        let payload = serde_json::to_string(next)?;
        self.queue.lock().push_back(payload);
        self.ack(delivery).await
    }

    async fn discard(&self, delivery: &Delivery) -> Result<()> {
        self.ack(delivery).await
    }

    async fn recover(&self) -> Result<usize> {
        let mut queue = self.queue.lock();
        let mut processing = self.processing.lock();
        let count = processing.len();
        for payload in processing.drain(..) {
            queue.push_back(payload);
        }
        Ok(count)
    }
}
