//! 持久点击队列
//!
//! 外部消息队列的接口边界：至少一次投递、持久消息、
//! 每条消息携带重试计数、手动确认/重入队。

use async_trait::async_trait;

use crate::analytics::event::ClickEnvelope;
use crate::errors::Result;

pub mod memory;
pub mod redis;

pub use memory::MemoryClickQueue;
pub use redis::RedisClickQueue;

/// 一条已投递待确认的消息，payload 同时充当确认回执
#[derive(Debug, Clone)]
pub struct Delivery {
    pub payload: String,
}

#[async_trait]
pub trait ClickQueue: Send + Sync {
    /// 批量发布，消息持久化存储
    async fn publish(&self, envelopes: &[ClickEnvelope]) -> Result<()>;

    /// 拉取最多 max 条消息，消息转入待确认状态
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>>;

    /// 处理成功，从待确认状态移除
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// 处理失败且仍有重试预算，带新的重试计数重新入队
    async fn requeue(&self, delivery: &Delivery, next: &ClickEnvelope) -> Result<()>;

    /// 超出重试预算，直接丢弃（死信处理在消费侧完成）
    async fn discard(&self, delivery: &Delivery) -> Result<()>;

    /// 启动时把上次进程崩溃遗留的待确认消息还回队列
    async fn recover(&self) -> Result<usize>;
}
