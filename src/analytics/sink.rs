//! 死信出口
//!
//! 超出重试预算或无法解码的消息从队列移除后交给 DeadLetterSink。
//! 默认实现只记日志；需要落盘或转发时替换实现即可。

use async_trait::async_trait;
use tracing::error;

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn handle(&self, payload: &str, reason: &str) -> anyhow::Result<()>;
}

pub struct LogDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LogDeadLetterSink {
    async fn handle(&self, payload: &str, reason: &str) -> anyhow::Result<()> {
        error!("Dead-lettered click message ({}): {}", reason, payload);
        Ok(())
    }
}
