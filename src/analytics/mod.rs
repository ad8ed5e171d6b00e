//! 异步点击分析管道
//!
//! 生产侧：请求路径 record -> 内存批量缓冲 -> 持久队列发布。
//! 消费侧：有界预取 -> 追加 per-code 点击日志 -> 确认；
//! 失败有界重试，耗尽预算转死信。
//! 整条管道相对主读写路径是尽力而为，故障绝不影响跳转请求。

pub mod batcher;
pub mod consumer;
pub mod event;
pub mod queue;
pub mod sink;

pub use batcher::ClickBatcher;
pub use consumer::ClickConsumer;
pub use event::{ClickEnvelope, ClickEvent, RequestMeta};
pub use queue::{ClickQueue, Delivery, MemoryClickQueue, RedisClickQueue};
pub use sink::{DeadLetterSink, LogDeadLetterSink};
