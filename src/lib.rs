//! Resilink - 具备弹性原语的短链接服务核心
//!
//! 面向不可靠存储设计的短链接内核：所有对持久层的读写都经过熔断器，
//! 热点解析走两级缓存，点击分析走异步批量管道，存储分片由一致性哈希环路由。
//!
//! # Architecture
//! - `core`: 弹性原语（熔断器、计数布隆过滤器、一致性哈希环）
//! - `cache`: L1 LRU + 可插拔 L2 共享缓存的两级读路径
//! - `storage`: URL 存储后端（内存 / Redis / 分片）
//! - `analytics`: 点击事件的批量入队、消费与死信处理
//! - `service`: 编排层，短链创建 / 解析 / 统计查询
//! - `api`: HTTP 服务与中间件
//! - `config`: 配置加载与全局访问
//! - `runtime`: 服务装配与生命周期
//! - `system`: 日志等系统设施

pub mod analytics;
pub mod api;
pub mod cache;
pub mod config;
pub mod core;
pub mod errors;
pub mod runtime;
pub mod service;
pub mod storage;
pub mod system;
pub mod utils;
