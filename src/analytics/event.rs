//! 点击事件模型
//!
//! 每次成功解析短码产生一条 ClickEvent，追加写入、创建后不再修改。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use woothee::parser::Parser;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClickEvent {
    pub short_code: String,
    /// 全局唯一点击 ID
    pub click_id: String,
    pub timestamp: DateTime<Utc>,
    /// Unix 毫秒时间戳，便于下游聚合
    pub timestamp_unix: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub device_type: String,
}

/// 队列消息封皮，retry_count 是消费侧重试的元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickEnvelope {
    pub retry_count: u32,
    pub event: ClickEvent,
}

impl ClickEnvelope {
    pub fn new(event: ClickEvent) -> Self {
        Self {
            retry_count: 0,
            event,
        }
    }
}

/// 请求侧元数据，HTTP 层收集后传给编排器
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

impl ClickEvent {
    pub fn from_meta(short_code: &str, meta: &RequestMeta) -> Self {
        let now = Utc::now();
        Self {
            short_code: short_code.to_string(),
            click_id: Uuid::new_v4().to_string(),
            timestamp: now,
            timestamp_unix: now.timestamp_millis(),
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
            referer: meta.referer.clone(),
            device_type: classify_device(meta.user_agent.as_deref()).to_string(),
        }
    }
}

/// 从 User-Agent 推导设备类型
pub fn classify_device(user_agent: Option<&str>) -> &'static str {
    let Some(ua) = user_agent else {
        return "Unknown";
    };
    if ua.contains("iPad") || ua.contains("Tablet") {
        return "Tablet";
    }
    match Parser::new().parse(ua) {
        Some(result) => match result.category {
            "smartphone" | "mobilephone" => "Mobile",
            "pc" => "Desktop",
            _ => "Other",
        },
        None => "Unknown",
    }
}
