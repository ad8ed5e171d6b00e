//! 内存存储后端
//!
//! DashMap 实现的进程内存储，TTL 惰性过期。
//! 用于测试和零依赖的开发模式。

use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;

use super::UrlStore;
use crate::errors::Result;

struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| Instant::now() >= t)
    }
}

#[derive(Default)]
pub struct MemoryUrlStore {
    entries: DashMap<String, StoredValue>,
    logs: DashMap<String, Vec<String>>,
}

impl MemoryUrlStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UrlStore for MemoryUrlStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<()> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + std::time::Duration::from_secs(seconds));
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn append_log(&self, list_key: &str, value: &str) -> Result<()> {
        self.logs
            .entry(list_key.to_string())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    async fn range_log(
        &self,
        list_key: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<String>> {
        let Some(log) = self.logs.get(list_key) else {
            return Ok(Vec::new());
        };
        Ok(log.iter().skip(offset).take(limit).cloned().collect())
    }
}
