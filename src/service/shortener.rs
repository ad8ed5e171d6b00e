//! 短链接编排器
//!
//! 组合熔断器、两级缓存、布隆过滤器和点击批量缓冲，
//! 实现创建短码、解析短码、查询点击分析三个操作。
//! 所有依赖显式注入，测试可以为每个用例构造隔离实例。

use std::sync::Arc;

use tracing::{debug, warn};

use crate::analytics::{ClickBatcher, ClickEvent, RequestMeta};
use crate::cache::TieredCache;
use crate::core::{BloomFilter, CircuitBreaker};
use crate::errors::{ResilinkError, Result};
use crate::storage::UrlStore;
use crate::utils::{generate_random_code, is_valid_short_code, url_validator::validate_url};

/// 随机短码冲突时的重试上限
const MAX_CODE_ATTEMPTS: usize = 5;

/// TTL 上限（10 年，分钟）；字段来自客户端，必须有界才能安全换算成秒
const MAX_TTL_MINUTES: u64 = 10 * 366 * 24 * 60;

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub url: String,
    pub custom_code: Option<String>,
    pub ttl_minutes: Option<u64>,
}

pub struct Shortener {
    store: Arc<dyn UrlStore>,
    cache: Arc<TieredCache>,
    breaker: Arc<CircuitBreaker>,
    bloom: Arc<BloomFilter>,
    batcher: Arc<ClickBatcher>,
    base_url: String,
    code_length: usize,
    /// 读路径负向短路；默认关闭，过滤器主要用于加速写路径查重
    read_path_filter: bool,
}

impl Shortener {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn UrlStore>,
        cache: Arc<TieredCache>,
        breaker: Arc<CircuitBreaker>,
        bloom: Arc<BloomFilter>,
        batcher: Arc<ClickBatcher>,
        base_url: String,
        code_length: usize,
        read_path_filter: bool,
    ) -> Self {
        Self {
            store,
            cache,
            breaker,
            bloom,
            batcher,
            base_url: base_url.trim_end_matches('/').to_string(),
            code_length,
            read_path_filter,
        }
    }

    fn url_key(code: &str) -> String {
        format!("url:{}", code)
    }

    fn clicks_key(code: &str) -> String {
        format!("clicks:{}", code)
    }

    /// 创建短码，写路径只写穿到持久存储，缓存留给首次读惰性填充
    pub async fn create(&self, request: CreateRequest) -> Result<String> {
        validate_url(&request.url)?;

        if let Some(ttl_minutes) = request.ttl_minutes
            && ttl_minutes > MAX_TTL_MINUTES
        {
            return Err(ResilinkError::validation(format!(
                "ttl_minutes must not exceed {}",
                MAX_TTL_MINUTES
            )));
        }

        let code = match request.custom_code {
            Some(custom) => {
                if !is_valid_short_code(&custom) {
                    return Err(ResilinkError::validation(format!(
                        "invalid custom code: {}",
                        custom
                    )));
                }
                if self.code_exists(&custom).await? {
                    return Err(ResilinkError::duplicate_code(format!(
                        "short code already exists: {}",
                        custom
                    )));
                }
                custom
            }
            None => self.pick_random_code().await?,
        };

        let key = Self::url_key(&code);
        let store = Arc::clone(&self.store);
        let url = request.url.clone();
        self.breaker
            .execute(|| async move { store.set(&key, &url).await })
            .await?;

        if let Some(ttl_minutes) = request.ttl_minutes {
            let key = Self::url_key(&code);
            let store = Arc::clone(&self.store);
            self.breaker
                .execute(|| async move { store.expire(&key, ttl_minutes * 60).await })
                .await?;
        }

        self.bloom.add(&Self::url_key(&code));
        debug!("Created short code: {}", code);

        Ok(format!("{}/{}", self.base_url, code))
    }

    /// 解析短码并记录一次点击；read 路径的失败只以
    /// NotFound 或 CircuitOpen 暴露给调用方
    pub async fn resolve(&self, code: &str, meta: RequestMeta) -> Result<String> {
        if !is_valid_short_code(code) {
            return Err(ResilinkError::not_found(format!(
                "invalid short code: {}",
                code
            )));
        }

        let key = Self::url_key(code);
        if self.read_path_filter && !self.bloom.test(&key) {
            // 过滤器说一定不存在，不必打扰缓存和存储
            return Err(ResilinkError::not_found(format!(
                "short code not found: {}",
                code
            )));
        }

        let target = self.cache.resolve(&key).await.map_err(|e| match e {
            ResilinkError::NotFound(_) | ResilinkError::CircuitOpen(_) => e,
            other => {
                warn!("Read path failure for {}: {}", code, other);
                ResilinkError::not_found(format!("short code not found: {}", code))
            }
        })?;

        // 点击记录发射后不管，绝不阻塞跳转
        self.batcher.record(ClickEvent::from_meta(code, &meta));

        Ok(target)
    }

    /// 查询短码的点击日志，按追加顺序（旧到新）返回 [offset, offset+limit)
    pub async fn analytics(
        &self,
        code: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<ClickEvent>> {
        let limit = limit.unwrap_or(100);
        let offset = offset.unwrap_or(0);
        let list_key = Self::clicks_key(code);

        let store = Arc::clone(&self.store);
        let raw = self
            .breaker
            .execute_with_fallback(
                || async move { store.range_log(&list_key, offset, limit).await },
                || async move { Ok(Vec::new()) },
            )
            .await?;

        // 容忍个别坏条目：记日志后跳过，不让整页查询失败
        let mut events = Vec::with_capacity(raw.len());
        for entry in raw {
            match serde_json::from_str::<ClickEvent>(&entry) {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping malformed click entry for {}: {}", code, e),
            }
        }
        Ok(events)
    }

    /// 写路径查重：过滤器说不存在就一定不存在，可以省一次存储访问
    async fn code_exists(&self, code: &str) -> Result<bool> {
        let key = Self::url_key(code);
        if !self.bloom.test(&key) {
            return Ok(false);
        }
        let store = Arc::clone(&self.store);
        self.breaker
            .execute(|| async move { store.exists(&key).await })
            .await
    }

    async fn pick_random_code(&self) -> Result<String> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = generate_random_code(self.code_length);
            if !self.code_exists(&code).await? {
                return Ok(code);
            }
        }
        Err(ResilinkError::upstream(format!(
            "failed to find a free random code in {} attempts",
            MAX_CODE_ATTEMPTS
        )))
    }
}
