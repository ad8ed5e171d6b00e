//! 熔断器
//!
//! 保护对持久存储的所有调用，资源级健康模型（整库一个熔断器，而非按 key）。
//! 连续失败达到阈值后打开，冷却期内直接短路；冷却结束后放行一个探测请求。

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::errors::{ResilinkError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    retry_timeout: Duration,
    call_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, retry_timeout: Duration, call_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
            }),
            failure_threshold,
            retry_timeout,
            call_timeout,
        }
    }

    pub fn from_config(config: &crate::config::BreakerConfig) -> Self {
        Self::new(
            config.failure_threshold,
            Duration::from_secs(config.retry_timeout_secs),
            Duration::from_millis(config.call_timeout_ms),
        )
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// 执行受保护操作，熔断打开时直接返回 CircuitOpen
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.try_admit() {
            return Err(ResilinkError::circuit_open(
                "circuit breaker is open, rejecting call",
            ));
        }
        self.run_guarded(operation).await
    }

    /// 执行受保护操作；熔断打开时改为执行 fallback
    pub async fn execute_with_fallback<T, F, Fut, FB, FutB>(
        &self,
        operation: F,
        fallback: FB,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        FB: FnOnce() -> FutB,
        FutB: Future<Output = Result<T>>,
    {
        if !self.try_admit() {
            debug!("Circuit open, serving fallback");
            return fallback().await;
        }
        self.run_guarded(operation).await
    }

    /// 判断调用是否放行；Open 状态在冷却结束后惰性转为 HalfOpen
    fn try_admit(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.retry_timeout {
                    inner.state = CircuitState::HalfOpen;
                    warn!("Circuit breaker transitioning to HALF_OPEN, probing upstream");
                    true
                } else {
                    false
                }
            }
        }
    }

    async fn run_guarded<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let result = match tokio::time::timeout(self.call_timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(ResilinkError::upstream(format!(
                "operation timed out after {:?}",
                self.call_timeout
            ))),
        };

        match result {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(e)
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            warn!("Circuit breaker closing after successful probe");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;

        // HalfOpen 探测失败立即重新打开；Closed 状态达到阈值才打开
        if inner.state == CircuitState::HalfOpen || inner.failure_count >= self.failure_threshold {
            if inner.state != CircuitState::Open {
                warn!(
                    "Circuit breaker OPEN after {} failures",
                    inner.failure_count
                );
            }
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }
}
