//! 固定窗口限流中间件
//!
//! 按客户端 IP 计数，窗口内超过上限返回 429。
//! 显式的 actix Transform 包装，不依赖任何注解式元数据。
//! 计数器在进程内维护；取不到客户端 IP 时放行（fail-open）。

use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_service::{Service, Transform};
use actix_web::{
    Error, HttpResponse,
    dev::{ServiceRequest, ServiceResponse},
};
use dashmap::DashMap;
use futures_util::future::{LocalBoxFuture, Ready, ready};
use tracing::debug;

/// 计数表达到该规模后，下一次 check 顺带清理过期窗口
const SWEEP_THRESHOLD: usize = 1024;

struct WindowCounter {
    window_start: Instant,
    count: u32,
}

/// 进程级限流状态，所有 worker 共享
pub struct RateLimiter {
    counters: DashMap<String, WindowCounter>,
    max_requests: u32,
    window: Duration,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Arc<Self> {
        Arc::new(Self {
            counters: DashMap::new(),
            max_requests,
            window,
            enabled: true,
        })
    }

    /// 关闭限流的空实例，让 App 组装保持单一类型
    pub fn disabled() -> Arc<Self> {
        Arc::new(Self {
            counters: DashMap::new(),
            max_requests: 0,
            window: Duration::ZERO,
            enabled: false,
        })
    }

    /// true 表示放行
    fn check(&self, client_ip: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();

        // 过期窗口批量驱逐，计数表不随不同来源 IP 的数量无界增长
        if self.counters.len() >= SWEEP_THRESHOLD {
            self.counters
                .retain(|_, counter| now.duration_since(counter.window_start) < self.window);
        }

        let mut entry = self
            .counters
            .entry(client_ip.to_string())
            .or_insert_with(|| WindowCounter {
                window_start: now,
                count: 0,
            });

        // 窗口到期则重开
        if now.duration_since(entry.window_start) >= self.window {
            entry.window_start = now;
            entry.count = 0;
        }

        entry.count += 1;
        entry.count <= self.max_requests
    }
}

/// 限流中间件工厂
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitService {
            service: Rc::new(service),
            limiter: Arc::clone(&self.limiter),
        }))
    }
}

pub struct RateLimitService<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
}

impl<S, B> Service<ServiceRequest> for RateLimitService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();
        let limiter = Arc::clone(&self.limiter);

        Box::pin(async move {
            let client_ip = req
                .connection_info()
                .realip_remote_addr()
                .map(|s| s.to_string());

            // 取不到 IP 时放行
            let allowed = client_ip
                .as_deref()
                .map(|ip| limiter.check(ip))
                .unwrap_or(true);

            if !allowed {
                debug!(
                    "Rate limit exceeded for {}",
                    client_ip.as_deref().unwrap_or("unknown")
                );
                let response = HttpResponse::TooManyRequests()
                    .insert_header(("Retry-After", limiter.window.as_secs().to_string()))
                    .body("Too Many Requests");
                return Ok(req.into_response(response).map_into_right_body());
            }

            srv.call(req).await.map(|res| res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_window_counting() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check("203.0.113.9"));
        assert!(limiter.check("203.0.113.9"));
        assert!(limiter.check("203.0.113.9"));
        assert!(!limiter.check("203.0.113.9"));
        // 其他 IP 不受影响
        assert!(limiter.check("198.51.100.7"));
    }

    #[test]
    fn test_expired_windows_are_evicted() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        for i in 0..(SWEEP_THRESHOLD + 100) {
            limiter.check(&format!("10.0.{}.{}", i / 256, i % 256));
        }
        assert!(limiter.counters.len() >= SWEEP_THRESHOLD);

        std::thread::sleep(Duration::from_millis(30));
        // 窗口全部过期，下一次 check 触发清理
        limiter.check("198.51.100.7");
        assert_eq!(limiter.counters.len(), 1);
    }

    #[test]
    fn test_window_reset() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check("203.0.113.9"));
        assert!(!limiter.check("203.0.113.9"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check("203.0.113.9"));
    }
}
