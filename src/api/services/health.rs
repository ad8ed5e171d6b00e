//! 健康检查

use std::sync::Arc;

use actix_web::{HttpResponse, Responder, web};
use serde::Serialize;

use crate::core::{BloomFilter, CircuitBreaker, CircuitState};
use crate::storage::UrlStore;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    storage: &'static str,
    circuit: &'static str,
    bloom_fill_ratio: f64,
}

pub struct HealthService {}

impl HealthService {
    pub async fn health_check(
        store: web::Data<Arc<dyn UrlStore>>,
        breaker: web::Data<Arc<CircuitBreaker>>,
        bloom: web::Data<Arc<BloomFilter>>,
    ) -> impl Responder {
        let storage_ok = store.exists("health:probe").await.is_ok();
        let circuit = match breaker.state() {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };

        let healthy = storage_ok && circuit != "open";
        let body = HealthResponse {
            status: if healthy { "ok" } else { "degraded" },
            storage: if storage_ok { "ok" } else { "unreachable" },
            circuit,
            bloom_fill_ratio: bloom.fill_ratio(),
        };

        if healthy {
            HttpResponse::Ok().json(body)
        } else {
            HttpResponse::ServiceUnavailable().json(body)
        }
    }
}
