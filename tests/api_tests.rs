//! HTTP API tests
//!
//! Drives the actix routes against in-memory backends: shorten,
//! redirect, analytics, health and the rate limit middleware.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, test, web};
use serde_json::{Value, json};

use resilink::analytics::{ClickBatcher, ClickEvent, ClickQueue, MemoryClickQueue, RequestMeta};
use resilink::api;
use resilink::api::middleware::{RateLimitMiddleware, RateLimiter};
use resilink::cache::TieredCache;
use resilink::cache::l2::null::NullSharedCache;
use resilink::core::{BloomFilter, CircuitBreaker};
use resilink::service::Shortener;
use resilink::storage::{MemoryUrlStore, UrlStore};

struct AppParts {
    shortener: web::Data<Arc<Shortener>>,
    store: web::Data<Arc<dyn UrlStore>>,
    breaker: web::Data<Arc<CircuitBreaker>>,
    bloom: web::Data<Arc<BloomFilter>>,
    raw_store: Arc<dyn UrlStore>,
}

fn build_app_parts() -> AppParts {
    let store: Arc<dyn UrlStore> = Arc::new(MemoryUrlStore::new());
    let breaker = Arc::new(CircuitBreaker::new(
        5,
        Duration::from_secs(10),
        Duration::from_secs(1),
    ));
    let bloom = Arc::new(BloomFilter::new(10_000, 0.01, true).unwrap());
    let queue: Arc<dyn ClickQueue> = Arc::new(MemoryClickQueue::new());
    let cache = Arc::new(TieredCache::new(
        128,
        Arc::new(NullSharedCache::new().unwrap()),
        Arc::clone(&store),
        Arc::clone(&breaker),
        60,
        true,
    ));
    let batcher = Arc::new(ClickBatcher::new(queue, 10, Duration::from_secs(60)));
    let shortener = Arc::new(Shortener::new(
        Arc::clone(&store),
        cache,
        Arc::clone(&breaker),
        Arc::clone(&bloom),
        batcher,
        "http://localhost:8080".to_string(),
        7,
        false,
    ));

    AppParts {
        shortener: web::Data::new(shortener),
        store: web::Data::new(Arc::clone(&store)),
        breaker: web::Data::new(breaker),
        bloom: web::Data::new(bloom),
        raw_store: store,
    }
}

macro_rules! test_app {
    ($parts:expr) => {
        test::init_service(
            App::new()
                .app_data($parts.shortener.clone())
                .app_data($parts.store.clone())
                .app_data($parts.breaker.clone())
                .app_data($parts.bloom.clone())
                .configure(api::configure_routes),
        )
        .await
    };
}

#[actix_web::test]
async fn test_shorten_returns_created() {
    let parts = build_app_parts();
    let app = test_app!(parts);

    let req = test::TestRequest::post()
        .uri("/shorten")
        .set_json(json!({"url": "https://example.com/page"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let body: Value = test::read_body_json(resp).await;
    let short_url = body["short_url"].as_str().unwrap();
    assert!(short_url.starts_with("http://localhost:8080/"));
}

#[actix_web::test]
async fn test_shorten_invalid_url_returns_bad_request() {
    let parts = build_app_parts();
    let app = test_app!(parts);

    let req = test::TestRequest::post()
        .uri("/shorten")
        .set_json(json!({"url": "javascript:alert(1)"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "E001");
}

#[actix_web::test]
async fn test_shorten_duplicate_code_returns_bad_request() {
    let parts = build_app_parts();
    let app = test_app!(parts);

    let payload = json!({"url": "https://example.com", "custom_code": "custom123"});
    let req = test::TestRequest::post()
        .uri("/shorten")
        .set_json(&payload)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    let req = test::TestRequest::post()
        .uri("/shorten")
        .set_json(&payload)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "E002");
}

#[actix_web::test]
async fn test_redirect_known_code() {
    let parts = build_app_parts();
    let app = test_app!(parts);

    let req = test::TestRequest::post()
        .uri("/shorten")
        .set_json(json!({"url": "https://example.com/target", "custom_code": "go"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    let req = test::TestRequest::get().uri("/go").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 307);
    assert_eq!(
        resp.headers().get("Location").unwrap(),
        "https://example.com/target"
    );
}

#[actix_web::test]
async fn test_redirect_unknown_code_returns_not_found() {
    let parts = build_app_parts();
    let app = test_app!(parts);

    let req = test::TestRequest::get().uri("/does-not-exist").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_analytics_returns_clicks() {
    let parts = build_app_parts();

    // 直接向日志里塞一条点击，绕过异步管道
    let event = ClickEvent::from_meta("seen", &RequestMeta::default());
    parts
        .raw_store
        .append_log("clicks:seen", &serde_json::to_string(&event).unwrap())
        .await
        .unwrap();

    let app = test_app!(parts);
    let req = test::TestRequest::get().uri("/analytics/seen").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: Value = test::read_body_json(resp).await;
    let clicks = body["clicks"].as_array().unwrap();
    assert_eq!(clicks.len(), 1);
    assert_eq!(clicks[0]["short_code"], "seen");
}

#[actix_web::test]
async fn test_health_check_reports_ok() {
    let parts = build_app_parts();
    let app = test_app!(parts);

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["circuit"], "closed");
}

#[actix_web::test]
async fn test_rate_limit_middleware_returns_429() {
    let parts = build_app_parts();
    let limiter = RateLimiter::new(2, Duration::from_secs(60));
    let app = test::init_service(
        App::new()
            .app_data(parts.shortener.clone())
            .app_data(parts.store.clone())
            .app_data(parts.breaker.clone())
            .app_data(parts.bloom.clone())
            .wrap(RateLimitMiddleware::new(limiter))
            .configure(api::configure_routes),
    )
    .await;

    for _ in 0..2 {
        let req = test::TestRequest::get()
            .uri("/health")
            .peer_addr("198.51.100.7:9000".parse().unwrap())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }

    let req = test::TestRequest::get()
        .uri("/health")
        .peer_addr("198.51.100.7:9000".parse().unwrap())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 429);
    assert!(resp.headers().contains_key("Retry-After"));
}
