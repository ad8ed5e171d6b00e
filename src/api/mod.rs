//! HTTP 层（薄壳）
//!
//! 路由与请求编解码都很薄，核心语义全部在 service / cache / core。

pub mod middleware;
pub mod services;

use actix_web::web;

use services::analytics::AnalyticsService;
use services::health::HealthService;
use services::links::LinkService;
use services::redirect::RedirectService;

/// 应用路由表
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/shorten", web::post().to(LinkService::post_shorten))
        .route(
            "/analytics/{code}",
            web::get().to(AnalyticsService::get_analytics),
        )
        .route("/health", web::get().to(HealthService::health_check))
        .route("/{code}", web::get().to(RedirectService::handle_redirect))
        .route("/{code}", web::head().to(RedirectService::handle_redirect));
}
