//! 短码跳转
//!
//! 核心热路径：短码 -> 307 跳转。未知短码 404，熔断打开 503。

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use tracing::trace;

use crate::analytics::RequestMeta;
use crate::errors::ResilinkError;
use crate::service::Shortener;
use crate::utils::ip::extract_client_ip;

pub struct RedirectService {}

impl RedirectService {
    pub async fn handle_redirect(
        req: HttpRequest,
        path: web::Path<String>,
        shortener: web::Data<Arc<Shortener>>,
    ) -> impl Responder {
        let code = path.into_inner();
        if code.is_empty() {
            return Self::not_found_response();
        }

        let meta = RequestMeta {
            ip_address: extract_client_ip(&req),
            user_agent: header_string(&req, "user-agent"),
            referer: header_string(&req, "referer"),
        };

        match shortener.resolve(&code, meta).await {
            Ok(target) => HttpResponse::build(StatusCode::TEMPORARY_REDIRECT)
                .insert_header(("Location", target))
                .finish(),
            Err(ResilinkError::NotFound(_)) => {
                trace!("Redirect not found: {}", code);
                Self::not_found_response()
            }
            Err(ResilinkError::CircuitOpen(_)) => HttpResponse::build(
                StatusCode::SERVICE_UNAVAILABLE,
            )
            .insert_header(("Retry-After", "10"))
            .body("Service Unavailable"),
            Err(_) => Self::not_found_response(),
        }
    }

    #[inline]
    fn not_found_response() -> HttpResponse {
        HttpResponse::build(StatusCode::NOT_FOUND)
            .insert_header(("Content-Type", "text/html; charset=utf-8"))
            .insert_header(("Cache-Control", "public, max-age=60"))
            .body("Not Found")
    }
}

fn header_string(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(String::from)
}
