//! 创建短链接

use std::sync::Arc;

use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::api::services::error_body;
use crate::errors::ResilinkError;
use crate::service::{CreateRequest, Shortener};

#[derive(Debug, Deserialize)]
pub struct ShortenRequest {
    pub url: String,
    #[serde(default)]
    pub custom_code: Option<String>,
    #[serde(default)]
    pub ttl_minutes: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ShortenResponse {
    pub short_url: String,
}

pub struct LinkService {}

impl LinkService {
    pub async fn post_shorten(
        payload: web::Json<ShortenRequest>,
        shortener: web::Data<Arc<Shortener>>,
    ) -> impl Responder {
        let request = payload.into_inner();
        match shortener
            .create(CreateRequest {
                url: request.url,
                custom_code: request.custom_code,
                ttl_minutes: request.ttl_minutes,
            })
            .await
        {
            Ok(short_url) => HttpResponse::Created().json(ShortenResponse { short_url }),
            Err(e @ (ResilinkError::Validation(_) | ResilinkError::DuplicateCode(_))) => {
                HttpResponse::BadRequest().json(error_body(&e))
            }
            Err(e @ ResilinkError::CircuitOpen(_)) => {
                HttpResponse::ServiceUnavailable().json(error_body(&e))
            }
            Err(e) => {
                error!("Shorten request failed: {}", e);
                HttpResponse::InternalServerError().json(error_body(&e))
            }
        }
    }
}
