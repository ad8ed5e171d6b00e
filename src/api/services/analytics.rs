//! 点击分析查询

use std::sync::Arc;

use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::analytics::ClickEvent;
use crate::api::services::error_body;
use crate::service::Shortener;

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub clicks: Vec<ClickEvent>,
}

pub struct AnalyticsService {}

impl AnalyticsService {
    pub async fn get_analytics(
        path: web::Path<String>,
        query: web::Query<AnalyticsQuery>,
        shortener: web::Data<Arc<Shortener>>,
    ) -> impl Responder {
        let code = path.into_inner();
        match shortener.analytics(&code, query.limit, query.offset).await {
            Ok(clicks) => HttpResponse::Ok().json(AnalyticsResponse { clicks }),
            Err(e) => {
                error!("Analytics query failed for {}: {}", code, e);
                HttpResponse::InternalServerError().json(error_body(&e))
            }
        }
    }
}
