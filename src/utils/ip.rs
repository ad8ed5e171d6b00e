//! 客户端 IP 提取
//!
//! 优先使用 X-Forwarded-For / X-Real-IP，退化到连接对端地址。

use actix_web::HttpRequest;

pub fn extract_client_ip(req: &HttpRequest) -> Option<String> {
    extract_forwarded_ip(req).or_else(|| {
        req.connection_info()
            .peer_addr()
            .map(|addr| addr.to_string())
    })
}

/// 从请求头提取转发的 IP（X-Forwarded-For 或 X-Real-IP）
fn extract_forwarded_ip(req: &HttpRequest) -> Option<String> {
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
    {
        // X-Forwarded-For 可能是逗号分隔的链，取最左端的原始客户端
        if let Some(first) = value.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }

    req.headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
