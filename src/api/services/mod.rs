pub mod analytics;
pub mod health;
pub mod links;
pub mod redirect;

use serde_json::{Value, json};

use crate::errors::ResilinkError;

/// 统一的错误响应体
pub fn error_body(error: &ResilinkError) -> Value {
    json!({
        "code": error.code(),
        "error": error.error_type(),
        "message": error.message(),
    })
}
