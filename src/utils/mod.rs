use axum::Json;
use serde::Serialize;

// 统一响应结构
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resp_data: Option<T>,
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: error_codes::SUCCESS,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

/// 日志中只保留凭据的前 8 个字符
pub fn mask_secret(value: &str) -> String {
    let prefix: String = value.chars().take(8).collect();
    if prefix.len() < value.len() {
        format!("{prefix}…")
    } else {
        prefix
    }
}

/// 按字符截断，避免切断多字节字符
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const AUTH_FAILED: i32 = 1002;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const UPSTREAM_ERROR: i32 = 5002;
    pub const UPSTREAM_UNAVAILABLE: i32 = 5003;
    pub const UPSTREAM_TIMEOUT: i32 = 5004;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_long_secrets_only() {
        assert_eq!(mask_secret("abcdefghijkl"), "abcdefgh…");
        assert_eq!(mask_secret("short"), "short");
        assert_eq!(mask_secret(""), "");
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("设备编号错误", 2), "设备");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
