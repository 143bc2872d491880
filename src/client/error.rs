use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::utils::truncate_chars;

/// 错误中保留的响应体最大长度（字符）
pub const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum MaximoError {
    #[error("Authentication failed: {message}")]
    Authentication { status: u16, message: String, body: String },

    #[error("Resource not found: {message}")]
    NotFound { status: u16, message: String, body: String },

    #[error("Validation error: {message}")]
    Validation { status: u16, message: String, body: String },

    #[error("Maximo API error ({status}): {message}")]
    Api { status: u16, message: String, body: String },

    #[error("Request timeout after {}s", .timeout.as_secs_f64())]
    Timeout {
        timeout: Duration,
        #[source]
        source: reqwest::Error,
    },

    #[error("Network error connecting to Maximo: {0}")]
    Connection(#[source] reqwest::Error),

    #[error("Failed to decode Maximo response: {0}")]
    Decode(String),

    #[error("Invalid Maximo URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{0}")]
    Internal(String),
}

impl MaximoError {
    /// 将非 2xx 响应映射为对应的错误类型
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = extract_message(body).unwrap_or_else(|| body.to_string());
        let body = truncate_chars(body, MAX_ERROR_BODY_CHARS);

        match status {
            401 => MaximoError::Authentication { status, message, body },
            404 => MaximoError::NotFound { status, message, body },
            400 => MaximoError::Validation { status, message, body },
            _ => MaximoError::Api { status, message, body },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        MaximoError::NotFound {
            status: 404,
            message: message.into(),
            body: String::new(),
        }
    }

    pub fn from_transport(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            MaximoError::Timeout {
                timeout,
                source: error,
            }
        } else if error.is_connect() || error.is_request() || error.is_body() {
            MaximoError::Connection(error)
        } else if error.is_decode() {
            MaximoError::Decode(error.to_string())
        } else {
            MaximoError::Internal(format!("Unexpected error: {error}"))
        }
    }

    /// 只有超时与连接失败可以重试
    pub fn is_transient(&self) -> bool {
        matches!(self, MaximoError::Timeout { .. } | MaximoError::Connection(_))
    }

    /// 下游返回的 HTTP 状态码
    pub fn status(&self) -> Option<u16> {
        match self {
            MaximoError::Authentication { status, .. }
            | MaximoError::NotFound { status, .. }
            | MaximoError::Validation { status, .. }
            | MaximoError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 下游返回的错误消息（仅下游错误有值）
    pub fn downstream_message(&self) -> Option<&str> {
        match self {
            MaximoError::Authentication { message, .. }
            | MaximoError::NotFound { message, .. }
            | MaximoError::Validation { message, .. }
            | MaximoError::Api { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Maximo 的错误体形如 `{"Error": {"message": "..."}}`
fn extract_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("Error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}
