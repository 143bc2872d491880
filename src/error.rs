use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::client::MaximoError;
use crate::utils::{error_codes, error_to_api_response};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Maximo(#[from] MaximoError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Maximo(e) => match e {
                MaximoError::Authentication { .. } => StatusCode::UNAUTHORIZED,
                MaximoError::NotFound { .. } => StatusCode::NOT_FOUND,
                MaximoError::Validation { .. } => StatusCode::BAD_REQUEST,
                MaximoError::Api { .. } | MaximoError::Decode(_) => StatusCode::BAD_GATEWAY,
                MaximoError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                MaximoError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
                MaximoError::InvalidUrl(_) | MaximoError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn error_code(&self) -> i32 {
        match self.status_code() {
            StatusCode::UNAUTHORIZED => error_codes::AUTH_FAILED,
            StatusCode::TOO_MANY_REQUESTS => error_codes::RATE_LIMIT,
            StatusCode::BAD_REQUEST => error_codes::VALIDATION_ERROR,
            StatusCode::NOT_FOUND => error_codes::NOT_FOUND,
            StatusCode::BAD_GATEWAY => error_codes::UPSTREAM_ERROR,
            StatusCode::SERVICE_UNAVAILABLE => error_codes::UPSTREAM_UNAVAILABLE,
            StatusCode::GATEWAY_TIMEOUT => error_codes::UPSTREAM_TIMEOUT,
            _ => error_codes::INTERNAL_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = error_to_api_response::<()>(self.error_code(), self.to_string());
        let mut response = (status, body).into_response();

        match &self {
            AppError::RateLimited { retry_after } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after));
            }
            AppError::Unauthorized(_) => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            _ => {}
        }

        response
    }
}
