use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};

use crate::{AppState, error::AppError, utils::mask_secret};

/// 通过校验的调用方，放入请求扩展供后续提取
#[derive(Debug, Clone)]
pub struct Principal {
    pub api_key: String,
}

/// 先读 `Authorization`（`Bearer <key>` 或裸值），再读 `X-API-Key`
pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    let from_authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
        .filter(|key| !key.is_empty());

    from_authorization
        .or_else(|| {
            headers
                .get("x-api-key")
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|key| !key.is_empty())
        })
        .map(str::to_string)
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(api_key) = extract_api_key(request.headers()) else {
        tracing::warn!("Missing API key in request");
        return Err(AppError::Unauthorized("Missing API key".into()));
    };

    if api_key != state.config.gateway_api_key {
        tracing::warn!(api_key_prefix = %mask_secret(&api_key), "Invalid API key attempt");
        return Err(AppError::Unauthorized("Invalid API key".into()));
    }

    tracing::debug!("API key validated");
    request.extensions_mut().insert(Principal { api_key });
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn bearer_raw_and_fallback_header() {
        assert_eq!(
            extract_api_key(&headers(&[("authorization", "Bearer abc")])).as_deref(),
            Some("abc")
        );
        assert_eq!(
            extract_api_key(&headers(&[("authorization", "abc")])).as_deref(),
            Some("abc")
        );
        assert_eq!(
            extract_api_key(&headers(&[("x-api-key", "xyz")])).as_deref(),
            Some("xyz")
        );
        assert_eq!(
            extract_api_key(&headers(&[("authorization", "Bearer one"), ("x-api-key", "two")]))
                .as_deref(),
            Some("one")
        );
        assert_eq!(extract_api_key(&headers(&[("authorization", "Bearer ")])), None);
        assert_eq!(extract_api_key(&HeaderMap::new()), None);
    }
}
