use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{HeaderMap, HeaderName, Request, request::Parts},
    middleware::Next,
    response::Response,
};

use super::auth::{Principal, extract_api_key};
use crate::{AppState, error::AppError, rate_limit::category, tools::ToolContext};

/// 需要原样透传给下游的请求头
const FORWARDED_HEADERS: [&str; 1] = ["maxauth"];

/// 限流标识：已认证的 API key，否则使用客户端地址
pub fn rate_limit_identifier(parts: &Parts) -> String {
    match parts.extensions.get::<Principal>() {
        Some(principal) => principal.api_key.clone(),
        None => client_ip(parts),
    }
}

/// 代理头优先，其次是连接的对端地址
pub fn client_ip(parts: &Parts) -> String {
    let remote_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    parts
        .headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .filter(|ip| !ip.trim().is_empty())
        .or_else(|| {
            parts
                .headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip.as_deref())
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

/// 认证之前的准入检查：未持有有效 API key 的请求按客户端地址计入默认类别
///
/// 持有有效 key 的调用在工具内部按 key 计数，这里直接放行。
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let authenticated = extract_api_key(request.headers())
        .is_some_and(|key| key == state.config.gateway_api_key);
    if authenticated {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();
    let ip = client_ip(&parts);
    let decision = state.rate_limiter.check(&ip, category::DEFAULT, 1);
    if !decision.allowed {
        tracing::info!(client_ip = %ip, path = %parts.uri.path(), "Unauthenticated request throttled");
        return Err(AppError::RateLimited {
            retry_after: decision.retry_after_secs(),
        });
    }

    Ok(next.run(Request::from_parts(parts, body)).await)
}

fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::new();
    for name in FORWARDED_HEADERS {
        if let Some(value) = headers.get(name) {
            forwarded.insert(HeaderName::from_static(name), value.clone());
        }
    }
    forwarded
}

impl<S> FromRequestParts<S> for ToolContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ToolContext {
            identifier: rate_limit_identifier(parts),
            headers: forwarded_headers(&parts.headers),
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn prefers_proxy_headers_then_peer_address() {
        let p = parts(Request::builder().header("x-real-ip", "10.0.0.7"));
        assert_eq!(client_ip(&p), "10.0.0.7");

        let p = parts(Request::builder().header("x-forwarded-for", " , 203.0.113.9, 10.0.0.1"));
        assert_eq!(client_ip(&p), "203.0.113.9");

        let mut p = parts(Request::builder());
        p.extensions
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 20], 5555))));
        assert_eq!(client_ip(&p), "192.168.1.20");

        assert_eq!(client_ip(&parts(Request::builder())), "unknown");
    }

    #[test]
    fn authenticated_key_wins_over_address() {
        let mut p = parts(Request::builder().header("x-real-ip", "10.0.0.7"));
        p.extensions.insert(Principal {
            api_key: "gateway-key".into(),
        });
        assert_eq!(rate_limit_identifier(&p), "gateway-key");
    }

    #[tokio::test]
    async fn context_forwards_only_maxauth() {
        let mut p = parts(
            Request::builder()
                .header("maxauth", "bWF4YWRtaW4=")
                .header("cookie", "session=1"),
        );
        let ctx = ToolContext::from_request_parts(&mut p, &()).await.unwrap();
        assert_eq!(ctx.identifier, "unknown");
        assert_eq!(ctx.headers.len(), 1);
        assert_eq!(ctx.headers["maxauth"], "bWF4YWRtaW4=");
    }
}
