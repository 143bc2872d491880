use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

fn incoming_id(request: &Request<Body>) -> Option<String> {
    [CORRELATION_ID_HEADER, REQUEST_ID_HEADER]
        .into_iter()
        .filter_map(|name| request.headers().get(name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// 复用调用方的关联 id 或生成新的 UUID，记录在请求 span 上并回写到响应头
pub async fn correlation_id(mut request: Request<Body>, next: Next) -> Response {
    let id = incoming_id(&request).unwrap_or_else(|| Uuid::new_v4().to_string());
    let span = tracing::info_span!(
        "request",
        correlation_id = %id,
        method = %request.method(),
        path = %request.uri().path()
    );

    request.extensions_mut().insert(CorrelationId(id.clone()));

    let mut response = async move {
        tracing::info!("Incoming request");
        next.run(request).await
    }
    .instrument(span)
    .await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}
