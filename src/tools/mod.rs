//! 面向调用方的工具实现
//!
//! 每个工具按固定顺序组合各层：限流准入、缓存读取（仅读操作）、
//! 下游调用、写操作成功后的缓存失效。

pub mod asset;
pub mod filter;
pub mod inventory;
pub mod user;
pub mod workorder;

use std::future::Future;

use reqwest::header::HeaderMap;
use serde_json::{Map, Value};

use crate::AppState;
use crate::cache::{CacheCategory, CacheKey};
use crate::client::MaximoError;
use crate::error::AppError;
use crate::utils::mask_secret;

/// 单次工具调用的上下文
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// 限流标识：API key 或客户端地址
    pub identifier: String,
    /// 需要透传给下游的请求头（例如 `maxauth`）
    pub headers: HeaderMap,
}

impl ToolContext {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            headers: HeaderMap::new(),
        }
    }

    pub fn forwarded_headers(&self) -> Option<&HeaderMap> {
        if self.headers.is_empty() {
            None
        } else {
            Some(&self.headers)
        }
    }
}

/// 限流准入，拒绝时返回带重试时间的错误
pub(crate) fn admit(state: &AppState, ctx: &ToolContext, category: &str) -> Result<(), AppError> {
    let decision = state.rate_limiter.check(&ctx.identifier, category, 1);
    if decision.allowed {
        return Ok(());
    }

    tracing::info!(
        identifier = %mask_secret(&ctx.identifier),
        category,
        "Tool call throttled"
    );
    Err(AppError::RateLimited {
        retry_after: decision.retry_after_secs(),
    })
}

/// cache-aside 读取：命中直接返回，未命中时调用 `fetch` 并回填
pub(crate) async fn read_through<F, Fut>(
    state: &AppState,
    key: &str,
    category: CacheCategory,
    fetch: F,
) -> Result<Value, AppError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, MaximoError>>,
{
    if let Some(value) = state.cache.get(key).await {
        return Ok(value);
    }

    let value = fetch().await?;
    state
        .cache
        .set(key, &value, Some(state.cache.ttl(category)))
        .await;
    Ok(value)
}

/// 写操作成功后清理：精确键、该记录的全部变体、整个搜索命名空间
pub(crate) async fn invalidate(state: &AppState, get_op: &str, id: &str, search_op: &str) {
    state.cache.delete(&CacheKey::new(get_op).arg(id).build()).await;
    state
        .cache
        .delete_matching(&CacheKey::variants(get_op, id))
        .await;
    state.cache.delete_matching(&CacheKey::all(search_op)).await;
}

/// 新建记录时编号可能由下游生成，只能确定搜索结果已过期
pub(crate) async fn invalidate_search(state: &AppState, search_op: &str) {
    state.cache.delete_matching(&CacheKey::all(search_op)).await;
}

/// 取出集合响应中的 `member` 数组
pub(crate) fn members(response: Value) -> Vec<Value> {
    match response {
        Value::Object(mut map) => match map.remove("member") {
            Some(Value::Array(members)) => members,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// 单条查询：`member` 为空视为 404
pub(crate) fn first_member(response: Value, not_found: impl FnOnce() -> String) -> Result<Value, MaximoError> {
    members(response)
        .into_iter()
        .next()
        .ok_or_else(|| MaximoError::not_found(not_found()))
}

/// 记录的资源 id：`_id`，其次是实体自己的 id 字段，最后取 `href` 的末段
pub(crate) fn record_id(record: &Value, id_field: &str) -> Option<String> {
    let scalar = |value: &Value| match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };

    record
        .get("_id")
        .and_then(scalar)
        .or_else(|| record.get(id_field).and_then(scalar))
        .or_else(|| {
            record
                .get("href")
                .and_then(Value::as_str)
                .and_then(|href| href.trim_end_matches('/').rsplit('/').next())
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
        })
}

pub(crate) fn resolve_id(record: &Value, id_field: &str, label: &str) -> Result<String, MaximoError> {
    record_id(record, id_field)
        .ok_or_else(|| MaximoError::Internal(format!("Cannot determine {label} id")))
}

/// 构造请求体，跳过值为空的可选字段
pub(crate) fn body<I>(fields: I) -> Value
where
    I: IntoIterator<Item = (&'static str, Option<Value>)>,
{
    let map: Map<String, Value> = fields
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
        .collect();
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn record_id_prefers_internal_id() {
        let record = json!({"_id": "12", "assetuid": 99, "href": "http://x/oslc/os/mxapiasset/77"});
        assert_eq!(record_id(&record, "assetuid").as_deref(), Some("12"));

        let record = json!({"assetuid": 99, "href": "http://x/oslc/os/mxapiasset/77"});
        assert_eq!(record_id(&record, "assetuid").as_deref(), Some("99"));

        let record = json!({"href": "http://x/oslc/os/mxuser/_TUFYQURNSU4-/"});
        assert_eq!(record_id(&record, "maxuserid").as_deref(), Some("_TUFYQURNSU4-"));

        assert_eq!(record_id(&json!({"assetnum": "A1"}), "assetuid"), None);
    }

    #[test]
    fn first_member_or_not_found() {
        let found = first_member(json!({"member": [{"a": 1}, {"a": 2}]}), || "x".into()).unwrap();
        assert_eq!(found, json!({"a": 1}));

        let err = first_member(json!({"member": []}), || "Asset not found: A1".into()).unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.downstream_message(), Some("Asset not found: A1"));

        assert!(first_member(Value::Null, String::new).is_err());
    }

    #[test]
    fn body_skips_absent_fields() {
        let value = body([
            ("status", Some(json!("ACTIVE"))),
            ("memo", None),
            ("priority", Some(json!(2))),
        ]);
        assert_eq!(value, json!({"status": "ACTIVE", "priority": 2}));
    }
}
