//! Maximo REST 客户端
//!
//! 共享连接池、有界重试，并把下游状态码映射为稳定的错误类型。

mod error;
mod retry;

pub use error::{MAX_ERROR_BODY_CHARS, MaximoError};
pub use retry::{RetryConfig, RetryPolicy};

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;
use tokio::sync::Semaphore;
use url::Url;

use crate::config::Config;

pub const WHOAMI_PATH: &str = "/oslc/whoami";

/// 下游请求使用的凭据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Credential {
    /// `apikey` 头，普通业务接口使用
    #[default]
    ApiKey,
    /// `maxauth` 头，只用于 whoami 探活
    MaxAuth,
}

#[derive(Debug, Clone)]
pub struct MaximoClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub maxauth: String,
    pub timeout: Duration,
    pub retry: RetryConfig,
    /// 同时在途的请求上限
    pub max_connections: usize,
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
}

impl MaximoClientConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.maximo_api_url.clone(),
            api_key: config.maximo_api_key.clone(),
            maxauth: config.maximo_maxauth.clone(),
            timeout: config.maximo_timeout(),
            retry: RetryConfig {
                max_attempts: config.maximo_max_retries,
                ..RetryConfig::default()
            },
            ..Self::default()
        }
    }
}

impl Default for MaximoClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            maxauth: String::new(),
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            max_connections: 50,
            max_idle_per_host: 10,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// 一次下游调用的完整描述
#[derive(Debug, Clone)]
pub struct DownstreamRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: HeaderMap,
    pub credential: Credential,
}

impl DownstreamRequest {
    fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
            credential: Credential::ApiKey,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str, body: Value) -> Self {
        Self::new(Method::POST, path).body(body)
    }

    pub fn patch(path: &str, body: Value) -> Self {
        Self::new(Method::PATCH, path).body(body)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// 附加请求头，覆盖同名的默认头
    pub fn headers(mut self, headers: &HeaderMap) -> Self {
        for (name, value) in headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }
}

pub struct MaximoClient {
    base_url: Url,
    api_key: String,
    maxauth: String,
    timeout: Duration,
    max_idle_per_host: usize,
    idle_timeout: Duration,
    retry: RetryPolicy,
    http: RwLock<Option<reqwest::Client>>,
    permits: Arc<Semaphore>,
}

impl MaximoClient {
    pub fn new(config: MaximoClientConfig) -> Result<Self, MaximoError> {
        // 基础地址以 / 结尾，相对路径才能正确拼接
        let base_url = Url::parse(&format!("{}/", config.base_url.trim_end_matches('/')))?;

        Ok(Self {
            base_url,
            api_key: config.api_key,
            maxauth: config.maxauth,
            timeout: config.timeout,
            max_idle_per_host: config.max_idle_per_host,
            idle_timeout: config.idle_timeout,
            retry: RetryPolicy::new(config.retry),
            http: RwLock::new(None),
            permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// 获取共享的 HTTP 客户端，首次调用或关闭后重新创建
    fn http_client(&self) -> Result<reqwest::Client, MaximoError> {
        if let Some(client) = self.http.read().as_ref() {
            return Ok(client.clone());
        }

        let mut guard = self.http.write();
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(self.max_idle_per_host)
            .pool_idle_timeout(self.idle_timeout)
            .build()
            .map_err(|e| MaximoError::Internal(format!("Failed to build HTTP client: {e}")))?;

        tracing::debug!(base_url = %self.base_url, "Maximo HTTP client created");
        *guard = Some(client.clone());
        Ok(client)
    }

    pub fn build_url(&self, path: &str) -> Result<Url, MaximoError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn build_headers(&self, request: &DownstreamRequest) -> Result<HeaderMap, MaximoError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let (name, secret) = match request.credential {
            Credential::ApiKey => ("apikey", &self.api_key),
            Credential::MaxAuth => ("maxauth", &self.maxauth),
        };
        let value = HeaderValue::from_str(secret)
            .map_err(|_| MaximoError::Internal(format!("Invalid {name} credential header")))?;
        headers.insert(HeaderName::from_static(name), value);

        if request.method == Method::PATCH {
            headers.insert(
                HeaderName::from_static("x-method-override"),
                HeaderValue::from_static("PATCH"),
            );
            headers.insert(
                HeaderName::from_static("patchtype"),
                HeaderValue::from_static("MERGE"),
            );
        }

        for (name, value) in &request.headers {
            headers.insert(name.clone(), value.clone());
        }
        Ok(headers)
    }

    /// 发送请求；DELETE 只尝试一次，其余方法在瞬时错误时按策略重试
    pub async fn send(&self, request: &DownstreamRequest) -> Result<Value, MaximoError> {
        let url = self.build_url(&request.path)?;
        let headers = self.build_headers(request)?;

        tracing::debug!(
            method = %request.method,
            url = %url,
            auth_type = ?request.credential,
            "Maximo request"
        );

        if request.method == Method::DELETE {
            return self.execute_once(request, &url, &headers).await;
        }

        let url = &url;
        let headers = &headers;
        self.retry
            .execute(move || self.execute_once(request, url, headers))
            .await
    }

    async fn execute_once(
        &self,
        request: &DownstreamRequest,
        url: &Url,
        headers: &HeaderMap,
    ) -> Result<Value, MaximoError> {
        let http = self.http_client()?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| MaximoError::Internal("Connection pool closed".into()))?;

        let mut builder = http
            .request(request.method.clone(), url.clone())
            .headers(headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(|e| {
            let error = MaximoError::from_transport(e, self.timeout);
            tracing::error!(method = %request.method, url = %url, error = %error, "Maximo request failed");
            error
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MaximoError::from_transport(e, self.timeout))?;

        if !status.is_success() {
            let error = MaximoError::from_response(status.as_u16(), &body);
            tracing::error!(
                method = %request.method,
                url = %url,
                status_code = status.as_u16(),
                response_body = %crate::utils::truncate_chars(&body, MAX_ERROR_BODY_CHARS),
                "Maximo API error"
            );
            return Err(error);
        }

        tracing::info!(
            method = %request.method,
            url = %url,
            status_code = status.as_u16(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Maximo request succeeded"
        );

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| MaximoError::Decode(e.to_string()))
    }

    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
        headers: Option<&HeaderMap>,
    ) -> Result<Value, MaximoError> {
        let mut request = DownstreamRequest::get(path)
            .query(query.iter().map(|(k, v)| (k.to_string(), v.clone())));
        if let Some(headers) = headers {
            request = request.headers(headers);
        }
        self.send(&request).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: Value,
        headers: Option<&HeaderMap>,
    ) -> Result<Value, MaximoError> {
        let mut request = DownstreamRequest::post(path, body);
        if let Some(headers) = headers {
            request = request.headers(headers);
        }
        self.send(&request).await
    }

    pub async fn patch(
        &self,
        path: &str,
        body: Value,
        headers: Option<&HeaderMap>,
    ) -> Result<Value, MaximoError> {
        let mut request = DownstreamRequest::patch(path, body);
        if let Some(headers) = headers {
            request = request.headers(headers);
        }
        self.send(&request).await
    }

    pub async fn delete(&self, path: &str, headers: Option<&HeaderMap>) -> Result<(), MaximoError> {
        let mut request = DownstreamRequest::delete(path);
        if let Some(headers) = headers {
            request = request.headers(headers);
        }
        self.send(&request).await.map(|_| ())
    }

    /// 使用 maxauth 凭据访问 whoami；任何失败都返回 false
    pub async fn health_check(&self) -> bool {
        let request = DownstreamRequest::get(WHOAMI_PATH).credential(Credential::MaxAuth);
        match self.send(&request).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "Maximo health check failed");
                false
            }
        }
    }

    /// 释放连接池；未初始化或重复调用都是安全的
    pub fn close(&self) {
        if self.http.write().take().is_some() {
            tracing::info!("Maximo API client closed");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.http.read().is_some()
    }
}
