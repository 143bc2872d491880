use std::sync::Arc;

use client::{MaximoClient, MaximoClientConfig, MaximoError};
use config::Config;

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod tools;
pub mod utils;

use cache::CacheManager;
use rate_limit::{RateLimitConfig, RateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub client: Arc<MaximoClient>,
    pub cache: Arc<CacheManager>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn from_config(config: Config) -> Result<Self, MaximoError> {
        let client = MaximoClient::new(MaximoClientConfig::from_config(&config))?;
        let cache = CacheManager::from_config(&config);
        let rate_limiter = RateLimiter::new(RateLimitConfig::from_config(&config));

        Ok(Self {
            config: Arc::new(config),
            client: Arc::new(client),
            cache: Arc::new(cache),
            rate_limiter: Arc::new(rate_limiter),
        })
    }

    /// 关闭缓存连接与下游连接池
    pub async fn shutdown(&self) {
        self.cache.close().await;
        self.client.close();
    }
}
