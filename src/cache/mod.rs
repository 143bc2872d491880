//! Cache-aside 缓存层
//!
//! 只在读路径上查询缓存；写操作成功后由调用方显式失效相关键。
//! 后端不可用或出错时一律降级为直通：读返回未命中，写返回 false，从不向调用方报错。

mod backend;
mod key;

pub use backend::{CacheBackend, CacheError, MemoryBackend, RedisBackend, RedisSettings};
pub use key::{CacheCategory, CacheKey, CacheTtls, KeyArg};

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::config::Config;

pub struct CacheManager {
    backend: Option<Arc<dyn CacheBackend>>,
    ttls: CacheTtls,
}

impl CacheManager {
    pub fn new(backend: Arc<dyn CacheBackend>, ttls: CacheTtls) -> Self {
        Self {
            backend: Some(backend),
            ttls,
        }
    }

    /// 禁用缓存：所有读取都是未命中
    pub fn disabled() -> Self {
        Self {
            backend: None,
            ttls: CacheTtls::default(),
        }
    }

    pub fn in_memory(ttls: CacheTtls) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), ttls)
    }

    /// 按配置创建；Redis 地址非法时记录错误并退化为禁用
    pub fn from_config(config: &Config) -> Self {
        let ttls = CacheTtls::from_config(config);
        if !config.redis_enabled {
            tracing::info!("Caching disabled by configuration");
            return Self {
                backend: None,
                ttls,
            };
        }

        match RedisBackend::new(&RedisSettings::from_config(config)) {
            Ok(backend) => Self::new(Arc::new(backend), ttls),
            Err(e) => {
                tracing::error!(error = %e, "Failed to configure Redis, caching disabled");
                Self {
                    backend: None,
                    ttls,
                }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn ttl(&self, category: CacheCategory) -> Duration {
        self.ttls.ttl(category)
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let backend = self.backend.as_ref()?;

        match backend.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    tracing::debug!(key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => {
                tracing::debug!(key, "Cache miss");
                None
            }
            Err(e) => {
                tracing::error!(key, error = %e, "Cache get error");
                None
            }
        }
    }

    /// 写入缓存；`ttl` 为 `None` 或 0 时不设置过期时间
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool
    where
        T: Serialize + ?Sized,
    {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };

        let serialized = match serde_json::to_string(value) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::error!(key, error = %e, "Cache serialization error");
                return false;
            }
        };

        let ttl = ttl.filter(|ttl| !ttl.is_zero());
        match backend.set(key, serialized, ttl).await {
            Ok(()) => {
                tracing::debug!(key, ttl_secs = ttl.map(|t| t.as_secs()), "Cache set");
                true
            }
            Err(e) => {
                tracing::error!(key, error = %e, "Cache set error");
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };

        match backend.delete(key).await {
            Ok(_) => {
                tracing::debug!(key, "Cache delete");
                true
            }
            Err(e) => {
                tracing::error!(key, error = %e, "Cache delete error");
                false
            }
        }
    }

    /// 删除所有匹配 `pattern`（结尾单个 `*`）的键，返回删除数量
    pub async fn delete_matching(&self, pattern: &str) -> usize {
        let Some(backend) = self.backend.as_ref() else {
            return 0;
        };

        match backend.delete_matching(pattern).await {
            Ok(count) => {
                if count > 0 {
                    tracing::info!(pattern, count, "Cache pattern delete");
                }
                count
            }
            Err(e) => {
                tracing::error!(pattern, error = %e, "Cache pattern delete error");
                0
            }
        }
    }

    /// 未启用缓存视为健康
    pub async fn health(&self) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return true;
        };

        match backend.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Cache health check failed");
                false
            }
        }
    }

    pub async fn close(&self) {
        if let Some(backend) = self.backend.as_ref() {
            backend.close().await;
        }
    }
}
