//! 缓存存储后端

mod memory;
mod redis;

pub use self::memory::MemoryBackend;
pub use self::redis::{RedisBackend, RedisSettings};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("timed out connecting to cache store after {0:?}")]
    ConnectTimeout(Duration),
    #[error("cache store did not answer within {0:?}")]
    CommandTimeout(Duration),
    #[error("cache store unavailable, retrying after cool-down")]
    Unavailable,
    #[error("invalid cache store address: {0}")]
    InvalidAddress(String),
}

/// 键值存储的最小操作集合
///
/// 值均为已经序列化好的 JSON 文本；模式只支持结尾的单个 `*` 通配符。
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// 返回实际删除的键数量
    async fn delete(&self, key: &str) -> Result<usize, CacheError>;

    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;

    /// 释放连接；可重复调用
    async fn close(&self);
}
