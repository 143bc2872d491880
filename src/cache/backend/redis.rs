use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::RwLock;
use tokio::time::Instant;
use url::Url;

use super::{CacheBackend, CacheError};
use crate::config::Config;

const SCAN_BATCH: usize = 100;

#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    /// 单条命令等待响应的上限
    pub command_timeout: Duration,
    /// 连接失败后暂停访问的时长，期间所有操作直接返回错误
    pub retry_cooldown: Duration,
}

impl RedisSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.redis_host.clone(),
            port: config.redis_port,
            db: config.redis_db,
            password: config.redis_password.clone(),
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(2),
            retry_cooldown: Duration::from_secs(30),
        }
    }

    pub fn url(&self) -> Result<Url, CacheError> {
        let mut url = Url::parse(&format!("redis://{}:{}/{}", self.host, self.port, self.db))
            .map_err(|e| CacheError::InvalidAddress(e.to_string()))?;
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| CacheError::InvalidAddress("cannot set password".into()))?;
        }
        Ok(url)
    }
}

/// 把结尾单个 `*` 的模式转换成 Redis glob，其余位置的通配字符按字面匹配
fn glob_pattern(pattern: &str) -> String {
    let (literal, wildcard) = match pattern.strip_suffix('*') {
        Some(prefix) => (prefix, true),
        None => (pattern, false),
    };

    let mut glob = String::with_capacity(pattern.len() + 8);
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            glob.push('\\');
        }
        glob.push(c);
    }
    if wildcard {
        glob.push('*');
    }
    glob
}

/// Redis 后端
///
/// 多路复用连接在第一次使用时建立，之后所有请求共享。
/// 连接失败或命令超时后丢弃连接，并在冷却期结束前拒绝访问，冷却结束后的下一次调用重新建立连接。
pub struct RedisBackend {
    client: redis::Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    connect_timeout: Duration,
    command_timeout: Duration,
    retry_cooldown: Duration,
    unavailable_until: Mutex<Option<Instant>>,
}

impl RedisBackend {
    pub fn new(settings: &RedisSettings) -> Result<Self, CacheError> {
        let client = redis::Client::open(settings.url()?.as_str())?;
        Ok(Self {
            client,
            connection: RwLock::new(None),
            connect_timeout: settings.connect_timeout,
            command_timeout: settings.command_timeout,
            retry_cooldown: settings.retry_cooldown,
            unavailable_until: Mutex::new(None),
        })
    }

    fn check_cooldown(&self) -> Result<(), CacheError> {
        let mut until = self.unavailable_until.lock();
        match *until {
            Some(deadline) if Instant::now() < deadline => Err(CacheError::Unavailable),
            Some(_) => {
                *until = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn mark_unavailable(&self) {
        self.connection.write().await.take();
        if self.retry_cooldown.is_zero() {
            return;
        }
        *self.unavailable_until.lock() = Some(Instant::now() + self.retry_cooldown);
        tracing::warn!(
            cooldown_secs = self.retry_cooldown.as_secs(),
            "Redis unavailable, bypassing cache"
        );
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        self.check_cooldown()?;

        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut guard = self.connection.write().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let connected = match tokio::time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(err)) => Err(CacheError::from(err)),
            Err(_) => Err(CacheError::ConnectTimeout(self.connect_timeout)),
        };

        match connected {
            Ok(conn) => {
                tracing::info!("Redis connection established");
                *guard = Some(conn.clone());
                Ok(conn)
            }
            Err(err) => {
                drop(guard);
                self.mark_unavailable().await;
                Err(err)
            }
        }
    }

    /// 为单条命令加上响应超时；连接级错误时丢弃共享连接并进入冷却
    async fn run<T, F>(&self, command: F) -> Result<T, CacheError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, command).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
                    self.mark_unavailable().await;
                }
                Err(err.into())
            }
            Err(_) => {
                self.mark_unavailable().await;
                Err(CacheError::CommandTimeout(self.command_timeout))
            }
        }
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        self.run(conn.get(key)).await
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        match ttl {
            Some(ttl) => self.run(conn.set_ex(key, value, ttl.as_secs().max(1))).await,
            None => self.run(conn.set(key, value)).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<usize, CacheError> {
        let mut conn = self.connection().await?;
        self.run(conn.del(key)).await
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        let mut conn = self.connection().await?;
        let glob = glob_pattern(pattern);

        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let mut scan = redis::cmd("SCAN");
            scan.arg(cursor)
                .arg("MATCH")
                .arg(&glob)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next, batch): (u64, Vec<String>) = self.run(scan.query_async(&mut conn)).await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        if keys.is_empty() {
            return Ok(0);
        }

        keys.sort();
        keys.dedup();
        self.run(conn.del(keys)).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: String = self.run(redis::cmd("PING").query_async(&mut conn)).await?;
        Ok(())
    }

    async fn close(&self) {
        if self.connection.write().await.take().is_some() {
            tracing::info!("Redis connection closed");
        }
    }
}
