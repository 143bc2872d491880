//! 进程内限流
//!
//! 每个 (调用方标识, 类别) 对应一个独立的令牌桶，桶在首次使用时按类别配置创建。
//! 限流状态只存在于当前进程，不做跨进程同步。

mod bucket;

pub use bucket::TokenBucket;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::config::Config;
use crate::utils::mask_secret;

/// 限流类别
pub mod category {
    pub const DEFAULT: &str = "default";
    pub const SEARCH: &str = "search";
    pub const CREATE: &str = "create";
}

const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// 单个类别的限额，例如 `100/minute`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub count: u32,
    pub period: Duration,
}

impl RateLimit {
    pub fn per_minute(count: u32) -> Self {
        Self {
            count,
            period: Duration::from_secs(60),
        }
    }

    /// 解析 `count/period` 形式的限额；未知的时间单位按分钟处理
    pub fn parse(spec: &str) -> Option<Self> {
        let (count, period) = spec.split_once('/')?;
        let count = count.trim().parse::<u32>().ok()?;
        let period = match period.trim() {
            "second" => Duration::from_secs(1),
            "hour" => Duration::from_secs(3600),
            _ => Duration::from_secs(60),
        };
        Some(Self { count, period })
    }

    pub fn capacity(&self) -> u32 {
        self.count
    }

    pub fn refill_rate(&self) -> f64 {
        f64::from(self.count) / self.period.as_secs_f64()
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub limits: HashMap<String, RateLimit>,
    /// 空闲超过该时长的桶会被回收
    pub idle_timeout: Duration,
    /// 桶数量达到上限时立即触发一次回收
    pub max_buckets: usize,
}

impl RateLimitConfig {
    pub fn from_config(config: &Config) -> Self {
        let specs = [
            (category::DEFAULT, format!("{}/minute", config.rate_limit_per_minute)),
            (category::SEARCH, format!("{}/minute", config.rate_limit_search_per_minute)),
            (category::CREATE, format!("{}/minute", config.rate_limit_create_per_minute)),
        ];

        let limits = specs
            .iter()
            .filter_map(|(name, spec)| RateLimit::parse(spec).map(|limit| (name.to_string(), limit)))
            .collect();

        Self {
            enabled: config.rate_limit_enabled,
            limits,
            idle_timeout: config.rate_limit_idle_timeout(),
            max_buckets: 10_000,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let limits = [
            (category::DEFAULT, RateLimit::per_minute(100)),
            (category::SEARCH, RateLimit::per_minute(50)),
            (category::CREATE, RateLimit::per_minute(20)),
        ]
        .into_iter()
        .map(|(name, limit)| (name.to_string(), limit))
        .collect();

        Self {
            enabled: true,
            limits,
            idle_timeout: Duration::from_secs(600),
            max_buckets: 10_000,
        }
    }
}

/// 准入结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub wait_seconds: Option<f64>,
}

impl RateLimitDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            wait_seconds: None,
        }
    }

    /// `Retry-After` 的秒数：向上取整，至少 1 秒，缺省 60 秒
    pub fn retry_after_secs(&self) -> u64 {
        match self.wait_seconds {
            Some(wait) if wait.is_finite() => (wait.ceil() as u64).max(1),
            _ => DEFAULT_RETRY_AFTER_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    identifier: String,
    category: String,
}

pub struct RateLimiter {
    enabled: bool,
    limits: HashMap<String, RateLimit>,
    fallback: RateLimit,
    idle_timeout: Duration,
    max_buckets: usize,
    buckets: DashMap<BucketKey, Arc<TokenBucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let fallback = config
            .limits
            .get(category::DEFAULT)
            .copied()
            .unwrap_or_else(|| RateLimit::per_minute(100));

        Self {
            enabled: config.enabled,
            limits: config.limits,
            fallback,
            idle_timeout: config.idle_timeout,
            max_buckets: config.max_buckets,
            buckets: DashMap::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 检查并消费令牌；从不返回错误
    pub fn check(&self, identifier: &str, category: &str, tokens: u32) -> RateLimitDecision {
        if !self.enabled {
            return RateLimitDecision::allowed();
        }

        let bucket = self.bucket(identifier, category);
        if bucket.consume(tokens) {
            return RateLimitDecision::allowed();
        }

        let wait = bucket.wait_time(tokens);
        tracing::warn!(
            identifier = %mask_secret(identifier),
            category,
            wait_time = wait,
            "Rate limit exceeded"
        );

        RateLimitDecision {
            allowed: false,
            wait_seconds: Some(wait),
        }
    }

    fn limit_for(&self, category: &str) -> RateLimit {
        self.limits.get(category).copied().unwrap_or(self.fallback)
    }

    fn bucket(&self, identifier: &str, category: &str) -> Arc<TokenBucket> {
        let key = BucketKey {
            identifier: identifier.to_string(),
            category: category.to_string(),
        };

        if let Some(bucket) = self.buckets.get(&key) {
            return bucket.clone();
        }

        if self.buckets.len() >= self.max_buckets {
            self.evict_idle(self.idle_timeout);
        }

        let limit = self.limit_for(category);
        self.buckets
            .entry(key)
            .or_insert_with(|| {
                tracing::debug!(category, capacity = limit.capacity(), "Creating rate limit bucket");
                Arc::new(TokenBucket::new(limit.capacity(), limit.refill_rate()))
            })
            .clone()
    }

    /// 回收空闲且已补满的桶，返回回收数量
    pub fn evict_idle(&self, idle: Duration) -> usize {
        let mut evicted = 0;
        self.buckets.retain(|_, bucket| {
            let reclaim = bucket.is_reclaimable(idle);
            if reclaim {
                evicted += 1;
            }
            !reclaim
        });

        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.buckets.len(), "Evicted idle rate limit buckets");
        }
        evicted
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(default: u32, search: u32, create: u32) -> RateLimiter {
        let limits = [
            (category::DEFAULT, RateLimit::per_minute(default)),
            (category::SEARCH, RateLimit::per_minute(search)),
            (category::CREATE, RateLimit::per_minute(create)),
        ]
        .into_iter()
        .map(|(name, limit)| (name.to_string(), limit))
        .collect();

        RateLimiter::new(RateLimitConfig {
            limits,
            ..RateLimitConfig::default()
        })
    }

    #[test]
    fn parses_rate_specs() {
        assert_eq!(
            RateLimit::parse("10/second"),
            Some(RateLimit {
                count: 10,
                period: Duration::from_secs(1)
            })
        );
        assert_eq!(RateLimit::parse("100/minute"), Some(RateLimit::per_minute(100)));
        assert_eq!(
            RateLimit::parse("3600/hour").map(|l| l.refill_rate()),
            Some(1.0)
        );
        assert_eq!(RateLimit::parse("7/fortnight"), Some(RateLimit::per_minute(7)));
        assert_eq!(RateLimit::parse("100"), None);
        assert_eq!(RateLimit::parse("many/minute"), None);
    }

    #[test]
    fn retry_after_rounds_up_with_floor_and_default() {
        let decision = |wait| RateLimitDecision {
            allowed: false,
            wait_seconds: wait,
        };
        assert_eq!(decision(Some(0.2)).retry_after_secs(), 1);
        assert_eq!(decision(Some(0.0)).retry_after_secs(), 1);
        assert_eq!(decision(Some(2.01)).retry_after_secs(), 3);
        assert_eq!(decision(None).retry_after_secs(), 60);
        assert_eq!(decision(Some(f64::INFINITY)).retry_after_secs(), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn categories_and_identifiers_are_independent() {
        let limiter = limiter(3, 2, 1);

        assert!(limiter.check("x", category::SEARCH, 1).allowed);
        assert!(limiter.check("x", category::SEARCH, 1).allowed);
        let rejected = limiter.check("x", category::SEARCH, 1);
        assert!(!rejected.allowed);
        assert!(rejected.wait_seconds.is_some_and(|w| w > 0.0));

        assert!(limiter.check("x", category::DEFAULT, 1).allowed);
        assert!(limiter.check("x", category::CREATE, 1).allowed);
        assert!(limiter.check("y", category::SEARCH, 1).allowed);
        assert!(limiter.check("y", category::SEARCH, 1).allowed);

        assert!(!limiter.check("x", category::SEARCH, 1).allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_caller_recovers_after_refill() {
        let limiter = limiter(60, 60, 60);
        for _ in 0..60 {
            assert!(limiter.check("x", category::DEFAULT, 1).allowed);
        }
        let rejected = limiter.check("x", category::DEFAULT, 1);
        assert!(!rejected.allowed);
        assert_eq!(rejected.retry_after_secs(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.check("x", category::DEFAULT, 1).allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_category_uses_default_limit() {
        let limiter = limiter(2, 50, 50);
        assert!(limiter.check("x", "export", 1).allowed);
        assert!(limiter.check("x", "export", 1).allowed);
        assert!(!limiter.check("x", "export", 1).allowed);
        assert!(limiter.check("x", category::DEFAULT, 2).allowed);
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let limiter = RateLimiter::disabled();
        for _ in 0..1_000 {
            let decision = limiter.check("x", category::CREATE, 1);
            assert!(decision.allowed);
            assert_eq!(decision.wait_seconds, None);
        }
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_buckets_are_reclaimed() {
        let limiter = limiter(10, 10, 10);
        assert!(limiter.check("a", category::DEFAULT, 10).allowed);
        assert!(limiter.check("b", category::DEFAULT, 1).allowed);
        assert_eq!(limiter.bucket_count(), 2);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(limiter.evict_idle(Duration::from_secs(60)), 0);

        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(limiter.evict_idle(Duration::from_secs(60)), 2);
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn bucket_cap_triggers_sweep() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_buckets: 2,
            idle_timeout: Duration::from_secs(1),
            ..RateLimitConfig::default()
        });

        limiter.check("a", category::DEFAULT, 1);
        limiter.check("b", category::DEFAULT, 1);
        tokio::time::advance(Duration::from_secs(5)).await;

        limiter.check("c", category::DEFAULT, 1);
        assert_eq!(limiter.bucket_count(), 1);
    }
}
