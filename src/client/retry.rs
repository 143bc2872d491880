//! 指数退避重试

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::MaximoError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 总尝试次数（包含第一次）
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// 第 `attempt` 次失败（从 0 开始）之后的等待时间
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay.as_secs_f64();
        let delay = base * self.config.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay.min(self.config.max_delay.as_secs_f64()))
    }

    /// 执行操作，仅在瞬时错误时重试；用尽次数后原样返回最后一次的错误
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, MaximoError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MaximoError>>,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(attempt = attempt + 1, "Retry succeeded");
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !error.is_transient() || attempt + 1 >= attempts {
                        return Err(error);
                    }

                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying Maximo request after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
