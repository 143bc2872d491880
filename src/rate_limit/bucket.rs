use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// 令牌桶
///
/// 不依赖后台定时任务补充令牌：每次调用时按距上次补充的时间差惰性补充。
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, capacity: f64, refill_rate: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;
    }
}

impl TokenBucket {
    /// 创建一个满桶，`refill_rate` 单位为 令牌/秒
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        let capacity = f64::from(capacity);
        Self {
            capacity,
            refill_rate: refill_rate.max(0.0),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// 尝试消费 `tokens` 个令牌，不足时返回 false 且不扣减
    pub fn consume(&self, tokens: u32) -> bool {
        let mut state = self.state.lock();
        state.refill(self.capacity, self.refill_rate, Instant::now());

        let requested = f64::from(tokens);
        if state.tokens >= requested {
            state.tokens -= requested;
            true
        } else {
            false
        }
    }

    /// 距离可以消费 `tokens` 个令牌还需等待的秒数
    pub fn wait_time(&self, tokens: u32) -> f64 {
        let mut state = self.state.lock();
        state.refill(self.capacity, self.refill_rate, Instant::now());

        let requested = f64::from(tokens);
        if state.tokens >= requested {
            return 0.0;
        }
        if self.refill_rate <= 0.0 {
            return f64::INFINITY;
        }
        (requested - state.tokens) / self.refill_rate
    }

    /// 当前可用令牌数（会先执行一次惰性补充）
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        state.refill(self.capacity, self.refill_rate, Instant::now());
        state.tokens
    }

    /// 空闲超过 `idle` 且已补满的桶可以回收，重建后的新桶与其状态一致
    pub(crate) fn is_reclaimable(&self, idle: Duration) -> bool {
        let state = self.state.lock();
        let now = Instant::now();
        let idle_for = now.saturating_duration_since(state.last_refill);
        if idle_for < idle {
            return false;
        }
        let refilled = state.tokens + idle_for.as_secs_f64() * self.refill_rate;
        refilled >= self.capacity
    }
}
