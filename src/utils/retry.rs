//! 指数退避重试

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// 重试策略：最多尝试 `attempts` 次，第 n 次失败后等待 `base_delay * 2^(n-1)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    /// 只尝试一次
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

/// 按策略重试异步操作，所有错误都视为可重试
pub async fn retry_async<T, E, F, Fut>(policy: RetryPolicy, label: &str, op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_async_if(policy, label, |_| true, op).await
}

/// 按策略重试异步操作，`should_retry` 返回 false 的错误立即返回
pub async fn retry_async_if<T, E, F, Fut, P>(
    policy: RetryPolicy,
    label: &str,
    should_retry: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.attempts && should_retry(&e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "⚠️ {} 第 {}/{} 次失败: {}，{:?} 后重试",
                    label, attempt, policy.attempts, e, delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
