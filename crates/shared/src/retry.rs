//! 指数退避重试
//!
//! 只用于可以安全重复执行的操作：补偿冲正（无条件加积分）、启动时等待数据库就绪。
//! 扣减类操作不可重试，是否重试由调用方传入的判定函数决定。

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

/// 重试策略
///
/// 第 n 次重试前等待 `initial_delay * multiplier^n`，不超过 `max_delay`。
/// 配置中的时长以毫秒为单位。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// 首次执行之外的最多重试次数
    pub max_retries: u32,
    #[serde(deserialize_with = "duration_from_millis")]
    pub initial_delay: Duration,
    #[serde(deserialize_with = "duration_from_millis")]
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 不重试，失败立即返回
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// 第 attempt 次重试（从 0 开始）前的等待时间
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// 全部重试的等待序列，长度等于 max_retries
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }

    /// 最坏情况下所有退避时间之和
    pub fn total_backoff(&self) -> Duration {
        self.delays().sum()
    }
}

fn duration_from_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// 按策略执行异步操作
///
/// `is_retryable` 返回 false 的错误立即返回；重试耗尽后返回最后一次的错误。
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut delays = policy.delays();
    let mut retries: u32 = 0;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    info!(operation = operation_name, retries, "重试后成功");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            warn!(operation = operation_name, error = %err, "不可重试的错误");
            return Err(err);
        }

        let Some(delay) = delays.next() else {
            warn!(
                operation = operation_name,
                retries,
                error = %err,
                "重试次数已用尽"
            );
            return Err(err);
        };

        warn!(
            operation = operation_name,
            retry = retries + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "操作失败，退避后重试"
        );
        tokio::time::sleep(delay).await;
        retries += 1;
    }
}
