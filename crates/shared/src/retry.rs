//! 连接重试策略
//!
//! 服务启动时数据库可能尚未就绪（容器编排下尤为常见），连接阶段按指数退避重试。
//! 是否重试由调用方通过 `is_retryable` 闭包决定。

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::error::DiscountError;

/// 指数退避重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大重试次数（不含首次执行）
    pub max_retries: u32,
    /// 首次重试前的等待时间
    pub initial_delay: Duration,
    /// 单次等待上限
    pub max_delay: Duration,
    /// 每次重试的退避倍数
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 由数据库配置构造连接重试策略
    pub fn for_database(config: &DatabaseConfig) -> Self {
        Self {
            max_retries: config.max_retry_count,
            max_delay: config.max_retry_delay(),
            ..Self::default()
        }
    }

    /// 第 N 次重试前的等待时间（attempt 从 0 开始），不超过 max_delay
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(attempt as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// 按策略执行异步操作，仅对可重试错误退避重试
pub async fn retry_with_policy<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&DiscountError) -> bool,
    mut operation: F,
) -> Result<T, DiscountError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DiscountError>>,
{
    let mut attempt: u32 = 0;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation = operation_name, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) || !policy.should_retry(attempt) {
            warn!(
                operation = operation_name,
                attempt,
                max_retries = policy.max_retries,
                error = %err,
                "Operation failed, giving up"
            );
            return Err(err);
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            operation = operation_name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Operation failed, retrying after backoff"
        );

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
