//! 重试控制器
//!
//! 指数退避策略对象，注入到所有发起服务调用的组件中。
//! 暂时性错误按计划重试，永久错误立即返回，重试耗尽后交给调用方按自己的约定处理。

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio_retry2::strategy::jitter;
use tokio_retry2::{Retry, RetryError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::CallFailure;
use super::ports::ServiceError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(15);
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.5;
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(120);

/// 重试策略
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 首次调用之外的最大重试次数
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// 零延迟策略（测试用）
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            backoff_factor: 1.0,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// 不重试
    pub fn none() -> Self {
        Self::immediate(0)
    }

    /// 退避计划：第 n 次重试前等待 initial_delay * backoff_factor^n，上限 max_delay
    pub fn schedule(&self) -> Vec<Duration> {
        let factor = if self.backoff_factor.is_finite() && self.backoff_factor >= 1.0 {
            self.backoff_factor
        } else {
            1.0
        };
        (0..self.max_retries)
            .map(|n| {
                let secs = self.initial_delay.as_secs_f64() * factor.powi(n as i32);
                let delay = Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()));
                if self.jitter {
                    jitter(delay)
                } else {
                    delay
                }
            })
            .collect()
    }

    /// 在策略下执行调用
    pub async fn run<T, F, Fut>(&self, label: &str, op: F) -> Result<T, CallFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        self.run_cancellable(label, &CancellationToken::new(), op)
            .await
    }

    /// 在策略下执行调用，并与取消令牌竞争
    ///
    /// 取消后在途调用被丢弃，其结果即使到达也不会被使用。
    pub async fn run_cancellable<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, CallFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        if cancel.is_cancelled() {
            return Err(CallFailure::Cancelled);
        }

        let attempts = AtomicU32::new(0);
        let retry = Retry::spawn(self.schedule(), || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            let call = op();
            async move {
                match call.await {
                    Ok(value) => Ok(value),
                    Err(ServiceError::Transient(msg)) => {
                        warn!(call = label, attempt, error = %msg, "Transient service error");
                        Err(RetryError::Transient {
                            err: ServiceError::Transient(msg),
                            retry_after: None,
                        })
                    }
                    Err(ServiceError::Permanent(msg)) => {
                        warn!(call = label, attempt, error = %msg, "Permanent service error, not retrying");
                        Err(RetryError::Permanent(ServiceError::Permanent(msg)))
                    }
                }
            }
        });

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(call = label, "Call cancelled, discarding in-flight result");
                return Err(CallFailure::Cancelled);
            }
            result = retry => result,
        };

        match result {
            Ok(value) => Ok(value),
            Err(ServiceError::Permanent(msg)) => Err(CallFailure::Permanent(msg)),
            Err(ServiceError::Transient(msg)) => Err(CallFailure::Exhausted {
                attempts: attempts.load(Ordering::Relaxed),
                last: msg,
            }),
        }
    }
}
