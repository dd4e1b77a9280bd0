//! 折扣码发放服务
//!
//! 将一次发放请求拆分为若干批次依次落库，每批独立提交：
//!
//! 1. 生成候选码 -> 2. 剔除已存在的码并补齐 -> 3. 整批原子写入
//!    -> 4. 唯一键冲突时整批重新生成，最多尝试 `max_batch_attempts` 次
//!
//! 已提交的批次不会因后续批次失败而回滚，失败时错误中携带已提交数量。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use discount_shared::config::CodesConfig;
use discount_shared::observability::metrics;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::with_cancellation;
use crate::error::{CodeError, Result};
use crate::generator::CodeGenerator;
use crate::models::NewDiscountCode;
use crate::repository::DiscountCodeRepositoryTrait;

/// 单批补齐候选码的最大轮数，超过后本次批次尝试失败
const MAX_TOP_UP_ROUNDS: usize = 32;

/// 折扣码发放服务
pub struct IssuanceService {
    repo: Arc<dyn DiscountCodeRepositoryTrait>,
    generator: Arc<dyn CodeGenerator>,
    batch_size: usize,
    max_batch_attempts: u32,
}

impl IssuanceService {
    pub fn new(
        repo: Arc<dyn DiscountCodeRepositoryTrait>,
        generator: Arc<dyn CodeGenerator>,
        config: &CodesConfig,
    ) -> Self {
        Self::with_limits(repo, generator, config.batch_size, config.max_batch_attempts)
    }

    pub fn with_limits(
        repo: Arc<dyn DiscountCodeRepositoryTrait>,
        generator: Arc<dyn CodeGenerator>,
        batch_size: usize,
        max_batch_attempts: u32,
    ) -> Self {
        Self {
            repo,
            generator,
            batch_size: batch_size.max(1),
            max_batch_attempts: max_batch_attempts.max(1),
        }
    }

    /// 发放 `count` 个长度为 `length` 的折扣码
    ///
    /// 成功时返回落库数量（恒等于 `count`）。参数合法性由调用方保证，
    /// 这里只拒绝退化输入。
    #[instrument(skip(self, cancel))]
    pub async fn issue(
        &self,
        count: usize,
        length: usize,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let start = Instant::now();
        let result = self.issue_batches(count, length, cancel).await;

        let status = match &result {
            Ok(_) => "success",
            Err(CodeError::Cancelled) => "cancelled",
            Err(_) => "failure",
        };
        metrics::record_issuance(status, start.elapsed().as_secs_f64());

        match &result {
            Ok(committed) => info!(committed = committed, "折扣码发放完成"),
            Err(CodeError::BatchRetriesExhausted {
                batch,
                attempts,
                committed,
            }) => warn!(
                batch = batch,
                attempts = attempts,
                committed = committed,
                "折扣码发放失败，部分批次已提交"
            ),
            Err(e) => warn!(error = %e, "折扣码发放失败"),
        }

        result
    }

    async fn issue_batches(
        &self,
        count: usize,
        length: usize,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        if count == 0 || length == 0 {
            return Err(CodeError::Validation(
                "Number of codes and code length must be greater than zero.".to_string(),
            ));
        }

        let mut committed = 0usize;
        let mut batch = 0usize;

        while committed < count {
            batch += 1;
            let batch_count = self.batch_size.min(count - committed);

            let mut attempt = 0u32;
            loop {
                if cancel.is_cancelled() {
                    return Err(CodeError::Cancelled);
                }
                attempt += 1;

                match self.try_batch(batch_count, length, cancel).await {
                    Ok(inserted) => {
                        committed += inserted;
                        metrics::record_codes_issued(inserted as u64);
                        debug!(batch = batch, attempt = attempt, inserted = inserted, "批次写入成功");
                        break;
                    }
                    Err(e) if e.is_retryable() => {
                        if matches!(e, CodeError::WriteConflict) {
                            metrics::record_write_conflict(attempt);
                            warn!(
                                batch = batch,
                                attempt = attempt,
                                max_attempts = self.max_batch_attempts,
                                "批次写入唯一键冲突，重新生成"
                            );
                        } else {
                            warn!(
                                batch = batch,
                                attempt = attempt,
                                max_attempts = self.max_batch_attempts,
                                error = %e,
                                "候选码补齐未收敛，重新生成"
                            );
                        }
                        if attempt >= self.max_batch_attempts {
                            return Err(CodeError::BatchRetriesExhausted {
                                batch,
                                attempts: attempt,
                                committed,
                            });
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(committed)
    }

    /// 单次批次尝试：准备一批不与已存储数据重复的码并整批写入
    async fn try_batch(
        &self,
        batch_count: usize,
        length: usize,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let codes = self.prepare_batch(batch_count, length, cancel).await?;
        with_cancellation(cancel, self.repo.add_all(&codes)).await?;
        Ok(codes.len())
    }

    /// 生成候选码，剔除已存储的码后用新生成的码补齐
    ///
    /// 补齐的码同样需要再次检查。
    async fn prepare_batch(
        &self,
        batch_count: usize,
        length: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<NewDiscountCode>> {
        let initial = self.generator.generate_unique_codes(batch_count, length);
        if initial.len() < batch_count {
            return Err(CodeError::Internal(format!(
                "无法生成 {} 个长度为 {} 的折扣码",
                batch_count, length
            )));
        }

        let mut accepted: HashSet<String> = HashSet::with_capacity(batch_count);
        let mut rejected: HashSet<String> = HashSet::new();
        let mut pending: Vec<String> = initial.into_iter().take(batch_count).collect();

        for _ in 0..MAX_TOP_UP_ROUNDS {
            let existing = with_cancellation(cancel, self.repo.exists_filtered(&pending)).await?;

            for code in pending.drain(..) {
                if existing.contains(&code) {
                    rejected.insert(code);
                } else {
                    accepted.insert(code);
                }
            }

            let missing = batch_count - accepted.len();
            if missing == 0 {
                let created_at = Utc::now();
                return Ok(accepted
                    .into_iter()
                    .map(|code| NewDiscountCode::new(code, created_at))
                    .collect());
            }

            debug!(duplicates = rejected.len(), missing = missing, "候选码与已存储数据重复，补齐");
            pending = self
                .generator
                .generate_unique_codes(missing, length)
                .into_iter()
                .filter(|c| !accepted.contains(c) && !rejected.contains(c))
                .collect();
        }

        Err(CodeError::TopUpExhausted {
            missing: batch_count - accepted.len(),
        })
    }
}
