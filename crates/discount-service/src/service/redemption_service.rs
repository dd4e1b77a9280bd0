//! 折扣码核销服务
//!
//! 核销由单条条件更新完成（`WHERE code = ? AND is_used = FALSE`），
//! 并发调用中恰好一个能命中。未命中时再读取一次记录，区分"不存在"与"已使用"。

use std::sync::Arc;

use chrono::Utc;
use discount_shared::observability::metrics;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::with_cancellation;
use crate::error::{CodeError, Result};
use crate::models::{CodeState, UseCodeResult};
use crate::repository::DiscountCodeRepositoryTrait;

/// 核销协调器
pub struct RedemptionCoordinator {
    repo: Arc<dyn DiscountCodeRepositoryTrait>,
}

impl RedemptionCoordinator {
    pub fn new(repo: Arc<dyn DiscountCodeRepositoryTrait>) -> Self {
        Self { repo }
    }

    /// 核销折扣码
    ///
    /// 所有结果都以 `UseCodeResult` 返回，不向调用方抛出错误：
    /// - 并发冲突视为已使用
    /// - 取消与存储错误视为无效
    #[instrument(skip(self, cancel))]
    pub async fn redeem(&self, code: &str, cancel: &CancellationToken) -> UseCodeResult {
        let result = match self.try_redeem(code, cancel).await {
            Ok(result) => result,
            Err(CodeError::ConcurrencyConflict) => {
                debug!("核销并发冲突，判定为已使用");
                UseCodeResult::AlreadyUsed
            }
            Err(CodeError::Cancelled) => {
                warn!("核销请求已取消");
                UseCodeResult::Invalid
            }
            Err(e) => {
                error!(error = %e, error_code = e.error_code(), "核销失败");
                UseCodeResult::Invalid
            }
        };

        metrics::record_redemption(result.as_str());
        if result.is_success() {
            info!("折扣码核销成功");
        }
        result
    }

    async fn try_redeem(&self, code: &str, cancel: &CancellationToken) -> Result<UseCodeResult> {
        if code.trim().is_empty() {
            return Ok(UseCodeResult::Invalid);
        }
        if cancel.is_cancelled() {
            return Err(CodeError::Cancelled);
        }

        let updated =
            with_cancellation(cancel, self.repo.conditional_mark_used(code, Utc::now())).await?;
        if updated > 0 {
            return Ok(UseCodeResult::Success);
        }

        // 条件更新未命中：码不存在，或已被核销
        let Some(existing) = with_cancellation(cancel, self.repo.fetch_by_code(code)).await? else {
            return Ok(UseCodeResult::Missing);
        };
        match existing.state() {
            CodeState::Used => Ok(UseCodeResult::AlreadyUsed),
            CodeState::Unused => {
                warn!("条件更新未命中但记录仍为未使用状态");
                Ok(UseCodeResult::Invalid)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiscountCode;
    use crate::repository::MockDiscountCodeRepositoryTrait;

    fn stored(code: &str, is_used: bool) -> DiscountCode {
        let now = Utc::now();
        DiscountCode {
            id: 1,
            code: code.to_string(),
            is_used,
            created_at: now,
            used_at: is_used.then_some(now),
            version: i32::from(is_used),
        }
    }

    fn coordinator(repo: MockDiscountCodeRepositoryTrait) -> RedemptionCoordinator {
        RedemptionCoordinator::new(Arc::new(repo))
    }

    #[tokio::test]
    async fn test_redeem_success() {
        let mut repo = MockDiscountCodeRepositoryTrait::new();
        repo.expect_conditional_mark_used()
            .withf(|code, _| code == "ABCDEFG")
            .times(1)
            .returning(|_, _| Ok(1));
        repo.expect_fetch_by_code().never();

        let result = coordinator(repo)
            .redeem("ABCDEFG", &CancellationToken::new())
            .await;
        assert_eq!(result, UseCodeResult::Success);
    }

    #[tokio::test]
    async fn test_redeem_missing() {
        let mut repo = MockDiscountCodeRepositoryTrait::new();
        repo.expect_conditional_mark_used().returning(|_, _| Ok(0));
        repo.expect_fetch_by_code().returning(|_| Ok(None));

        let result = coordinator(repo)
            .redeem("NOPE123", &CancellationToken::new())
            .await;
        assert_eq!(result, UseCodeResult::Missing);
    }

    #[tokio::test]
    async fn test_redeem_already_used() {
        let mut repo = MockDiscountCodeRepositoryTrait::new();
        repo.expect_conditional_mark_used().returning(|_, _| Ok(0));
        repo.expect_fetch_by_code()
            .returning(|code| Ok(Some(stored(code, true))));

        let result = coordinator(repo)
            .redeem("ABCDEFG", &CancellationToken::new())
            .await;
        assert_eq!(result, UseCodeResult::AlreadyUsed);
    }

    #[tokio::test]
    async fn test_redeem_unused_after_missed_update_is_invalid() {
        let mut repo = MockDiscountCodeRepositoryTrait::new();
        repo.expect_conditional_mark_used().returning(|_, _| Ok(0));
        repo.expect_fetch_by_code()
            .returning(|code| Ok(Some(stored(code, false))));

        let result = coordinator(repo)
            .redeem("ABCDEFG", &CancellationToken::new())
            .await;
        assert_eq!(result, UseCodeResult::Invalid);
    }

    #[tokio::test]
    async fn test_redeem_blank_code_is_invalid() {
        let mut repo = MockDiscountCodeRepositoryTrait::new();
        repo.expect_conditional_mark_used().never();

        let coordinator = coordinator(repo);
        let cancel = CancellationToken::new();
        assert_eq!(coordinator.redeem("", &cancel).await, UseCodeResult::Invalid);
        assert_eq!(coordinator.redeem("   ", &cancel).await, UseCodeResult::Invalid);
    }

    #[tokio::test]
    async fn test_concurrency_conflict_maps_to_already_used() {
        let mut repo = MockDiscountCodeRepositoryTrait::new();
        repo.expect_conditional_mark_used()
            .returning(|_, _| Err(CodeError::ConcurrencyConflict));

        let result = coordinator(repo)
            .redeem("ABCDEFG", &CancellationToken::new())
            .await;
        assert_eq!(result, UseCodeResult::AlreadyUsed);
    }

    #[tokio::test]
    async fn test_storage_error_maps_to_invalid() {
        let mut repo = MockDiscountCodeRepositoryTrait::new();
        repo.expect_conditional_mark_used()
            .returning(|_, _| Err(CodeError::Database(sqlx::Error::PoolTimedOut)));

        let result = coordinator(repo)
            .redeem("ABCDEFG", &CancellationToken::new())
            .await;
        assert_eq!(result, UseCodeResult::Invalid);
    }

    #[tokio::test]
    async fn test_cancelled_redeem_is_invalid() {
        let mut repo = MockDiscountCodeRepositoryTrait::new();
        repo.expect_conditional_mark_used().never();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = coordinator(repo).redeem("ABCDEFG", &cancel).await;
        assert_eq!(result, UseCodeResult::Invalid);
    }
}
