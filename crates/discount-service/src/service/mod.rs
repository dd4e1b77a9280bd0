//! 服务层
//!
//! 实现折扣码业务逻辑，协调生成器与仓储层。
//!
//! ## 模块结构
//!
//! - `issuance_service`: 批量发放（生成、去重、分批落库、冲突重试）
//! - `redemption_service`: 核销（原子条件更新、结果判定）

pub mod issuance_service;
pub mod redemption_service;

pub use issuance_service::IssuanceService;
pub use redemption_service::RedemptionCoordinator;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{CodeError, Result};

/// 在取消令牌触发时放弃等待存储操作
pub(crate) async fn with_cancellation<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CodeError::Cancelled),
        result = fut => result,
    }
}
