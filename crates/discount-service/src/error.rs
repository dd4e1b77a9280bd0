//! 折扣码服务错误类型
//!
//! 仓储层与服务层之间通过显式的错误种类传递冲突信息，由上层决定是否重试。

use thiserror::Error;

/// 折扣码服务错误类型
#[derive(Debug, Error)]
pub enum CodeError {
    // === 发放相关错误 ===
    #[error("折扣码唯一键冲突，批次写入被拒绝")]
    WriteConflict,

    #[error("候选码补齐失败: 仍缺 {missing} 个未被占用的折扣码")]
    TopUpExhausted { missing: usize },

    #[error("批次写入在 {attempts} 次尝试后仍然冲突: batch={batch}, 已提交 {committed} 个")]
    BatchRetriesExhausted {
        batch: usize,
        attempts: u32,
        committed: usize,
    },

    // === 核销相关错误 ===
    /// 存储层检测到 `version` 不匹配。条件更新路径不会产生该错误，
    /// 仅在先读后写的核销路径上出现。
    #[error("并发冲突: 记录版本已变化")]
    ConcurrencyConflict,

    // === 通用错误 ===
    #[error("操作已取消")]
    Cancelled,

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 折扣码服务 Result 类型别名
pub type Result<T> = std::result::Result<T, CodeError>;

impl CodeError {
    /// 将 sqlx 错误归类：唯一键冲突转为 WriteConflict，其余保留原始错误
    pub fn from_insert_error(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => Self::WriteConflict,
            _ => Self::Database(err),
        }
    }

    /// 是否可通过重新生成整批折扣码恢复
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteConflict | Self::TopUpExhausted { .. })
    }

    /// 获取错误码（用于日志与指标）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::WriteConflict => "WRITE_CONFLICT",
            Self::TopUpExhausted { .. } => "TOP_UP_EXHAUSTED",
            Self::BatchRetriesExhausted { .. } => "BATCH_RETRIES_EXHAUSTED",
            Self::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            Self::Cancelled => "CANCELLED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
