//! 折扣码实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::CodeState;

/// 已持久化的折扣码
///
/// `is_used` 只会从 false 变为 true；`used_at` 当且仅当 `is_used` 为 true 时存在。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCode {
    /// 存储层分配的代理主键
    pub id: i64,
    /// 折扣码（7 或 8 位，[A-Z0-9]），全局唯一
    pub code: String,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    /// 并发令牌，每次状态变更递增
    pub version: i32,
}

impl DiscountCode {
    pub fn state(&self) -> CodeState {
        if self.is_used {
            CodeState::Used
        } else {
            CodeState::Unused
        }
    }
}

/// 待写入的折扣码
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDiscountCode {
    pub code: String,
    pub created_at: DateTime<Utc>,
}

impl NewDiscountCode {
    pub fn new(code: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            code: code.into(),
            created_at,
        }
    }
}
