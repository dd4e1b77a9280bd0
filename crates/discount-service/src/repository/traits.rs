//! 仓储 Trait 定义
//!
//! 服务层只依赖该接口，PostgreSQL 与内存实现可互换，单元测试使用 mock。

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{DiscountCode, NewDiscountCode};

/// 折扣码仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DiscountCodeRepositoryTrait: Send + Sync {
    /// 整批原子写入；任一折扣码已存在时整批失败并返回 `CodeError::WriteConflict`
    async fn add_all(&self, codes: &[NewDiscountCode]) -> Result<u64>;

    /// 返回候选集中已持久化的折扣码
    async fn exists_filtered(&self, codes: &[String]) -> Result<HashSet<String>>;

    async fn exists(&self, code: &str) -> Result<bool>;

    async fn fetch_by_code(&self, code: &str) -> Result<Option<DiscountCode>>;

    /// 条件更新：仅当 `is_used = false` 时标记为已用，返回受影响行数（0 或 1）
    async fn conditional_mark_used(&self, code: &str, used_at: DateTime<Utc>) -> Result<u64>;

    async fn count(&self) -> Result<i64>;
}
