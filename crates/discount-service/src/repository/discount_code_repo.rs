//! 折扣码仓储（PostgreSQL）
//!
//! 唯一性由 `discount_codes.code` 上的唯一约束保证，核销依赖带条件的单条 UPDATE，
//! 由数据库裁决并发竞争。

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::traits::DiscountCodeRepositoryTrait;
use crate::error::{CodeError, Result};
use crate::models::{DiscountCode, NewDiscountCode};

/// 折扣码仓储
pub struct PgDiscountCodeRepository {
    pool: PgPool,
}

impl PgDiscountCodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DiscountCodeRepositoryTrait for PgDiscountCodeRepository {
    /// 批量写入
    ///
    /// 单条 INSERT ... SELECT FROM UNNEST，语句本身即为原子单元，
    /// 唯一键冲突时整批回滚。
    async fn add_all(&self, codes: &[NewDiscountCode]) -> Result<u64> {
        if codes.is_empty() {
            return Ok(0);
        }

        let (values, created_at): (Vec<String>, Vec<DateTime<Utc>>) = codes
            .iter()
            .map(|c| (c.code.clone(), c.created_at))
            .unzip();

        let result = sqlx::query(
            r#"
            INSERT INTO discount_codes (code, is_used, created_at)
            SELECT code, FALSE, created_at
            FROM UNNEST($1::varchar[], $2::timestamptz[]) AS t(code, created_at)
            "#,
        )
        .bind(&values)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(CodeError::from_insert_error)?;

        Ok(result.rows_affected())
    }

    async fn exists_filtered(&self, codes: &[String]) -> Result<HashSet<String>> {
        if codes.is_empty() {
            return Ok(HashSet::new());
        }

        let existing: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT code
            FROM discount_codes
            WHERE code = ANY($1)
            "#,
        )
        .bind(codes)
        .fetch_all(&self.pool)
        .await?;

        Ok(existing.into_iter().collect())
    }

    async fn exists(&self, code: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"SELECT EXISTS(SELECT 1 FROM discount_codes WHERE code = $1)"#,
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn fetch_by_code(&self, code: &str) -> Result<Option<DiscountCode>> {
        let row = sqlx::query_as::<_, DiscountCode>(
            r#"
            SELECT id, code, is_used, created_at, used_at, version
            FROM discount_codes
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// 条件核销
    ///
    /// `WHERE is_used = FALSE` 保证并发调用中只有一个能命中该行。
    async fn conditional_mark_used(&self, code: &str, used_at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE discount_codes
            SET is_used = TRUE, used_at = $2, version = version + 1
            WHERE code = $1 AND is_used = FALSE
            "#,
        )
        .bind(code)
        .bind(used_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM discount_codes")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
