//! 内存仓储
//!
//! 使用 DashMap 实现，适用于测试和本地开发环境。语义与 PostgreSQL 实现保持一致：
//! 批次写入要么全部成功要么整批拒绝，核销是对单条记录的原子条件更新。

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use super::traits::DiscountCodeRepositoryTrait;
use crate::error::{CodeError, Result};
use crate::models::{DiscountCode, NewDiscountCode};

/// 内存折扣码仓储
#[derive(Debug)]
pub struct InMemoryDiscountCodeRepository {
    codes: DashMap<String, DiscountCode>,
    next_id: AtomicI64,
    /// 串行化批次写入，保证"检查全部 + 插入全部"不被其他批次穿插
    write_gate: Mutex<()>,
}

impl Default for InMemoryDiscountCodeRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDiscountCodeRepository {
    pub fn new() -> Self {
        Self {
            codes: DashMap::new(),
            next_id: AtomicI64::new(1),
            write_gate: Mutex::new(()),
        }
    }

    /// 列出全部折扣码（测试辅助）
    pub fn snapshot(&self) -> Vec<DiscountCode> {
        self.codes.iter().map(|e| e.value().clone()).collect()
    }
}

#[async_trait]
impl DiscountCodeRepositoryTrait for InMemoryDiscountCodeRepository {
    async fn add_all(&self, codes: &[NewDiscountCode]) -> Result<u64> {
        if codes.is_empty() {
            return Ok(0);
        }

        let _gate = self.write_gate.lock();

        let mut batch = HashSet::with_capacity(codes.len());
        for new_code in codes {
            if self.codes.contains_key(&new_code.code) || !batch.insert(new_code.code.as_str()) {
                return Err(CodeError::WriteConflict);
            }
        }

        for new_code in codes {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            self.codes.insert(
                new_code.code.clone(),
                DiscountCode {
                    id,
                    code: new_code.code.clone(),
                    is_used: false,
                    created_at: new_code.created_at,
                    used_at: None,
                    version: 0,
                },
            );
        }

        Ok(codes.len() as u64)
    }

    async fn exists_filtered(&self, codes: &[String]) -> Result<HashSet<String>> {
        Ok(codes
            .iter()
            .filter(|c| self.codes.contains_key(c.as_str()))
            .cloned()
            .collect())
    }

    async fn exists(&self, code: &str) -> Result<bool> {
        Ok(self.codes.contains_key(code))
    }

    async fn fetch_by_code(&self, code: &str) -> Result<Option<DiscountCode>> {
        Ok(self.codes.get(code).map(|e| e.value().clone()))
    }

    async fn conditional_mark_used(&self, code: &str, used_at: DateTime<Utc>) -> Result<u64> {
        // get_mut 持有分片写锁，检查与更新在同一临界区内完成
        match self.codes.get_mut(code) {
            Some(mut entry) if !entry.is_used => {
                entry.is_used = true;
                entry.used_at = Some(used_at);
                entry.version += 1;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.codes.len() as i64)
    }
}
