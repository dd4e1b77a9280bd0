//! PostgreSQL 仓储集成测试
//!
//! 需要可用的数据库，默认忽略。运行方式：
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo test -p discount-service --test postgres_repository_test -- --ignored
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use discount_shared::database::Database;
use discount_shared::test_utils::test_database_config;
use tokio_util::sync::CancellationToken;

use discount_service::repository::{DiscountCodeRepositoryTrait, PgDiscountCodeRepository};
use discount_service::{
    CodeError, CodeGenerator, NewDiscountCode, RandomCodeGenerator, RedemptionCoordinator,
    UseCodeResult,
};

async fn setup() -> Arc<PgDiscountCodeRepository> {
    let mut config = test_database_config();
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.url = url;
    }

    let db = Database::connect(&config).await.unwrap();
    db.run_migrations().await.unwrap();
    Arc::new(PgDiscountCodeRepository::new(db.pool().clone()))
}

fn fresh_codes(count: usize) -> Vec<NewDiscountCode> {
    let now = Utc::now();
    RandomCodeGenerator::new()
        .generate_unique_codes(count, 8)
        .into_iter()
        .map(|c| NewDiscountCode::new(c, now))
        .collect()
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_bulk_insert_and_filter() {
    let repo = setup().await;
    let codes = fresh_codes(100);

    assert_eq!(repo.add_all(&codes).await.unwrap(), 100);

    let mut lookup: Vec<String> = codes.iter().take(10).map(|c| c.code.clone()).collect();
    lookup.push("ZZZZZZZZ".to_string());
    let existing = repo.exists_filtered(&lookup).await.unwrap();
    assert!(existing.len() >= 10);
    assert!(codes.iter().take(10).all(|c| existing.contains(&c.code)));
    assert!(repo.exists(&codes[0].code).await.unwrap());
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_conflicting_batch_is_rejected_atomically() {
    let repo = setup().await;
    let first = fresh_codes(5);
    repo.add_all(&first).await.unwrap();

    let mut second = fresh_codes(5);
    second.push(first[0].clone());

    let err = repo.add_all(&second).await.unwrap_err();
    assert!(matches!(err, CodeError::WriteConflict));

    let lookup: Vec<String> = second.iter().take(5).map(|c| c.code.clone()).collect();
    let existing: HashSet<String> = repo.exists_filtered(&lookup).await.unwrap();
    assert!(existing.is_empty());
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_conditional_update_race() {
    let repo = setup().await;
    let codes = fresh_codes(1);
    repo.add_all(&codes).await.unwrap();
    let code = codes[0].code.clone();

    let coordinator = Arc::new(RedemptionCoordinator::new(repo.clone()));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let coordinator = coordinator.clone();
            let code = code.clone();
            tokio::spawn(async move { coordinator.redeem(&code, &CancellationToken::new()).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            UseCodeResult::Success => successes += 1,
            other => assert_eq!(other, UseCodeResult::AlreadyUsed),
        }
    }
    assert_eq!(successes, 1);

    let stored = repo.fetch_by_code(&code).await.unwrap().unwrap();
    assert!(stored.is_used);
    assert!(stored.used_at.is_some());
    assert_eq!(stored.version, 1);
}
