//! 数据访问层
//!
//! - `PgDiscountCodeRepository`：PostgreSQL 实现，生产环境使用
//! - `InMemoryDiscountCodeRepository`：DashMap 实现，测试与本地开发使用
//!
//! 两者实现同一 trait，服务层通过 `Arc<dyn DiscountCodeRepositoryTrait>` 持有。

mod discount_code_repo;
mod memory_repo;
mod traits;

pub use discount_code_repo::PgDiscountCodeRepository;
pub use memory_repo::InMemoryDiscountCodeRepository;
pub use traits::*;
