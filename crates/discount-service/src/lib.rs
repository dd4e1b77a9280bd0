//! 折扣码服务
//!
//! 批量发放一次性折扣码，并保证每个折扣码在并发下恰好被核销一次。
//!
//! ## 核心功能
//!
//! - **批量发放**：按批生成、去重、原子写入，唯一键冲突时整批重试
//! - **一次性核销**：基于条件更新的原子状态迁移，由存储层裁决并发竞争
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `generator`: 折扣码生成器
//! - `repository`: 数据访问层（PostgreSQL / 内存）
//! - `service`: 发放与核销服务
//! - `grpc`: gRPC 服务端实现

pub mod error;
pub mod generator;
pub mod grpc;
pub mod models;
pub mod repository;
pub mod service;

pub use error::{CodeError, Result};
pub use generator::{CodeGenerator, RandomCodeGenerator};
pub use grpc::DiscountServiceImpl;
pub use models::*;
pub use service::{IssuanceService, RedemptionCoordinator};
