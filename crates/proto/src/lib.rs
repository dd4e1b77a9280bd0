//! 折扣码服务 gRPC 协议定义
//!
//! 由 `build.rs` 从 `proto/discount.proto` 生成。

pub mod discount {
    tonic::include_proto!("discount.v1");
}
