//! gRPC 服务端实现
//!
//! 参数校验在此层完成，校验失败与发放失败都以正常响应返回（`success = false`），
//! 核销结果恒为四种枚举值之一，不返回错误状态。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{instrument, warn};

use discount_proto::discount::{
    GenerateCodesRequest, GenerateCodesResponse, UseCodeRequest, UseCodeResponse,
    UseCodeResult as ProtoUseCodeResult, discount_service_server::DiscountService,
};
use discount_shared::config::CodesConfig;

use crate::error::CodeError;
use crate::models::UseCodeResult;
use crate::service::{IssuanceService, RedemptionCoordinator};

// ==================== 错误转换 ====================

impl From<CodeError> for Status {
    fn from(err: CodeError) -> Self {
        match err {
            CodeError::Validation(_) => Status::invalid_argument(err.to_string()),
            CodeError::WriteConflict => Status::aborted(err.to_string()),
            CodeError::TopUpExhausted { .. } => Status::aborted(err.to_string()),
            CodeError::ConcurrencyConflict => Status::aborted(err.to_string()),
            CodeError::BatchRetriesExhausted { .. } => Status::unavailable(err.to_string()),
            CodeError::Cancelled => Status::cancelled(err.to_string()),
            CodeError::Database(_) => Status::internal(err.to_string()),
            CodeError::Internal(_) => Status::internal(err.to_string()),
        }
    }
}

// ==================== 类型转换辅助函数 ====================

/// 将内部 UseCodeResult 转换为 Proto 枚举值
fn use_code_result_to_proto(result: UseCodeResult) -> i32 {
    match result {
        UseCodeResult::Success => ProtoUseCodeResult::Success as i32,
        UseCodeResult::Missing => ProtoUseCodeResult::Missing as i32,
        UseCodeResult::AlreadyUsed => ProtoUseCodeResult::AlreadyUsed as i32,
        UseCodeResult::Invalid => ProtoUseCodeResult::Invalid as i32,
    }
}

fn failure(message: impl Into<String>) -> GenerateCodesResponse {
    GenerateCodesResponse {
        success: false,
        message: Some(message.into()),
    }
}

/// 发放失败时返回给调用方的说明
fn issuance_failure_message(err: &CodeError, requested: usize) -> String {
    match err {
        CodeError::BatchRetriesExhausted { committed, .. } => format!(
            "Issued {} of {} codes before batch retries were exhausted",
            committed, requested
        ),
        CodeError::Cancelled => "Code generation was cancelled".to_string(),
        CodeError::Validation(msg) => msg.clone(),
        _ => "Failed to generate discount codes".to_string(),
    }
}

// ==================== gRPC 服务实现 ====================

/// 折扣码服务 gRPC 实现
pub struct DiscountServiceImpl {
    issuance: Arc<IssuanceService>,
    redemption: Arc<RedemptionCoordinator>,
    max_codes_per_request: u32,
    allowed_lengths: Vec<u32>,
    /// 服务级关闭令牌，每个请求派生子令牌
    shutdown: CancellationToken,
}

impl DiscountServiceImpl {
    pub fn new(
        issuance: Arc<IssuanceService>,
        redemption: Arc<RedemptionCoordinator>,
        config: &CodesConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            issuance,
            redemption,
            max_codes_per_request: config.max_codes_per_request,
            allowed_lengths: config.allowed_lengths.clone(),
            shutdown,
        }
    }

    /// 校验发放请求，返回截断后的数量与长度
    fn validate_generate(
        &self,
        req: &GenerateCodesRequest,
    ) -> std::result::Result<(usize, usize), GenerateCodesResponse> {
        if req.count <= 0 || req.length <= 0 {
            return Err(failure(
                "Number of codes and code length must be greater than zero.",
            ));
        }

        let length = req.length as u32;
        if !self.allowed_lengths.contains(&length) {
            let allowed = self
                .allowed_lengths
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(failure(format!("Code length must be one of: {}", allowed)));
        }

        let mut count = req.count as u32;
        if count > self.max_codes_per_request {
            warn!(
                requested = count,
                max = self.max_codes_per_request,
                "Requested count exceeds maximum, limiting"
            );
            count = self.max_codes_per_request;
        }

        Ok((count as usize, length as usize))
    }
}

#[tonic::async_trait]
impl DiscountService for DiscountServiceImpl {
    /// 批量生成折扣码
    #[instrument(skip(self, request), fields(count = request.get_ref().count, length = request.get_ref().length))]
    async fn generate_codes(
        &self,
        request: Request<GenerateCodesRequest>,
    ) -> Result<Response<GenerateCodesResponse>, Status> {
        let req = request.into_inner();

        let (count, length) = match self.validate_generate(&req) {
            Ok(v) => v,
            Err(response) => return Ok(Response::new(response)),
        };

        // 客户端断开时 handler future 被 drop，guard 随之取消令牌
        let cancel = self.shutdown.child_token();
        let _guard = cancel.clone().drop_guard();

        let response = match self.issuance.issue(count, length, &cancel).await {
            Ok(_) => GenerateCodesResponse {
                success: true,
                message: None,
            },
            Err(e) => failure(issuance_failure_message(&e, count)),
        };

        Ok(Response::new(response))
    }

    /// 核销折扣码
    #[instrument(skip(self, request))]
    async fn use_code(
        &self,
        request: Request<UseCodeRequest>,
    ) -> Result<Response<UseCodeResponse>, Status> {
        let req = request.into_inner();

        let cancel = self.shutdown.child_token();
        let _guard = cancel.clone().drop_guard();

        let result = self.redemption.redeem(&req.code, &cancel).await;

        Ok(Response::new(UseCodeResponse {
            result: use_code_result_to_proto(result),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::RandomCodeGenerator;
    use crate::repository::{DiscountCodeRepositoryTrait, InMemoryDiscountCodeRepository};

    fn build(repo: Arc<InMemoryDiscountCodeRepository>) -> DiscountServiceImpl {
        let config = CodesConfig::default();
        let issuance = Arc::new(IssuanceService::new(
            repo.clone(),
            Arc::new(RandomCodeGenerator::new()),
            &config,
        ));
        let redemption = Arc::new(RedemptionCoordinator::new(repo));
        DiscountServiceImpl::new(issuance, redemption, &config, CancellationToken::new())
    }

    async fn generate(service: &DiscountServiceImpl, count: i32, length: i32) -> GenerateCodesResponse {
        service
            .generate_codes(Request::new(GenerateCodesRequest { count, length }))
            .await
            .unwrap()
            .into_inner()
    }

    #[test]
    fn test_code_error_to_status() {
        let status: Status = CodeError::Validation("bad".to_string()).into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status: Status = CodeError::WriteConflict.into();
        assert_eq!(status.code(), tonic::Code::Aborted);

        let status: Status = CodeError::TopUpExhausted { missing: 3 }.into();
        assert_eq!(status.code(), tonic::Code::Aborted);

        let status: Status = CodeError::Cancelled.into();
        assert_eq!(status.code(), tonic::Code::Cancelled);

        let status: Status = CodeError::Internal("x".to_string()).into();
        assert_eq!(status.code(), tonic::Code::Internal);
    }

    #[test]
    fn test_use_code_result_to_proto() {
        assert_eq!(use_code_result_to_proto(UseCodeResult::Success), 0);
        assert_eq!(use_code_result_to_proto(UseCodeResult::Missing), 1);
        assert_eq!(use_code_result_to_proto(UseCodeResult::AlreadyUsed), 2);
        assert_eq!(use_code_result_to_proto(UseCodeResult::Invalid), 3);
    }

    #[test]
    fn test_issuance_failure_message() {
        let err = CodeError::BatchRetriesExhausted {
            batch: 2,
            attempts: 5,
            committed: 1000,
        };
        let msg = issuance_failure_message(&err, 2000);
        assert!(msg.contains("1000 of 2000"));
    }

    #[tokio::test]
    async fn test_generate_rejects_non_positive() {
        let service = build(Arc::new(InMemoryDiscountCodeRepository::new()));
        for (count, length) in [(0, 8), (-1, 8), (10, 0), (10, -7)] {
            let response = generate(&service, count, length).await;
            assert!(!response.success);
            assert!(response
                .message
                .unwrap()
                .contains("must be greater than zero"));
        }
    }

    #[tokio::test]
    async fn test_generate_rejects_disallowed_length() {
        let repo = Arc::new(InMemoryDiscountCodeRepository::new());
        let service = build(repo.clone());

        let response = generate(&service, 10, 6).await;
        assert!(!response.success);
        assert_eq!(
            response.message.as_deref(),
            Some("Code length must be one of: 7, 8")
        );
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_generate_caps_count() {
        let repo = Arc::new(InMemoryDiscountCodeRepository::new());
        let service = build(repo.clone());

        let response = generate(&service, 2500, 8).await;
        assert!(response.success);
        assert!(response.message.is_none());
        assert_eq!(repo.count().await.unwrap(), 2000);
    }

    #[tokio::test]
    async fn test_use_code_roundtrip() {
        let repo = Arc::new(InMemoryDiscountCodeRepository::new());
        let service = build(repo.clone());
        assert!(generate(&service, 1, 7).await.success);

        let code = repo.snapshot().remove(0).code;
        let use_code = |code: String| {
            service.use_code(Request::new(UseCodeRequest { code }))
        };

        let first = use_code(code.clone()).await.unwrap().into_inner();
        assert_eq!(first.result, ProtoUseCodeResult::Success as i32);

        let second = use_code(code).await.unwrap().into_inner();
        assert_eq!(second.result, ProtoUseCodeResult::AlreadyUsed as i32);

        let missing = use_code("ZZZZZZZ".to_string()).await.unwrap().into_inner();
        assert_eq!(missing.result, ProtoUseCodeResult::Missing as i32);

        let blank = use_code(String::new()).await.unwrap().into_inner();
        assert_eq!(blank.result, ProtoUseCodeResult::Invalid as i32);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_requests() {
        let repo = Arc::new(InMemoryDiscountCodeRepository::new());
        let config = CodesConfig::default();
        let shutdown = CancellationToken::new();
        let service = DiscountServiceImpl::new(
            Arc::new(IssuanceService::new(
                repo.clone(),
                Arc::new(RandomCodeGenerator::new()),
                &config,
            )),
            Arc::new(RedemptionCoordinator::new(repo.clone())),
            &config,
            shutdown.clone(),
        );
        shutdown.cancel();

        let response = generate(&service, 10, 8).await;
        assert!(!response.success);
        assert_eq!(repo.count().await.unwrap(), 0);

        let used = service
            .use_code(Request::new(UseCodeRequest {
                code: "ABCDEFG".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(used.result, ProtoUseCodeResult::Invalid as i32);
    }
}
