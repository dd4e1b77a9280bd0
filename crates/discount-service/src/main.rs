//! 折扣码服务
//!
//! 批量发放与一次性核销的 gRPC 服务入口。

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use discount_proto::discount::discount_service_server::DiscountServiceServer;
use discount_shared::{
    config::{AppConfig, StorageBackend},
    database::Database,
    observability,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{info, warn};

use discount_service::{
    grpc::DiscountServiceImpl,
    repository::{
        DiscountCodeRepositoryTrait, InMemoryDiscountCodeRepository, PgDiscountCodeRepository,
    },
    service::{IssuanceService, RedemptionCoordinator},
    RandomCodeGenerator,
};

const SERVICE_NAME: &str = "discount-service";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 读取 .env（不存在时忽略）
    let _ = dotenvy::dotenv();

    // 2. 统一加载配置
    let (config, config_error) = match AppConfig::load(SERVICE_NAME) {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // 3. 初始化可观测性
    let obs_config = config.observability.clone().with_service_name(SERVICE_NAME);
    let _guard = observability::init(&obs_config).await?;

    if let Some(e) = config_error {
        warn!("Failed to load config, using defaults: {}", e);
    }
    info!("Starting {}...", SERVICE_NAME);
    info!(
        environment = %config.environment,
        backend = ?config.storage.backend,
        "Configuration loaded"
    );

    let grpc_addr: SocketAddr = config
        .server_addr()
        .parse()
        .context("Invalid gRPC address")?;

    // 4. 初始化存储
    let (repo, database): (Arc<dyn DiscountCodeRepositoryTrait>, Option<Database>) =
        match config.storage.backend {
            StorageBackend::Postgres => {
                let db = Database::connect_with_retry(&config.database).await?;
                info!("Database connection established");

                if config.storage.run_migrations {
                    db.run_migrations().await?;
                }

                let repo: Arc<dyn DiscountCodeRepositoryTrait> =
                    Arc::new(PgDiscountCodeRepository::new(db.pool().clone()));
                (repo, Some(db))
            }
            StorageBackend::Memory => {
                warn!("Using in-memory storage, codes will not survive a restart");
                let repo: Arc<dyn DiscountCodeRepositoryTrait> =
                    Arc::new(InMemoryDiscountCodeRepository::new());
                (repo, None)
            }
        };

    // 5. 创建服务
    let issuance = Arc::new(IssuanceService::new(
        repo.clone(),
        Arc::new(RandomCodeGenerator::new()),
        &config.codes,
    ));
    let redemption = Arc::new(RedemptionCoordinator::new(repo));
    info!("Services initialized");

    // 6. 创建 gRPC 服务
    let shutdown = CancellationToken::new();
    let grpc_service =
        DiscountServiceImpl::new(issuance, redemption, &config.codes, shutdown.clone());

    // 7. 启动 gRPC 服务
    info!("gRPC server listening on {}", grpc_addr);
    Server::builder()
        .add_service(DiscountServiceServer::new(grpc_service))
        .serve_with_shutdown(grpc_addr, async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    if let Some(db) = database {
        db.close().await;
    }

    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
