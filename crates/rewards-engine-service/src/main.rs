//! 积分经济服务入口
//!
//! 加载配置、初始化可观测性、选择存储后端并装配业务服务。

use std::sync::Arc;

use anyhow::Result;
use rewards_shared::{config::AppConfig, database::Database, observability, retry::RetryPolicy};
use tokio::signal;
use tracing::{error, info, warn};

use rewards_engine::{
    EngineConfig, EngineServices, MIGRATOR, MemoryStore, ProgressionEngine, Repositories,
    StaticScanOracle, StorageBackend,
};

const SERVICE_NAME: &str = "rewards-engine-service";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 基础配置：加载失败时使用默认值继续启动
    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    // 2. 可观测性
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting rewards-engine-service...");
    info!(environment = %config.environment, "Configuration loaded");

    // 3. 业务配置：等级表、补偿策略等配置错误必须阻止启动
    let engine_config = EngineConfig::load(SERVICE_NAME)?;
    let progression = ProgressionEngine::from_config(&engine_config.progression)?;
    info!(
        max_level = progression.max_level(),
        "Progression table loaded"
    );

    let oracle = Arc::new(StaticScanOracle::from_config(&engine_config.scan));
    info!(codes = oracle.len(), "Scan oracle loaded");

    // 4. 存储后端
    let (repos, database) = match engine_config.storage.backend {
        StorageBackend::Postgres => {
            let db =
                Database::connect_with_retry(&config.database, &RetryPolicy::default()).await?;
            let status = db.health_check().await?;
            info!(
                pool_size = status.size,
                idle = status.idle,
                "Database connection established"
            );

            if config.database.run_migrations {
                db.run_migrations(&MIGRATOR).await?;
            }
            (Repositories::postgres(db.pool().clone()), Some(db))
        }
        StorageBackend::Memory => {
            warn!("使用内存存储，进程退出后数据不会保留");
            (Repositories::memory(Arc::new(MemoryStore::new())), None)
        }
    };

    // 5. 业务服务
    let _services = EngineServices::new(
        &repos,
        oracle,
        progression,
        engine_config.compensation.clone(),
    );
    info!(backend = ?engine_config.storage.backend, "Services initialized");

    // 健康检查端点已由 observability 模块在 metrics_port 上提供
    shutdown_signal().await;

    if let Some(db) = database {
        db.close().await;
    }
    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号，用于 Kubernetes 优雅关闭
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
