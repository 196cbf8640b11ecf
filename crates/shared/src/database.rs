//! PostgreSQL 连接池
//!
//! 余额、库存等计数器的原子条件更新都直接落在这个连接池上，
//! 因此启动阶段会按重试策略等待数据库就绪，并在健康检查中报告连接池水位。

use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::error::{InfraError, Result};
use crate::retry::{RetryPolicy, retry_with_policy};

/// 连接池水位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub size: u32,
    pub idle: usize,
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[instrument(skip(config), fields(max_connections = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = pool_options(config).connect(&config.url).await?;
        info!("数据库连接池已建立");
        Ok(Self { pool })
    }

    /// 带退避重试的连接，用于数据库可能晚于服务启动的部署环境
    ///
    /// 只重试连接类错误，认证失败等配置问题直接返回
    pub async fn connect_with_retry(config: &DatabaseConfig, policy: &RetryPolicy) -> Result<Self> {
        retry_with_policy(policy, "database_connect", InfraError::is_retryable, || {
            Self::connect(config)
        })
        .await
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 执行一次往返查询并返回连接池水位
    pub async fn health_check(&self) -> Result<PoolStatus> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(self.status())
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("数据库连接池已关闭");
    }

    /// 执行内嵌迁移
    ///
    /// `migrate!` 在编译期解析目录，迁移集由持有 migrations 目录的服务 crate 传入
    #[instrument(skip(self, migrator))]
    pub async fn run_migrations(&self, migrator: &Migrator) -> Result<()> {
        migrator.run(&self.pool).await?;
        info!(count = migrator.iter().count(), "数据库迁移已应用");
        Ok(())
    }
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections.min(config.max_connections))
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
}
