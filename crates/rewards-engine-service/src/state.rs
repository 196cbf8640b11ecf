//! 服务装配
//!
//! 把选定的存储后端装配成各业务服务，入口程序与集成测试共用

use std::sync::Arc;

use rewards_shared::retry::RetryPolicy;
use sqlx::PgPool;

use crate::progression::ProgressionEngine;
use crate::repository::{
    CartRepository, CartRepositoryTrait, CatalogRepository, CatalogRepositoryTrait,
    LedgerRepository, LedgerRepositoryTrait, MemoryStore, ProgressRepository,
    ProgressRepositoryTrait, RecordRepository, RecordRepositoryTrait,
};
use crate::scan::ScanOracle;
use crate::service::{
    CartService, QueryService, RedemptionService, ScanSettlementService,
    TransactionStatusService,
};

/// 仓储集合
#[derive(Clone)]
pub struct Repositories {
    pub ledger: Arc<dyn LedgerRepositoryTrait>,
    pub catalog: Arc<dyn CatalogRepositoryTrait>,
    pub cart: Arc<dyn CartRepositoryTrait>,
    pub records: Arc<dyn RecordRepositoryTrait>,
    pub progress: Arc<dyn ProgressRepositoryTrait>,
}

impl Repositories {
    /// PostgreSQL 后端
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            ledger: Arc::new(LedgerRepository::new(pool.clone())),
            catalog: Arc::new(CatalogRepository::new(pool.clone())),
            cart: Arc::new(CartRepository::new(pool.clone())),
            records: Arc::new(RecordRepository::new(pool.clone())),
            progress: Arc::new(ProgressRepository::new(pool)),
        }
    }

    /// 内存后端，所有仓储共享同一个存储
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            ledger: store.clone(),
            catalog: store.clone(),
            cart: store.clone(),
            records: store.clone(),
            progress: store,
        }
    }
}

/// 业务服务集合
#[derive(Clone)]
pub struct EngineServices {
    pub redemption: Arc<RedemptionService>,
    pub settlement: Arc<ScanSettlementService>,
    pub status: Arc<TransactionStatusService>,
    pub cart: Arc<CartService>,
    pub query: Arc<QueryService>,
}

impl EngineServices {
    pub fn new(
        repos: &Repositories,
        oracle: Arc<dyn ScanOracle>,
        engine: ProgressionEngine,
        compensation_policy: RetryPolicy,
    ) -> Self {
        let redemption = Arc::new(RedemptionService::new(
            repos.ledger.clone(),
            repos.catalog.clone(),
            repos.cart.clone(),
            repos.records.clone(),
            compensation_policy,
        ));

        let settlement = Arc::new(ScanSettlementService::new(
            oracle,
            repos.ledger.clone(),
            repos.progress.clone(),
            repos.records.clone(),
            engine.clone(),
        ));

        let status = Arc::new(TransactionStatusService::new(repos.records.clone()));
        let cart = Arc::new(CartService::new(repos.cart.clone(), repos.catalog.clone()));

        let query = Arc::new(QueryService::new(
            repos.ledger.clone(),
            repos.progress.clone(),
            repos.records.clone(),
            repos.cart.clone(),
            engine,
        ));

        Self {
            redemption,
            settlement,
            status,
            cart,
            query,
        }
    }
}
