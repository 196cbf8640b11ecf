//! 积分经济服务
//!
//! 回收投递换积分、积分兑换商品的核心引擎。
//!
//! ## 核心功能
//!
//! - **积分账本**：余额只通过原子条件扣减与无条件入账变更，绝不透支
//! - **商品目录**：库存遵循与余额相同的原子扣减约定
//! - **积分兑换**：先扣积分后扣库存，库存不足时补偿冲正积分
//! - **购物车**：逐条独立结算
//! - **成长体系**：经验、等级、跨级累计升级奖励（纯计算）
//! - **扫码结算**：识别回收码后发放积分与经验
//! - **订单状态**：运营侧推进订单状态，不触碰已记账的积分与库存
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `config`: 业务配置
//! - `progression`: 成长引擎
//! - `scan`: 回收码识别
//! - `repository`: 仓储层（PostgreSQL / 内存）
//! - `service`: 业务服务层
//! - `state`: 服务装配

pub mod config;
pub mod error;
pub mod models;
pub mod progression;
pub mod repository;
pub mod scan;
pub mod service;
pub mod state;

pub use config::{EngineConfig, StorageBackend};
pub use error::{Result, RewardsError};
pub use models::*;
pub use progression::{EarnOutcome, LevelTable, ProgressionConfig, ProgressionEngine};
pub use repository::{DebitOutcome, MemoryStore};
pub use scan::{ScanClassification, ScanOracle, StaticScanOracle};
pub use service::{
    CartService, QueryService, RedemptionService, ScanSettlementService,
    TransactionStatusService, dto,
};
pub use state::{EngineServices, Repositories};

/// 内嵌数据库迁移
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
