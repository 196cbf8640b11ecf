//! 数据仓储层
//!
//! 提供账本、商品、购物车、订单流水、成长进度的数据访问。
//!
//! ## 设计原则
//!
//! - 仓储只负责数据持久化，不包含业务逻辑
//! - 所有计数器（余额、库存、经验）只通过单条原子条件更新变更，从不先读后写
//! - PostgreSQL 与内存两种后端实现同一组 trait
//! - 定义 trait 接口以支持 mock 测试

mod cart_repo;
mod catalog_repo;
mod ledger_repo;
mod memory;
mod progress_repo;
mod record_repo;
mod traits;

pub use cart_repo::CartRepository;
pub use catalog_repo::CatalogRepository;
pub use ledger_repo::LedgerRepository;
pub use memory::MemoryStore;
pub use progress_repo::ProgressRepository;
pub use record_repo::RecordRepository;
pub use traits::*;

use crate::error::{RewardsError, Result};
use crate::models::ActivityRecord;

/// PostgreSQL 唯一约束冲突（unique_violation）
const UNIQUE_VIOLATION: &str = "23505";
/// PostgreSQL 外键约束冲突（foreign_key_violation）
const FOREIGN_KEY_VIOLATION: &str = "23503";

fn db_error_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_error) => db_error.code().map(|code| code.into_owned()),
        _ => None,
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    db_error_code(err).as_deref() == Some(UNIQUE_VIOLATION)
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    db_error_code(err).as_deref() == Some(FOREIGN_KEY_VIOLATION)
}

/// 追加流水前校验变动方向，两种后端共用
pub(crate) fn ensure_activity_directions(activities: &[ActivityRecord]) -> Result<()> {
    match activities.iter().find(|a| !a.has_consistent_direction()) {
        Some(activity) => Err(RewardsError::Validation(format!(
            "流水方向与类型不符: {:?} {}",
            activity.activity_type, activity.points_delta
        ))),
        None => Ok(()),
    }
}
