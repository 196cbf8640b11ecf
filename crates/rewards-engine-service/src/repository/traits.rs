//! 仓储 Trait 定义
//!
//! 服务层只依赖这些抽象，PostgreSQL 与内存两种后端实现同一套原子语义，也便于 mock 测试

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    ActivityRecord, CartItem, MonthlyEarning, MonthlyPeriod, NewProduct, NewRedemption, Product,
    TransactionRecord, TransactionStatus, UserProgress,
};

/// 条件扣减的结果
///
/// 扣减是单次原子操作：要么整体生效，要么没有任何副作用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    /// 已扣减，携带扣减后的剩余量
    Applied(i64),
    /// 余量不足，未做任何修改
    Insufficient,
    /// 目标不存在
    Missing,
}

/// 积分账本仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRepositoryTrait: Send + Sync {
    /// 开户，已存在时保持原余额不变
    async fn open_account(&self, user_id: &str, initial_balance: i64) -> Result<()>;
    async fn balance(&self, user_id: &str) -> Result<Option<i64>>;
    /// 余额充足时原子扣减
    async fn debit(&self, user_id: &str, amount: i64) -> Result<DebitOutcome>;
    /// 无条件原子加积分，返回加后余额；用户不存在返回 UserNotFound
    async fn credit(&self, user_id: &str, amount: i64) -> Result<i64>;
}

/// 商品目录仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogRepositoryTrait: Send + Sync {
    async fn create_product(&self, product: &NewProduct) -> Result<Product>;
    /// 每次都读取最新数据，不做缓存
    async fn get_product(&self, product_id: i64) -> Result<Option<Product>>;
    async fn list_products(&self) -> Result<Vec<Product>>;
    /// 库存充足时原子扣减
    async fn debit_stock(&self, product_id: i64, quantity: i64) -> Result<DebitOutcome>;
    /// 无条件加库存（补货或回滚），商品不存在返回 ProductNotFound
    async fn credit_stock(&self, product_id: i64, quantity: i64) -> Result<i64>;
}

/// 购物车仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CartRepositoryTrait: Send + Sync {
    /// 加入购物车，已有条目时累加数量
    async fn upsert_item(&self, user_id: &str, product_id: i64, quantity: i64) -> Result<CartItem>;
    /// 覆盖数量，条目不存在返回 None
    async fn set_quantity(
        &self,
        user_id: &str,
        product_id: i64,
        quantity: i64,
    ) -> Result<Option<CartItem>>;
    async fn get_item(&self, user_id: &str, product_id: i64) -> Result<Option<CartItem>>;
    async fn list_items(&self, user_id: &str) -> Result<Vec<CartItem>>;
    /// 删除条目，返回是否确实删除了
    async fn remove_item(&self, user_id: &str, product_id: i64) -> Result<bool>;
    /// 结算后原子扣减已购数量，减到 0 时删除条目
    ///
    /// 返回剩余数量（已删除为 0），条目不存在返回 None
    async fn consume_item(
        &self,
        user_id: &str,
        product_id: i64,
        quantity: i64,
    ) -> Result<Option<i64>>;
}

/// 订单与流水仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordRepositoryTrait: Send + Sync {
    /// 原子写入订单及其兑换流水；幂等键冲突返回 DuplicateRedemption
    async fn create_redemption(&self, redemption: &NewRedemption) -> Result<()>;
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<TransactionRecord>>;
    async fn get_transaction(&self, transaction_id: Uuid) -> Result<Option<TransactionRecord>>;
    /// 比较并设置订单状态，同步更新对应兑换流水
    ///
    /// 当前状态不是 `from` 时不做修改并返回 false
    async fn update_status(
        &self,
        transaction_id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
        note: Option<String>,
    ) -> Result<bool>;
    async fn append_activities(&self, activities: &[ActivityRecord]) -> Result<()>;
    async fn list_activities(&self, user_id: &str, limit: i64) -> Result<Vec<ActivityRecord>>;
    async fn list_transactions(&self, user_id: &str, limit: i64) -> Result<Vec<TransactionRecord>>;
}

/// 成长进度仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressRepositoryTrait: Send + Sync {
    async fn get_progress(&self, user_id: &str) -> Result<Option<UserProgress>>;
    /// 原子累加经验，返回累加后的经验值；用户不存在返回 None
    async fn add_xp(&self, user_id: &str, xp: i64) -> Result<Option<i64>>;
    /// 记录一次投递：累加投递重量与次数，并累加当月积分
    async fn record_deposit(
        &self,
        user_id: &str,
        weight_grams: i64,
        period: &MonthlyPeriod,
        points: i64,
    ) -> Result<()>;
    async fn list_monthly_earnings(&self, user_id: &str, limit: i64)
    -> Result<Vec<MonthlyEarning>>;
}
