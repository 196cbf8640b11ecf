//! 查询服务（只读）

use std::sync::Arc;

use tracing::instrument;

use crate::error::{RewardsError, Result};
use crate::models::{ActivityRecord, CartItem, MonthlyEarning, TransactionRecord, UserProgress};
use crate::progression::ProgressionEngine;
use crate::repository::{
    CartRepositoryTrait, LedgerRepositoryTrait, ProgressRepositoryTrait, RecordRepositoryTrait,
};
use crate::service::dto::ProgressView;

/// 列表查询的最大条数
const MAX_LIST_LIMIT: i64 = 200;

/// 查询服务
pub struct QueryService {
    ledger: Arc<dyn LedgerRepositoryTrait>,
    progress: Arc<dyn ProgressRepositoryTrait>,
    records: Arc<dyn RecordRepositoryTrait>,
    cart: Arc<dyn CartRepositoryTrait>,
    engine: ProgressionEngine,
}

impl QueryService {
    pub fn new(
        ledger: Arc<dyn LedgerRepositoryTrait>,
        progress: Arc<dyn ProgressRepositoryTrait>,
        records: Arc<dyn RecordRepositoryTrait>,
        cart: Arc<dyn CartRepositoryTrait>,
        engine: ProgressionEngine,
    ) -> Self {
        Self {
            ledger,
            progress,
            records,
            cart,
            engine,
        }
    }

    fn clamp_limit(limit: i64) -> i64 {
        limit.clamp(1, MAX_LIST_LIMIT)
    }

    /// 积分余额
    #[instrument(skip(self))]
    pub async fn balance(&self, user_id: &str) -> Result<i64> {
        self.ledger
            .balance(user_id)
            .await?
            .ok_or_else(|| RewardsError::UserNotFound(user_id.to_string()))
    }

    /// 成长进度，等级由经验实时推导
    #[instrument(skip(self))]
    pub async fn progress(&self, user_id: &str) -> Result<ProgressView> {
        let progress = match self.progress.get_progress(user_id).await? {
            Some(progress) => progress,
            // 已开户但还没有投递过
            None => {
                self.balance(user_id).await?;
                UserProgress::new(user_id)
            }
        };

        let level = self.engine.level(progress.xp);
        Ok(ProgressView {
            user_id: progress.user_id,
            xp: progress.xp,
            level,
            max_level: self.engine.max_level(),
            progress_percent: self.engine.progress_percent(progress.xp, level),
            xp_to_next_level: self.engine.xp_to_next_level(progress.xp),
            total_weight_grams: progress.total_weight_grams,
            deposit_count: progress.deposit_count,
        })
    }

    #[instrument(skip(self))]
    pub async fn monthly_earnings(&self, user_id: &str, limit: i64) -> Result<Vec<MonthlyEarning>> {
        self.progress
            .list_monthly_earnings(user_id, Self::clamp_limit(limit))
            .await
    }

    #[instrument(skip(self))]
    pub async fn activities(&self, user_id: &str, limit: i64) -> Result<Vec<ActivityRecord>> {
        self.records
            .list_activities(user_id, Self::clamp_limit(limit))
            .await
    }

    #[instrument(skip(self))]
    pub async fn transactions(&self, user_id: &str, limit: i64) -> Result<Vec<TransactionRecord>> {
        self.records
            .list_transactions(user_id, Self::clamp_limit(limit))
            .await
    }

    #[instrument(skip(self))]
    pub async fn cart(&self, user_id: &str) -> Result<Vec<CartItem>> {
        self.cart.list_items(user_id).await
    }
}
