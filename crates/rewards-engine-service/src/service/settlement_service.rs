//! 扫码结算服务
//!
//! 用户投递回收物后扫码入账：识别 -> 加经验 -> 算升级奖励 -> 加积分 -> 记月度统计 -> 写流水。
//!
//! 经验通过原子累加得到新值，再由新值倒推本次入账前的经验，
//! 同一用户的并发扫码各自只会看到自己跨越的等级，升级奖励不会重复发放。
//! 任何存储故障都直接上报，不做静默重试。

use std::sync::Arc;

use rewards_shared::observability::metrics::{outcome, record_scan_settlement};
use tracing::{info, instrument, warn};

use crate::error::{RewardsError, Result};
use crate::models::{ActivityRecord, MonthlyPeriod};
use crate::progression::ProgressionEngine;
use crate::repository::{LedgerRepositoryTrait, ProgressRepositoryTrait, RecordRepositoryTrait};
use crate::scan::{ScanClassification, ScanOracle};
use crate::service::dto::{ScanPreview, ScanSettlement};

/// 扫码结算服务
pub struct ScanSettlementService {
    oracle: Arc<dyn ScanOracle>,
    ledger: Arc<dyn LedgerRepositoryTrait>,
    progress: Arc<dyn ProgressRepositoryTrait>,
    records: Arc<dyn RecordRepositoryTrait>,
    engine: ProgressionEngine,
}

impl ScanSettlementService {
    pub fn new(
        oracle: Arc<dyn ScanOracle>,
        ledger: Arc<dyn LedgerRepositoryTrait>,
        progress: Arc<dyn ProgressRepositoryTrait>,
        records: Arc<dyn RecordRepositoryTrait>,
        engine: ProgressionEngine,
    ) -> Self {
        Self {
            oracle,
            ledger,
            progress,
            records,
            engine,
        }
    }

    /// 识别回收码并拒绝非法结果
    async fn classify(&self, code: &str) -> Result<ScanClassification> {
        let classification = self
            .oracle
            .classify(code)
            .await?
            .ok_or_else(|| RewardsError::ScanNotRecognized(code.to_string()))?;
        classification.validate()?;
        Ok(classification)
    }

    /// 预览扫码收益，不产生任何修改
    #[instrument(skip(self))]
    pub async fn preview_scan(&self, code: &str) -> Result<ScanPreview> {
        let classification = self.classify(code).await?;
        let xp_to_earn = self
            .engine
            .xp_from_kilograms(classification.weight_kg);

        Ok(ScanPreview {
            code: code.to_string(),
            category: classification.category,
            weight_kg: classification.weight_kg,
            points_earned: classification.points_earned,
            xp_to_earn,
        })
    }

    /// 扫码结算
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn settle_scan(&self, user_id: &str, code: &str) -> Result<ScanSettlement> {
        let result = self.settle(user_id, code).await;
        match &result {
            Ok(settlement) => record_scan_settlement(outcome::SUCCESS, settlement.leveled_up),
            Err(e) => record_scan_settlement(e.error_code(), false),
        }
        result
    }

    async fn settle(&self, user_id: &str, code: &str) -> Result<ScanSettlement> {
        // 1. 识别
        let classification = self.classify(code).await?;

        // 2. 重量换算经验
        let weight_grams = self.engine.xp_from_kilograms(classification.weight_kg);
        let xp_earned = weight_grams;

        // 3. 原子加经验（用户不存在时此处失败，尚未产生任何修改）
        let new_xp = self
            .progress
            .add_xp(user_id, xp_earned)
            .await?
            .ok_or_else(|| RewardsError::UserNotFound(user_id.to_string()))?;
        let outcome = self.engine.on_earn(new_xp - xp_earned, xp_earned);

        // 4. 积分入账（投递积分 + 升级奖励）
        let total_points = classification
            .points_earned
            .checked_add(outcome.bonus)
            .ok_or_else(|| RewardsError::Internal("积分累加溢出".to_string()))?;
        let balance_after = if total_points > 0 {
            self.ledger.credit(user_id, total_points).await?
        } else {
            self.ledger
                .balance(user_id)
                .await?
                .ok_or_else(|| RewardsError::UserNotFound(user_id.to_string()))?
        };

        // 5. 月度统计与投递累计
        self.progress
            .record_deposit(
                user_id,
                weight_grams,
                &MonthlyPeriod::current(),
                total_points,
            )
            .await?;

        // 6. 流水：投递与升级奖励分开记录
        let mut activities = vec![ActivityRecord::scan(
            user_id,
            classification.points_earned,
            &classification.category,
        )];
        if outcome.bonus > 0 {
            activities.push(ActivityRecord::level_bonus(
                user_id,
                outcome.bonus,
                outcome.new_level,
            ));
        }
        self.records.append_activities(&activities).await?;

        if outcome.leveled_up {
            info!(
                user_id = %user_id,
                old_level = outcome.old_level,
                new_level = outcome.new_level,
                bonus = outcome.bonus,
                "用户升级"
            );
        }
        info!(
            user_id = %user_id,
            category = %classification.category,
            points = classification.points_earned,
            xp = xp_earned,
            balance_after,
            "扫码结算成功"
        );
        if classification.points_earned == 0 && xp_earned == 0 {
            warn!(user_id = %user_id, code, "扫码结算未产生任何收益");
        }

        Ok(ScanSettlement {
            user_id: user_id.to_string(),
            category: classification.category,
            points_earned: classification.points_earned,
            xp_earned,
            new_xp: outcome.new_xp,
            new_level: outcome.new_level,
            leveled_up: outcome.leveled_up,
            bonus: outcome.bonus,
            balance_after,
        })
    }
}
