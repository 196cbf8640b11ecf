//! 成长进度仓储

use async_trait::async_trait;
use sqlx::PgPool;

use super::traits::ProgressRepositoryTrait;
use crate::error::{RewardsError, Result};
use crate::models::{MonthlyEarning, MonthlyPeriod, UserProgress};

/// 成长进度仓储
pub struct ProgressRepository {
    pool: PgPool,
}

impl ProgressRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_progress(&self, user_id: &str) -> Result<Option<UserProgress>> {
        let progress = sqlx::query_as::<_, UserProgress>(
            r#"
            SELECT user_id, xp, total_weight_grams, deposit_count, updated_at
            FROM user_progress
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(progress)
    }

    /// 原子累加经验
    ///
    /// 只为已开户的用户建立进度行；用户不存在时不插入任何数据并返回 None
    pub async fn add_xp(&self, user_id: &str, xp: i64) -> Result<Option<i64>> {
        if xp < 0 {
            return Err(RewardsError::Validation(format!("经验值不能为负数: {}", xp)));
        }

        let new_xp: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO user_progress (user_id, xp)
            SELECT $1, $2
            WHERE EXISTS (SELECT 1 FROM user_balances WHERE user_id = $1)
            ON CONFLICT (user_id)
            DO UPDATE SET xp = user_progress.xp + EXCLUDED.xp, updated_at = NOW()
            RETURNING xp
            "#,
        )
        .bind(user_id)
        .bind(xp)
        .fetch_optional(&self.pool)
        .await?;

        Ok(new_xp)
    }

    /// 记录一次投递
    pub async fn record_deposit(
        &self,
        user_id: &str,
        weight_grams: i64,
        period: &MonthlyPeriod,
        points: i64,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO user_progress (user_id, total_weight_grams, deposit_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (user_id)
            DO UPDATE SET total_weight_grams = user_progress.total_weight_grams + EXCLUDED.total_weight_grams,
                          deposit_count = user_progress.deposit_count + 1,
                          updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(weight_grams)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO monthly_earnings (user_id, period, points)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, period)
            DO UPDATE SET points = monthly_earnings.points + EXCLUDED.points, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(period)
        .bind(points)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// 最近若干个月的积分统计，按月份倒序
    pub async fn list_monthly_earnings(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<MonthlyEarning>> {
        let earnings = sqlx::query_as::<_, MonthlyEarning>(
            r#"
            SELECT user_id, period, points
            FROM monthly_earnings
            WHERE user_id = $1
            ORDER BY period DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(earnings)
    }
}

#[async_trait]
impl ProgressRepositoryTrait for ProgressRepository {
    async fn get_progress(&self, user_id: &str) -> Result<Option<UserProgress>> {
        self.get_progress(user_id).await
    }

    async fn add_xp(&self, user_id: &str, xp: i64) -> Result<Option<i64>> {
        self.add_xp(user_id, xp).await
    }

    async fn record_deposit(
        &self,
        user_id: &str,
        weight_grams: i64,
        period: &MonthlyPeriod,
        points: i64,
    ) -> Result<()> {
        self.record_deposit(user_id, weight_grams, period, points)
            .await
    }

    async fn list_monthly_earnings(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<MonthlyEarning>> {
        self.list_monthly_earnings(user_id, limit).await
    }
}
