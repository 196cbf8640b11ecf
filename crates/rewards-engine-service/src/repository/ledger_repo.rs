//! 积分账本仓储
//!
//! 余额只能通过条件 UPDATE 变更：扣减与"余额是否充足"的判断在同一条语句内完成，
//! 并发扣减不可能把余额扣成负数（表上另有 CHECK 约束兜底）

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use super::traits::{DebitOutcome, LedgerRepositoryTrait};
use crate::error::{RewardsError, Result};

/// 积分账本仓储
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 开户
    pub async fn open_account(&self, user_id: &str, initial_balance: i64) -> Result<()> {
        if initial_balance < 0 {
            return Err(RewardsError::Validation("初始余额不能为负数".to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO user_balances (user_id, balance)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(initial_balance)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 查询余额
    pub async fn balance(&self, user_id: &str) -> Result<Option<i64>> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM user_balances WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(balance)
    }

    /// 条件扣减
    pub async fn debit(&self, user_id: &str, amount: i64) -> Result<DebitOutcome> {
        let mut conn = self.pool.acquire().await?;
        Self::debit_on(&mut conn, user_id, amount).await
    }

    /// 在指定连接上条件扣减
    ///
    /// 没有命中行时再判断是余额不足还是用户不存在，这一步只读不写
    async fn debit_on(
        conn: &mut PgConnection,
        user_id: &str,
        amount: i64,
    ) -> Result<DebitOutcome> {
        if amount <= 0 {
            return Err(RewardsError::Validation(format!(
                "扣减积分必须为正数: {}",
                amount
            )));
        }

        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE user_balances
            SET balance = balance - $2, updated_at = NOW()
            WHERE user_id = $1 AND balance >= $2
            RETURNING balance
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(remaining) = remaining {
            return Ok(DebitOutcome::Applied(remaining));
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM user_balances WHERE user_id = $1)")
                .bind(user_id)
                .fetch_one(&mut *conn)
                .await?;

        Ok(if exists {
            DebitOutcome::Insufficient
        } else {
            DebitOutcome::Missing
        })
    }

    /// 无条件加积分
    pub async fn credit(&self, user_id: &str, amount: i64) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::credit_on(&mut conn, user_id, amount).await
    }

    /// 在指定连接上无条件加积分
    async fn credit_on(conn: &mut PgConnection, user_id: &str, amount: i64) -> Result<i64> {
        if amount <= 0 {
            return Err(RewardsError::Validation(format!(
                "入账积分必须为正数: {}",
                amount
            )));
        }

        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE user_balances
            SET balance = balance + $2, updated_at = NOW()
            WHERE user_id = $1
            RETURNING balance
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(conn)
        .await?;

        balance.ok_or_else(|| RewardsError::UserNotFound(user_id.to_string()))
    }
}

#[async_trait]
impl LedgerRepositoryTrait for LedgerRepository {
    async fn open_account(&self, user_id: &str, initial_balance: i64) -> Result<()> {
        self.open_account(user_id, initial_balance).await
    }

    async fn balance(&self, user_id: &str) -> Result<Option<i64>> {
        self.balance(user_id).await
    }

    async fn debit(&self, user_id: &str, amount: i64) -> Result<DebitOutcome> {
        self.debit(user_id, amount).await
    }

    async fn credit(&self, user_id: &str, amount: i64) -> Result<i64> {
        self.credit(user_id, amount).await
    }
}
