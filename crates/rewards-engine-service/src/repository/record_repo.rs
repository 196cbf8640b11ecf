//! 订单与流水仓储
//!
//! 兑换订单与其兑换流水在同一个数据库事务中写入，二者要么同时存在要么都不存在

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{ensure_activity_directions, is_unique_violation};
use super::traits::RecordRepositoryTrait;
use crate::error::{RewardsError, Result};
use crate::models::{ActivityRecord, NewRedemption, TransactionRecord, TransactionStatus};

/// 幂等键唯一约束名（见 migrations/0001_init.sql）
const IDEMPOTENCY_CONSTRAINT: &str = "uq_redemption_idempotency_key";

const TRANSACTION_COLUMNS: &str = "id, order_no, user_id, product_id, quantity, unit_cost, total_cost, \
     shipping, status, note, idempotency_key, created_at, updated_at";

const ACTIVITY_COLUMNS: &str = "id, user_id, activity_type, points_delta, product_id, transaction_id, \
     status, note, created_at";

/// 订单与流水仓储
pub struct RecordRepository {
    pool: PgPool,
}

impl RecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 写入兑换订单及兑换流水
    pub async fn create_redemption(&self, redemption: &NewRedemption) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let transaction = &redemption.transaction;
        let inserted = sqlx::query(
            r#"
            INSERT INTO redemption_transactions
                (id, order_no, user_id, product_id, quantity, unit_cost, total_cost,
                 shipping, status, note, idempotency_key, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(transaction.id)
        .bind(&transaction.order_no)
        .bind(&transaction.user_id)
        .bind(transaction.product_id)
        .bind(transaction.quantity)
        .bind(transaction.unit_cost)
        .bind(transaction.total_cost)
        .bind(Json(&transaction.shipping))
        .bind(transaction.status)
        .bind(&transaction.note)
        .bind(&transaction.idempotency_key)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            if let Some(key) = duplicate_idempotency_key(&e, transaction) {
                return Err(RewardsError::DuplicateRedemption(key));
            }
            return Err(e.into());
        }

        Self::insert_activity_in_tx(&mut tx, &redemption.activity).await?;

        tx.commit().await?;
        Ok(())
    }

    /// 在事务中写入一条流水
    async fn insert_activity_in_tx(
        conn: &mut PgConnection,
        activity: &ActivityRecord,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_records
                (id, user_id, activity_type, points_delta, product_id, transaction_id,
                 status, note, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(activity.id)
        .bind(&activity.user_id)
        .bind(activity.activity_type)
        .bind(activity.points_delta)
        .bind(activity.product_id)
        .bind(activity.transaction_id)
        .bind(activity.status)
        .bind(&activity.note)
        .bind(activity.created_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// 追加流水（同一批次在一个事务内写入）
    pub async fn append_activities(&self, activities: &[ActivityRecord]) -> Result<()> {
        if activities.is_empty() {
            return Ok(());
        }
        ensure_activity_directions(activities)?;

        let mut tx = self.pool.begin().await?;
        for activity in activities {
            Self::insert_activity_in_tx(&mut tx, activity).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    pub async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<TransactionRecord>> {
        let transaction = sqlx::query_as::<_, TransactionRecord>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM redemption_transactions WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    pub async fn get_transaction(&self, transaction_id: Uuid) -> Result<Option<TransactionRecord>> {
        let transaction = sqlx::query_as::<_, TransactionRecord>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM redemption_transactions WHERE id = $1"
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    /// 比较并设置订单状态
    ///
    /// 只修改 status / note / updated_at，不会触碰积分与库存
    pub async fn update_status(
        &self,
        transaction_id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
        note: Option<String>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE redemption_transactions
            SET status = $3, note = COALESCE($4, note), updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(transaction_id)
        .bind(from)
        .bind(to)
        .bind(&note)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE activity_records
            SET status = $2
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .bind(to)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn list_activities(&self, user_id: &str, limit: i64) -> Result<Vec<ActivityRecord>> {
        let activities = sqlx::query_as::<_, ActivityRecord>(&format!(
            r#"
            SELECT {ACTIVITY_COLUMNS}
            FROM activity_records
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(activities)
    }

    pub async fn list_transactions(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>> {
        let transactions = sqlx::query_as::<_, TransactionRecord>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM redemption_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }
}

/// 幂等键冲突时返回该键
fn duplicate_idempotency_key(err: &sqlx::Error, transaction: &TransactionRecord) -> Option<String> {
    if !is_unique_violation(err) {
        return None;
    }
    let constraint = match err {
        sqlx::Error::Database(db_error) => db_error.constraint(),
        _ => None,
    };
    if constraint != Some(IDEMPOTENCY_CONSTRAINT) {
        return None;
    }
    transaction.idempotency_key.clone()
}

#[async_trait]
impl RecordRepositoryTrait for RecordRepository {
    async fn create_redemption(&self, redemption: &NewRedemption) -> Result<()> {
        self.create_redemption(redemption).await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<TransactionRecord>> {
        self.find_by_idempotency_key(key).await
    }

    async fn get_transaction(&self, transaction_id: Uuid) -> Result<Option<TransactionRecord>> {
        self.get_transaction(transaction_id).await
    }

    async fn update_status(
        &self,
        transaction_id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
        note: Option<String>,
    ) -> Result<bool> {
        self.update_status(transaction_id, from, to, note).await
    }

    async fn append_activities(&self, activities: &[ActivityRecord]) -> Result<()> {
        self.append_activities(activities).await
    }

    async fn list_activities(&self, user_id: &str, limit: i64) -> Result<Vec<ActivityRecord>> {
        self.list_activities(user_id, limit).await
    }

    async fn list_transactions(&self, user_id: &str, limit: i64) -> Result<Vec<TransactionRecord>> {
        self.list_transactions(user_id, limit).await
    }
}
