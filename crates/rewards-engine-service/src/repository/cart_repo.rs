//! 购物车仓储

use async_trait::async_trait;
use sqlx::PgPool;

use super::is_foreign_key_violation;
use super::traits::CartRepositoryTrait;
use crate::error::{RewardsError, Result};
use crate::models::CartItem;

const CART_COLUMNS: &str = "user_id, product_id, quantity, created_at, updated_at";

/// 购物车仓储
pub struct CartRepository {
    pool: PgPool,
}

impl CartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn ensure_quantity(quantity: i64) -> Result<()> {
        if quantity < 1 {
            return Err(RewardsError::Validation(format!(
                "购物车数量至少为 1: {}",
                quantity
            )));
        }
        Ok(())
    }

    /// 加入购物车，已存在时累加数量
    pub async fn upsert_item(
        &self,
        user_id: &str,
        product_id: i64,
        quantity: i64,
    ) -> Result<CartItem> {
        Self::ensure_quantity(quantity)?;

        let item = sqlx::query_as::<_, CartItem>(&format!(
            r#"
            INSERT INTO cart_items (user_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id)
            DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity, updated_at = NOW()
            RETURNING {CART_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                RewardsError::ProductNotFound(product_id)
            } else {
                e.into()
            }
        })?;

        Ok(item)
    }

    pub async fn set_quantity(
        &self,
        user_id: &str,
        product_id: i64,
        quantity: i64,
    ) -> Result<Option<CartItem>> {
        Self::ensure_quantity(quantity)?;

        let item = sqlx::query_as::<_, CartItem>(&format!(
            r#"
            UPDATE cart_items
            SET quantity = $3, updated_at = NOW()
            WHERE user_id = $1 AND product_id = $2
            RETURNING {CART_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    pub async fn get_item(&self, user_id: &str, product_id: i64) -> Result<Option<CartItem>> {
        let item = sqlx::query_as::<_, CartItem>(&format!(
            "SELECT {CART_COLUMNS} FROM cart_items WHERE user_id = $1 AND product_id = $2"
        ))
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    pub async fn list_items(&self, user_id: &str) -> Result<Vec<CartItem>> {
        let items = sqlx::query_as::<_, CartItem>(&format!(
            "SELECT {CART_COLUMNS} FROM cart_items WHERE user_id = $1 ORDER BY created_at, product_id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    pub async fn remove_item(&self, user_id: &str, product_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 两个 CTE 基于同一快照，恰好一个生效：数量更多时扣减，否则删除
    pub async fn consume_item(
        &self,
        user_id: &str,
        product_id: i64,
        quantity: i64,
    ) -> Result<Option<i64>> {
        Self::ensure_quantity(quantity)?;

        let remaining = sqlx::query_scalar::<_, i64>(
            r#"
            WITH decremented AS (
                UPDATE cart_items
                SET quantity = quantity - $3, updated_at = NOW()
                WHERE user_id = $1 AND product_id = $2 AND quantity > $3
                RETURNING quantity
            ),
            deleted AS (
                DELETE FROM cart_items
                WHERE user_id = $1 AND product_id = $2 AND quantity <= $3
                RETURNING 0::BIGINT AS quantity
            )
            SELECT quantity FROM decremented
            UNION ALL
            SELECT quantity FROM deleted
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(remaining)
    }
}

#[async_trait]
impl CartRepositoryTrait for CartRepository {
    async fn upsert_item(&self, user_id: &str, product_id: i64, quantity: i64) -> Result<CartItem> {
        self.upsert_item(user_id, product_id, quantity).await
    }

    async fn set_quantity(
        &self,
        user_id: &str,
        product_id: i64,
        quantity: i64,
    ) -> Result<Option<CartItem>> {
        self.set_quantity(user_id, product_id, quantity).await
    }

    async fn get_item(&self, user_id: &str, product_id: i64) -> Result<Option<CartItem>> {
        self.get_item(user_id, product_id).await
    }

    async fn list_items(&self, user_id: &str) -> Result<Vec<CartItem>> {
        self.list_items(user_id).await
    }

    async fn remove_item(&self, user_id: &str, product_id: i64) -> Result<bool> {
        self.remove_item(user_id, product_id).await
    }

    async fn consume_item(
        &self,
        user_id: &str,
        product_id: i64,
        quantity: i64,
    ) -> Result<Option<i64>> {
        self.consume_item(user_id, product_id, quantity).await
    }
}
