//! 商品目录仓储
//!
//! 库存与余额遵循相同的原子条件扣减约定

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use super::traits::{CatalogRepositoryTrait, DebitOutcome};
use crate::error::{RewardsError, Result};
use crate::models::{NewProduct, Product};

const PRODUCT_COLUMNS: &str = "id, name, description, unit_cost, stock, created_at, updated_at";

/// 商品目录仓储
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 新建商品
    pub async fn create_product(&self, product: &NewProduct) -> Result<Product> {
        if product.unit_cost < 0 || product.stock < 0 {
            return Err(RewardsError::Validation(
                "商品单价与库存不能为负数".to_string(),
            ));
        }

        let created = sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products (name, description, unit_cost, stock)
            VALUES ($1, $2, $3, $4)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.unit_cost)
        .bind(product.stock)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    pub async fn get_product(&self, product_id: i64) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    pub async fn list_products(&self) -> Result<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// 条件扣减库存
    pub async fn debit_stock(&self, product_id: i64, quantity: i64) -> Result<DebitOutcome> {
        let mut conn = self.pool.acquire().await?;
        Self::debit_stock_on(&mut conn, product_id, quantity).await
    }

    /// 在指定连接上条件扣减库存
    async fn debit_stock_on(
        conn: &mut PgConnection,
        product_id: i64,
        quantity: i64,
    ) -> Result<DebitOutcome> {
        if quantity <= 0 {
            return Err(RewardsError::Validation(format!(
                "扣减数量必须为正数: {}",
                quantity
            )));
        }

        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(remaining) = remaining {
            return Ok(DebitOutcome::Applied(remaining));
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(product_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(if exists {
            DebitOutcome::Insufficient
        } else {
            DebitOutcome::Missing
        })
    }

    /// 无条件加库存
    pub async fn credit_stock(&self, product_id: i64, quantity: i64) -> Result<i64> {
        if quantity <= 0 {
            return Err(RewardsError::Validation(format!(
                "补充数量必须为正数: {}",
                quantity
            )));
        }

        let stock: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING stock
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;

        stock.ok_or(RewardsError::ProductNotFound(product_id))
    }
}

#[async_trait]
impl CatalogRepositoryTrait for CatalogRepository {
    async fn create_product(&self, product: &NewProduct) -> Result<Product> {
        self.create_product(product).await
    }

    async fn get_product(&self, product_id: i64) -> Result<Option<Product>> {
        self.get_product(product_id).await
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        self.list_products().await
    }

    async fn debit_stock(&self, product_id: i64, quantity: i64) -> Result<DebitOutcome> {
        self.debit_stock(product_id, quantity).await
    }

    async fn credit_stock(&self, product_id: i64, quantity: i64) -> Result<i64> {
        self.credit_stock(product_id, quantity).await
    }
}
