//! 购物车服务
//!
//! 购物车只记录意向，不锁定积分或库存；结算由 [`super::RedemptionService`] 完成

use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::{RewardsError, Result};
use crate::models::CartItem;
use crate::repository::{CartRepositoryTrait, CatalogRepositoryTrait};

/// 购物车服务
pub struct CartService {
    cart: Arc<dyn CartRepositoryTrait>,
    catalog: Arc<dyn CatalogRepositoryTrait>,
}

impl CartService {
    pub fn new(cart: Arc<dyn CartRepositoryTrait>, catalog: Arc<dyn CatalogRepositoryTrait>) -> Self {
        Self { cart, catalog }
    }

    /// 加入购物车，已有条目时累加数量
    #[instrument(skip(self))]
    pub async fn add_item(&self, user_id: &str, product_id: i64, quantity: i64) -> Result<CartItem> {
        if quantity < 1 {
            return Err(RewardsError::Validation("加入数量至少为1".to_string()));
        }
        self.catalog
            .get_product(product_id)
            .await?
            .ok_or(RewardsError::ProductNotFound(product_id))?;

        let item = self.cart.upsert_item(user_id, product_id, quantity).await?;
        info!(quantity = item.quantity, "商品已加入购物车");
        Ok(item)
    }

    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        user_id: &str,
        product_id: i64,
        quantity: i64,
    ) -> Result<CartItem> {
        if quantity < 1 {
            return Err(RewardsError::Validation("购物车数量至少为1".to_string()));
        }
        self.cart
            .set_quantity(user_id, product_id, quantity)
            .await?
            .ok_or_else(|| RewardsError::CartItemNotFound {
                user_id: user_id.to_string(),
                product_id,
            })
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: &str, product_id: i64) -> Result<()> {
        if !self.cart.remove_item(user_id, product_id).await? {
            return Err(RewardsError::CartItemNotFound {
                user_id: user_id.to_string(),
                product_id,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::Product;
    use crate::repository::{MockCartRepositoryTrait, MockCatalogRepositoryTrait};

    #[tokio::test]
    async fn test_add_item_requires_product() {
        let mut catalog = MockCatalogRepositoryTrait::new();
        catalog.expect_get_product().returning(|_| Ok(None));
        let mut cart = MockCartRepositoryTrait::new();
        cart.expect_upsert_item().never();

        let service = CartService::new(Arc::new(cart), Arc::new(catalog));
        let err = service.add_item("user-1", 9, 1).await.unwrap_err();
        assert!(matches!(err, RewardsError::ProductNotFound(9)));
    }

    #[tokio::test]
    async fn test_add_item() {
        let mut catalog = MockCatalogRepositoryTrait::new();
        catalog.expect_get_product().returning(|id| {
            Ok(Some(Product {
                id,
                name: "Bottle".to_string(),
                description: None,
                unit_cost: 20,
                stock: 5,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }))
        });
        let mut cart = MockCartRepositoryTrait::new();
        cart.expect_upsert_item()
            .returning(|user_id, product_id, quantity| {
                Ok(CartItem {
                    user_id: user_id.to_string(),
                    product_id,
                    quantity,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                })
            });

        let service = CartService::new(Arc::new(cart), Arc::new(catalog));
        let item = service.add_item("user-1", 3, 2).await.unwrap();
        assert_eq!(item.quantity, 2);
        assert!(service.add_item("user-1", 3, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_missing_item() {
        let mut cart = MockCartRepositoryTrait::new();
        cart.expect_remove_item().returning(|_, _| Ok(false));

        let service = CartService::new(Arc::new(cart), Arc::new(MockCatalogRepositoryTrait::new()));
        let err = service.remove_item("user-1", 3).await.unwrap_err();
        assert!(matches!(err, RewardsError::CartItemNotFound { .. }));
    }
}
