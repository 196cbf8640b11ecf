//! 商品与购物车实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 兑换商品
///
/// 单价以积分计；库存只能通过 Catalog 仓储的原子操作变更
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    /// 商品名称
    pub name: String,
    /// 商品描述
    #[sqlx(default)]
    pub description: Option<String>,
    /// 单价（积分）
    pub unit_cost: i64,
    /// 当前库存
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// 计算兑换总价，溢出时返回 None
    pub fn total_cost(&self, quantity: i64) -> Option<i64> {
        self.unit_cost.checked_mul(quantity)
    }
}

/// 新建商品参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub unit_cost: i64,
    pub stock: i64,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, unit_cost: i64, stock: i64) -> Self {
        Self {
            name: name.into(),
            description: None,
            unit_cost,
            stock,
        }
    }
}

/// 购物车条目
///
/// 每个用户每个商品最多一行，数量至少为 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub user_id: String,
    pub product_id: i64,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
