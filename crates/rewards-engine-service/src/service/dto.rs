//! 服务层数据传输对象
//!
//! 定义服务层与外部交互使用的请求与响应，与内部领域模型解耦

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{ShippingInfo, TransactionStatus};

/// 直接兑换请求
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    #[validate(length(min = 1, max = 128, message = "用户ID长度必须在1-128个字符之间"))]
    pub user_id: String,
    pub product_id: i64,
    #[validate(range(min = 1, message = "兑换数量至少为1"))]
    pub quantity: i64,
    #[validate(nested)]
    pub shipping: ShippingInfo,
    /// 客户端提供的幂等键，重试时携带同一个键
    #[validate(length(min = 1, max = 128, message = "幂等键长度必须在1-128个字符之间"))]
    pub idempotency_key: Option<String>,
}

/// 购物车单条结算请求
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[validate(length(min = 1, max = 128, message = "用户ID长度必须在1-128个字符之间"))]
    pub user_id: String,
    pub product_id: i64,
    #[validate(nested)]
    pub shipping: ShippingInfo,
    #[validate(length(min = 1, max = 128, message = "幂等键长度必须在1-128个字符之间"))]
    pub idempotency_key: Option<String>,
}

/// 兑换回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub transaction_id: Uuid,
    pub order_no: String,
    pub product_id: i64,
    pub quantity: i64,
    pub total_cost: i64,
    /// 扣减后的积分余额
    pub remaining_balance: i64,
}

/// 购物车结算中单个商品的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCheckoutLine {
    pub product_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<PurchaseReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CartCheckoutLine {
    pub fn succeeded(receipt: PurchaseReceipt) -> Self {
        Self {
            product_id: receipt.product_id,
            receipt: Some(receipt),
            error_code: None,
            error_message: None,
        }
    }

    pub fn failed(product_id: i64, error: &crate::error::RewardsError) -> Self {
        Self {
            product_id,
            receipt: None,
            error_code: Some(error.error_code().to_string()),
            error_message: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.receipt.is_some()
    }
}

/// 购物车整体结算结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCheckoutSummary {
    pub lines: Vec<CartCheckoutLine>,
    pub succeeded: usize,
    pub failed: usize,
}

impl CartCheckoutSummary {
    pub fn push(&mut self, line: CartCheckoutLine) {
        if line.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.lines.push(line);
    }
}

/// 扫码预览（不产生任何修改）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanPreview {
    pub code: String,
    pub category: String,
    pub weight_kg: f64,
    pub points_earned: i64,
    pub xp_to_earn: i64,
}

/// 扫码结算结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSettlement {
    pub user_id: String,
    pub category: String,
    pub points_earned: i64,
    pub xp_earned: i64,
    pub new_xp: i64,
    pub new_level: usize,
    pub leveled_up: bool,
    /// 升级奖励积分（未升级为 0）
    pub bonus: i64,
    pub balance_after: i64,
}

/// 用户成长视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub user_id: String,
    pub xp: i64,
    pub level: usize,
    pub max_level: usize,
    pub progress_percent: u8,
    /// 满级时为空
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xp_to_next_level: Option<i64>,
    pub total_weight_grams: i64,
    pub deposit_count: i64,
}

/// 订单状态流转请求
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StatusTransitionRequest {
    pub transaction_id: Uuid,
    pub target: TransactionStatus,
    #[validate(length(max = 500, message = "备注不超过500字符"))]
    pub note: Option<String>,
}
