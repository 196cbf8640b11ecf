//! 积分流水与兑换订单实体定义
//!
//! 流水记录只追加不修改：创建后仅允许运营侧更新 status 与 note，points_delta 永不变更

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::enums::{ActivityType, TransactionStatus};

/// 收货信息快照
///
/// 兑换时随订单一起保存，后续用户修改地址不影响已下单订单
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    #[validate(length(min = 1, max = 100, message = "收件人姓名长度必须在1-100个字符之间"))]
    pub recipient_name: String,
    #[validate(length(min = 5, max = 30, message = "联系电话长度必须在5-30个字符之间"))]
    pub phone: String,
    #[validate(length(min = 1, max = 500, message = "收货地址长度必须在1-500个字符之间"))]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

/// 积分流水记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: Uuid,
    pub user_id: String,
    pub activity_type: ActivityType,
    /// 积分变动（入账为正，兑换为负）
    pub points_delta: i64,
    #[sqlx(default)]
    pub product_id: Option<i64>,
    #[sqlx(default)]
    pub transaction_id: Option<Uuid>,
    /// 仅兑换流水有状态
    #[sqlx(default)]
    pub status: Option<TransactionStatus>,
    #[sqlx(default)]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActivityRecord {
    fn new(user_id: &str, activity_type: ActivityType, points_delta: i64) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.to_string(),
            activity_type,
            points_delta,
            product_id: None,
            transaction_id: None,
            status: None,
            note: None,
            created_at: Utc::now(),
        }
    }

    /// 变动方向与流水类型一致：入账类型不为负，兑换不为正
    pub fn has_consistent_direction(&self) -> bool {
        if self.activity_type.is_credit() {
            self.points_delta >= 0
        } else {
            self.points_delta <= 0
        }
    }

    /// 投递流水
    pub fn scan(user_id: &str, points: i64, category: &str) -> Self {
        let mut record = Self::new(user_id, ActivityType::Scan, points);
        record.note = Some(format!("投递回收物: {}", category));
        record
    }

    /// 升级奖励流水
    pub fn level_bonus(user_id: &str, bonus: i64, new_level: usize) -> Self {
        let mut record = Self::new(user_id, ActivityType::Earn, bonus);
        record.note = Some(format!("升级奖励: Lv.{}", new_level));
        record
    }

    /// 兑换流水（与订单一一对应）
    pub fn redeem(transaction: &TransactionRecord) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: transaction.user_id.clone(),
            activity_type: ActivityType::Redeem,
            points_delta: -transaction.total_cost,
            product_id: Some(transaction.product_id),
            transaction_id: Some(transaction.id),
            status: Some(transaction.status),
            note: None,
            created_at: transaction.created_at,
        }
    }
}

/// 兑换订单
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: Uuid,
    /// 订单号（业务唯一标识）
    pub order_no: String,
    pub user_id: String,
    pub product_id: i64,
    pub quantity: i64,
    /// 下单时的单价快照
    pub unit_cost: i64,
    pub total_cost: i64,
    #[sqlx(json)]
    pub shipping: ShippingInfo,
    pub status: TransactionStatus,
    #[sqlx(default)]
    pub note: Option<String>,
    #[sqlx(default)]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 一次兑换需要同时落库的订单与流水
#[derive(Debug, Clone)]
pub struct NewRedemption {
    pub transaction: TransactionRecord,
    pub activity: ActivityRecord,
}

impl NewRedemption {
    /// 以 PENDING 状态构造订单及其兑换流水
    pub fn pending(
        user_id: &str,
        product_id: i64,
        quantity: i64,
        unit_cost: i64,
        total_cost: i64,
        shipping: ShippingInfo,
        idempotency_key: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let transaction = TransactionRecord {
            id: Uuid::now_v7(),
            order_no: generate_order_no(now),
            user_id: user_id.to_string(),
            product_id,
            quantity,
            unit_cost,
            total_cost,
            shipping,
            status: TransactionStatus::Pending,
            note: None,
            idempotency_key,
            created_at: now,
            updated_at: now,
        };
        let activity = ActivityRecord::redeem(&transaction);
        Self {
            transaction,
            activity,
        }
    }
}

/// 生成兑换订单号
///
/// 格式: RD{yyyyMMddHHmmss}{6位随机数}
/// 使用 UUID v4 作为随机数源
fn generate_order_no(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().as_u128() % 1_000_000;
    format!("RD{}{:06}", now.format("%Y%m%d%H%M%S"), random)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shipping() -> ShippingInfo {
        ShippingInfo {
            recipient_name: "Lin".to_string(),
            phone: "13800000000".to_string(),
            address: "1 Recycling Road".to_string(),
            postal_code: None,
        }
    }

    #[test]
    fn test_generate_order_no_format() {
        let order_no = generate_order_no(Utc::now());
        assert!(order_no.starts_with("RD"));
        // "RD" + 14 位时间戳 + 6 位随机数
        assert_eq!(order_no.len(), 22);
    }

    #[test]
    fn test_pending_redemption_pairs_records() {
        let redemption = NewRedemption::pending("user-1", 7, 2, 30, 60, shipping(), None);

        assert_eq!(redemption.transaction.status, TransactionStatus::Pending);
        assert_eq!(redemption.activity.activity_type, ActivityType::Redeem);
        assert_eq!(redemption.activity.points_delta, -60);
        assert_eq!(redemption.activity.status, Some(TransactionStatus::Pending));
        assert_eq!(
            redemption.activity.transaction_id,
            Some(redemption.transaction.id)
        );
        assert_eq!(redemption.activity.product_id, Some(7));
    }

    #[test]
    fn test_scan_and_bonus_records() {
        let scan = ActivityRecord::scan("user-1", 25, "PET");
        assert_eq!(scan.activity_type, ActivityType::Scan);
        assert_eq!(scan.points_delta, 25);
        assert!(scan.status.is_none());

        let bonus = ActivityRecord::level_bonus("user-1", 110, 4);
        assert_eq!(bonus.activity_type, ActivityType::Earn);
        assert_eq!(bonus.note.as_deref(), Some("升级奖励: Lv.4"));
    }

    #[test]
    fn test_direction_matches_activity_type() {
        assert!(ActivityRecord::scan("user-1", 25, "PET").has_consistent_direction());
        assert!(ActivityRecord::level_bonus("user-1", 110, 4).has_consistent_direction());

        let redemption = NewRedemption::pending("user-1", 7, 2, 30, 60, shipping(), None);
        assert!(redemption.activity.has_consistent_direction());

        let mut negative_scan = ActivityRecord::scan("user-1", 25, "PET");
        negative_scan.points_delta = -25;
        assert!(!negative_scan.has_consistent_direction());

        let mut positive_redeem = redemption.activity;
        positive_redeem.points_delta = 60;
        assert!(!positive_redeem.has_consistent_direction());
    }

    #[test]
    fn test_shipping_validation() {
        assert!(shipping().validate().is_ok());

        let mut invalid = shipping();
        invalid.recipient_name = String::new();
        assert!(invalid.validate().is_err());
    }
}
