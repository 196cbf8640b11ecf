//! 积分经济枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 积分流水类型
///
/// 正向流水（earn / scan）增加余额，兑换流水（redeem）减少余额
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    /// 奖励（+）- 升级奖励积分
    Earn,
    /// 兑换（-）- 积分兑换商品
    Redeem,
    /// 投递（+）- 扫码投递回收物
    Scan,
}

impl ActivityType {
    /// 是否为入账类型
    pub fn is_credit(&self) -> bool {
        matches!(self, Self::Earn | Self::Scan)
    }
}

/// 兑换订单状态
///
/// 合法流转：
/// - PENDING -> APPROVED -> SHIPPED -> COMPLETED
/// - PENDING -> REJECTED
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// 待审核
    #[default]
    Pending,
    /// 已审核通过
    Approved,
    /// 已发货
    Shipped,
    /// 已完成
    Completed,
    /// 已驳回
    Rejected,
}

impl TransactionStatus {
    /// 是否允许流转到目标状态
    pub fn can_transition_to(&self, target: TransactionStatus) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Approved)
                | (Self::Approved, Self::Shipped)
                | (Self::Shipped, Self::Completed)
                | (Self::Pending, Self::Rejected)
        )
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    /// 数据库/指标中使用的字符串表示
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Shipped => "SHIPPED",
            Self::Completed => "COMPLETED",
            Self::Rejected => "REJECTED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TransactionStatus; 5] = [
        TransactionStatus::Pending,
        TransactionStatus::Approved,
        TransactionStatus::Shipped,
        TransactionStatus::Completed,
        TransactionStatus::Rejected,
    ];

    #[test]
    fn test_valid_transitions() {
        use TransactionStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Approved.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Rejected));
    }

    #[test]
    fn test_only_four_transitions_are_valid() {
        let valid = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .count();
        assert_eq!(valid, 4);
    }

    #[test]
    fn test_invalid_transitions() {
        use TransactionStatus::*;
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Shipped.can_transition_to(Rejected));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Shipped));
    }

    #[test]
    fn test_terminal_states() {
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Rejected.is_terminal());
        assert!(!TransactionStatus::Shipped.is_terminal());
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_transitions() {
        for from in ALL {
            let has_next = ALL.iter().any(|to| from.can_transition_to(*to));
            assert_eq!(from.is_terminal(), !has_next, "{from:?}");
        }
    }

    #[test]
    fn test_credit_activity_types() {
        assert!(ActivityType::Earn.is_credit());
        assert!(ActivityType::Scan.is_credit());
        assert!(!ActivityType::Redeem.is_credit());
    }

    #[test]
    fn test_serde_format() {
        let json = serde_json::to_string(&TransactionStatus::Shipped).unwrap();
        assert_eq!(json, "\"SHIPPED\"");
        let parsed: ActivityType = serde_json::from_str("\"REDEEM\"").unwrap();
        assert_eq!(parsed, ActivityType::Redeem);
        assert!(!parsed.is_credit());
    }
}
