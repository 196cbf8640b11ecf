//! 用户成长进度实体定义
//!
//! 等级不落库：任何时刻都由 xp 经成长引擎推导

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// 用户成长进度与投递累计
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub user_id: String,
    /// 累计经验值
    pub xp: i64,
    /// 累计投递重量（克）
    pub total_weight_grams: i64,
    /// 累计投递次数
    pub deposit_count: i64,
    pub updated_at: DateTime<Utc>,
}

impl UserProgress {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            xp: 0,
            total_weight_grams: 0,
            deposit_count: 0,
            updated_at: Utc::now(),
        }
    }
}

/// 月度统计周期
///
/// 以 `YYYY-MM` 作为键，不同年份的同一月份不会冲突
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct MonthlyPeriod(String);

impl MonthlyPeriod {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(format!("{:04}-{:02}", at.year(), at.month()))
    }

    /// 当前 UTC 月份
    pub fn current() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MonthlyPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 月度积分统计（仅用于报表，不参与余额计算）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyEarning {
    pub user_id: String,
    pub period: MonthlyPeriod,
    pub points: i64,
}
