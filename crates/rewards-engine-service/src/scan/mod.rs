//! 回收码识别
//!
//! 识别结果由外部判定（称重设备、视觉识别等），本服务只依赖 [`ScanOracle`] 抽象。
//! 识别必须是只读且幂等的：同一个码多次识别得到相同结果。

mod static_oracle;

pub use static_oracle::{ScanCodeEntry, ScanConfig, StaticScanOracle};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RewardsError, Result};

/// 回收物识别结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanClassification {
    /// 回收物品类（如 PET、ALUMINUM）
    pub category: String,
    pub weight_kg: f64,
    /// 本次投递可得积分
    pub points_earned: i64,
}

impl ScanClassification {
    /// 拒绝负数或非有限的重量、负数积分
    pub fn validate(&self) -> Result<()> {
        if !self.weight_kg.is_finite() || self.weight_kg < 0.0 {
            return Err(RewardsError::Validation(format!(
                "回收物重量非法: {}",
                self.weight_kg
            )));
        }
        if self.points_earned < 0 {
            return Err(RewardsError::Validation(format!(
                "回收物积分不能为负数: {}",
                self.points_earned
            )));
        }
        Ok(())
    }
}

/// 回收码识别接口
///
/// 返回 `None` 表示无法识别
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScanOracle: Send + Sync {
    async fn classify(&self, code: &str) -> Result<Option<ScanClassification>>;
}
