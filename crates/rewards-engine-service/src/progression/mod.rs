//! 成长引擎（纯计算，无 I/O）
//!
//! 负责经验值与等级的换算、升级奖励累计和等级进度百分比。
//!
//! ## 规则
//!
//! - 等级阈值表 `T` 为固定、严格递增的不可变序列，`T[0] = 0`
//! - `level(xp)` 为满足 `xp >= T[i]` 的最大 i，最高等级为 `T.len() - 1`
//! - 一次入账跨越多个等级时，途经每一级的奖励都要累加
//! - 1 克投递重量 = 1 点经验

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RewardsError, Result};

/// 默认等级阈值（累计经验）
pub const DEFAULT_THRESHOLDS: [i64; 10] = [0, 50, 150, 300, 500, 750, 1100, 1500, 2000, 3000];

/// 默认升级奖励（到达对应等级时发放的积分）
pub const DEFAULT_LEVEL_BONUSES: [i64; 10] = [0, 10, 20, 30, 50, 80, 120, 160, 220, 300];

/// 千克换算克时保留到微克，消除二进制浮点误差（如 1.1 kg * 1000 = 1100.0000000000002）
const MICROGRAMS_PER_KILOGRAM: f64 = 1e9;
const MICROGRAMS_PER_GRAM: f64 = 1e6;

/// 成长配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProgressionConfig {
    pub thresholds: Vec<i64>,
    pub bonuses: Vec<i64>,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            thresholds: DEFAULT_THRESHOLDS.to_vec(),
            bonuses: DEFAULT_LEVEL_BONUSES.to_vec(),
        }
    }
}

/// 等级表
///
/// 构造后不可变，阈值与奖励按等级下标一一对应
#[derive(Debug, PartialEq, Eq)]
pub struct LevelTable {
    thresholds: Box<[i64]>,
    bonuses: Box<[i64]>,
}

impl LevelTable {
    /// 校验并构造等级表
    pub fn new(thresholds: Vec<i64>, bonuses: Vec<i64>) -> Result<Self> {
        if thresholds.is_empty() {
            return Err(RewardsError::Validation("等级阈值表不能为空".to_string()));
        }
        if thresholds[0] != 0 {
            return Err(RewardsError::Validation(format!(
                "等级阈值表必须从 0 开始，实际为 {}",
                thresholds[0]
            )));
        }
        if let Some(pair) = thresholds.windows(2).find(|w| w[0] >= w[1]) {
            return Err(RewardsError::Validation(format!(
                "等级阈值必须严格递增: {} >= {}",
                pair[0], pair[1]
            )));
        }
        if bonuses.len() != thresholds.len() {
            return Err(RewardsError::Validation(format!(
                "奖励表长度 {} 与阈值表长度 {} 不一致",
                bonuses.len(),
                thresholds.len()
            )));
        }
        if bonuses.iter().any(|b| *b < 0) {
            return Err(RewardsError::Validation("升级奖励不能为负数".to_string()));
        }

        Ok(Self {
            thresholds: thresholds.into_boxed_slice(),
            bonuses: bonuses.into_boxed_slice(),
        })
    }

    pub fn thresholds(&self) -> &[i64] {
        &self.thresholds
    }

    pub fn bonuses(&self) -> &[i64] {
        &self.bonuses
    }
}

impl Default for LevelTable {
    fn default() -> Self {
        Self {
            thresholds: Box::new(DEFAULT_THRESHOLDS),
            bonuses: Box::new(DEFAULT_LEVEL_BONUSES),
        }
    }
}

/// 一次入账的成长结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnOutcome {
    pub new_xp: i64,
    pub old_level: usize,
    pub new_level: usize,
    /// 本次跨越的所有等级奖励之和
    pub bonus: i64,
    pub leveled_up: bool,
}

/// 成长引擎
///
/// 内部共享不可变等级表，克隆开销很小
#[derive(Debug, Clone, Default)]
pub struct ProgressionEngine {
    table: Arc<LevelTable>,
}

impl ProgressionEngine {
    pub fn new(table: LevelTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    /// 从配置构造，配置非法时返回校验错误
    pub fn from_config(config: &ProgressionConfig) -> Result<Self> {
        LevelTable::new(config.thresholds.clone(), config.bonuses.clone()).map(Self::new)
    }

    pub fn table(&self) -> &LevelTable {
        &self.table
    }

    /// 最高等级
    pub fn max_level(&self) -> usize {
        self.table.thresholds.len() - 1
    }

    /// 经验值对应的等级
    pub fn level(&self, xp: i64) -> usize {
        // T[0] = 0，负数经验按 0 处理
        let xp = xp.max(0);
        self.table.thresholds.partition_point(|t| *t <= xp) - 1
    }

    /// 投递重量（克）换算经验值，向下取整
    pub fn xp_from_weight(&self, grams: f64) -> i64 {
        if !grams.is_finite() || grams <= 0.0 {
            return 0;
        }
        // f64 -> i64 的 as 转换在越界时饱和
        grams.floor() as i64
    }

    /// 投递重量（千克）换算经验值
    ///
    /// 先按微克精度舍入再取整，千克到克的换算误差不会跨过整克边界
    pub fn xp_from_kilograms(&self, kilograms: f64) -> i64 {
        let micrograms = kilograms * MICROGRAMS_PER_KILOGRAM;
        let grams = if micrograms.is_finite() {
            micrograms.round() / MICROGRAMS_PER_GRAM
        } else {
            kilograms * 1000.0
        };
        self.xp_from_weight(grams)
    }

    /// 入账经验并计算升级奖励
    pub fn on_earn(&self, old_xp: i64, delta_xp: i64) -> EarnOutcome {
        let old_xp = old_xp.max(0);
        let new_xp = old_xp.saturating_add(delta_xp.max(0));
        let old_level = self.level(old_xp);
        let new_level = self.level(new_xp);

        let bonus = if new_level > old_level {
            self.table.bonuses[old_level + 1..=new_level].iter().sum()
        } else {
            0
        };

        EarnOutcome {
            new_xp,
            old_level,
            new_level,
            bonus,
            leveled_up: new_level > old_level,
        }
    }

    /// 当前等级内的进度百分比，满级为 100
    pub fn progress_percent(&self, xp: i64, level: usize) -> u8 {
        if level >= self.max_level() {
            return 100;
        }

        let floor = self.table.thresholds[level] as i128;
        let ceil = self.table.thresholds[level + 1] as i128;
        let percent = (xp as i128 - floor) * 100 / (ceil - floor);

        percent.clamp(0, 100) as u8
    }

    /// 距下一级还差的经验，满级返回 None
    pub fn xp_to_next_level(&self, xp: i64) -> Option<i64> {
        let level = self.level(xp);
        if level >= self.max_level() {
            return None;
        }
        Some(self.table.thresholds[level + 1] - xp.max(0))
    }
}
