//! 基于配置的静态识别表

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{ScanClassification, ScanOracle};
use crate::error::Result;

/// 识别表中的一条记录
#[derive(Debug, Clone, Deserialize)]
pub struct ScanCodeEntry {
    pub code: String,
    pub category: String,
    pub weight_kg: f64,
    pub points_earned: i64,
}

/// `[scan]` 配置段
///
/// ```toml
/// [[scan.codes]]
/// code = "PET-0001"
/// category = "PET"
/// weight_kg = 2.5
/// points_earned = 25
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub codes: Vec<ScanCodeEntry>,
}

/// 静态识别器
///
/// 启动时载入，运行期只读
#[derive(Debug, Default)]
pub struct StaticScanOracle {
    entries: HashMap<String, ScanClassification>,
}

impl StaticScanOracle {
    pub fn new(entries: impl IntoIterator<Item = ScanCodeEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| {
                (
                    entry.code,
                    ScanClassification {
                        category: entry.category,
                        weight_kg: entry.weight_kg,
                        points_earned: entry.points_earned,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.codes.iter().cloned())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ScanOracle for StaticScanOracle {
    async fn classify(&self, code: &str) -> Result<Option<ScanClassification>> {
        let found = self.entries.get(code.trim()).cloned();
        debug!(code, recognized = found.is_some(), "回收码识别");
        Ok(found)
    }
}
