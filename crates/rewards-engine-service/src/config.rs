//! 积分经济服务业务配置
//!
//! 与 [`rewards_shared::config::AppConfig`] 共用同一套加载顺序，只读取本服务关心的配置段：
//!
//! ```toml
//! [storage]
//! backend = "postgres"   # 或 "memory"
//!
//! [progression]
//! thresholds = [0, 50, 150, 300, 500, 750, 1100, 1500, 2000, 3000]
//! bonuses = [0, 10, 20, 30, 50, 80, 120, 160, 220, 300]
//!
//! [compensation]
//! max_retries = 3
//! initial_delay = 200
//! max_delay = 5000
//! multiplier = 2.0
//! ```

use config::ConfigError;
use rewards_shared::config::config_builder;
use rewards_shared::retry::RetryPolicy;
use serde::Deserialize;

use crate::progression::ProgressionConfig;
use crate::scan::ScanConfig;

/// 存储后端
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// 进程内存储，仅用于本地演示与测试
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

/// 服务业务配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub progression: ProgressionConfig,
    /// 补偿冲正的重试策略
    pub compensation: RetryPolicy,
    pub scan: ScanConfig,
}

impl EngineConfig {
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        config_builder(service_name)?.build()?.try_deserialize()
    }
}
