//! 积分经济领域模型
//!
//! 包含账本、商品、购物车、兑换订单、成长进度等核心实体定义

pub mod catalog;
pub mod enums;
pub mod progress;
pub mod record;

// 重新导出常用类型
pub use catalog::{CartItem, NewProduct, Product};
pub use enums::{ActivityType, TransactionStatus};
pub use progress::{MonthlyEarning, MonthlyPeriod, UserProgress};
pub use record::{ActivityRecord, NewRedemption, ShippingInfo, TransactionRecord};
