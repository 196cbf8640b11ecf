//! 服务层
//!
//! 实现积分经济业务逻辑，协调各仓储。
//!
//! ## 模块结构
//!
//! - `dto`: 请求与响应定义
//! - `redemption_service`: 积分兑换（直接兑换、购物车结算）
//! - `settlement_service`: 扫码结算
//! - `status_service`: 兑换订单状态流转
//! - `cart_service`: 购物车维护
//! - `query_service`: 只读查询

pub mod cart_service;
pub mod dto;
pub mod query_service;
pub mod redemption_service;
pub mod settlement_service;
pub mod status_service;

pub use cart_service::CartService;
pub use dto::*;
pub use query_service::QueryService;
pub use redemption_service::RedemptionService;
pub use settlement_service::ScanSettlementService;
pub use status_service::TransactionStatusService;
