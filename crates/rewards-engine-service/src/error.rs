//! 积分经济服务错误类型
//!
//! 定义服务层的业务错误和系统错误。
//! 余额与库存不足分别使用独立的错误码，调用方据此告知用户是哪种资源不足。

use thiserror::Error;
use uuid::Uuid;

use crate::models::TransactionStatus;

/// 积分经济服务错误类型
#[derive(Debug, Error)]
pub enum RewardsError {
    // === 参数错误 ===
    #[error("参数校验失败: {0}")]
    Validation(String),

    // === 实体不存在 ===
    #[error("用户不存在: {0}")]
    UserNotFound(String),

    #[error("商品不存在: {0}")]
    ProductNotFound(i64),

    #[error("购物车条目不存在: user_id={user_id}, product_id={product_id}")]
    CartItemNotFound { user_id: String, product_id: i64 },

    #[error("兑换订单不存在: {0}")]
    TransactionNotFound(Uuid),

    // === 资源不足 ===
    #[error("积分余额不足: user_id={user_id}, 需要 {required}")]
    InsufficientBalance { user_id: String, required: i64 },

    #[error("商品库存不足: product_id={product_id}, 需要 {requested}")]
    InsufficientStock { product_id: i64, requested: i64 },

    // === 补偿失败（需人工对账） ===
    #[error("积分补偿失败，需人工对账: user_id={user_id}, amount={amount}, reason={reason}")]
    CompensationFailure {
        user_id: String,
        amount: i64,
        reason: String,
    },

    // === 扫码相关 ===
    #[error("无法识别的回收码: {0}")]
    ScanNotRecognized(String),

    // === 兑换订单相关 ===
    #[error("重复的兑换请求: idempotency_key={0}")]
    DuplicateRedemption(String),

    #[error("订单状态不允许此操作: {from:?} -> {to:?}")]
    InvalidStatusTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("并发冲突，请重试")]
    ConcurrencyConflict,

    // === 系统错误 ===
    #[error("存储不可用: {0}")]
    UpstreamUnavailable(#[from] sqlx::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 积分经济服务 Result 类型别名
pub type Result<T> = std::result::Result<T, RewardsError>;

impl RewardsError {
    /// 检查是否为可重试的错误
    ///
    /// 仅表示错误本身是瞬时的；服务层不会自动重试兑换（无幂等键时重试可能重复扣款）
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_) | Self::ConcurrencyConflict)
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::UpstreamUnavailable(_)
                | Self::Internal(_)
                | Self::ConcurrencyConflict
                | Self::CompensationFailure { .. }
        )
    }

    /// 是否属于"不存在"类错误
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound(_)
                | Self::ProductNotFound(_)
                | Self::CartItemNotFound { .. }
                | Self::TransactionNotFound(_)
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            Self::CartItemNotFound { .. } => "CART_ITEM_NOT_FOUND",
            Self::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::CompensationFailure { .. } => "COMPENSATION_FAILURE",
            Self::ScanNotRecognized(_) => "SCAN_NOT_RECOGNIZED",
            Self::DuplicateRedemption(_) => "DUPLICATE_REDEMPTION",
            Self::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            Self::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<validator::ValidationErrors> for RewardsError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}
