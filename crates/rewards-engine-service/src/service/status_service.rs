//! 兑换订单状态服务
//!
//! 运营侧推进订单状态。状态流转只修改订单与对应兑换流水的 status，
//! 已记账的积分变动和库存一律不动。

use std::sync::Arc;

use rewards_shared::observability::metrics::record_status_transition;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::error::{RewardsError, Result};
use crate::models::TransactionRecord;
use crate::repository::RecordRepositoryTrait;
use crate::service::dto::StatusTransitionRequest;

/// 兑换订单状态服务
pub struct TransactionStatusService {
    records: Arc<dyn RecordRepositoryTrait>,
}

impl TransactionStatusService {
    pub fn new(records: Arc<dyn RecordRepositoryTrait>) -> Self {
        Self { records }
    }

    /// 推进订单状态
    ///
    /// 先按状态机校验，再以读到的当前状态做比较并设置；
    /// 期间状态被并发修改时返回 ConcurrencyConflict
    #[instrument(skip(self, request), fields(transaction_id = %request.transaction_id, target = ?request.target))]
    pub async fn transition(&self, request: StatusTransitionRequest) -> Result<TransactionRecord> {
        request.validate()?;

        let transaction = self
            .records
            .get_transaction(request.transaction_id)
            .await?
            .ok_or(RewardsError::TransactionNotFound(request.transaction_id))?;

        let from = transaction.status;
        if !from.can_transition_to(request.target) {
            if from.is_terminal() {
                warn!(from = ?from, to = ?request.target, "订单已处于终态，不能再流转");
            } else {
                warn!(from = ?from, to = ?request.target, "非法的订单状态流转");
            }
            return Err(RewardsError::InvalidStatusTransition {
                from,
                to: request.target,
            });
        }

        let applied = self
            .records
            .update_status(
                request.transaction_id,
                from,
                request.target,
                request.note.clone(),
            )
            .await?;
        if !applied {
            warn!(from = ?from, "订单状态已被并发修改");
            return Err(RewardsError::ConcurrencyConflict);
        }

        record_status_transition(from.as_str(), request.target.as_str());
        info!(
            order_no = %transaction.order_no,
            from = ?from,
            to = ?request.target,
            terminal = request.target.is_terminal(),
            "订单状态已更新"
        );

        self.records
            .get_transaction(request.transaction_id)
            .await?
            .ok_or(RewardsError::TransactionNotFound(request.transaction_id))
    }
}
