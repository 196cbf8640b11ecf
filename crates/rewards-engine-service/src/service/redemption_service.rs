//! 积分兑换服务
//!
//! 处理积分兑换商品的核心业务逻辑，包括：
//! - 幂等处理（防止重复兑换）
//! - 积分余额与商品库存的原子扣减
//! - 库存不足时的积分补偿冲正
//! - 订单与兑换流水的原子写入
//!
//! ## 兑换流程
//!
//! 1. 幂等检查 -> 2. 读取商品算总价 -> 3. 扣积分 -> 4. 扣库存（失败则补偿积分）
//!    -> 5. 写订单与流水 -> 6. 返回回执
//!
//! 先扣积分后扣库存。两步之间（或扣库存与写订单之间）出现存储故障时不会自动修复，
//! 以 UpstreamUnavailable 上报并记录 error 日志，由人工对账处理。

use std::sync::Arc;
use std::time::Instant;

use rewards_shared::observability::metrics::{outcome, record_compensation, record_redemption};
use rewards_shared::retry::{RetryPolicy, retry_with_policy};
use tracing::{debug, error, info, instrument, warn};
use validator::Validate;

use crate::error::{RewardsError, Result};
use crate::models::{NewRedemption, ShippingInfo};
use crate::repository::{
    CartRepositoryTrait, CatalogRepositoryTrait, DebitOutcome, LedgerRepositoryTrait,
    RecordRepositoryTrait,
};
use crate::service::dto::{
    CartCheckoutLine, CartCheckoutSummary, CheckoutRequest, PurchaseReceipt, PurchaseRequest,
};

/// 一次兑换的入参
struct RedeemCommand<'a> {
    user_id: &'a str,
    product_id: i64,
    quantity: i64,
    shipping: ShippingInfo,
    idempotency_key: Option<String>,
}

/// 积分兑换服务
pub struct RedemptionService {
    ledger: Arc<dyn LedgerRepositoryTrait>,
    catalog: Arc<dyn CatalogRepositoryTrait>,
    cart: Arc<dyn CartRepositoryTrait>,
    records: Arc<dyn RecordRepositoryTrait>,
    compensation_policy: RetryPolicy,
}

impl RedemptionService {
    pub fn new(
        ledger: Arc<dyn LedgerRepositoryTrait>,
        catalog: Arc<dyn CatalogRepositoryTrait>,
        cart: Arc<dyn CartRepositoryTrait>,
        records: Arc<dyn RecordRepositoryTrait>,
        compensation_policy: RetryPolicy,
    ) -> Self {
        Self {
            ledger,
            catalog,
            cart,
            records,
            compensation_policy,
        }
    }

    /// 直接兑换商品
    #[instrument(
        skip(self, request),
        fields(user_id = %request.user_id, product_id = request.product_id, quantity = request.quantity)
    )]
    pub async fn purchase(&self, request: PurchaseRequest) -> Result<PurchaseReceipt> {
        request.validate()?;

        let start = Instant::now();
        let result = self
            .redeem(RedeemCommand {
                user_id: &request.user_id,
                product_id: request.product_id,
                quantity: request.quantity,
                shipping: request.shipping,
                idempotency_key: request.idempotency_key,
            })
            .await;
        observe_redemption("purchase", &result, start);

        result
    }

    /// 结算购物车中的单个商品
    ///
    /// 数量取自购物车当前条目，单价重新读取商品最新数据；成功后从该条目扣减已购数量
    #[instrument(skip(self, request), fields(user_id = %request.user_id, product_id = request.product_id))]
    pub async fn checkout_cart_item(&self, request: CheckoutRequest) -> Result<PurchaseReceipt> {
        request.validate()?;

        let start = Instant::now();
        let result = self.checkout_item_inner(request).await;
        observe_redemption("cart", &result, start);

        result
    }

    /// 结算整个购物车
    ///
    /// 每个条目独立结算，某一条失败不影响其他条目
    #[instrument(skip(self, shipping))]
    pub async fn checkout_cart(
        &self,
        user_id: &str,
        shipping: ShippingInfo,
    ) -> Result<CartCheckoutSummary> {
        if user_id.is_empty() {
            return Err(RewardsError::Validation("用户ID不能为空".to_string()));
        }
        shipping.validate()?;

        let items = self.cart.list_items(user_id).await?;
        let mut summary = CartCheckoutSummary::default();

        for item in items {
            let request = CheckoutRequest {
                user_id: user_id.to_string(),
                product_id: item.product_id,
                shipping: shipping.clone(),
                idempotency_key: None,
            };
            let line = match self.checkout_cart_item(request).await {
                Ok(receipt) => CartCheckoutLine::succeeded(receipt),
                Err(e) => {
                    warn!(product_id = item.product_id, error = %e, "购物车条目结算失败");
                    CartCheckoutLine::failed(item.product_id, &e)
                }
            };
            summary.push(line);
        }

        info!(
            user_id = %user_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "购物车结算完成"
        );
        Ok(summary)
    }

    async fn checkout_item_inner(&self, request: CheckoutRequest) -> Result<PurchaseReceipt> {
        let item = self
            .cart
            .get_item(&request.user_id, request.product_id)
            .await?
            .ok_or_else(|| RewardsError::CartItemNotFound {
                user_id: request.user_id.clone(),
                product_id: request.product_id,
            })?;

        let receipt = self
            .redeem(RedeemCommand {
                user_id: &request.user_id,
                product_id: request.product_id,
                quantity: item.quantity,
                shipping: request.shipping,
                idempotency_key: request.idempotency_key,
            })
            .await?;

        // 只扣减本次购买的数量，期间追加的件数留在购物车；扣减失败不影响兑换结果
        match self
            .cart
            .consume_item(&request.user_id, request.product_id, item.quantity)
            .await
        {
            Ok(Some(0)) => {}
            Ok(Some(remaining)) => debug!(remaining, "购物车条目在结算期间被追加，保留剩余数量"),
            Ok(None) => debug!("购物车条目已被并发移除"),
            Err(e) => warn!(
                order_no = %receipt.order_no,
                error = %e,
                "兑换成功但扣减购物车条目失败"
            ),
        }

        Ok(receipt)
    }

    /// 兑换流程
    async fn redeem(&self, command: RedeemCommand<'_>) -> Result<PurchaseReceipt> {
        let RedeemCommand {
            user_id,
            product_id,
            quantity,
            shipping,
            idempotency_key,
        } = command;

        if quantity < 1 {
            return Err(RewardsError::Validation(format!(
                "兑换数量至少为1: {}",
                quantity
            )));
        }

        // 1. 幂等检查
        if let Some(key) = &idempotency_key
            && self.records.find_by_idempotency_key(key).await?.is_some()
        {
            warn!(idempotency_key = %key, "重复的兑换请求，直接拒绝");
            return Err(RewardsError::DuplicateRedemption(key.clone()));
        }

        // 2. 读取最新商品信息并计算总价
        let product = self
            .catalog
            .get_product(product_id)
            .await?
            .ok_or(RewardsError::ProductNotFound(product_id))?;
        let total_cost = product.total_cost(quantity).ok_or_else(|| {
            RewardsError::Validation(format!(
                "兑换总价溢出: unit_cost={}, quantity={}",
                product.unit_cost, quantity
            ))
        })?;

        // 3. 扣减积分
        let remaining_balance = self.debit_balance(user_id, total_cost).await?;

        // 4. 扣减库存，失败时补偿积分
        match self.catalog.debit_stock(product_id, quantity).await {
            Ok(DebitOutcome::Applied(remaining_stock)) => {
                debug!(remaining_stock, "库存扣减成功");
            }
            Ok(DebitOutcome::Insufficient) => {
                self.compensate_balance(user_id, total_cost, "库存不足")
                    .await?;
                return Err(RewardsError::InsufficientStock {
                    product_id,
                    requested: quantity,
                });
            }
            Ok(DebitOutcome::Missing) => {
                self.compensate_balance(user_id, total_cost, "商品已下架")
                    .await?;
                return Err(RewardsError::ProductNotFound(product_id));
            }
            Err(e) => {
                error!(
                    user_id = %user_id,
                    product_id,
                    amount = total_cost,
                    error = %e,
                    "积分已扣减但库存扣减失败，需人工对账"
                );
                return Err(e);
            }
        }

        // 5. 写入订单与兑换流水
        let redemption = NewRedemption::pending(
            user_id,
            product_id,
            quantity,
            product.unit_cost,
            total_cost,
            shipping,
            idempotency_key,
        );

        match self.records.create_redemption(&redemption).await {
            Ok(()) => {}
            Err(RewardsError::DuplicateRedemption(key)) => {
                // 并发的重复请求抢先落库，本次扣减全部回滚
                warn!(idempotency_key = %key, "并发重复兑换，回滚库存与积分");
                self.compensate_stock(product_id, quantity).await;
                self.compensate_balance(user_id, total_cost, "重复兑换")
                    .await?;
                return Err(RewardsError::DuplicateRedemption(key));
            }
            Err(e) => {
                error!(
                    user_id = %user_id,
                    product_id,
                    amount = total_cost,
                    quantity,
                    error = %e,
                    "积分与库存已扣减但订单写入失败，需人工对账"
                );
                return Err(e);
            }
        }

        let transaction = redemption.transaction;
        info!(
            user_id = %user_id,
            product_id,
            order_no = %transaction.order_no,
            total_cost,
            remaining_balance,
            "积分兑换成功"
        );

        Ok(PurchaseReceipt {
            transaction_id: transaction.id,
            order_no: transaction.order_no,
            product_id,
            quantity,
            total_cost,
            remaining_balance,
        })
    }

    /// 扣减积分，返回扣减后余额
    async fn debit_balance(&self, user_id: &str, total_cost: i64) -> Result<i64> {
        // 零价商品不动余额，但仍要求用户存在
        if total_cost == 0 {
            return self
                .ledger
                .balance(user_id)
                .await?
                .ok_or_else(|| RewardsError::UserNotFound(user_id.to_string()));
        }

        match self.ledger.debit(user_id, total_cost).await? {
            DebitOutcome::Applied(balance) => Ok(balance),
            DebitOutcome::Insufficient => Err(RewardsError::InsufficientBalance {
                user_id: user_id.to_string(),
                required: total_cost,
            }),
            DebitOutcome::Missing => Err(RewardsError::UserNotFound(user_id.to_string())),
        }
    }

    /// 补偿冲正积分
    ///
    /// 加积分可安全重复执行，按重试策略退避重试；最终失败返回 CompensationFailure
    async fn compensate_balance(&self, user_id: &str, amount: i64, reason: &str) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }

        let result = retry_with_policy(
            &self.compensation_policy,
            "compensate_balance",
            RewardsError::is_retryable,
            || self.ledger.credit(user_id, amount),
        )
        .await;

        match result {
            Ok(balance) => {
                record_compensation("balance", true);
                info!(user_id = %user_id, amount, balance, reason, "积分补偿成功");
                Ok(())
            }
            Err(e) => {
                record_compensation("balance", false);
                error!(
                    user_id = %user_id,
                    amount,
                    reason,
                    error = %e,
                    "积分补偿失败，需人工对账"
                );
                Err(RewardsError::CompensationFailure {
                    user_id: user_id.to_string(),
                    amount,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// 回补库存，失败只记录不中断（积分补偿更重要）
    async fn compensate_stock(&self, product_id: i64, quantity: i64) {
        let result = retry_with_policy(
            &self.compensation_policy,
            "compensate_stock",
            RewardsError::is_retryable,
            || self.catalog.credit_stock(product_id, quantity),
        )
        .await;

        match result {
            Ok(stock) => {
                record_compensation("stock", true);
                info!(product_id, quantity, stock, "库存回补成功");
            }
            Err(e) => {
                record_compensation("stock", false);
                error!(product_id, quantity, error = %e, "库存回补失败，需人工对账");
            }
        }
    }
}

/// 记录兑换指标；业务拒绝只记 info，系统错误记 error
fn observe_redemption<T>(channel: &str, result: &Result<T>, start: Instant) {
    record_redemption(channel, outcome_label(result), start.elapsed().as_secs_f64());

    match result {
        Err(e) if e.is_business_error() => {
            info!(channel, code = e.error_code(), reason = %e, "兑换被拒绝");
        }
        Err(e) => {
            error!(channel, code = e.error_code(), error = %e, "兑换因系统错误失败");
        }
        Ok(_) => {}
    }
}

/// 指标中的结果标签
fn outcome_label<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => outcome::SUCCESS,
        Err(e) => e.error_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use mockall::predicate::eq;
    use rewards_shared::observability::metrics::names;
    use rewards_shared::test_utils::capture_counters;

    use crate::models::{CartItem, Product};
    use crate::repository::{
        MockCartRepositoryTrait, MockCatalogRepositoryTrait, MockLedgerRepositoryTrait,
        MockRecordRepositoryTrait,
    };

    struct Mocks {
        ledger: MockLedgerRepositoryTrait,
        catalog: MockCatalogRepositoryTrait,
        cart: MockCartRepositoryTrait,
        records: MockRecordRepositoryTrait,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                ledger: MockLedgerRepositoryTrait::new(),
                catalog: MockCatalogRepositoryTrait::new(),
                cart: MockCartRepositoryTrait::new(),
                records: MockRecordRepositoryTrait::new(),
            }
        }

        fn into_service(self) -> RedemptionService {
            RedemptionService::new(
                Arc::new(self.ledger),
                Arc::new(self.catalog),
                Arc::new(self.cart),
                Arc::new(self.records),
                fast_policy(),
            )
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    fn product(unit_cost: i64, stock: i64) -> Product {
        Product {
            id: 7,
            name: "Tote Bag".to_string(),
            description: None,
            unit_cost,
            stock,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn shipping() -> ShippingInfo {
        ShippingInfo {
            recipient_name: "Lin".to_string(),
            phone: "13800000000".to_string(),
            address: "1 Recycling Road".to_string(),
            postal_code: None,
        }
    }

    fn request(quantity: i64) -> PurchaseRequest {
        PurchaseRequest {
            user_id: "user-1".to_string(),
            product_id: 7,
            quantity,
            shipping: shipping(),
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn test_purchase_success() {
        let mut mocks = Mocks::new();
        mocks
            .catalog
            .expect_get_product()
            .with(eq(7))
            .returning(|_| Ok(Some(product(30, 5))));
        mocks
            .ledger
            .expect_debit()
            .withf(|user_id, amount| user_id == "user-1" && *amount == 60)
            .times(1)
            .returning(|_, _| Ok(DebitOutcome::Applied(40)));
        mocks
            .catalog
            .expect_debit_stock()
            .with(eq(7), eq(2))
            .times(1)
            .returning(|_, _| Ok(DebitOutcome::Applied(3)));
        mocks
            .records
            .expect_create_redemption()
            .withf(|r| r.transaction.total_cost == 60 && r.activity.points_delta == -60)
            .times(1)
            .returning(|_| Ok(()));
        mocks.ledger.expect_credit().never();

        let receipt = mocks.into_service().purchase(request(2)).await.unwrap();
        assert_eq!(receipt.total_cost, 60);
        assert_eq!(receipt.remaining_balance, 40);
        assert!(receipt.order_no.starts_with("RD"));
    }

    #[tokio::test]
    async fn test_purchase_insufficient_balance_has_no_side_effects() {
        let mut mocks = Mocks::new();
        mocks
            .catalog
            .expect_get_product()
            .returning(|_| Ok(Some(product(60, 5))));
        mocks
            .ledger
            .expect_debit()
            .returning(|_, _| Ok(DebitOutcome::Insufficient));
        mocks.catalog.expect_debit_stock().never();
        mocks.records.expect_create_redemption().never();

        let err = mocks.into_service().purchase(request(1)).await.unwrap_err();
        assert!(matches!(
            err,
            RewardsError::InsufficientBalance { required: 60, .. }
        ));
    }

    #[tokio::test]
    async fn test_purchase_unknown_user() {
        let mut mocks = Mocks::new();
        mocks
            .catalog
            .expect_get_product()
            .returning(|_| Ok(Some(product(60, 5))));
        mocks
            .ledger
            .expect_debit()
            .returning(|_, _| Ok(DebitOutcome::Missing));

        let err = mocks.into_service().purchase(request(1)).await.unwrap_err();
        assert!(matches!(err, RewardsError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_purchase_unknown_product() {
        let mut mocks = Mocks::new();
        mocks.catalog.expect_get_product().returning(|_| Ok(None));
        mocks.ledger.expect_debit().never();

        let err = mocks.into_service().purchase(request(1)).await.unwrap_err();
        assert!(matches!(err, RewardsError::ProductNotFound(7)));
    }

    #[tokio::test]
    async fn test_insufficient_stock_compensates_balance() {
        let mut mocks = Mocks::new();
        mocks
            .catalog
            .expect_get_product()
            .returning(|_| Ok(Some(product(60, 0))));
        mocks
            .ledger
            .expect_debit()
            .returning(|_, _| Ok(DebitOutcome::Applied(40)));
        mocks
            .catalog
            .expect_debit_stock()
            .returning(|_, _| Ok(DebitOutcome::Insufficient));
        mocks
            .ledger
            .expect_credit()
            .withf(|user_id, amount| user_id == "user-1" && *amount == 60)
            .times(1)
            .returning(|_, _| Ok(100));
        mocks.records.expect_create_redemption().never();

        let err = mocks.into_service().purchase(request(1)).await.unwrap_err();
        assert!(matches!(
            err,
            RewardsError::InsufficientStock {
                product_id: 7,
                requested: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_compensation_retries_transient_failure() {
        let mut mocks = Mocks::new();
        mocks
            .catalog
            .expect_get_product()
            .returning(|_| Ok(Some(product(60, 0))));
        mocks
            .ledger
            .expect_debit()
            .returning(|_, _| Ok(DebitOutcome::Applied(40)));
        mocks
            .catalog
            .expect_debit_stock()
            .returning(|_, _| Ok(DebitOutcome::Insufficient));

        let mut seq = mockall::Sequence::new();
        mocks
            .ledger
            .expect_credit()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(RewardsError::UpstreamUnavailable(sqlx::Error::PoolTimedOut)));
        mocks
            .ledger
            .expect_credit()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(100));

        let err = mocks.into_service().purchase(request(1)).await.unwrap_err();
        assert!(matches!(err, RewardsError::InsufficientStock { .. }));
    }

    #[tokio::test]
    async fn test_compensation_failure_is_surfaced() {
        let mut mocks = Mocks::new();
        mocks
            .catalog
            .expect_get_product()
            .returning(|_| Ok(Some(product(60, 0))));
        mocks
            .ledger
            .expect_debit()
            .returning(|_, _| Ok(DebitOutcome::Applied(40)));
        mocks
            .catalog
            .expect_debit_stock()
            .returning(|_, _| Ok(DebitOutcome::Insufficient));
        // 首次 + 2 次重试
        mocks
            .ledger
            .expect_credit()
            .times(3)
            .returning(|_, _| Err(RewardsError::UpstreamUnavailable(sqlx::Error::PoolTimedOut)));

        let err = mocks.into_service().purchase(request(1)).await.unwrap_err();
        match err {
            RewardsError::CompensationFailure {
                user_id, amount, ..
            } => {
                assert_eq!(user_id, "user-1");
                assert_eq!(amount, 60);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_compensation_outcome_is_labelled_failed() {
        let mut mocks = Mocks::new();
        mocks
            .catalog
            .expect_get_product()
            .returning(|_| Ok(Some(product(60, 0))));
        mocks
            .ledger
            .expect_debit()
            .returning(|_, _| Ok(DebitOutcome::Applied(40)));
        mocks
            .catalog
            .expect_debit_stock()
            .returning(|_, _| Ok(DebitOutcome::Insufficient));
        mocks
            .ledger
            .expect_credit()
            .returning(|_, _| Err(RewardsError::UpstreamUnavailable(sqlx::Error::PoolTimedOut)));
        let service = mocks.into_service();

        let (result, samples) =
            capture_counters(|| tokio_test::block_on(service.purchase(request(1))));
        assert!(matches!(
            result,
            Err(RewardsError::CompensationFailure { .. })
        ));

        let compensation = samples
            .iter()
            .find(|s| s.name == names::COMPENSATIONS_TOTAL)
            .unwrap();
        assert_eq!(compensation.label("resource"), Some("balance"));
        assert_eq!(compensation.label("status"), Some(outcome::FAILED));

        let redemption = samples
            .iter()
            .find(|s| s.name == names::REDEMPTIONS_TOTAL)
            .unwrap();
        assert_eq!(redemption.label("status"), Some("COMPENSATION_FAILURE"));
    }

    #[tokio::test]
    async fn test_stock_failure_is_not_compensated() {
        let mut mocks = Mocks::new();
        mocks
            .catalog
            .expect_get_product()
            .returning(|_| Ok(Some(product(60, 5))));
        mocks
            .ledger
            .expect_debit()
            .returning(|_, _| Ok(DebitOutcome::Applied(40)));
        mocks
            .catalog
            .expect_debit_stock()
            .returning(|_, _| Err(RewardsError::UpstreamUnavailable(sqlx::Error::PoolClosed)));
        mocks.ledger.expect_credit().never();

        let err = mocks.into_service().purchase(request(1)).await.unwrap_err();
        assert!(matches!(err, RewardsError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_known_idempotency_key_is_rejected_before_debit() {
        let mut mocks = Mocks::new();
        mocks
            .records
            .expect_find_by_idempotency_key()
            .with(eq("key-1"))
            .returning(|_| {
                Ok(Some(
                    NewRedemption::pending("user-1", 7, 1, 60, 60, shipping(), Some("key-1".into()))
                        .transaction,
                ))
            });
        mocks.catalog.expect_get_product().never();
        mocks.ledger.expect_debit().never();

        let mut req = request(1);
        req.idempotency_key = Some("key-1".to_string());
        let err = mocks.into_service().purchase(req).await.unwrap_err();
        assert!(matches!(err, RewardsError::DuplicateRedemption(key) if key == "key-1"));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_rolls_back_stock_and_balance() {
        let mut mocks = Mocks::new();
        mocks
            .records
            .expect_find_by_idempotency_key()
            .returning(|_| Ok(None));
        mocks
            .catalog
            .expect_get_product()
            .returning(|_| Ok(Some(product(60, 5))));
        mocks
            .ledger
            .expect_debit()
            .returning(|_, _| Ok(DebitOutcome::Applied(40)));
        mocks
            .catalog
            .expect_debit_stock()
            .returning(|_, _| Ok(DebitOutcome::Applied(4)));
        mocks
            .records
            .expect_create_redemption()
            .returning(|_| Err(RewardsError::DuplicateRedemption("key-1".to_string())));
        mocks
            .catalog
            .expect_credit_stock()
            .with(eq(7), eq(1))
            .times(1)
            .returning(|_, _| Ok(5));
        mocks
            .ledger
            .expect_credit()
            .times(1)
            .returning(|_, _| Ok(100));

        let mut req = request(1);
        req.idempotency_key = Some("key-1".to_string());
        let err = mocks.into_service().purchase(req).await.unwrap_err();
        assert!(matches!(err, RewardsError::DuplicateRedemption(_)));
    }

    #[tokio::test]
    async fn test_invalid_quantity_rejected() {
        let mocks = Mocks::new();
        let err = mocks.into_service().purchase(request(0)).await.unwrap_err();
        assert!(matches!(err, RewardsError::Validation(_)));
    }

    #[tokio::test]
    async fn test_overflowing_total_cost_rejected() {
        let mut mocks = Mocks::new();
        mocks
            .catalog
            .expect_get_product()
            .returning(|_| Ok(Some(product(i64::MAX, 5))));
        mocks.ledger.expect_debit().never();

        let err = mocks.into_service().purchase(request(2)).await.unwrap_err();
        assert!(matches!(err, RewardsError::Validation(_)));
    }

    #[tokio::test]
    async fn test_checkout_cart_item_uses_cart_quantity_and_consumes_it() {
        let mut mocks = Mocks::new();
        mocks.cart.expect_get_item().returning(|user_id, product_id| {
            Ok(Some(CartItem {
                user_id: user_id.to_string(),
                product_id,
                quantity: 3,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }))
        });
        mocks
            .catalog
            .expect_get_product()
            .returning(|_| Ok(Some(product(10, 5))));
        mocks
            .ledger
            .expect_debit()
            .withf(|_, amount| *amount == 30)
            .returning(|_, _| Ok(DebitOutcome::Applied(70)));
        mocks
            .catalog
            .expect_debit_stock()
            .with(eq(7), eq(3))
            .returning(|_, _| Ok(DebitOutcome::Applied(2)));
        mocks
            .records
            .expect_create_redemption()
            .returning(|_| Ok(()));
        mocks
            .cart
            .expect_consume_item()
            .with(eq("user-1"), eq(7), eq(3))
            .times(1)
            .returning(|_, _, _| Ok(Some(0)));
        mocks.cart.expect_remove_item().never();

        let receipt = mocks
            .into_service()
            .checkout_cart_item(CheckoutRequest {
                user_id: "user-1".to_string(),
                product_id: 7,
                shipping: shipping(),
                idempotency_key: None,
            })
            .await
            .unwrap();
        assert_eq!(receipt.quantity, 3);
        assert_eq!(receipt.total_cost, 30);
    }

    #[tokio::test]
    async fn test_checkout_missing_cart_item() {
        let mut mocks = Mocks::new();
        mocks.cart.expect_get_item().returning(|_, _| Ok(None));
        mocks.ledger.expect_debit().never();

        let err = mocks
            .into_service()
            .checkout_cart_item(CheckoutRequest {
                user_id: "user-1".to_string(),
                product_id: 7,
                shipping: shipping(),
                idempotency_key: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RewardsError::CartItemNotFound { product_id: 7, .. }
        ));
    }

    #[tokio::test]
    async fn test_cart_consume_failure_keeps_purchase() {
        let mut mocks = Mocks::new();
        mocks.cart.expect_get_item().returning(|user_id, product_id| {
            Ok(Some(CartItem {
                user_id: user_id.to_string(),
                product_id,
                quantity: 1,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }))
        });
        mocks
            .catalog
            .expect_get_product()
            .returning(|_| Ok(Some(product(10, 5))));
        mocks
            .ledger
            .expect_debit()
            .returning(|_, _| Ok(DebitOutcome::Applied(90)));
        mocks
            .catalog
            .expect_debit_stock()
            .returning(|_, _| Ok(DebitOutcome::Applied(4)));
        mocks
            .records
            .expect_create_redemption()
            .returning(|_| Ok(()));
        mocks
            .cart
            .expect_consume_item()
            .returning(|_, _, _| Err(RewardsError::UpstreamUnavailable(sqlx::Error::PoolTimedOut)));

        let result = mocks
            .into_service()
            .checkout_cart_item(CheckoutRequest {
                user_id: "user-1".to_string(),
                product_id: 7,
                shipping: shipping(),
                idempotency_key: None,
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_checkout_keeps_units_added_during_checkout() {
        let mut mocks = Mocks::new();
        mocks.cart.expect_get_item().returning(|user_id, product_id| {
            Ok(Some(CartItem {
                user_id: user_id.to_string(),
                product_id,
                quantity: 3,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }))
        });
        mocks
            .catalog
            .expect_get_product()
            .returning(|_| Ok(Some(product(10, 10))));
        mocks
            .ledger
            .expect_debit()
            .returning(|_, _| Ok(DebitOutcome::Applied(70)));
        mocks
            .catalog
            .expect_debit_stock()
            .with(eq(7), eq(3))
            .returning(|_, _| Ok(DebitOutcome::Applied(7)));
        mocks
            .records
            .expect_create_redemption()
            .returning(|_| Ok(()));
        // 结算期间用户把数量改成了 5，只扣掉已购买的 3 件
        mocks
            .cart
            .expect_consume_item()
            .with(eq("user-1"), eq(7), eq(3))
            .times(1)
            .returning(|_, _, _| Ok(Some(2)));
        mocks.cart.expect_remove_item().never();

        let receipt = mocks
            .into_service()
            .checkout_cart_item(CheckoutRequest {
                user_id: "user-1".to_string(),
                product_id: 7,
                shipping: shipping(),
                idempotency_key: None,
            })
            .await
            .unwrap();
        assert_eq!(receipt.quantity, 3);
    }
}
