//! 内存存储
//!
//! 使用 DashMap 实现的进程内后端，适用于测试和本地演示。
//!
//! 与 PostgreSQL 后端保持同样的原子语义：
//! - 余额、库存、经验等计数器通过 `get_mut` 持有分片写锁完成"检查并修改"，不会出现先读后写
//! - 订单、流水和幂等键放在同一把互斥锁保护的账簿里，订单与流水同时可见

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use uuid::Uuid;

use super::ensure_activity_directions;
use super::traits::{
    CartRepositoryTrait, CatalogRepositoryTrait, DebitOutcome, LedgerRepositoryTrait,
    ProgressRepositoryTrait, RecordRepositoryTrait,
};
use crate::error::{RewardsError, Result};
use crate::models::{
    ActivityRecord, CartItem, MonthlyEarning, MonthlyPeriod, NewProduct, NewRedemption, Product,
    TransactionRecord, TransactionStatus, UserProgress,
};

/// 订单与流水账簿
#[derive(Debug, Default)]
struct RecordBook {
    transactions: Vec<TransactionRecord>,
    index: HashMap<Uuid, usize>,
    idempotency: HashMap<String, Uuid>,
    activities: Vec<ActivityRecord>,
}

impl RecordBook {
    fn transaction_mut(&mut self, id: Uuid) -> Option<&mut TransactionRecord> {
        let position = *self.index.get(&id)?;
        self.transactions.get_mut(position)
    }
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    balances: DashMap<String, i64>,
    products: DashMap<i64, Product>,
    next_product_id: AtomicI64,
    carts: DashMap<(String, i64), CartItem>,
    progress: DashMap<String, UserProgress>,
    monthly: DashMap<(String, MonthlyPeriod), i64>,
    records: Mutex<RecordBook>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_positive(amount: i64, what: &str) -> Result<()> {
        if amount <= 0 {
            return Err(RewardsError::Validation(format!(
                "{}必须为正数: {}",
                what, amount
            )));
        }
        Ok(())
    }

    /// 计数器累加，溢出时报错而不是回绕或 panic（与数据库 BIGINT 越界一致）
    fn checked_increase(current: i64, delta: i64, what: &str) -> Result<i64> {
        current
            .checked_add(delta)
            .ok_or_else(|| {
                RewardsError::Internal(format!("{}累加溢出: {} + {}", what, current, delta))
            })
    }

    /// 对单个计数器做条件扣减，持有分片写锁期间完成判断与修改
    fn debit_counter<K>(map: &DashMap<K, i64>, key: &K, amount: i64) -> DebitOutcome
    where
        K: Eq + std::hash::Hash,
    {
        match map.get_mut(key) {
            Some(mut balance) if *balance >= amount => {
                *balance -= amount;
                DebitOutcome::Applied(*balance)
            }
            Some(_) => DebitOutcome::Insufficient,
            None => DebitOutcome::Missing,
        }
    }
}

#[async_trait]
impl LedgerRepositoryTrait for MemoryStore {
    async fn open_account(&self, user_id: &str, initial_balance: i64) -> Result<()> {
        if initial_balance < 0 {
            return Err(RewardsError::Validation("初始余额不能为负数".to_string()));
        }
        self.balances
            .entry(user_id.to_string())
            .or_insert(initial_balance);
        Ok(())
    }

    async fn balance(&self, user_id: &str) -> Result<Option<i64>> {
        Ok(self.balances.get(user_id).map(|b| *b))
    }

    async fn debit(&self, user_id: &str, amount: i64) -> Result<DebitOutcome> {
        Self::ensure_positive(amount, "扣减积分")?;
        Ok(Self::debit_counter(
            &self.balances,
            &user_id.to_string(),
            amount,
        ))
    }

    async fn credit(&self, user_id: &str, amount: i64) -> Result<i64> {
        Self::ensure_positive(amount, "入账积分")?;
        let mut balance = self
            .balances
            .get_mut(user_id)
            .ok_or_else(|| RewardsError::UserNotFound(user_id.to_string()))?;
        *balance = Self::checked_increase(*balance, amount, "积分余额")?;
        Ok(*balance)
    }
}

#[async_trait]
impl CatalogRepositoryTrait for MemoryStore {
    async fn create_product(&self, product: &NewProduct) -> Result<Product> {
        if product.unit_cost < 0 || product.stock < 0 {
            return Err(RewardsError::Validation(
                "商品单价与库存不能为负数".to_string(),
            ));
        }

        let now = Utc::now();
        let created = Product {
            id: self.next_product_id.fetch_add(1, Ordering::SeqCst) + 1,
            name: product.name.clone(),
            description: product.description.clone(),
            unit_cost: product.unit_cost,
            stock: product.stock,
            created_at: now,
            updated_at: now,
        };
        self.products.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_product(&self, product_id: i64) -> Result<Option<Product>> {
        Ok(self.products.get(&product_id).map(|p| p.clone()))
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = self.products.iter().map(|p| p.clone()).collect();
        products.sort_by_key(|p| p.id);
        Ok(products)
    }

    async fn debit_stock(&self, product_id: i64, quantity: i64) -> Result<DebitOutcome> {
        Self::ensure_positive(quantity, "扣减数量")?;
        let outcome = match self.products.get_mut(&product_id) {
            Some(mut product) if product.stock >= quantity => {
                product.stock -= quantity;
                product.updated_at = Utc::now();
                DebitOutcome::Applied(product.stock)
            }
            Some(_) => DebitOutcome::Insufficient,
            None => DebitOutcome::Missing,
        };
        Ok(outcome)
    }

    async fn credit_stock(&self, product_id: i64, quantity: i64) -> Result<i64> {
        Self::ensure_positive(quantity, "补充数量")?;
        let mut product = self
            .products
            .get_mut(&product_id)
            .ok_or(RewardsError::ProductNotFound(product_id))?;
        product.stock = Self::checked_increase(product.stock, quantity, "商品库存")?;
        product.updated_at = Utc::now();
        Ok(product.stock)
    }
}

#[async_trait]
impl CartRepositoryTrait for MemoryStore {
    async fn upsert_item(&self, user_id: &str, product_id: i64, quantity: i64) -> Result<CartItem> {
        if quantity < 1 {
            return Err(RewardsError::Validation(format!(
                "购物车数量至少为 1: {}",
                quantity
            )));
        }
        if !self.products.contains_key(&product_id) {
            return Err(RewardsError::ProductNotFound(product_id));
        }

        let now = Utc::now();
        let item = match self.carts.entry((user_id.to_string(), product_id)) {
            Entry::Occupied(mut entry) => {
                let item = entry.get_mut();
                item.quantity = Self::checked_increase(item.quantity, quantity, "购物车数量")?;
                item.updated_at = now;
                item.clone()
            }
            Entry::Vacant(entry) => entry
                .insert(CartItem {
                    user_id: user_id.to_string(),
                    product_id,
                    quantity,
                    created_at: now,
                    updated_at: now,
                })
                .clone(),
        };
        Ok(item)
    }

    async fn set_quantity(
        &self,
        user_id: &str,
        product_id: i64,
        quantity: i64,
    ) -> Result<Option<CartItem>> {
        if quantity < 1 {
            return Err(RewardsError::Validation(format!(
                "购物车数量至少为 1: {}",
                quantity
            )));
        }

        Ok(self
            .carts
            .get_mut(&(user_id.to_string(), product_id))
            .map(|mut item| {
                item.quantity = quantity;
                item.updated_at = Utc::now();
                item.clone()
            }))
    }

    async fn get_item(&self, user_id: &str, product_id: i64) -> Result<Option<CartItem>> {
        Ok(self
            .carts
            .get(&(user_id.to_string(), product_id))
            .map(|item| item.clone()))
    }

    async fn list_items(&self, user_id: &str) -> Result<Vec<CartItem>> {
        let mut items: Vec<CartItem> = self
            .carts
            .iter()
            .filter(|entry| entry.key().0 == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.product_id.cmp(&b.product_id))
        });
        Ok(items)
    }

    async fn remove_item(&self, user_id: &str, product_id: i64) -> Result<bool> {
        Ok(self
            .carts
            .remove(&(user_id.to_string(), product_id))
            .is_some())
    }

    async fn consume_item(
        &self,
        user_id: &str,
        product_id: i64,
        quantity: i64,
    ) -> Result<Option<i64>> {
        Self::ensure_positive(quantity, "结算数量")?;

        let remaining = match self.carts.entry((user_id.to_string(), product_id)) {
            Entry::Occupied(mut entry) if entry.get().quantity > quantity => {
                let item = entry.get_mut();
                item.quantity -= quantity;
                item.updated_at = Utc::now();
                Some(item.quantity)
            }
            Entry::Occupied(entry) => {
                entry.remove();
                Some(0)
            }
            Entry::Vacant(_) => None,
        };
        Ok(remaining)
    }
}

#[async_trait]
impl RecordRepositoryTrait for MemoryStore {
    async fn create_redemption(&self, redemption: &NewRedemption) -> Result<()> {
        let mut book = self.records.lock();
        let transaction = &redemption.transaction;

        if let Some(key) = &transaction.idempotency_key {
            if book.idempotency.contains_key(key) {
                return Err(RewardsError::DuplicateRedemption(key.clone()));
            }
            book.idempotency.insert(key.clone(), transaction.id);
        }

        let position = book.transactions.len();
        book.transactions.push(transaction.clone());
        book.index.insert(transaction.id, position);
        book.activities.push(redemption.activity.clone());
        Ok(())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<TransactionRecord>> {
        let book = self.records.lock();
        Ok(book
            .idempotency
            .get(key)
            .and_then(|id| book.index.get(id))
            .and_then(|position| book.transactions.get(*position))
            .cloned())
    }

    async fn get_transaction(&self, transaction_id: Uuid) -> Result<Option<TransactionRecord>> {
        let book = self.records.lock();
        Ok(book
            .index
            .get(&transaction_id)
            .and_then(|position| book.transactions.get(*position))
            .cloned())
    }

    async fn update_status(
        &self,
        transaction_id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
        note: Option<String>,
    ) -> Result<bool> {
        let mut book = self.records.lock();

        let Some(transaction) = book.transaction_mut(transaction_id) else {
            return Ok(false);
        };
        if transaction.status != from {
            return Ok(false);
        }
        transaction.status = to;
        transaction.updated_at = Utc::now();
        if note.is_some() {
            transaction.note = note;
        }

        for activity in book
            .activities
            .iter_mut()
            .filter(|a| a.transaction_id == Some(transaction_id))
        {
            activity.status = Some(to);
        }
        Ok(true)
    }

    async fn append_activities(&self, activities: &[ActivityRecord]) -> Result<()> {
        ensure_activity_directions(activities)?;
        self.records
            .lock()
            .activities
            .extend_from_slice(activities);
        Ok(())
    }

    async fn list_activities(&self, user_id: &str, limit: i64) -> Result<Vec<ActivityRecord>> {
        let book = self.records.lock();
        Ok(book
            .activities
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn list_transactions(&self, user_id: &str, limit: i64) -> Result<Vec<TransactionRecord>> {
        let book = self.records.lock();
        Ok(book
            .transactions
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProgressRepositoryTrait for MemoryStore {
    async fn get_progress(&self, user_id: &str) -> Result<Option<UserProgress>> {
        Ok(self.progress.get(user_id).map(|p| p.clone()))
    }

    async fn add_xp(&self, user_id: &str, xp: i64) -> Result<Option<i64>> {
        if xp < 0 {
            return Err(RewardsError::Validation(format!("经验值不能为负数: {}", xp)));
        }
        if !self.balances.contains_key(user_id) {
            return Ok(None);
        }

        let mut progress = self
            .progress
            .entry(user_id.to_string())
            .or_insert_with(|| UserProgress::new(user_id));
        progress.xp = Self::checked_increase(progress.xp, xp, "经验值")?;
        progress.updated_at = Utc::now();
        Ok(Some(progress.xp))
    }

    async fn record_deposit(
        &self,
        user_id: &str,
        weight_grams: i64,
        period: &MonthlyPeriod,
        points: i64,
    ) -> Result<()> {
        // 先算出全部新值再写入，任何一项溢出都不留下部分修改
        let mut bucket = self
            .monthly
            .entry((user_id.to_string(), period.clone()))
            .or_insert(0);
        let mut progress = self
            .progress
            .entry(user_id.to_string())
            .or_insert_with(|| UserProgress::new(user_id));

        let points_total = Self::checked_increase(*bucket, points, "月度积分")?;
        let weight_total =
            Self::checked_increase(progress.total_weight_grams, weight_grams, "累计投递重量")?;
        let deposit_count = Self::checked_increase(progress.deposit_count, 1, "投递次数")?;

        *bucket = points_total;
        progress.total_weight_grams = weight_total;
        progress.deposit_count = deposit_count;
        progress.updated_at = Utc::now();
        Ok(())
    }

    async fn list_monthly_earnings(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<MonthlyEarning>> {
        let mut earnings: Vec<MonthlyEarning> = self
            .monthly
            .iter()
            .filter(|entry| entry.key().0 == user_id)
            .map(|entry| MonthlyEarning {
                user_id: user_id.to_string(),
                period: entry.key().1.clone(),
                points: *entry.value(),
            })
            .collect();
        earnings.sort_by(|a, b| b.period.cmp(&a.period));
        earnings.truncate(limit.max(0) as usize);
        Ok(earnings)
    }
}
