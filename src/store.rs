//! Persistence seams used by the pipeline and the notifier.
//!
//! The traits describe what the core needs from storage; [`SqliteStore`]
//! implements all of them on top of the `db` repository.
use anyhow::Result;
use async_trait::async_trait;

use crate::db::{self, Pool};
use crate::model::{Account, BalanceReport, Channel, MonthCount, Template, Transaction, TransactionType};

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert_in_bulk(&self, transactions: &[Transaction]) -> Result<()>;

    async fn balance_report(
        &self,
        account_id: &str,
        balance_type: TransactionType,
    ) -> Result<BalanceReport>;

    async fn monthly_counts(&self, account_id: &str) -> Result<Vec<MonthCount>>;

    async fn transactions_by_account(&self, account_id: &str) -> Result<Vec<Transaction>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// `Ok(None)` when no such account exists.
    async fn get_by_id(&self, id: &str) -> Result<Option<Account>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn enabled_channels(&self, account_id: &str) -> Result<Vec<Channel>>;

    async fn active_templates(&self, operation: &str, channels: &[Channel]) -> Result<Vec<Template>>;
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl TransactionStore for SqliteStore {
    async fn insert_in_bulk(&self, transactions: &[Transaction]) -> Result<()> {
        db::insert_transactions_in_bulk(&self.pool, transactions).await
    }

    async fn balance_report(
        &self,
        account_id: &str,
        balance_type: TransactionType,
    ) -> Result<BalanceReport> {
        db::balance_report(&self.pool, account_id, balance_type).await
    }

    async fn monthly_counts(&self, account_id: &str) -> Result<Vec<MonthCount>> {
        db::monthly_counts(&self.pool, account_id).await
    }

    async fn transactions_by_account(&self, account_id: &str) -> Result<Vec<Transaction>> {
        db::transactions_by_account(&self.pool, account_id).await
    }
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn get_by_id(&self, id: &str) -> Result<Option<Account>> {
        db::account_by_id(&self.pool, id).await
    }
}

#[async_trait]
impl NotificationStore for SqliteStore {
    async fn enabled_channels(&self, account_id: &str) -> Result<Vec<Channel>> {
        db::enabled_channels(&self.pool, account_id).await
    }

    async fn active_templates(&self, operation: &str, channels: &[Channel]) -> Result<Vec<Template>> {
        db::active_templates(&self.pool, operation, channels).await
    }
}
