//! Per-account balance summaries computed from everything stored for the account.
use thiserror::Error;
use tracing::{debug, instrument};

use crate::model::{BalanceSummary, TransactionType};
use crate::store::TransactionStore;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("couldn't get the credit report for account {account_id}: {source:#}")]
    CreditReport {
        account_id: String,
        source: anyhow::Error,
    },
    #[error("couldn't get the debit report for account {account_id}: {source:#}")]
    DebitReport {
        account_id: String,
        source: anyhow::Error,
    },
    #[error("couldn't get the transactions per month for account {account_id}: {source:#}")]
    MonthlyCounts {
        account_id: String,
        source: anyhow::Error,
    },
}

impl AggregateError {
    pub fn account_id(&self) -> &str {
        match self {
            AggregateError::CreditReport { account_id, .. }
            | AggregateError::DebitReport { account_id, .. }
            | AggregateError::MonthlyCounts { account_id, .. } => account_id,
        }
    }
}

/// Run the credit, debit and monthly-count queries and combine them.
///
/// The total balance is converted to major units; the averages are passed
/// through in minor units exactly as the store reports them.
#[instrument(skip(store))]
pub async fn summarize_account(
    store: &dyn TransactionStore,
    account_id: &str,
) -> Result<BalanceSummary, AggregateError> {
    let credit = store
        .balance_report(account_id, TransactionType::Credit)
        .await
        .map_err(|source| AggregateError::CreditReport {
            account_id: account_id.to_string(),
            source,
        })?;

    let debit = store
        .balance_report(account_id, TransactionType::Debit)
        .await
        .map_err(|source| AggregateError::DebitReport {
            account_id: account_id.to_string(),
            source,
        })?;

    let transactions_by_month =
        store
            .monthly_counts(account_id)
            .await
            .map_err(|source| AggregateError::MonthlyCounts {
                account_id: account_id.to_string(),
                source,
            })?;

    let total_cents = credit.total_balance + debit.total_balance;
    debug!(total_cents, months = transactions_by_month.len(), "account aggregated");

    Ok(BalanceSummary {
        account_id: account_id.to_string(),
        total_balance: total_cents as f64 / 100.0,
        average_credit: credit.average_amount,
        average_debit: debit.average_amount,
        transactions_by_month,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BalanceReport, MonthCount, Transaction};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    /// Fixed answers per query; `None` makes that query fail.
    struct CannedStore {
        credit: Option<(i64, f64)>,
        debit: Option<(i64, f64)>,
        months: Option<Vec<MonthCount>>,
    }

    #[async_trait]
    impl TransactionStore for CannedStore {
        async fn insert_in_bulk(&self, _transactions: &[Transaction]) -> Result<()> {
            Ok(())
        }

        async fn balance_report(
            &self,
            account_id: &str,
            balance_type: TransactionType,
        ) -> Result<BalanceReport> {
            let canned = match balance_type {
                TransactionType::Credit => self.credit,
                TransactionType::Debit => self.debit,
            };
            let (total_balance, average_amount) = canned.ok_or_else(|| anyhow!("db down"))?;
            Ok(BalanceReport {
                account_id: account_id.to_string(),
                balance_type,
                total_balance,
                average_amount,
            })
        }

        async fn monthly_counts(&self, _account_id: &str) -> Result<Vec<MonthCount>> {
            self.months.clone().ok_or_else(|| anyhow!("db down"))
        }

        async fn transactions_by_account(&self, _account_id: &str) -> Result<Vec<Transaction>> {
            Ok(Vec::new())
        }
    }

    fn healthy() -> CannedStore {
        CannedStore {
            credit: Some((1500, 1500.0)),
            debit: Some((-300, -300.0)),
            months: Some(vec![MonthCount { year: 2024, month: 1, count: 2 }]),
        }
    }

    #[tokio::test]
    async fn combines_reports() {
        let summary = summarize_account(&healthy(), "acc1").await.unwrap();
        assert_eq!(summary.account_id, "acc1");
        assert_eq!(summary.total_balance, 12.0);
        // Averages stay in minor units.
        assert_eq!(summary.average_credit, 1500.0);
        assert_eq!(summary.average_debit, -300.0);
        assert_eq!(summary.transactions_by_month.len(), 1);
    }

    #[tokio::test]
    async fn each_query_failure_is_named() {
        let mut store = healthy();
        store.credit = None;
        let err = summarize_account(&store, "acc1").await.unwrap_err();
        assert!(matches!(err, AggregateError::CreditReport { .. }));
        assert_eq!(err.account_id(), "acc1");

        let mut store = healthy();
        store.debit = None;
        let err = summarize_account(&store, "acc1").await.unwrap_err();
        assert!(err.to_string().contains("debit report for account acc1"));

        let mut store = healthy();
        store.months = None;
        let err = summarize_account(&store, "acc1").await.unwrap_err();
        assert!(matches!(err, AggregateError::MonthlyCounts { .. }));
    }
}
