use anyhow::{Context, Result};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::instrument;
use uuid::Uuid;

use super::model::channel_column;
use crate::model::{
    Account, BalanceReport, Channel, MonthCount, Template, Transaction, TransactionType,
};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Insert all transactions in one database transaction; nothing is kept on failure.
#[instrument(skip_all, fields(count = transactions.len()))]
pub async fn insert_transactions_in_bulk(pool: &Pool, transactions: &[Transaction]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for txn in transactions {
        sqlx::query(
            "INSERT INTO transactions (id, account_id, date, amount, type, year, month) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(txn.id())
        .bind(txn.account_id())
        .bind(txn.date().to_rfc3339())
        .bind(txn.amount())
        .bind(txn.kind().as_str())
        .bind(txn.year())
        .bind(txn.month() as i64)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to insert transaction {}", txn.id()))?;
    }
    tx.commit().await?;
    Ok(())
}

/// Sum and average of every stored transaction of `balance_type` for the account.
/// An account with no such transactions reports zero for both.
#[instrument(skip_all)]
pub async fn balance_report(
    pool: &Pool,
    account_id: &str,
    balance_type: TransactionType,
) -> Result<BalanceReport> {
    let row = sqlx::query(
        "SELECT COALESCE(SUM(amount), 0) AS total_balance, COALESCE(AVG(amount), 0.0) AS average_amount \
         FROM transactions WHERE account_id = ? AND type = ?",
    )
    .bind(account_id)
    .bind(balance_type.as_str())
    .fetch_one(pool)
    .await?;

    Ok(BalanceReport {
        account_id: account_id.to_string(),
        balance_type,
        total_balance: row.try_get("total_balance")?,
        average_amount: row.try_get("average_amount")?,
    })
}

/// Transaction counts per calendar month, most recent month first.
#[instrument(skip_all)]
pub async fn monthly_counts(pool: &Pool, account_id: &str) -> Result<Vec<MonthCount>> {
    let rows = sqlx::query(
        "SELECT year, month, COUNT(*) AS count FROM transactions WHERE account_id = ? \
         GROUP BY year, month ORDER BY year DESC, month DESC",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(MonthCount::try_from).collect()
}

#[instrument(skip_all)]
pub async fn transactions_by_account(pool: &Pool, account_id: &str) -> Result<Vec<Transaction>> {
    let rows = sqlx::query(
        "SELECT id, account_id, date, amount, type FROM transactions WHERE account_id = ? ORDER BY date ASC",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(Transaction::try_from).collect()
}

#[instrument(skip_all)]
pub async fn account_by_id(pool: &Pool, id: &str) -> Result<Option<Account>> {
    let row = sqlx::query("SELECT id, name, email FROM accounts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(Account::try_from).transpose()
}

#[instrument(skip_all)]
pub async fn insert_account(pool: &Pool, account: &Account) -> Result<()> {
    sqlx::query("INSERT INTO accounts (id, name, email) VALUES (?, ?, ?)")
        .bind(&account.id)
        .bind(&account.name)
        .bind(&account.email)
        .execute(pool)
        .await
        .with_context(|| format!("failed to insert account {}", account.id))?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn enabled_channels(pool: &Pool, account_id: &str) -> Result<Vec<Channel>> {
    let rows = sqlx::query(
        "SELECT channel FROM notifications_settings WHERE account_id = ? AND enabled = 1",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(channel_column).collect()
}

/// Enable or disable one channel for an account, creating the setting if needed.
#[instrument(skip_all)]
pub async fn upsert_notification_setting(
    pool: &Pool,
    account_id: &str,
    channel: Channel,
    enabled: bool,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO notifications_settings (id, account_id, channel, enabled) VALUES (?, ?, ?, ?) \
         ON CONFLICT(account_id, channel) DO UPDATE SET enabled = excluded.enabled",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(account_id)
    .bind(channel.as_str())
    .bind(enabled)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn active_templates(
    pool: &Pool,
    operation: &str,
    channels: &[Channel],
) -> Result<Vec<Template>> {
    if channels.is_empty() {
        return Ok(Vec::new());
    }

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, operation, channel, source, source_type, active FROM templates \
         WHERE active = 1 AND operation = ",
    );
    query.push_bind(operation);
    query.push(" AND channel IN (");
    let mut separated = query.separated(", ");
    for channel in channels {
        separated.push_bind(channel.as_str());
    }
    separated.push_unseparated(") ORDER BY id");

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(Template::try_from).collect()
}

#[instrument(skip_all)]
pub async fn insert_template(pool: &Pool, template: &Template) -> Result<()> {
    sqlx::query(
        "INSERT INTO templates (id, operation, channel, source, source_type, active) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&template.id)
    .bind(&template.operation)
    .bind(template.channel.as_str())
    .bind(&template.source)
    .bind(&template.source_type)
    .bind(template.active)
    .execute(pool)
    .await
    .with_context(|| format!("failed to insert template {}", template.id))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn txn(account: &str, date: &str, amount: i64) -> Transaction {
        Transaction::new(account, DateTime::parse_from_rfc3339(date).unwrap(), amount)
    }

    #[test]
    fn prepare_sqlite_url_passes_memory_and_other_schemes() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x/y"), "postgres://x/y");
    }

    #[test]
    fn prepare_sqlite_url_creates_parent_dir() {
        let td = tempfile::tempdir().unwrap();
        let db = td.path().join("nested").join("ledger.db");
        let url = format!("sqlite://{}?mode=rwc", db.display());
        let rebuilt = prepare_sqlite_url(&url);
        assert_eq!(rebuilt, url);
        assert!(td.path().join("nested").exists());
    }

    #[tokio::test]
    async fn reports_are_scoped_to_account_and_type() {
        let pool = setup_pool().await;
        let batch = vec![
            txn("acc1", "2024-01-05T00:00:00Z", 1500),
            txn("acc1", "2024-01-20T00:00:00Z", -300),
            txn("acc1", "2024-02-01T00:00:00Z", 500),
            txn("acc2", "2024-01-07T00:00:00Z", 9999),
        ];
        insert_transactions_in_bulk(&pool, &batch).await.unwrap();

        let credit = balance_report(&pool, "acc1", TransactionType::Credit).await.unwrap();
        assert_eq!(credit.total_balance, 2000);
        assert_eq!(credit.average_amount, 1000.0);

        let debit = balance_report(&pool, "acc1", TransactionType::Debit).await.unwrap();
        assert_eq!(debit.total_balance, -300);
        assert_eq!(debit.average_amount, -300.0);

        let none = balance_report(&pool, "acc2", TransactionType::Debit).await.unwrap();
        assert_eq!(none.total_balance, 0);
        assert_eq!(none.average_amount, 0.0);

        let months = monthly_counts(&pool, "acc1").await.unwrap();
        assert_eq!(
            months,
            vec![
                MonthCount { year: 2024, month: 2, count: 1 },
                MonthCount { year: 2024, month: 1, count: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn bulk_insert_is_all_or_nothing() {
        let pool = setup_pool().await;
        let first = txn("acc1", "2024-01-05T00:00:00Z", 1);
        let batch = vec![first.clone(), txn("acc1", "2024-01-06T00:00:00Z", 2), first];
        assert!(insert_transactions_in_bulk(&pool, &batch).await.is_err());
        assert!(transactions_by_account(&pool, "acc1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transactions_round_trip_through_storage() {
        let pool = setup_pool().await;
        let original = txn("acc1", "2024-03-31T22:00:00-04:00", -75);
        insert_transactions_in_bulk(&pool, std::slice::from_ref(&original))
            .await
            .unwrap();
        let stored = transactions_by_account(&pool, "acc1").await.unwrap();
        assert_eq!(stored, vec![original]);
    }

    #[tokio::test]
    async fn channels_and_templates() {
        let pool = setup_pool().await;
        upsert_notification_setting(&pool, "acc1", Channel::Email, true).await.unwrap();
        upsert_notification_setting(&pool, "acc1", Channel::Sms, true).await.unwrap();
        upsert_notification_setting(&pool, "acc1", Channel::Sms, false).await.unwrap();

        let channels = enabled_channels(&pool, "acc1").await.unwrap();
        assert_eq!(channels, vec![Channel::Email]);
        assert!(enabled_channels(&pool, "other").await.unwrap().is_empty());

        upsert_notification_setting(&pool, "acc2", Channel::parse_channel("whatsapp"), true)
            .await
            .unwrap();
        assert_eq!(
            enabled_channels(&pool, "acc2").await.unwrap(),
            vec![Channel::Other("whatsapp".into())]
        );

        for (id, channel, active) in [
            ("t1", Channel::Email, true),
            ("t2", Channel::Email, false),
            ("t3", Channel::Sms, true),
        ] {
            insert_template(
                &pool,
                &Template {
                    id: id.into(),
                    operation: "account-summary".into(),
                    channel,
                    source: format!("d-{}", id),
                    source_type: "sendgrid".into(),
                    active,
                },
            )
            .await
            .unwrap();
        }

        let templates = active_templates(&pool, "account-summary", &channels).await.unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].id, "t1");
        assert_eq!(templates[0].source, "d-t1");

        let both = active_templates(&pool, "account-summary", &[Channel::Email, Channel::Sms])
            .await
            .unwrap();
        assert_eq!(both.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["t1", "t3"]);

        assert!(active_templates(&pool, "other-op", &channels).await.unwrap().is_empty());
        assert!(active_templates(&pool, "account-summary", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn account_lookup() {
        let pool = setup_pool().await;
        let account = Account {
            id: "acc1".into(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
        };
        insert_account(&pool, &account).await.unwrap();
        assert_eq!(account_by_id(&pool, "acc1").await.unwrap(), Some(account));
        assert_eq!(account_by_id(&pool, "missing").await.unwrap(), None);
    }
}
