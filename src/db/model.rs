//! Row to entity conversions used by repositories.
//!
//! Keep these focused on decoding columns. Business logic lives in higher layers.

use anyhow::{anyhow, Context, Result};
use chrono::DateTime;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::model::{Account, Channel, MonthCount, Template, Transaction, TransactionType};

pub(crate) fn channel_column(row: &SqliteRow) -> Result<Channel> {
    let raw: String = row.try_get("channel")?;
    Ok(Channel::parse_channel(&raw))
}

impl TryFrom<&SqliteRow> for Transaction {
    type Error = anyhow::Error;

    fn try_from(row: &SqliteRow) -> Result<Self> {
        let id: String = row.try_get("id")?;
        let raw_date: String = row.try_get("date")?;
        let date = DateTime::parse_from_rfc3339(&raw_date)
            .with_context(|| format!("transaction {} has invalid date {}", id, raw_date))?;
        let txn = Transaction::restore(
            id,
            row.try_get::<String, _>("account_id")?,
            date,
            row.try_get::<i64, _>("amount")?,
        );

        // Stored classification must agree with the one derived from the amount.
        let stored_type: String = row.try_get("type")?;
        if TransactionType::parse_type(&stored_type) != Some(txn.kind()) {
            return Err(anyhow!(
                "transaction {} has type {} inconsistent with amount {}",
                txn.id(),
                stored_type,
                txn.amount()
            ));
        }
        Ok(txn)
    }
}

impl TryFrom<&SqliteRow> for MonthCount {
    type Error = anyhow::Error;

    fn try_from(row: &SqliteRow) -> Result<Self> {
        let month: i64 = row.try_get("month")?;
        Ok(MonthCount {
            year: row.try_get::<i64, _>("year")?.try_into()?,
            month: month.try_into()?,
            count: row.try_get("count")?,
        })
    }
}

impl TryFrom<&SqliteRow> for Template {
    type Error = anyhow::Error;

    fn try_from(row: &SqliteRow) -> Result<Self> {
        Ok(Template {
            id: row.try_get("id")?,
            operation: row.try_get("operation")?,
            channel: channel_column(row)?,
            source: row.try_get("source")?,
            source_type: row.try_get("source_type")?,
            active: row.try_get("active")?,
        })
    }
}

impl TryFrom<&SqliteRow> for Account {
    type Error = anyhow::Error;

    fn try_from(row: &SqliteRow) -> Result<Self> {
        Ok(Account {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
        })
    }
}
