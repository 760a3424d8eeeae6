use chrono::{DateTime, Datelike, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification of a transaction, derived from the sign of its amount.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Credit,
    Debit,
}

impl TransactionType {
    pub fn for_amount(amount: i64) -> Self {
        if amount >= 0 {
            TransactionType::Credit
        } else {
            TransactionType::Debit
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Credit => "credit",
            TransactionType::Debit => "debit",
        }
    }

    pub fn parse_type(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(TransactionType::Credit),
            "debit" => Some(TransactionType::Debit),
            _ => None,
        }
    }
}

/// A single ledger movement. Amounts are in minor units (cents).
///
/// Fields are private: the classification and the calendar fields are always
/// derived from `amount` and `date`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Transaction {
    id: String,
    account_id: String,
    date: DateTime<FixedOffset>,
    amount: i64,
    #[serde(rename = "type")]
    kind: TransactionType,
    year: i32,
    month: u32,
}

impl Transaction {
    /// Build a new transaction with a freshly generated identifier.
    pub fn new(account_id: impl Into<String>, date: DateTime<FixedOffset>, amount: i64) -> Self {
        Self::restore(Uuid::new_v4().to_string(), account_id, date, amount)
    }

    /// Rebuild a transaction that already has an identifier (e.g. read back from storage).
    pub fn restore(
        id: impl Into<String>,
        account_id: impl Into<String>,
        date: DateTime<FixedOffset>,
        amount: i64,
    ) -> Self {
        Self {
            id: id.into(),
            account_id: account_id.into(),
            year: date.year(),
            month: date.month(),
            date,
            amount,
            kind: TransactionType::for_amount(amount),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn date(&self) -> DateTime<FixedOffset> {
        self.date
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn kind(&self) -> TransactionType {
        self.kind
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

/// Sum and average of one classification of an account's stored transactions.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceReport {
    pub account_id: String,
    pub balance_type: TransactionType,
    pub total_balance: i64,
    pub average_amount: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonthCount {
    pub month: u32,
    pub year: i32,
    pub count: i64,
}

/// Per-account figures sent in the account summary notification.
///
/// `total_balance` is in major units; the averages stay in minor units.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSummary {
    #[serde(skip)]
    pub account_id: String,
    pub total_balance: f64,
    pub average_credit: f64,
    pub average_debit: f64,
    pub transactions_by_month: Vec<MonthCount>,
}

/// Notification delivery medium. Settings and templates may name channels
/// this build has no variant for; those are kept as [`Channel::Other`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum Channel {
    Email,
    Sms,
    Push,
    Other(String),
}

impl Channel {
    pub fn as_str(&self) -> &str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
            Channel::Other(name) => name,
        }
    }

    pub fn parse_channel(s: &str) -> Self {
        match s {
            "email" => Channel::Email,
            "sms" => Channel::Sms,
            "push" => Channel::Push,
            other => Channel::Other(other.to_string()),
        }
    }
}

impl From<String> for Channel {
    fn from(s: String) -> Self {
        Channel::parse_channel(&s)
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.as_str().to_string()
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business events that can trigger a notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Operation {
    AccountSummary,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::AccountSummary => "account-summary",
        }
    }

    pub fn parse_operation(s: &str) -> Option<Self> {
        match s {
            "account-summary" => Some(Operation::AccountSummary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationsSettings {
    pub id: String,
    pub account_id: String,
    pub channel: Channel,
    pub enabled: bool,
}

/// Where a template body lives; `sendgrid` means `source` is a provider template id.
pub const SENDGRID_SOURCE_TYPE: &str = "sendgrid";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Template {
    pub id: String,
    /// Operation name as stored; may name an operation this build does not know.
    pub operation: String,
    pub channel: Channel,
    pub source: String,
    pub source_type: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn classification_follows_sign() {
        assert_eq!(TransactionType::for_amount(0), TransactionType::Credit);
        assert_eq!(TransactionType::for_amount(1), TransactionType::Credit);
        assert_eq!(TransactionType::for_amount(-1), TransactionType::Debit);
    }

    #[test]
    fn calendar_fields_use_source_offset() {
        // 23:30 on Jan 31 at -05:00 is already February in UTC.
        let date = DateTime::parse_from_rfc3339("2024-01-31T23:30:00-05:00").unwrap();
        let txn = Transaction::new("acc1", date, -250);
        assert_eq!(txn.year(), 2024);
        assert_eq!(txn.month(), 1);
        assert_eq!(txn.kind(), TransactionType::Debit);
    }

    #[test]
    fn new_transactions_get_distinct_ids() {
        let date = DateTime::parse_from_rfc3339("2024-01-05T00:00:00Z").unwrap();
        let a = Transaction::new("acc1", date, 10);
        let b = Transaction::new("acc1", date, 10);
        assert_ne!(a.id(), b.id());
        assert!(Uuid::parse_str(a.id()).is_ok());
    }

    #[test]
    fn string_forms_round_trip() {
        for c in [Channel::Email, Channel::Sms, Channel::Push] {
            assert_eq!(Channel::parse_channel(c.as_str()), c);
        }
        let fax = Channel::parse_channel("fax");
        assert_eq!(fax, Channel::Other("fax".into()));
        assert_eq!(fax.as_str(), "fax");
        assert_eq!(serde_json::to_value(&fax).unwrap(), "fax");
        assert_eq!(serde_json::from_value::<Channel>("sms".into()).unwrap(), Channel::Sms);
        assert_eq!(
            Operation::parse_operation("account-summary"),
            Some(Operation::AccountSummary)
        );
        assert_eq!(TransactionType::parse_type("debit"), Some(TransactionType::Debit));
    }

    #[test]
    fn summary_serializes_without_account_id() {
        let summary = BalanceSummary {
            account_id: "acc1".into(),
            total_balance: 12.0,
            average_credit: 1500.0,
            average_debit: -300.0,
            transactions_by_month: vec![MonthCount { month: 1, year: 2024, count: 2 }],
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert!(value.get("accountId").is_none());
        assert_eq!(value["totalBalance"], 12.0);
        assert_eq!(value["transactionsByMonth"][0]["count"], 2);
    }
}
