//! Configuration loader and validator for the transaction ledger.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

pub const FILE_SYSTEM_SOURCE_TYPE: &str = "file-system";
pub const CSV_SOURCE_FORMAT: &str = "csv";

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub database: Database,
    pub sendgrid: SendGrid,
    pub transactions: Transactions,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    /// Time budget for a whole file-processing run.
    pub deadline_seconds: u64,
    /// Accounts aggregated and notified concurrently; 1 runs them in sequence.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Database {
    pub url: String,
}

/// SendGrid v3 mail API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendGrid {
    pub sender_email: String,
    pub sender_name: String,
    pub key: String,
    pub host: String,
    #[serde(default)]
    pub sandbox_mode: bool,
}

/// Where the transactions file comes from and how it is laid out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transactions {
    pub source_type: String,
    pub source_format: String,
    pub source_path: String,
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub columns: Columns,
}

/// Header names of the three columns the parser consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Columns {
    pub account_id: String,
    pub date: String,
    pub amount: String,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            account_id: "accountId".into(),
            date: "date".into(),
            amount: "amount".into(),
        }
    }
}

fn default_workers() -> usize {
    1
}

impl App {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_seconds)
    }
}

/// Load configuration from a YAML file, apply environment overrides and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    validate(&cfg)?;
    Ok(cfg)
}

/// Environment values win over the file. `lookup` is injectable for tests.
fn apply_env_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("DATABASE_URL") {
        cfg.database.url = v;
    }
    if let Some(v) = lookup("SENDGRID_KEY") {
        cfg.sendgrid.key = v;
    }
    if let Some(v) = lookup("SENDGRID_HOST") {
        cfg.sendgrid.host = v;
    }
    if let Some(v) = lookup("TRANSACTIONS_SOURCE_PATH") {
        cfg.transactions.source_path = v;
    }
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.deadline_seconds == 0 {
        return Err(ConfigError::Invalid("app.deadline_seconds must be > 0"));
    }
    if cfg.app.workers == 0 {
        return Err(ConfigError::Invalid("app.workers must be > 0"));
    }

    if cfg.database.url.trim().is_empty() {
        return Err(ConfigError::Invalid("database.url must be non-empty"));
    }

    if cfg.sendgrid.sender_email.trim().is_empty() {
        return Err(ConfigError::Invalid("sendgrid.sender_email must be non-empty"));
    }
    if cfg.sendgrid.key.trim().is_empty() {
        return Err(ConfigError::Invalid("sendgrid.key must be non-empty"));
    }
    if Url::parse(&cfg.sendgrid.host).is_err() {
        return Err(ConfigError::Invalid("sendgrid.host must be a valid URL"));
    }

    let tx = &cfg.transactions;
    if tx.source_type != FILE_SYSTEM_SOURCE_TYPE {
        return Err(ConfigError::Invalid("transactions.source_type must be \"file-system\""));
    }
    if tx.source_format != CSV_SOURCE_FORMAT {
        return Err(ConfigError::Invalid("transactions.source_format must be \"csv\""));
    }
    if tx.source_path.trim().is_empty() {
        return Err(ConfigError::Invalid("transactions.source_path must be non-empty"));
    }
    let cols = &tx.columns;
    if cols.account_id.trim().is_empty()
        || cols.date.trim().is_empty()
        || cols.amount.trim().is_empty()
    {
        return Err(ConfigError::Invalid("transactions.columns entries must be non-empty"));
    }

    Ok(())
}

/// Returns an example YAML document covering every setting.
pub fn example() -> &'static str {
    r#"app:
  deadline_seconds: 60
  workers: 1

database:
  url: "sqlite://./data/ledger.db?mode=rwc"

sendgrid:
  sender_email: "noreply@example.com"
  sender_name: "Ledger"
  key: "YOUR_SENDGRID_API_KEY"
  host: "https://api.sendgrid.com"
  sandbox_mode: true

transactions:
  source_type: "file-system"
  source_format: "csv"
  source_path: "./resources/transactions.csv"
  required_fields:
    - accountId
    - date
    - amount
  columns:
    account_id: "accountId"
    date: "date"
    amount: "amount"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn example_cfg() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    #[test]
    fn parse_example_ok() {
        let cfg = example_cfg();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.deadline(), Duration::from_secs(60));
        assert_eq!(cfg.transactions.required_fields.len(), 3);
    }

    #[test]
    fn optional_sections_default() {
        let yaml = example()
            .replace("  workers: 1\n", "")
            .replace("  sandbox_mode: true\n", "");
        let yaml = yaml.split("  required_fields:").next().unwrap().to_string();
        let cfg: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(cfg.app.workers, 1);
        assert!(!cfg.sendgrid.sandbox_mode);
        assert!(cfg.transactions.required_fields.is_empty());
        assert_eq!(cfg.transactions.columns, Columns::default());
    }

    #[test]
    fn invalid_app_values() {
        let mut cfg = example_cfg();
        cfg.app.deadline_seconds = 0;
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("deadline_seconds")), _ => panic!("wrong error") }

        let mut cfg = example_cfg();
        cfg.app.workers = 0;
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("workers")), _ => panic!("wrong error") }
    }

    #[test]
    fn invalid_sendgrid_settings() {
        let mut cfg = example_cfg();
        cfg.sendgrid.key = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("sendgrid.key")), _ => panic!("wrong error") }

        let mut cfg = example_cfg();
        cfg.sendgrid.host = "not a url".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.sendgrid.sender_email = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_transaction_source() {
        let mut cfg = example_cfg();
        cfg.transactions.source_type = "s3".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("source_type")), _ => panic!("wrong error") }

        let mut cfg = example_cfg();
        cfg.transactions.source_format = "json".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.transactions.columns.amount = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn env_overrides_win() {
        let mut cfg = example_cfg();
        let env: HashMap<&str, &str> = [
            ("DATABASE_URL", "sqlite::memory:"),
            ("SENDGRID_KEY", "secret"),
            ("TRANSACTIONS_SOURCE_PATH", "/tmp/txns.csv"),
        ]
        .into_iter()
        .collect();
        apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.database.url, "sqlite::memory:");
        assert_eq!(cfg.sendgrid.key, "secret");
        assert_eq!(cfg.sendgrid.host, "https://api.sendgrid.com");
        assert_eq!(cfg.transactions.source_path, "/tmp/txns.csv");
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.transactions.columns.account_id, "accountId");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let td = tempdir().unwrap();
        let err = load(Some(&td.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
