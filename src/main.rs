use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, warn};

use txn_ledger::config;
use txn_ledger::db;
use txn_ledger::model::Channel;
use txn_ledger::notify::{EmailDispatcher, Notifier};
use txn_ledger::parser::CsvParser;
use txn_ledger::pipeline::Pipeline;
use txn_ledger::sendgrid::SendGridClient;
use txn_ledger::source::DiskOpener;
use txn_ledger::store::SqliteStore;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
    /// Transactions file to ingest instead of `transactions.source_path`
    #[arg(long)]
    source: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let pool = db::init_pool(&cfg.database.url).await?;
    db::run_migrations(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let email = Arc::new(SendGridClient::from_config(&cfg.sendgrid)?);
    let notifier = Notifier::builder(store.clone(), store.clone())
        .dispatcher(Channel::Email, Arc::new(EmailDispatcher::new(email)))
        .build();

    let parser = CsvParser::new(cfg.transactions.required_fields.clone())
        .with_columns(cfg.transactions.columns.clone());
    let pipeline = Pipeline::new(Arc::new(parser), store, Arc::new(notifier))
        .with_workers(cfg.app.workers);

    let source = args
        .source
        .unwrap_or_else(|| cfg.transactions.source_path.clone());
    let deadline = Instant::now() + cfg.app.deadline();

    info!(%source, "processing transactions file");
    let (summaries, errors) = pipeline
        .process_source(&DiskOpener, &source, Some(deadline))
        .await;

    for summary in &summaries {
        info!(
            account_id = %summary.account_id,
            total_balance = summary.total_balance,
            average_credit = summary.average_credit,
            average_debit = summary.average_debit,
            months = summary.transactions_by_month.len(),
            "account summarized"
        );
    }
    for err in &errors {
        if err.is_fatal() {
            error!(error = %err, "processing failed");
        } else {
            warn!(error = %err, "processing incomplete");
        }
    }

    if summaries.is_empty() && errors.iter().any(|e| e.is_fatal()) {
        bail!("transactions file {} was not processed", source);
    }
    info!(
        accounts = summaries.len(),
        errors = errors.len(),
        "done"
    );
    Ok(())
}
