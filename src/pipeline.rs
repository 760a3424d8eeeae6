//! File ingestion: parse → persist → aggregate per account → notify.
//!
//! Only opening the source, parsing it and storing its transactions are fatal.
//! Anything that goes wrong for one account is recorded and the remaining
//! accounts are still processed.
use futures::stream::{self, StreamExt};
use serde::ser::Error as _;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::io::Read;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{self, JoinError};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

use crate::aggregate::{summarize_account, AggregateError};
use crate::model::{BalanceSummary, Operation};
use crate::notify::{NotificationService, NotifyError, Payload};
use crate::parser::{ParseError, TransactionParser};
use crate::source::{SourceError, SourceOpener};
use crate::store::TransactionStore;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("parser task failed: {0}")]
    ParseTask(#[from] JoinError),
    #[error("couldn't store the transactions from the file")]
    Store(#[source] anyhow::Error),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error("couldn't encode balance summary for account {account_id}: {source}")]
    Payload {
        account_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("notification for account {account_id} failed: {source}")]
    Notify {
        account_id: String,
        #[source]
        source: NotifyError,
    },
    #[error("deadline exceeded while {stage}")]
    DeadlineExceeded { stage: Stage },
}

/// Step of a run that a deadline can interrupt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Parsing,
    Storing,
    Aggregating(String),
    Notifying(String),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Parsing => f.write_str("parsing transactions"),
            Stage::Storing => f.write_str("storing transactions"),
            Stage::Aggregating(account_id) => write!(f, "aggregating account {}", account_id),
            Stage::Notifying(account_id) => write!(f, "notifying account {}", account_id),
        }
    }
}

impl PipelineError {
    /// True for failures that stop the whole run rather than one account.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Source(_)
                | PipelineError::Parse(_)
                | PipelineError::ParseTask(_)
                | PipelineError::Store(_)
                | PipelineError::DeadlineExceeded {
                    stage: Stage::Parsing | Stage::Storing
                }
        )
    }
}

/// What happened to one account of the batch.
#[derive(Debug, Default)]
struct AccountOutcome {
    summary: Option<BalanceSummary>,
    errors: Vec<PipelineError>,
}

impl AccountOutcome {
    fn failed(err: PipelineError) -> Self {
        Self {
            summary: None,
            errors: vec![err],
        }
    }
}

pub struct Pipeline {
    parser: Arc<dyn TransactionParser>,
    store: Arc<dyn TransactionStore>,
    notifier: Arc<dyn NotificationService>,
    workers: usize,
}

impl Pipeline {
    pub fn new(
        parser: Arc<dyn TransactionParser>,
        store: Arc<dyn TransactionStore>,
        notifier: Arc<dyn NotificationService>,
    ) -> Self {
        Self {
            parser,
            store,
            notifier,
            workers: 1,
        }
    }

    /// Number of accounts aggregated and notified at the same time.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Open `identifier` through `opener` and process it.
    pub async fn process_source(
        &self,
        opener: &dyn SourceOpener,
        identifier: &str,
        deadline: Option<Instant>,
    ) -> (Vec<BalanceSummary>, Vec<PipelineError>) {
        match opener.open(identifier) {
            Ok(reader) => self.process_transactions_file(reader, deadline).await,
            Err(err) => {
                warn!(error = %err, identifier, "couldn't open transactions source");
                (Vec::new(), vec![err.into()])
            }
        }
    }

    /// Process one transactions file.
    ///
    /// Returns the summaries that were computed and every failure met along
    /// the way. An empty error list means full success. Summaries come back in
    /// no particular order.
    ///
    /// The reader is consumed on the blocking pool. When the deadline hits
    /// first the call returns, but a read already in progress finishes in the
    /// background.
    #[instrument(skip_all, fields(workers = self.workers))]
    pub async fn process_transactions_file<R: Read + Send + 'static>(
        &self,
        mut reader: R,
        deadline: Option<Instant>,
    ) -> (Vec<BalanceSummary>, Vec<PipelineError>) {
        let parser = Arc::clone(&self.parser);
        let parsing = task::spawn_blocking(move || parser.parse(&mut reader));
        let txns = match before_deadline(deadline, parsing).await {
            Some(Ok(Ok(txns))) => txns,
            Some(Ok(Err(err))) => {
                warn!(error = %err, "couldn't parse transactions file");
                return (Vec::new(), vec![err.into()]);
            }
            Some(Err(err)) => {
                warn!(error = %err, "parser task failed");
                return (Vec::new(), vec![err.into()]);
            }
            None => {
                warn!("deadline exceeded while parsing transactions");
                return (
                    Vec::new(),
                    vec![PipelineError::DeadlineExceeded {
                        stage: Stage::Parsing,
                    }],
                );
            }
        };
        info!(count = txns.len(), "parsed transactions file");

        match before_deadline(deadline, self.store.insert_in_bulk(&txns)).await {
            Some(Ok(())) => {}
            Some(Err(err)) => {
                warn!(error = ?err, "couldn't store transactions");
                return (Vec::new(), vec![PipelineError::Store(err)]);
            }
            None => {
                warn!("deadline exceeded while storing transactions");
                return (
                    Vec::new(),
                    vec![PipelineError::DeadlineExceeded {
                        stage: Stage::Storing,
                    }],
                );
            }
        }

        let accounts: Vec<String> = txns
            .iter()
            .map(|t| t.account_id())
            .collect::<HashSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();
        debug!(accounts = accounts.len(), "accounts touched by batch");

        let outcomes: Vec<AccountOutcome> = stream::iter(accounts)
            .map(|account_id| self.process_account(account_id, deadline))
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut summaries = Vec::new();
        let mut errors = Vec::new();
        for outcome in outcomes {
            summaries.extend(outcome.summary);
            errors.extend(outcome.errors);
        }
        info!(
            summaries = summaries.len(),
            errors = errors.len(),
            "transactions file processed"
        );
        (summaries, errors)
    }

    async fn process_account(&self, account_id: String, deadline: Option<Instant>) -> AccountOutcome {
        let summary =
            match before_deadline(deadline, summarize_account(self.store.as_ref(), &account_id)).await {
                Some(Ok(summary)) => summary,
                Some(Err(err)) => {
                    warn!(error = %err, account_id = %account_id, "aggregation failed");
                    return AccountOutcome::failed(err.into());
                }
                None => {
                    return AccountOutcome::failed(PipelineError::DeadlineExceeded {
                        stage: Stage::Aggregating(account_id.clone()),
                    })
                }
            };

        let payload = match summary_payload(&summary) {
            Ok(payload) => payload,
            Err(source) => {
                warn!(error = %source, account_id = %account_id, "couldn't encode balance summary");
                return AccountOutcome {
                    summary: Some(summary),
                    errors: vec![PipelineError::Payload { account_id, source }],
                };
            }
        };

        let notified = before_deadline(
            deadline,
            self.notifier
                .send_notification(&account_id, Operation::AccountSummary.as_str(), payload),
        )
        .await;
        let errors = match notified {
            Some(errs) => errs
                .into_iter()
                .map(|source| PipelineError::Notify {
                    account_id: account_id.clone(),
                    source,
                })
                .collect(),
            None => vec![PipelineError::DeadlineExceeded {
                stage: Stage::Notifying(account_id.clone()),
            }],
        };

        AccountOutcome {
            summary: Some(summary),
            errors,
        }
    }
}

/// Encode a summary as notification template data.
pub fn summary_payload(summary: &BalanceSummary) -> Result<Payload, serde_json::Error> {
    match serde_json::to_value(summary)? {
        Value::Object(map) => Ok(map),
        _ => Err(serde_json::Error::custom("balance summary is not a JSON object")),
    }
}

/// Run `fut` to completion, or give up at `deadline` and drop it.
async fn before_deadline<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}
