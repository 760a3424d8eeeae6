//! Decides which channels and templates an account event goes out on, and
//! hands each (channel, template) pair to the dispatcher registered for it.
//!
//! Failures of one pair never stop the others; they are collected and
//! returned together.
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::model::{Account, Channel, Template};
use crate::store::{AccountStore, NotificationStore};

pub mod email;

pub use email::{EmailClient, EmailDispatcher};

/// Template data handed to the delivery client.
pub type Payload = Map<String, Value>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{dispatcher}: cannot process the template channel {channel}")]
    ChannelMismatch {
        dispatcher: Channel,
        channel: Channel,
    },
    #[error("{channel}: template {template_id} is not active")]
    InactiveTemplate { channel: Channel, template_id: String },
    #[error("{channel}: operation '{operation}' not supported")]
    UnsupportedOperation { channel: Channel, operation: String },
    #[error("{channel}: source type '{source_type}' not supported")]
    UnsupportedSourceType { channel: Channel, source_type: String },
    #[error("{channel}: error while sending {operation} notification: {source:#}")]
    Send {
        channel: Channel,
        operation: String,
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("error looking up account {account_id}: {source:#}")]
    AccountLookup {
        account_id: String,
        source: anyhow::Error,
    },
    #[error("error getting active channels from settings of account {account_id}: {source:#}")]
    Channels {
        account_id: String,
        source: anyhow::Error,
    },
    #[error("error getting the '{operation}' templates for the notification channels: {source:#}")]
    Templates {
        operation: String,
        source: anyhow::Error,
    },
    #[error("error processing template {template_id}: no dispatcher registered for channel {channel}")]
    NoDispatcher { channel: Channel, template_id: String },
    #[error("template {template_id}: {source}")]
    Dispatch {
        template_id: String,
        #[source]
        source: DispatchError,
    },
}

/// Delivers one template over one channel.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(
        &self,
        account: &Account,
        template: &Template,
        payload: &Payload,
    ) -> Result<(), DispatchError>;
}

#[async_trait]
pub trait NotificationService: Send + Sync {
    /// An empty result means every resolved channel/template succeeded.
    async fn send_notification(
        &self,
        account_id: &str,
        operation: &str,
        payload: Payload,
    ) -> Vec<NotifyError>;
}

pub struct Notifier {
    notifications: Arc<dyn NotificationStore>,
    accounts: Arc<dyn AccountStore>,
    dispatchers: HashMap<Channel, Arc<dyn Dispatcher>>,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut channels: Vec<_> = self.dispatchers.keys().map(Channel::as_str).collect();
        channels.sort_unstable();
        f.debug_struct("Notifier")
            .field("channels", &channels)
            .finish_non_exhaustive()
    }
}

/// Collects the channel → dispatcher table before the notifier is built.
pub struct NotifierBuilder {
    notifications: Arc<dyn NotificationStore>,
    accounts: Arc<dyn AccountStore>,
    dispatchers: HashMap<Channel, Arc<dyn Dispatcher>>,
}

impl NotifierBuilder {
    /// Register `dispatcher` for `channel`, replacing any earlier registration.
    pub fn dispatcher(mut self, channel: Channel, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatchers.insert(channel, dispatcher);
        self
    }

    pub fn build(self) -> Notifier {
        Notifier {
            notifications: self.notifications,
            accounts: self.accounts,
            dispatchers: self.dispatchers,
        }
    }
}

impl Notifier {
    pub fn builder(
        notifications: Arc<dyn NotificationStore>,
        accounts: Arc<dyn AccountStore>,
    ) -> NotifierBuilder {
        NotifierBuilder {
            notifications,
            accounts,
            dispatchers: HashMap::new(),
        }
    }

    async fn resolve_templates(
        &self,
        account_id: &str,
        operation: &str,
    ) -> Result<Vec<Template>, NotifyError> {
        let channels = self
            .notifications
            .enabled_channels(account_id)
            .await
            .map_err(|source| NotifyError::Channels {
                account_id: account_id.to_string(),
                source,
            })?;
        if channels.is_empty() {
            debug!(account_id, "no notification channels enabled");
            return Ok(Vec::new());
        }

        let templates = self
            .notifications
            .active_templates(operation, &channels)
            .await
            .map_err(|source| NotifyError::Templates {
                operation: operation.to_string(),
                source,
            })?;
        if templates.is_empty() {
            debug!(account_id, operation, "no active templates for enabled channels");
        }
        Ok(templates)
    }
}

#[async_trait]
impl NotificationService for Notifier {
    #[instrument(skip(self, payload))]
    async fn send_notification(
        &self,
        account_id: &str,
        operation: &str,
        payload: Payload,
    ) -> Vec<NotifyError> {
        let account = match self.accounts.get_by_id(account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => return vec![NotifyError::AccountNotFound(account_id.to_string())],
            Err(source) => {
                return vec![NotifyError::AccountLookup {
                    account_id: account_id.to_string(),
                    source,
                }]
            }
        };

        let templates = match self.resolve_templates(account_id, operation).await {
            Ok(templates) => templates,
            Err(err) => return vec![err],
        };

        let mut errs = Vec::new();
        for template in &templates {
            let Some(dispatcher) = self.dispatchers.get(&template.channel) else {
                warn!(channel = %template.channel, template_id = %template.id, "no dispatcher registered");
                errs.push(NotifyError::NoDispatcher {
                    channel: template.channel.clone(),
                    template_id: template.id.clone(),
                });
                continue;
            };

            match dispatcher.dispatch(&account, template, &payload).await {
                Ok(()) => debug!(channel = %template.channel, template_id = %template.id, "notification dispatched"),
                Err(source) => {
                    warn!(channel = %template.channel, template_id = %template.id, error = %source, "dispatch failed");
                    errs.push(NotifyError::Dispatch {
                        template_id: template.id.clone(),
                        source,
                    });
                }
            }
        }
        errs
    }
}
