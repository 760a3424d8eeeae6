use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

use super::{DispatchError, Dispatcher, Payload};
use crate::model::{Account, Channel, Operation, Template, SENDGRID_SOURCE_TYPE};

/// Outbound email provider.
#[async_trait]
pub trait EmailClient: Send + Sync {
    async fn send(
        &self,
        to_email: &str,
        to_name: &str,
        template_id: &str,
        payload: &Payload,
    ) -> Result<()>;
}

/// Dispatcher for the email channel. Each known [`Operation`] has its own handler.
pub struct EmailDispatcher {
    client: Arc<dyn EmailClient>,
}

impl EmailDispatcher {
    pub fn new(client: Arc<dyn EmailClient>) -> Self {
        Self { client }
    }

    /// Adds the account's display name and sends through the template's source.
    async fn account_summary(
        &self,
        account: &Account,
        template: &Template,
        payload: &Payload,
    ) -> Result<(), DispatchError> {
        let mut data = payload.clone();
        data.insert("name".into(), Value::String(account.name.clone()));

        match template.source_type.as_str() {
            SENDGRID_SOURCE_TYPE => {
                self.client
                    .send(&account.email, &account.name, &template.source, &data)
                    .await
                    .map_err(|source| DispatchError::Send {
                        channel: Channel::Email,
                        operation: template.operation.clone(),
                        source,
                    })?;
            }
            other => {
                return Err(DispatchError::UnsupportedSourceType {
                    channel: Channel::Email,
                    source_type: other.to_string(),
                })
            }
        }

        info!(account_id = %account.id, template_id = %template.id, "account summary email sent");
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for EmailDispatcher {
    #[instrument(skip_all, fields(template_id = %template.id))]
    async fn dispatch(
        &self,
        account: &Account,
        template: &Template,
        payload: &Payload,
    ) -> Result<(), DispatchError> {
        if template.channel != Channel::Email {
            return Err(DispatchError::ChannelMismatch {
                dispatcher: Channel::Email,
                channel: template.channel.clone(),
            });
        }
        if !template.active {
            return Err(DispatchError::InactiveTemplate {
                channel: Channel::Email,
                template_id: template.id.clone(),
            });
        }

        match Operation::parse_operation(&template.operation) {
            Some(Operation::AccountSummary) => self.account_summary(account, template, payload).await,
            None => Err(DispatchError::UnsupportedOperation {
                channel: Channel::Email,
                operation: template.operation.clone(),
            }),
        }
    }
}
