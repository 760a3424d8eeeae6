use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use tracing::{debug, instrument, warn};

use crate::config::SendGrid;
use crate::notify::{EmailClient, Payload};
use crate::sendgrid::model::{EmailAddress, MailSendRequest, MailSettings, Personalization, Setting};

pub mod model;

const MAIL_SEND_PATH: &str = "v3/mail/send";

#[derive(Clone)]
pub struct SendGridClient {
    http: Client,
    base_url: Url,
    key: String,
    sender_email: String,
    sender_name: String,
    sandbox_mode: bool,
}

impl fmt::Debug for SendGridClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendGridClient")
            .field("base_url", &self.base_url)
            .field("sandbox_mode", &self.sandbox_mode)
            .finish_non_exhaustive()
    }
}

impl SendGridClient {
    pub fn from_config(cfg: &SendGrid) -> Result<Self> {
        let base_url = Url::parse(&cfg.host).context("invalid SendGrid host")?;
        let http = Client::builder()
            .user_agent("txn-ledger/0.1")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            key: cfg.key.clone(),
            sender_email: cfg.sender_email.clone(),
            sender_name: cfg.sender_name.clone(),
            sandbox_mode: cfg.sandbox_mode,
        })
    }

    pub fn build_request(
        &self,
        to_email: &str,
        to_name: &str,
        template_id: &str,
        payload: &Payload,
    ) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(MAIL_SEND_PATH)
            .context("invalid SendGrid base URL")?;
        let body = build_mail_send_request(
            EmailAddress {
                email: &self.sender_email,
                name: &self.sender_name,
            },
            EmailAddress {
                email: to_email,
                name: to_name,
            },
            template_id,
            payload,
            self.sandbox_mode,
        );
        self.http
            .post(endpoint)
            .bearer_auth(&self.key)
            .json(&body)
            .build()
            .context("failed to build SendGrid request")
    }
}

pub fn build_mail_send_request<'a>(
    from: EmailAddress<'a>,
    to: EmailAddress<'a>,
    template_id: &'a str,
    payload: &'a Payload,
    sandbox_mode: bool,
) -> MailSendRequest<'a> {
    MailSendRequest {
        from,
        template_id,
        personalizations: vec![Personalization {
            to: vec![to],
            dynamic_template_data: payload,
        }],
        mail_settings: sandbox_mode.then(|| MailSettings {
            sandbox_mode: Setting { enable: true },
        }),
    }
}

#[async_trait]
impl EmailClient for SendGridClient {
    #[instrument(skip_all, fields(template_id = %template_id))]
    async fn send(
        &self,
        to_email: &str,
        to_name: &str,
        template_id: &str,
        payload: &Payload,
    ) -> Result<()> {
        let request = self.build_request(to_email, to_name, template_id, payload)?;
        debug!(url = %request.url(), "sending SendGrid mail");

        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach SendGrid")?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "SendGrid API error");
            return Err(anyhow!("sendgrid error {}: {}", status, body));
        }
        Ok(())
    }
}
