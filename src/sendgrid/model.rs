use serde::Serialize;

use crate::notify::Payload;

/// Body of `POST /v3/mail/send` for a dynamic template.
#[derive(Serialize, Debug)]
pub struct MailSendRequest<'a> {
    pub from: EmailAddress<'a>,
    pub template_id: &'a str,
    pub personalizations: Vec<Personalization<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mail_settings: Option<MailSettings>,
}

#[derive(Serialize, Debug)]
pub struct EmailAddress<'a> {
    pub email: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub name: &'a str,
}

#[derive(Serialize, Debug)]
pub struct Personalization<'a> {
    pub to: Vec<EmailAddress<'a>>,
    pub dynamic_template_data: &'a Payload,
}

#[derive(Serialize, Debug)]
pub struct MailSettings {
    pub sandbox_mode: Setting,
}

#[derive(Serialize, Debug)]
pub struct Setting {
    pub enable: bool,
}
