//! Outbound notifications: the email relay API, Periskope WhatsApp and
//! reverse geocoding. Handlers never wait on these except for OTP delivery
//! and geocoding; everything else goes through the `spawn_*` helpers.

pub mod templates;

use crate::config::Config;
use crate::utils::phone::whatsapp_participant;
use derive_more::Display;
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Display)]
pub enum NotifyError {
    #[display(fmt = "{} is not configured", _0)]
    NotConfigured(&'static str),
    #[display(fmt = "request failed: {}", _0)]
    Http(reqwest::Error),
    #[display(fmt = "provider returned {}: {}", _0, _1)]
    Status(u16, String),
    #[display(fmt = "unexpected provider response")]
    BadResponse,
}

impl std::error::Error for NotifyError {}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        NotifyError::Http(e)
    }
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    /// Base64 encoded content
    pub data: String,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub subject: String,
    pub body: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub attachment: Option<Attachment>,
}

impl OutgoingEmail {
    pub fn new(subject: impl Into<String>, body: impl Into<String>, to: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            to,
            cc: Vec::new(),
            attachment: None,
        }
    }

    /// First address goes to `to`, the rest are copied.
    pub fn to_first_cc_rest(subject: impl Into<String>, body: impl Into<String>, mut recipients: Vec<String>) -> Self {
        let cc = if recipients.len() > 1 { recipients.split_off(1) } else { Vec::new() };
        let mut email = Self::new(subject, body, recipients);
        email.cc = cc;
        email
    }
}

#[derive(Serialize)]
struct EmailPayload<'a> {
    subject: &'a str,
    msgbody: &'a str,
    to_emails: &'a [String],
    cc_emails: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment_data: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment_mime_type: Option<&'a str>,
}

impl<'a> From<&'a OutgoingEmail> for EmailPayload<'a> {
    fn from(email: &'a OutgoingEmail) -> Self {
        let attachment = email.attachment.as_ref();
        EmailPayload {
            subject: &email.subject,
            msgbody: &email.body,
            to_emails: &email.to,
            cc_emails: &email.cc,
            attachment_name: attachment.map(|a| a.name.as_str()),
            attachment_data: attachment.map(|a| a.data.as_str()),
            attachment_mime_type: attachment.map(|a| a.mime_type.as_str()),
        }
    }
}

/// Cheap to clone; the inner client shares its connection pool.
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    email_api_url: String,
    whatsapp_api_url: String,
    whatsapp_base_url: String,
    whatsapp_create_group_url: String,
    whatsapp_api_key: String,
    whatsapp_sender_phone: String,
    geocode_url: String,
}

fn configured(value: &str, name: &'static str) -> Result<(), NotifyError> {
    if value.trim().is_empty() {
        Err(NotifyError::NotConfigured(name))
    } else {
        Ok(())
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, NotifyError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        let body = resp.text().await.unwrap_or_default();
        Err(NotifyError::Status(status.as_u16(), body))
    }
}

impl Notifier {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("hr-portal/0.1")
            .build()?;

        Ok(Self {
            client,
            email_api_url: config.email_api_url.clone(),
            whatsapp_api_url: config.whatsapp_api_url.clone(),
            whatsapp_base_url: config.whatsapp_base_url.trim_end_matches('/').to_string(),
            whatsapp_create_group_url: config.whatsapp_create_group_url.clone(),
            whatsapp_api_key: config.whatsapp_api_key.clone(),
            whatsapp_sender_phone: config.whatsapp_sender_phone.clone(),
            geocode_url: config.geocode_url.clone(),
        })
    }

    pub fn whatsapp_enabled(&self) -> bool {
        !self.whatsapp_api_key.trim().is_empty()
    }

    pub async fn send_email(&self, email: &OutgoingEmail) -> Result<(), NotifyError> {
        configured(&self.email_api_url, "EMAIL_API_URL")?;
        if email.to.is_empty() {
            return Err(NotifyError::BadResponse);
        }

        let resp = self
            .client
            .post(&self.email_api_url)
            .json(&EmailPayload::from(email))
            .send()
            .await?;
        ensure_success(resp).await?;

        info!(subject = %email.subject, to = ?email.to, "Email sent");
        Ok(())
    }

    fn periskope(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .bearer_auth(&self.whatsapp_api_key)
            .header("x-phone", &self.whatsapp_sender_phone)
    }

    pub async fn send_whatsapp_text(&self, chat_id: &str, message: &str) -> Result<(), NotifyError> {
        configured(&self.whatsapp_api_key, "PERISKOPE_API_KEY")?;

        let resp = self
            .periskope(&self.whatsapp_api_url)
            .json(&json!({ "chat_id": chat_id, "type": "text", "message": message }))
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    /// Creates a group and returns its chat id when the provider reports one.
    pub async fn create_whatsapp_group(
        &self,
        group_name: &str,
        phones: &[String],
    ) -> Result<Option<String>, NotifyError> {
        configured(&self.whatsapp_api_key, "PERISKOPE_API_KEY")?;

        let participants: Vec<String> = phones.iter().filter_map(|p| whatsapp_participant(p)).collect();
        let resp = self
            .periskope(&self.whatsapp_create_group_url)
            .json(&json!({ "group_name": group_name, "participants": participants }))
            .send()
            .await?;
        let body: Value = ensure_success(resp).await?.json().await?;

        Ok(extract_chat_id(&body))
    }

    pub async fn add_participant(&self, chat_id: &str, phone: &str) -> Result<(), NotifyError> {
        self.edit_participants(chat_id, phone, "add").await
    }

    pub async fn remove_participant(&self, chat_id: &str, phone: &str) -> Result<(), NotifyError> {
        self.edit_participants(chat_id, phone, "remove").await
    }

    async fn edit_participants(&self, chat_id: &str, phone: &str, op: &str) -> Result<(), NotifyError> {
        configured(&self.whatsapp_api_key, "PERISKOPE_API_KEY")?;
        let participant = whatsapp_participant(phone).ok_or(NotifyError::BadResponse)?;

        let url = format!("{}/chats/{}/{}", self.whatsapp_base_url, chat_id, op);
        let resp = self
            .periskope(&url)
            .json(&json!({ "participants": [participant] }))
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    /// `display_name` of the nearest address.
    pub async fn reverse_geocode(&self, latitude: f64, longitude: f64) -> Result<String, NotifyError> {
        configured(&self.geocode_url, "GEOCODE_URL")?;

        let resp = self
            .client
            .get(&self.geocode_url)
            .query(&[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("format", "json".to_string()),
                ("zoom", "18".to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .await?;
        let body: Value = ensure_success(resp).await?.json().await?;

        body.get("display_name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(NotifyError::BadResponse)
    }

    pub fn spawn_email(&self, email: OutgoingEmail) {
        let notifier = self.clone();
        actix_web::rt::spawn(async move {
            if let Err(e) = notifier.send_email(&email).await {
                warn!(error = %e, subject = %email.subject, "Background email failed");
            }
        });
    }

    pub fn spawn_add_participant(&self, chat_id: String, phone: String) {
        let notifier = self.clone();
        actix_web::rt::spawn(async move {
            if let Err(e) = notifier.add_participant(&chat_id, &phone).await {
                warn!(error = %e, chat_id = %chat_id, "Adding WhatsApp participant failed");
            }
        });
    }

    pub fn spawn_remove_participant(&self, chat_id: String, phone: String) {
        let notifier = self.clone();
        actix_web::rt::spawn(async move {
            if let Err(e) = notifier.remove_participant(&chat_id, &phone).await {
                warn!(error = %e, chat_id = %chat_id, "Removing WhatsApp participant failed");
            }
        });
    }
}

/// Periskope answers with `chat_id`, `id`, or a nested `chat.id`.
fn extract_chat_id(body: &Value) -> Option<String> {
    body.get("chat_id")
        .or_else(|| body.get("id"))
        .or_else(|| body.get("chat").and_then(|c| c.get("id")))
        .and_then(Value::as_str)
        .map(str::to_string)
}
