// Outbound confirmation email: HTTP provider and log-only fallback

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("mail client setup failed: {0}")]
    Setup(String),

    #[error("mail transport failed: {0}")]
    Transport(String),

    #[error("mail provider rejected message (status={status}): {body}")]
    Rejected { status: u16, body: String },
}

/// A message ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

impl OutgoingMail {
    /// Confirmation email carrying the signup link
    pub fn confirmation(to: &str, nickname: &str, link: &Url) -> Self {
        Self {
            to: to.to_string(),
            subject: "Confirm your account".to_string(),
            text: format!(
                "Hi {},\n\nFinish creating your account by opening the link below:\n\n{}\n\n\
                 If you did not sign up, ignore this message.\n",
                nickname, link
            ),
        }
    }

    /// Body with every `token=` query value masked, safe for logs
    pub fn redacted_text(&self) -> String {
        const MARKER: &str = "token=";
        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();
        while let Some(pos) = rest.find(MARKER) {
            let (head, tail) = rest.split_at(pos + MARKER.len());
            out.push_str(head);
            out.push_str("<redacted>");
            let end = tail
                .find(|c: char| c.is_whitespace() || c == '&' || c == '#')
                .unwrap_or(tail.len());
            rest = &tail[end..];
        }
        out.push_str(rest);
        out
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// Writes messages to the log instead of sending them
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        info!(to = %mail.to, subject = %mail.subject, "Mail delivery disabled, message logged only");
        debug!(body = %mail.redacted_text(), "Mail body");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailAddress<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailBody<'a> {
    sender: EmailAddress<'a>,
    to: Vec<EmailAddress<'a>>,
    subject: &'a str,
    text_content: &'a str,
}

/// Transactional-email HTTP API client (JSON POST with an `api-key` header)
pub struct HttpMailer {
    http_client: Client,
    endpoint: Url,
    api_key: SecretString,
    sender: String,
}

impl HttpMailer {
    pub fn new(endpoint: Url, api_key: SecretString, sender: String, timeout: Duration) -> Result<Self, MailError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| MailError::Setup(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint,
            api_key,
            sender,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let body = SendEmailBody {
            sender: EmailAddress { email: &self.sender },
            to: vec![EmailAddress { email: &mail.to }],
            subject: &mail.subject,
            text_content: &mail.text,
        };

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .header("api-key", self.api_key.expose_secret())
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(to = %mail.to, "Confirmation email accepted by provider");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(MailError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
