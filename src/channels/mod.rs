//! Transport adapters: email over SMTP, SMS over Twilio, and a console echo.

pub mod console;
pub mod email;
pub mod email_types;
pub mod sms;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ChannelError;

pub use console::ConsoleTransport;
pub use email::SmtpEmailTransport;
pub use email_types::{extract_addresses, html_to_text, strip_quoted_text};
pub use sms::TwilioSmsTransport;

/// A fully rendered outbound email.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub to: String,
    pub from: String,
    pub reply_to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_at: Option<DateTime<Utc>>,
}

/// A fully rendered outbound SMS.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsMessage {
    pub to: String,
    /// Sender number. The messaging service picks one when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_at: Option<DateTime<Utc>>,
}

/// Sends email. `Ok(None)` means the provider gave no acknowledgement.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage)
    -> Result<Option<serde_json::Value>, ChannelError>;
}

/// Sends SMS. `Ok(None)` means the provider gave no acknowledgement.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, message: &SmsMessage) -> Result<Option<serde_json::Value>, ChannelError>;
}
