//! Email transport: SMTP relay via lettre.
//!
//! SendGrid's relay accepts the API key as the SMTP password and reads
//! scheduling instructions from the `X-SMTPAPI` header.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::message::header::{HeaderName, HeaderValue};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::{error, info};

use crate::channels::{EmailMessage, EmailTransport};
use crate::config::SmtpConfig;
use crate::error::ChannelError;

const CHANNEL: &str = "email";

/// Port that speaks implicit TLS; anything else upgrades with STARTTLS.
const SMTPS_PORT: u16 = 465;

/// Email transport over an authenticated SMTP relay.
pub struct SmtpEmailTransport {
    config: SmtpConfig,
}

impl SmtpEmailTransport {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn relay(&self) -> Result<SmtpTransport, ChannelError> {
        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.api_key.expose_secret().to_string(),
        );

        let builder = if self.config.port == SMTPS_PORT {
            SmtpTransport::relay(&self.config.host)
        } else {
            SmtpTransport::starttls_relay(&self.config.host)
        }
        .map_err(|e| ChannelError::SendFailed {
            name: CHANNEL.into(),
            reason: format!("SMTP relay error: {e}"),
        })?;

        Ok(builder.port(self.config.port).credentials(creds).build())
    }
}

/// Parse an address, rejecting malformed input before anything is sent.
fn mailbox(field: &str, value: &str) -> Result<Mailbox, ChannelError> {
    value.parse().map_err(|e| ChannelError::InvalidAddress {
        name: CHANNEL.into(),
        reason: format!("invalid {field} address {value:?}: {e}"),
    })
}

/// `X-SMTPAPI` header asking the relay to hold the message until `send_at`.
fn schedule_header(send_at: DateTime<Utc>) -> HeaderValue {
    HeaderValue::new(
        HeaderName::new_from_ascii_str("X-SMTPAPI"),
        serde_json::json!({ "send_at": send_at.timestamp() }).to_string(),
    )
}

/// Build the MIME message: plain-text and HTML alternatives, reply-to and schedule.
pub fn build_message(message: &EmailMessage) -> Result<Message, ChannelError> {
    let mut builder = Message::builder()
        .from(mailbox("from", &message.from)?)
        .to(mailbox("to", &message.to)?)
        .reply_to(mailbox("reply-to", &message.reply_to)?)
        .subject(message.subject.clone());

    if let Some(send_at) = message.send_at {
        builder = builder.raw_header(schedule_header(send_at));
    }

    builder
        .multipart(MultiPart::alternative_plain_html(
            message.text.clone(),
            message.html.clone(),
        ))
        .map_err(|e| ChannelError::SendFailed {
            name: CHANNEL.into(),
            reason: format!("Failed to build email: {e}"),
        })
}

#[async_trait]
impl EmailTransport for SmtpEmailTransport {
    async fn send(
        &self,
        message: &EmailMessage,
    ) -> Result<Option<serde_json::Value>, ChannelError> {
        let email = build_message(message)?;
        let transport = self.relay()?;

        let response = tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: CHANNEL.into(),
                reason: format!("SMTP task failed: {e}"),
            })?
            .map_err(|e| {
                error!(to = %message.to, error = %e, "SMTP send failed");
                ChannelError::SendFailed {
                    name: CHANNEL.into(),
                    reason: format!("SMTP send failed: {e}"),
                }
            })?;

        info!(to = %message.to, scheduled = message.send_at.is_some(), "Email sent");
        Ok(Some(serde_json::json!({
            "code": response.code().to_string(),
            "message": response.first_line(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message() -> EmailMessage {
        EmailMessage {
            to: "marge@example.com".into(),
            from: "city@springfield.gov".into(),
            reply_to: "abc123@inbound.example.com".into(),
            subject: "Request #7: We received your request".into(),
            html: "<p>Hello</p>".into(),
            text: "Hello".into(),
            send_at: None,
        }
    }

    fn formatted(m: &Message) -> String {
        String::from_utf8_lossy(&m.formatted()).into_owned()
    }

    #[test]
    fn builds_alternative_message_with_reply_to() {
        let built = build_message(&message()).unwrap();
        let raw = formatted(&built);
        assert!(raw.contains("Reply-To:"));
        assert!(raw.contains("abc123@inbound.example.com"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/html"));
        assert!(!raw.contains("X-SMTPAPI"));
    }

    #[test]
    fn scheduled_message_carries_send_at_header() {
        let mut m = message();
        m.send_at = Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
        let raw = formatted(&build_message(&m).unwrap());
        assert!(raw.contains("X-SMTPAPI:"));
        assert!(raw.contains("\"send_at\":1772366400"));
    }

    #[test]
    fn malformed_recipient_is_input_rejection() {
        let mut m = message();
        m.to = "not an address".into();
        let err = build_message(&m).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidAddress { .. }));
    }
}
