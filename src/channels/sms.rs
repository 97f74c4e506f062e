//! SMS transport: Twilio Messages API over reqwest.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::{error, info};

use crate::channels::{SmsMessage, SmsTransport};
use crate::config::TwilioConfig;
use crate::error::ChannelError;

const CHANNEL: &str = "sms";

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// SMS transport over Twilio's REST API.
pub struct TwilioSmsTransport {
    config: TwilioConfig,
    api_base: String,
    client: reqwest::Client,
}

impl TwilioSmsTransport {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            config,
            api_base: TWILIO_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point at a different API host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn api_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Messages.json",
            self.api_base, self.config.account_sid
        )
    }

    /// Form fields for the Messages resource.
    ///
    /// Scheduled sends always carry the messaging service, alongside `From`
    /// when the tenant has its own number.
    pub fn form(&self, message: &SmsMessage) -> Vec<(&'static str, String)> {
        let mut form = vec![("To", message.to.clone()), ("Body", message.body.clone())];
        if let Some(from) = &message.from {
            form.push(("From", from.clone()));
        }
        if message.from.is_none() || message.send_at.is_some() {
            form.push((
                "MessagingServiceSid",
                self.config.messaging_service_sid.clone(),
            ));
        }
        if let Some(url) = &self.config.status_callback_url {
            form.push(("StatusCallback", url.clone()));
        }
        if let Some(send_at) = message.send_at {
            form.push(("SendAt", send_at.to_rfc3339()));
            form.push(("ScheduleType", "fixed".to_string()));
        }
        form
    }
}

/// Accept `+` followed by 8 to 15 digits.
pub fn validate_phone(phone: &str) -> Result<(), ChannelError> {
    let digits = phone.strip_prefix('+').unwrap_or_default();
    if (8..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ChannelError::InvalidAddress {
            name: CHANNEL.into(),
            reason: format!("{phone:?} is not an E.164 phone number"),
        })
    }
}

#[async_trait]
impl SmsTransport for TwilioSmsTransport {
    async fn send(&self, message: &SmsMessage) -> Result<Option<serde_json::Value>, ChannelError> {
        validate_phone(&message.to)?;

        let resp = self
            .client
            .post(self.api_url())
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose_secret()),
            )
            .form(&self.form(message))
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(to = %message.to, status = status.as_u16(), "Twilio rejected message");
            return Err(ChannelError::ProviderRejected {
                name: CHANNEL.into(),
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Http(format!("invalid Twilio response: {e}")))?;

        info!(
            to = %message.to,
            sid = body.get("sid").and_then(|s| s.as_str()).unwrap_or_default(),
            "SMS sent"
        );
        Ok(Some(body))
    }
}
