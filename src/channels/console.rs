//! Console transport: logs outbound messages instead of sending them.
//!
//! Every message is also kept in an in-memory outbox so local runs and
//! tests can inspect what would have gone out.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::channels::{EmailMessage, EmailTransport, SmsMessage, SmsTransport};
use crate::error::ChannelError;

/// One echoed message.
#[derive(Debug, Clone, PartialEq)]
pub enum Echoed {
    Email(EmailMessage),
    Sms(SmsMessage),
}

/// Echo transport for both channels.
#[derive(Default)]
pub struct ConsoleTransport {
    outbox: Mutex<Vec<Echoed>>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything echoed so far, oldest first.
    pub fn sent(&self) -> Vec<Echoed> {
        self.outbox
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.outbox.lock().map(|guard| guard.len()).unwrap_or_default()
    }

    fn push(&self, echoed: Echoed) {
        if let Ok(mut guard) = self.outbox.lock() {
            guard.push(echoed);
        }
    }
}

#[async_trait]
impl EmailTransport for ConsoleTransport {
    async fn send(
        &self,
        message: &EmailMessage,
    ) -> Result<Option<serde_json::Value>, ChannelError> {
        info!(
            to = %message.to,
            from = %message.from,
            reply_to = %message.reply_to,
            subject = %message.subject,
            send_at = ?message.send_at,
            "[console] email\n{}",
            message.text
        );
        self.push(Echoed::Email(message.clone()));
        Ok(Some(json!({ "console": true, "channel": "email", "to": message.to })))
    }
}

#[async_trait]
impl SmsTransport for ConsoleTransport {
    async fn send(&self, message: &SmsMessage) -> Result<Option<serde_json::Value>, ChannelError> {
        info!(
            to = %message.to,
            from = ?message.from,
            send_at = ?message.send_at,
            "[console] sms: {}",
            message.body
        );
        self.push(Echoed::Sms(message.clone()));
        Ok(Some(json!({ "console": true, "channel": "sms", "to": message.to })))
    }
}
