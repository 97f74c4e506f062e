//! Recording fakes for dispatch tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::channels::{EmailMessage, EmailTransport, SmsMessage, SmsTransport};
use crate::error::{ChannelError, TemplateError};
use crate::model::TemplatePart;
use crate::templates::{RenderRequest, Renderer, template_key};

/// Renders fixed content and counts calls.
#[derive(Default)]
pub struct RecordingRenderer {
    pub calls: AtomicUsize,
    pub keys: Mutex<Vec<String>>,
    contexts: Mutex<Vec<serde_json::Value>>,
}

impl RecordingRenderer {
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }

    /// Context of the most recent render.
    pub fn last_context(&self) -> Option<serde_json::Value> {
        self.contexts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Renderer for RecordingRenderer {
    async fn render(&self, request: RenderRequest<'_>) -> Result<String, TemplateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.keys
            .lock()
            .unwrap()
            .push(template_key(request.channel, request.name, request.part));
        self.contexts.lock().unwrap().push(request.context.clone());
        Ok(match request.part {
            TemplatePart::Subject => format!("Subject for {}", request.name),
            TemplatePart::Body => "<p>rendered body</p>".to_string(),
        })
    }
}

/// Records sends on both channels; can fail for chosen addresses.
#[derive(Default)]
pub struct RecordingTransport {
    pub email_calls: AtomicUsize,
    pub sms_calls: AtomicUsize,
    /// Acknowledge nothing.
    pub silent: AtomicBool,
    failing: Mutex<HashSet<String>>,
    emails: Mutex<Vec<EmailMessage>>,
    sms: Mutex<Vec<SmsMessage>>,
}

impl RecordingTransport {
    pub fn fail_for(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    pub fn emails(&self) -> Vec<EmailMessage> {
        self.emails.lock().unwrap().clone()
    }

    pub fn sms(&self) -> Vec<SmsMessage> {
        self.sms.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.email_calls.load(Ordering::SeqCst) + self.sms_calls.load(Ordering::SeqCst)
    }

    fn outcome(&self, name: &str, to: &str) -> Result<Option<serde_json::Value>, ChannelError> {
        if self.failing.lock().unwrap().contains(to) {
            return Err(ChannelError::SendFailed {
                name: name.into(),
                reason: format!("refused {to}"),
            });
        }
        if self.silent.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(serde_json::json!({ "ok": true, "to": to })))
    }
}

#[async_trait]
impl EmailTransport for RecordingTransport {
    async fn send(
        &self,
        message: &EmailMessage,
    ) -> Result<Option<serde_json::Value>, ChannelError> {
        self.email_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.outcome("email", &message.to);
        if outcome.is_ok() {
            self.emails.lock().unwrap().push(message.clone());
        }
        outcome
    }
}

#[async_trait]
impl SmsTransport for RecordingTransport {
    async fn send(&self, message: &SmsMessage) -> Result<Option<serde_json::Value>, ChannelError> {
        self.sms_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.outcome("sms", &message.to);
        if outcome.is_ok() {
            self.sms.lock().unwrap().push(message.clone());
        }
        outcome
    }
}
