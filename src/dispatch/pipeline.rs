//! Message dispatch pipeline: gate → render → send → audit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::channels::{EmailMessage, EmailTransport, SmsMessage, SmsTransport, html_to_text};
use crate::dispatch::gate::check_channel_status;
use crate::error::{DatabaseError, DispatchError};
use crate::model::{Channel, Communication, CommunicationType, TemplatePart};
use crate::store::Database;
use crate::templates::{RenderRequest, Renderer};

/// Where and how one message goes out.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub jurisdiction_id: String,
    pub service_request_id: Option<Uuid>,
    pub channel: Channel,
    pub comm_type: CommunicationType,
    pub to: String,
    /// Email sender.
    pub from_email: String,
    pub reply_to: String,
    /// SMS sender; the messaging service picks one when absent.
    pub from_phone: Option<String>,
    pub send_at: Option<DateTime<Utc>>,
}

/// Which template to render and with what context.
#[derive(Debug, Clone)]
pub struct TemplateConfig {
    pub name: &'static str,
    pub context: serde_json::Value,
}

/// Drives a single dispatch through the gate, renderer, transport and audit log.
pub struct MessageDispatcher {
    db: Arc<dyn Database>,
    renderer: Arc<dyn Renderer>,
    email: Arc<dyn EmailTransport>,
    sms: Arc<dyn SmsTransport>,
}

impl MessageDispatcher {
    pub fn new(
        db: Arc<dyn Database>,
        renderer: Arc<dyn Renderer>,
        email: Arc<dyn EmailTransport>,
        sms: Arc<dyn SmsTransport>,
    ) -> Self {
        Self {
            db,
            renderer,
            email,
            sms,
        }
    }

    async fn render(
        &self,
        config: &DispatchRequest,
        template: &TemplateConfig,
        part: TemplatePart,
    ) -> Result<String, DispatchError> {
        let rendered = self
            .renderer
            .render(RenderRequest {
                jurisdiction_id: &config.jurisdiction_id,
                channel: config.channel,
                comm_type: config.comm_type,
                name: template.name,
                part,
                context: &template.context,
            })
            .await?;
        Ok(rendered)
    }

    /// Send one message. Returns the audit record, or `None` when the
    /// transport gave no acknowledgement.
    ///
    /// A blocked email destination fails before anything is rendered or sent.
    pub async fn dispatch(
        &self,
        config: &DispatchRequest,
        template: &TemplateConfig,
    ) -> Result<Option<Communication>, DispatchError> {
        check_channel_status(self.db.as_ref(), config.channel, &config.to).await?;

        let (payload, response) = match config.channel {
            Channel::Email => {
                let subject = self.render(config, template, TemplatePart::Subject).await?;
                let html = self.render(config, template, TemplatePart::Body).await?;
                let message = EmailMessage {
                    to: config.to.clone(),
                    from: config.from_email.clone(),
                    reply_to: config.reply_to.clone(),
                    subject,
                    text: html_to_text(&html),
                    html,
                    send_at: config.send_at,
                };
                let response = self.email.send(&message).await.map_err(|e| {
                    error!(to = %config.to, template = template.name, error = %e, "Email dispatch failed");
                    e
                })?;
                (to_json(&message)?, response)
            }
            Channel::Sms => {
                let body = self.render(config, template, TemplatePart::Body).await?;
                let message = SmsMessage {
                    to: config.to.clone(),
                    from: config.from_phone.clone(),
                    body,
                    send_at: config.send_at,
                };
                let response = self.sms.send(&message).await.map_err(|e| {
                    error!(to = %config.to, template = template.name, error = %e, "SMS dispatch failed");
                    e
                })?;
                (to_json(&message)?, response)
            }
        };

        let Some(response) = response.filter(|r| !r.is_null()) else {
            warn!(to = %config.to, channel = %config.channel, "Transport returned no response, nothing recorded");
            return Ok(None);
        };

        let record = Communication::dispatched(
            config.channel,
            config.to.clone(),
            config.comm_type,
            config.service_request_id,
            payload,
            response,
        );
        self.db.insert_communication(&record).await?;

        debug!(
            communication_id = %record.id,
            channel = %config.channel,
            template = template.name,
            "Dispatch recorded"
        );
        Ok(Some(record))
    }
}

fn to_json<T: serde::Serialize>(message: &T) -> Result<serde_json::Value, DispatchError> {
    serde_json::to_value(message)
        .map_err(|e| DatabaseError::Serialization(format!("dispatch payload: {e}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::{RecordingRenderer, RecordingTransport};
    use crate::model::Jurisdiction;
    use crate::store::LibSqlBackend;
    use crate::templates::names;
    use std::sync::atomic::Ordering;

    struct Harness {
        db: Arc<LibSqlBackend>,
        renderer: Arc<RecordingRenderer>,
        transport: Arc<RecordingTransport>,
        dispatcher: MessageDispatcher,
    }

    async fn harness() -> Harness {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.insert_jurisdiction(&Jurisdiction::new("j1", "Springfield"))
            .await
            .unwrap();
        let renderer = Arc::new(RecordingRenderer::default());
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = MessageDispatcher::new(
            db.clone(),
            renderer.clone(),
            transport.clone(),
            transport.clone(),
        );
        Harness {
            db,
            renderer,
            transport,
            dispatcher,
        }
    }

    fn config(channel: Channel, to: &str, sr: Uuid) -> DispatchRequest {
        DispatchRequest {
            jurisdiction_id: "j1".into(),
            service_request_id: Some(sr),
            channel,
            comm_type: CommunicationType::Workflow,
            to: to.into(),
            from_email: "city@x.gov".into(),
            reply_to: "reply@x.gov".into(),
            from_phone: None,
            send_at: None,
        }
    }

    fn template() -> TemplateConfig {
        TemplateConfig {
            name: names::NEW_PUBLIC_USER,
            context: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn email_renders_subject_and_body_then_records() {
        let h = harness().await;
        let sr = Uuid::new_v4();
        let record = h
            .dispatcher
            .dispatch(&config(Channel::Email, "a@x.com", sr), &template())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.transport.email_calls.load(Ordering::SeqCst), 1);
        assert!(record.dispatched && record.accepted && record.delivered);
        assert_eq!(record.dispatch_payload["replyTo"], "reply@x.gov");

        let stored = h.db.list_communications(sr).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, record.id);
    }

    #[tokio::test]
    async fn email_plain_text_is_derived_from_html() {
        let h = harness().await;
        h.dispatcher
            .dispatch(&config(Channel::Email, "a@x.com", Uuid::new_v4()), &template())
            .await
            .unwrap();
        let sent = h.transport.emails();
        assert_eq!(sent[0].html, "<p>rendered body</p>");
        assert_eq!(sent[0].text, "rendered body");
    }

    #[tokio::test]
    async fn sms_renders_body_only() {
        let h = harness().await;
        h.dispatcher
            .dispatch(&config(Channel::Sms, "+15550001111", Uuid::new_v4()), &template())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.transport.sms_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blocked_email_fails_before_render_or_send() {
        let h = harness().await;
        h.db.record_channel_event("a@x.com", Channel::Email, "bounce", Some(false))
            .await
            .unwrap();
        let sr = Uuid::new_v4();

        let err = h
            .dispatcher
            .dispatch(&config(Channel::Email, "a@x.com", sr), &template())
            .await
            .unwrap_err();

        assert!(err.is_policy_rejection());
        assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.transport.email_calls.load(Ordering::SeqCst), 0);
        assert!(h.db.list_communications(sr).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_propagates_without_record() {
        let h = harness().await;
        h.transport.fail_for("broken@x.com");
        let sr = Uuid::new_v4();

        let err = h
            .dispatcher
            .dispatch(&config(Channel::Email, "broken@x.com", sr), &template())
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Transport(_)));
        assert!(h.db.list_communications(sr).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn silent_transport_records_nothing() {
        let h = harness().await;
        h.transport.silent.store(true, Ordering::SeqCst);
        let sr = Uuid::new_v4();

        let out = h
            .dispatcher
            .dispatch(&config(Channel::Email, "a@x.com", sr), &template())
            .await
            .unwrap();

        assert!(out.is_none());
        assert!(h.db.list_communications(sr).await.unwrap().is_empty());
    }
}
