//! Outbound dispatch orchestrator.
//!
//! One entry point per lifecycle trigger. Each resolves recipients, channel
//! and schedule, then hands every message to the [`MessageDispatcher`].
//! Recipients are processed one at a time in order.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{DispatchConfig, FanOutPolicy};
use crate::dispatch::pipeline::{DispatchRequest, MessageDispatcher, TemplateConfig};
use crate::dispatch::reply_to::{get_reply_to_email, get_send_from_email, get_send_from_phone};
use crate::dispatch::schedule::compute_send_at;
use crate::error::DispatchError;
use crate::model::{
    Channel, Communication, CommunicationType, Jurisdiction, RequestChannel, ServiceRequest,
    StaffUser,
};
use crate::store::Database;
use crate::templates::names;

/// System-wide values the orchestrator falls back to.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub app_name: String,
    pub app_base_url: String,
    pub inbound_email_domain: String,
    pub send_from_email: String,
    pub reply_to_email: String,
    pub send_from_phone: Option<String>,
    pub cx_survey_url: Option<String>,
    pub fan_out: FanOutPolicy,
}

impl From<&DispatchConfig> for OrchestratorSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            app_name: config.app_name.clone(),
            app_base_url: config.app_base_url.clone(),
            inbound_email_domain: config.inbound_email_domain.clone(),
            send_from_email: config.send_from_email.clone(),
            reply_to_email: config.reply_to_email.clone(),
            send_from_phone: config.send_from_phone.clone(),
            cx_survey_url: config.cx_survey_url.clone(),
            fan_out: config.fan_out,
        }
    }
}

/// Values computed once per lifecycle call and shared by every recipient.
struct Shared {
    from_email: String,
    from_phone: Option<String>,
    reply_to: String,
    send_at: Option<chrono::DateTime<Utc>>,
    comm_type: CommunicationType,
}

/// Decides who hears about a lifecycle event, on which channel, and when.
pub struct Orchestrator {
    db: Arc<dyn Database>,
    dispatcher: MessageDispatcher,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        db: Arc<dyn Database>,
        dispatcher: MessageDispatcher,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            db,
            dispatcher,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    // ── Recipient resolution ────────────────────────────────────────

    /// Admin staff for the tenant, or the department's leads when the tenant
    /// filters broadcasts by department and a department is given.
    pub async fn get_staff_recipients(
        &self,
        jurisdiction: &Jurisdiction,
        department_id: Option<&str>,
    ) -> Result<Vec<StaffUser>, DispatchError> {
        if jurisdiction.filter_broadcasts_by_department
            && let Some(department_id) = department_id
        {
            return Ok(self
                .db
                .list_department_leads(&jurisdiction.id, department_id)
                .await?);
        }
        Ok(self.db.list_admin_staff(&jurisdiction.id).await?)
    }

    /// The staff user the ticket is assigned to, if any and if they exist.
    async fn resolve_assignee(
        &self,
        jurisdiction: &Jurisdiction,
        request: &ServiceRequest,
    ) -> Result<Option<StaffUser>, DispatchError> {
        let Some(staff_id) = request.assigned_to.as_deref() else {
            return Ok(None);
        };
        let staff = self.db.get_staff_user(&jurisdiction.id, staff_id).await?;
        if staff.is_none() {
            warn!(
                service_request_id = %request.id,
                staff_user_id = staff_id,
                "Assigned staff user not found"
            );
        }
        Ok(staff)
    }

    // ── Context and configuration ───────────────────────────────────

    fn shared(
        &self,
        jurisdiction: &Jurisdiction,
        request: &ServiceRequest,
        comm_type: CommunicationType,
        send_at: Option<chrono::DateTime<Utc>>,
    ) -> Shared {
        Shared {
            from_email: get_send_from_email(jurisdiction, &self.settings.send_from_email),
            from_phone: get_send_from_phone(jurisdiction, self.settings.send_from_phone.as_deref()),
            reply_to: get_reply_to_email(
                Some(request),
                jurisdiction,
                &self.settings.inbound_email_domain,
                &self.settings.reply_to_email,
            ),
            send_at,
            comm_type,
        }
    }

    fn workflow_shared(&self, jurisdiction: &Jurisdiction, request: &ServiceRequest) -> Shared {
        let now = Utc::now();
        let send_at = compute_send_at(now, jurisdiction.workflow_broadcast_window, now);
        self.shared(jurisdiction, request, CommunicationType::Workflow, send_at)
    }

    fn context(&self, jurisdiction: &Jurisdiction, request: &ServiceRequest) -> Value {
        json!({
            "appName": self.settings.app_name,
            "appBaseUrl": self.settings.app_base_url,
            "jurisdiction": {
                "id": jurisdiction.id,
                "name": jurisdiction.name,
            },
            "serviceRequest": {
                "id": request.id,
                "publicId": request.public_id,
                "status": request.status.as_str(),
                "description": request.description,
                "inputChannel": request.input_channel,
                "departmentId": request.department_id,
                "createdAt": request.created_at.to_rfc3339(),
            },
            "submitterName": request.display_name(),
            "requestUrl": format!(
                "{}/jurisdictions/{}/requests/{}",
                self.settings.app_base_url.trim_end_matches('/'),
                jurisdiction.id,
                request.id
            ),
        })
    }

    /// Channel and address for the submitter, or `None` when they cannot be
    /// reached on the ticket's channel.
    fn submitter_target(
        jurisdiction: &Jurisdiction,
        request: &ServiceRequest,
    ) -> Option<(Channel, String)> {
        let channel = match request.effective_channel() {
            RequestChannel::Email => Channel::Email,
            RequestChannel::Sms => Channel::Sms,
            RequestChannel::Multiple => jurisdiction.preferred_broadcast_channel,
            RequestChannel::Anon => return None,
        };
        let address = match channel {
            Channel::Email => request.email.as_deref(),
            Channel::Sms => request.phone.as_deref(),
        };
        address
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(|a| (channel, a.to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    async fn send(
        &self,
        jurisdiction: &Jurisdiction,
        request: &ServiceRequest,
        shared: &Shared,
        channel: Channel,
        to: String,
        template: &'static str,
        context: Value,
    ) -> Result<Option<Communication>, DispatchError> {
        let dispatch = DispatchRequest {
            jurisdiction_id: jurisdiction.id.clone(),
            service_request_id: Some(request.id),
            channel,
            comm_type: shared.comm_type,
            to,
            from_email: shared.from_email.clone(),
            reply_to: shared.reply_to.clone(),
            from_phone: shared.from_phone.clone(),
            send_at: shared.send_at,
        };
        self.dispatcher
            .dispatch(
                &dispatch,
                &TemplateConfig {
                    name: template,
                    context,
                },
            )
            .await
    }

    /// Apply the fan-out policy to one recipient's outcome.
    fn absorb(
        &self,
        outcome: Result<Option<Communication>, DispatchError>,
        address: &str,
        sent: &mut Vec<Communication>,
    ) -> Result<(), DispatchError> {
        match outcome {
            Ok(Some(record)) => sent.push(record),
            Ok(None) => {}
            Err(e) => match self.settings.fan_out {
                FanOutPolicy::AbortOnFirst => return Err(e),
                FanOutPolicy::CollectAndContinue => {
                    warn!(address, error = %e, "Recipient failed, continuing fan-out");
                }
            },
        }
        Ok(())
    }

    async fn notify_submitter(
        &self,
        jurisdiction: &Jurisdiction,
        request: &ServiceRequest,
        shared: &Shared,
        template: &'static str,
        context: Value,
        sent: &mut Vec<Communication>,
    ) -> Result<(), DispatchError> {
        let Some((channel, address)) = Self::submitter_target(jurisdiction, request) else {
            info!(service_request_id = %request.id, "No submitter contact, skipping submitter notification");
            return Ok(());
        };
        let outcome = self
            .send(jurisdiction, request, shared, channel, address.clone(), template, context)
            .await;
        self.absorb(outcome, &address, sent)
    }

    /// Email each staff user in order, skipping addresses already in `seen`.
    #[allow(clippy::too_many_arguments)]
    async fn notify_staff(
        &self,
        jurisdiction: &Jurisdiction,
        request: &ServiceRequest,
        shared: &Shared,
        staff: &[StaffUser],
        template: &'static str,
        context: &Value,
        seen: &mut HashSet<String>,
        sent: &mut Vec<Communication>,
    ) -> Result<(), DispatchError> {
        for user in staff {
            if !seen.insert(user.email.to_lowercase()) {
                continue;
            }
            let mut ctx = context.clone();
            ctx["recipientName"] = json!(user.display_name());
            let outcome = self
                .send(
                    jurisdiction,
                    request,
                    shared,
                    Channel::Email,
                    user.email.clone(),
                    template,
                    ctx,
                )
                .await;
            self.absorb(outcome, &user.email, sent)?;
        }
        Ok(())
    }

    // ── Lifecycle entry points ──────────────────────────────────────

    /// Submitter confirmation, then one notice per staff recipient.
    /// The submitter's record comes first.
    pub async fn dispatch_service_request_create(
        &self,
        jurisdiction: &Jurisdiction,
        request: &ServiceRequest,
    ) -> Result<Vec<Communication>, DispatchError> {
        let shared = self.workflow_shared(jurisdiction, request);
        let context = self.context(jurisdiction, request);
        let mut sent = Vec::new();

        self.notify_submitter(
            jurisdiction,
            request,
            &shared,
            names::NEW_PUBLIC_USER,
            context.clone(),
            &mut sent,
        )
        .await?;

        let staff = self
            .get_staff_recipients(jurisdiction, request.department_id.as_deref())
            .await?;
        self.notify_staff(
            jurisdiction,
            request,
            &shared,
            &staff,
            names::NEW_STAFF_USER,
            &context,
            &mut HashSet::new(),
            &mut sent,
        )
        .await?;

        info!(
            jurisdiction_id = %jurisdiction.id,
            service_request_id = %request.id,
            count = sent.len(),
            "Create notifications dispatched"
        );
        Ok(sent)
    }

    async fn notify_assignee(
        &self,
        jurisdiction: &Jurisdiction,
        request: &ServiceRequest,
        template: &'static str,
    ) -> Result<Option<Communication>, DispatchError> {
        let Some(assignee) = self.resolve_assignee(jurisdiction, request).await? else {
            info!(service_request_id = %request.id, template, "No assignee to notify");
            return Ok(None);
        };
        let shared = self.workflow_shared(jurisdiction, request);
        let mut context = self.context(jurisdiction, request);
        context["recipientName"] = json!(assignee.display_name());
        self.send(
            jurisdiction,
            request,
            &shared,
            Channel::Email,
            assignee.email,
            template,
            context,
        )
        .await
    }

    /// Tell the assignee the status changed. `None` without an assignee.
    pub async fn dispatch_service_request_change_status(
        &self,
        jurisdiction: &Jurisdiction,
        request: &ServiceRequest,
    ) -> Result<Option<Communication>, DispatchError> {
        self.notify_assignee(jurisdiction, request, names::CHANGED_STATUS_STAFF_USER)
            .await
    }

    /// Tell the new assignee about the ticket. `None` without an assignee.
    pub async fn dispatch_service_request_change_assignee(
        &self,
        jurisdiction: &Jurisdiction,
        request: &ServiceRequest,
    ) -> Result<Option<Communication>, DispatchError> {
        self.notify_assignee(jurisdiction, request, names::CHANGED_ASSIGNEE_STAFF_USER)
            .await
    }

    /// Submitter notice (when the tenant opts in), then every staff recipient.
    pub async fn dispatch_service_request_closed(
        &self,
        jurisdiction: &Jurisdiction,
        request: &ServiceRequest,
    ) -> Result<Vec<Communication>, DispatchError> {
        let shared = self.workflow_shared(jurisdiction, request);
        let context = self.context(jurisdiction, request);
        let mut sent = Vec::new();

        if jurisdiction.broadcast_to_submitter_on_request_closed {
            self.notify_submitter(
                jurisdiction,
                request,
                &shared,
                names::CLOSED_PUBLIC_USER,
                context.clone(),
                &mut sent,
            )
            .await?;
        }

        let staff = self
            .get_staff_recipients(jurisdiction, request.department_id.as_deref())
            .await?;
        self.notify_staff(
            jurisdiction,
            request,
            &shared,
            &staff,
            names::CLOSED_STAFF_USER,
            &context,
            &mut HashSet::new(),
            &mut sent,
        )
        .await?;
        Ok(sent)
    }

    /// Broadcast a comment to whoever its flags select.
    pub async fn dispatch_service_request_comment(
        &self,
        jurisdiction: &Jurisdiction,
        request: &ServiceRequest,
        comment_id: Uuid,
    ) -> Result<Vec<Communication>, DispatchError> {
        let comment =
            request
                .find_comment(comment_id)
                .ok_or(DispatchError::CommentNotFound {
                    service_request_id: request.id,
                    comment_id,
                })?;

        let commenter = if comment.is_from_submitter() {
            request.display_name()
        } else {
            match comment.added_by.as_deref() {
                Some(staff_id) => self
                    .db
                    .get_staff_user(&jurisdiction.id, staff_id)
                    .await?
                    .map(|s| s.display_name())
                    .unwrap_or_else(|| "System".to_string()),
                None => "System".to_string(),
            }
        };

        let shared = self.workflow_shared(jurisdiction, request);
        let mut context = self.context(jurisdiction, request);
        context["commenterName"] = json!(commenter);
        context["comment"] = json!(comment.comment);

        let mut sent = Vec::new();
        let mut seen = HashSet::new();

        if comment.broadcast_to_submitter {
            self.notify_submitter(
                jurisdiction,
                request,
                &shared,
                names::COMMENT_BROADCAST_PUBLIC_USER,
                context.clone(),
                &mut sent,
            )
            .await?;
        }

        if comment.broadcast_to_assignee
            && let Some(assignee) = self.resolve_assignee(jurisdiction, request).await?
        {
            self.notify_staff(
                jurisdiction,
                request,
                &shared,
                std::slice::from_ref(&assignee),
                names::COMMENT_BROADCAST_STAFF_USER,
                &context,
                &mut seen,
                &mut sent,
            )
            .await?;
        }

        if comment.broadcast_to_staff {
            let staff = self
                .get_staff_recipients(jurisdiction, request.department_id.as_deref())
                .await?;
            self.notify_staff(
                jurisdiction,
                request,
                &shared,
                &staff,
                names::COMMENT_BROADCAST_STAFF_USER,
                &context,
                &mut seen,
                &mut sent,
            )
            .await?;
        }

        info!(
            service_request_id = %request.id,
            comment_id = %comment_id,
            count = sent.len(),
            "Comment broadcast dispatched"
        );
        Ok(sent)
    }

    /// Send the satisfaction survey once the ticket reaches the tenant's
    /// trigger status. At most one survey is sent per ticket.
    pub async fn dispatch_cx_survey(
        &self,
        jurisdiction: &Jurisdiction,
        request: &ServiceRequest,
    ) -> Result<Option<Communication>, DispatchError> {
        if !jurisdiction.cx_survey_enabled {
            return Ok(None);
        }
        let Some(survey_url) = self.settings.cx_survey_url.as_deref() else {
            info!(jurisdiction_id = %jurisdiction.id, "No survey URL configured");
            return Ok(None);
        };
        if request.status != jurisdiction.cx_survey_trigger_status {
            return Ok(None);
        }

        let already_sent = self
            .db
            .list_communications(request.id)
            .await?
            .iter()
            .any(|c| c.comm_type == CommunicationType::Cx);
        if already_sent {
            info!(service_request_id = %request.id, "Survey already sent");
            return Ok(None);
        }

        let Some((channel, address)) = Self::submitter_target(jurisdiction, request) else {
            info!(service_request_id = %request.id, "No submitter contact for survey");
            return Ok(None);
        };

        let now = Utc::now();
        let reference = match request.close_date {
            Some(closed) if request.is_closed() => closed,
            _ => now,
        };
        let send_at = compute_send_at(reference, jurisdiction.cx_survey_broadcast_window, now);
        let shared = self.shared(jurisdiction, request, CommunicationType::Cx, send_at);

        let mut context = self.context(jurisdiction, request);
        context["surveyUrl"] = json!(survey_url);

        self.send(
            jurisdiction,
            request,
            &shared,
            channel,
            address,
            names::CX_SURVEY_PUBLIC_USER,
            context,
        )
        .await
    }
}
