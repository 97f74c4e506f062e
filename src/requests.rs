//! Service-request operations that drive the lifecycle hooks.
//!
//! Every mutation persists first, then runs the matching hooks with the
//! saved ticket.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::channels::strip_quoted_text;
use crate::error::RequestError;
use crate::hooks::{ExtraData, HookRunner, LifecycleEvent};
use crate::inbound::{InboundRecord, register_service_request};
use crate::model::{
    Communication, Jurisdiction, RequestChannel, RequestStatus, SUBMITTER_SENTINEL,
    ServiceRequest, ServiceRequestComment,
};
use crate::store::Database;

/// What an inbound message turned into.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum IngestOutcome {
    #[serde(rename_all = "camelCase")]
    Commented {
        service_request_id: Uuid,
        comment_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    Created {
        service_request_id: Uuid,
        public_id: u64,
    },
}

/// Ticket mutations plus the notifications they trigger.
pub struct RequestService {
    db: Arc<dyn Database>,
    hooks: Arc<HookRunner>,
}

impl RequestService {
    pub fn new(db: Arc<dyn Database>, hooks: Arc<HookRunner>) -> Self {
        Self { db, hooks }
    }

    async fn jurisdiction(&self, id: &str) -> Result<Jurisdiction, RequestError> {
        self.db
            .get_jurisdiction(id)
            .await?
            .ok_or_else(|| RequestError::JurisdictionNotFound(id.to_string()))
    }

    async fn load(&self, id: Uuid) -> Result<ServiceRequest, RequestError> {
        self.db
            .get_service_request(id)
            .await?
            .ok_or(RequestError::NotFound(id))
    }

    /// The assignee must exist and, when the tenant enforces it, belong to
    /// the ticket's department.
    async fn check_assignment(
        &self,
        jurisdiction: &Jurisdiction,
        request: &ServiceRequest,
        staff_user_id: &str,
    ) -> Result<(), RequestError> {
        if self
            .db
            .get_staff_user(&jurisdiction.id, staff_user_id)
            .await?
            .is_none()
        {
            return Err(RequestError::StaffNotFound(staff_user_id.to_string()));
        }
        if jurisdiction.enforce_assignment_through_department
            && let Some(department_id) = request.department_id.as_deref()
            && !self
                .db
                .is_staff_in_department(staff_user_id, department_id)
                .await?
        {
            return Err(RequestError::AssigneeOutsideDepartment {
                staff_user_id: staff_user_id.to_string(),
                department_id: department_id.to_string(),
            });
        }
        Ok(())
    }

    /// Persist a new ticket with its reply map, then notify.
    pub async fn create(
        &self,
        mut request: ServiceRequest,
    ) -> Result<(ServiceRequest, Vec<Communication>), RequestError> {
        let jurisdiction = self.jurisdiction(&request.jurisdiction_id).await?;

        if request.channel.is_none() {
            request.channel = Some(RequestChannel::derive(
                request.email.as_deref(),
                request.phone.as_deref(),
            ));
        }
        let status = request.status;
        request.set_status(status, request.created_at);

        if let Some(staff_user_id) = request.assigned_to.clone() {
            self.check_assignment(&jurisdiction, &request, &staff_user_id)
                .await?;
        }

        request.public_id = self.db.insert_service_request(&request).await?;
        let map = register_service_request(self.db.as_ref(), &request).await?;
        request.inbound_maps.push(map);

        info!(
            jurisdiction_id = %jurisdiction.id,
            service_request_id = %request.id,
            public_id = request.public_id,
            "Service request created"
        );

        let sent = self
            .hooks
            .run(LifecycleEvent::ServiceRequestCreate, &jurisdiction, &request, None)
            .await?;
        Ok((request, sent))
    }

    /// Move a ticket to `status`. Entering the closed set also runs the
    /// closed hook. An unchanged status is a no-op.
    pub async fn change_status(
        &self,
        id: Uuid,
        status: RequestStatus,
    ) -> Result<(ServiceRequest, Vec<Communication>), RequestError> {
        let mut request = self.load(id).await?;
        if request.status == status {
            return Ok((request, Vec::new()));
        }
        let jurisdiction = self.jurisdiction(&request.jurisdiction_id).await?;

        let was_closed = request.is_closed();
        request.set_status(status, Utc::now());
        self.db.update_service_request(&request).await?;

        let mut sent = self
            .hooks
            .run(
                LifecycleEvent::ServiceRequestChangeStatus,
                &jurisdiction,
                &request,
                None,
            )
            .await?;
        if !was_closed && request.is_closed() {
            sent.extend(
                self.hooks
                    .run(LifecycleEvent::ServiceRequestClosed, &jurisdiction, &request, None)
                    .await?,
            );
        }
        Ok((request, sent))
    }

    pub async fn change_assignee(
        &self,
        id: Uuid,
        staff_user_id: &str,
    ) -> Result<(ServiceRequest, Vec<Communication>), RequestError> {
        let mut request = self.load(id).await?;
        let jurisdiction = self.jurisdiction(&request.jurisdiction_id).await?;
        self.check_assignment(&jurisdiction, &request, staff_user_id)
            .await?;

        request.assigned_to = Some(staff_user_id.to_string());
        request.updated_at = Utc::now();
        self.db.update_service_request(&request).await?;

        let sent = self
            .hooks
            .run(
                LifecycleEvent::ServiceRequestChangeAssignedTo,
                &jurisdiction,
                &request,
                None,
            )
            .await?;
        Ok((request, sent))
    }

    /// Persist a comment; broadcast comments also notify.
    pub async fn add_comment(
        &self,
        comment: ServiceRequestComment,
    ) -> Result<(ServiceRequestComment, Vec<Communication>), RequestError> {
        let mut request = self.load(comment.service_request_id).await?;
        let jurisdiction = self.jurisdiction(&request.jurisdiction_id).await?;

        self.db.insert_comment(&comment).await?;
        request.comments.push(comment.clone());

        if !comment.is_broadcast() {
            return Ok((comment, Vec::new()));
        }
        let extra = ExtraData {
            service_request_comment_id: Some(comment.id),
        };
        let sent = self
            .hooks
            .run(
                LifecycleEvent::ServiceRequestCommentBroadcast,
                &jurisdiction,
                &request,
                Some(&extra),
            )
            .await?;
        Ok((comment, sent))
    }

    async fn correlate(&self, record: &InboundRecord) -> Result<Option<ServiceRequest>, RequestError> {
        if let Some(id) = record.service_request_id {
            match self.db.get_service_request(id).await? {
                Some(request) if request.jurisdiction_id == record.jurisdiction_id => {
                    return Ok(Some(request));
                }
                Some(_) => warn!(service_request_id = %id, "Mapped ticket belongs to another jurisdiction"),
                None => warn!(service_request_id = %id, "Mapped ticket missing"),
            }
        }
        if let Some(public_id) = record.public_id {
            return Ok(self
                .db
                .get_service_request_by_public_id(&record.jurisdiction_id, public_id)
                .await?);
        }
        Ok(None)
    }

    /// Append an inbound message to its ticket, or open a new ticket.
    pub async fn ingest_inbound(&self, record: InboundRecord) -> Result<IngestOutcome, RequestError> {
        if let Some(request) = self.correlate(&record).await? {
            let stripped = strip_quoted_text(&record.body);
            let text = if stripped.trim().is_empty() {
                record.body.trim().to_string()
            } else {
                stripped
            };
            let mut comment = ServiceRequestComment::new(request.id, text)
                .with_added_by(SUBMITTER_SENTINEL)
                .with_broadcast(false, request.assigned_to.is_some(), false);
            comment.created_at = record.created_at;

            let (comment, _) = self.add_comment(comment).await?;
            info!(
                service_request_id = %request.id,
                comment_id = %comment.id,
                channel = %record.channel,
                "Inbound reply appended"
            );
            return Ok(IngestOutcome::Commented {
                service_request_id: request.id,
                comment_id: comment.id,
            });
        }

        let mut request = ServiceRequest::new(&record.jurisdiction_id, record.description);
        request.first_name = record.first_name;
        request.last_name = record.last_name;
        request.email = record.email;
        request.phone = record.phone;
        request.department_id = record.department_id;
        request.service_id = record.service_id;
        request.assigned_to = record.assigned_to;
        request.input_channel = record.input_channel;
        request.created_at = record.created_at;

        let (request, _) = self.create(request).await?;
        Ok(IngestOutcome::Created {
            service_request_id: request.id,
            public_id: request.public_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FanOutPolicy;
    use crate::dispatch::testing::{RecordingRenderer, RecordingTransport};
    use crate::dispatch::{MessageDispatcher, Orchestrator, OrchestratorSettings};
    use crate::model::{Channel, CommunicationType, Department, StaffDepartment, StaffUser};
    use crate::store::LibSqlBackend;

    struct Harness {
        db: Arc<LibSqlBackend>,
        transport: Arc<RecordingTransport>,
        service: RequestService,
    }

    async fn harness(jurisdiction: Jurisdiction) -> Harness {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.insert_jurisdiction(&jurisdiction).await.unwrap();
        db.insert_staff_user(&StaffUser::new("admin", &jurisdiction.id, "admin@city.gov").admin())
            .await
            .unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = MessageDispatcher::new(
            db.clone(),
            Arc::new(RecordingRenderer::default()),
            transport.clone(),
            transport.clone(),
        );
        let settings = OrchestratorSettings {
            app_name: "Civic Dispatch".into(),
            app_base_url: "https://civic.example.com".into(),
            inbound_email_domain: "inbound.example.com".into(),
            send_from_email: "no-reply@civic.example.com".into(),
            reply_to_email: "no-reply@civic.example.com".into(),
            send_from_phone: None,
            cx_survey_url: Some("https://survey.example.com".into()),
            fan_out: FanOutPolicy::AbortOnFirst,
        };
        let orchestrator = Arc::new(Orchestrator::new(db.clone(), dispatcher, settings));
        let hooks = Arc::new(HookRunner::new(orchestrator));
        Harness {
            service: RequestService::new(db.clone(), hooks),
            db,
            transport,
        }
    }

    fn tenant() -> Jurisdiction {
        let mut j = Jurisdiction::new("j1", "Springfield");
        j.workflow_enabled = true;
        j
    }

    fn record(body: &str) -> InboundRecord {
        InboundRecord {
            jurisdiction_id: "j1".into(),
            department_id: None,
            assigned_to: None,
            service_request_id: None,
            service_id: None,
            first_name: Some("Marge".into()),
            last_name: None,
            email: Some("marge@x.com".into()),
            phone: None,
            description: body.into(),
            body: body.into(),
            input_channel: "email".into(),
            created_at: Utc::now(),
            public_id: None,
            channel: Channel::Email,
        }
    }

    #[tokio::test]
    async fn create_assigns_public_id_and_reply_map() {
        let h = harness(tenant()).await;
        let (first, sent) = h
            .service
            .create(ServiceRequest::new("j1", "Pothole").with_email("marge@x.com"))
            .await
            .unwrap();
        let (second, _) = h
            .service
            .create(ServiceRequest::new("j1", "Graffiti"))
            .await
            .unwrap();

        assert_eq!(first.public_id + 1, second.public_id);
        assert_eq!(first.channel, Some(RequestChannel::Email));
        assert_eq!(second.channel, Some(RequestChannel::Anon));
        assert_eq!(first.inbound_maps.len(), 1);
        assert_eq!(first.inbound_maps[0].id, first.id.to_string().replace('-', ""));
        // Submitter plus one admin.
        assert_eq!(sent.len(), 2);
        assert_eq!(h.db.list_communications(first.id).await.unwrap().len(), 2);

        let stored = h.db.get_service_request(first.id).await.unwrap().unwrap();
        assert_eq!(stored.inbound_maps, first.inbound_maps);
    }

    #[tokio::test]
    async fn closing_runs_status_and_closed_hooks() {
        let mut j = tenant();
        j.cx_survey_enabled = true;
        let h = harness(j).await;
        h.db.insert_staff_user(&StaffUser::new("s2", "j1", "ned@city.gov"))
            .await
            .unwrap();
        let (sr, _) = h
            .service
            .create(
                ServiceRequest::new("j1", "Pothole")
                    .with_email("marge@x.com")
                    .with_assignee("s2"),
            )
            .await
            .unwrap();

        let (closed, sent) = h.service.change_status(sr.id, RequestStatus::Done).await.unwrap();
        assert!(closed.close_date.is_some());

        // Assignee status notice, admin closed notice, one survey.
        assert_eq!(sent.len(), 3);
        assert_eq!(
            sent.iter().filter(|c| c.comm_type == CommunicationType::Cx).count(),
            1
        );

        // Same status again does nothing.
        let (_, again) = h.service.change_status(sr.id, RequestStatus::Done).await.unwrap();
        assert!(again.is_empty());

        let (reopened, _) = h.service.change_status(sr.id, RequestStatus::Todo).await.unwrap();
        assert!(reopened.close_date.is_none());
    }

    #[tokio::test]
    async fn enforced_department_assignment() {
        let mut j = tenant();
        j.enforce_assignment_through_department = true;
        let h = harness(j).await;
        h.db.insert_department(&Department {
            id: "roads".into(),
            jurisdiction_id: "j1".into(),
            name: "Roads".into(),
        })
        .await
        .unwrap();
        h.db.insert_staff_user(&StaffUser::new("in", "j1", "in@city.gov"))
            .await
            .unwrap();
        h.db.insert_staff_user(&StaffUser::new("out", "j1", "out@city.gov"))
            .await
            .unwrap();
        h.db.add_staff_department(&StaffDepartment {
            staff_user_id: "in".into(),
            department_id: "roads".into(),
            is_lead: false,
        })
        .await
        .unwrap();

        let (sr, _) = h
            .service
            .create(ServiceRequest::new("j1", "x").with_department("roads"))
            .await
            .unwrap();

        let err = h.service.change_assignee(sr.id, "out").await.unwrap_err();
        assert!(matches!(err, RequestError::AssigneeOutsideDepartment { .. }));

        let err = h.service.change_assignee(sr.id, "ghost").await.unwrap_err();
        assert!(matches!(err, RequestError::StaffNotFound(_)));

        let (updated, sent) = h.service.change_assignee(sr.id, "in").await.unwrap();
        assert_eq!(updated.assigned_to.as_deref(), Some("in"));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].address, "in@city.gov");
    }

    #[tokio::test]
    async fn private_comment_sends_nothing() {
        let h = harness(tenant()).await;
        let (sr, _) = h.service.create(ServiceRequest::new("j1", "x")).await.unwrap();
        let calls = h.transport.total_calls();

        let (_, sent) = h
            .service
            .add_comment(ServiceRequestComment::new(sr.id, "internal note").with_added_by("admin"))
            .await
            .unwrap();
        assert!(sent.is_empty());
        assert_eq!(h.transport.total_calls(), calls);

        let stored = h.db.get_service_request(sr.id).await.unwrap().unwrap();
        assert_eq!(stored.comments.len(), 1);
    }

    #[tokio::test]
    async fn inbound_reply_becomes_submitter_comment() {
        let h = harness(tenant()).await;
        let (sr, _) = h
            .service
            .create(ServiceRequest::new("j1", "x").with_email("marge@x.com"))
            .await
            .unwrap();

        let mut reply = record("Still broken.\n\nOn Mon, Jan 1, 2026 Springfield wrote:\n> Request #1: received");
        reply.service_request_id = Some(sr.id);
        let outcome = h.service.ingest_inbound(reply).await.unwrap();

        let IngestOutcome::Commented { comment_id, .. } = outcome else {
            panic!("expected a comment, got {outcome:?}");
        };
        let stored = h.db.get_service_request(sr.id).await.unwrap().unwrap();
        let comment = stored.find_comment(comment_id).unwrap();
        assert_eq!(comment.comment, "Still broken.");
        assert!(comment.is_from_submitter());
        // No assignee, so nobody is notified.
        assert!(!comment.is_broadcast());
    }

    #[tokio::test]
    async fn inbound_public_id_correlates_within_tenant() {
        let h = harness(tenant()).await;
        let (sr, _) = h.service.create(ServiceRequest::new("j1", "x")).await.unwrap();

        let mut reply = record("Any update?");
        reply.public_id = Some(sr.public_id);
        assert!(matches!(
            h.service.ingest_inbound(reply).await.unwrap(),
            IngestOutcome::Commented { service_request_id, .. } if service_request_id == sr.id
        ));

        let mut unknown = record("New problem");
        unknown.public_id = Some(9999);
        let outcome = h.service.ingest_inbound(unknown).await.unwrap();
        let IngestOutcome::Created { service_request_id, .. } = outcome else {
            panic!("expected a new ticket, got {outcome:?}");
        };
        let created = h.db.get_service_request(service_request_id).await.unwrap().unwrap();
        assert_eq!(created.input_channel, "email");
        assert_eq!(created.email.as_deref(), Some("marge@x.com"));
        assert_eq!(created.channel, Some(RequestChannel::Email));
    }

    #[tokio::test]
    async fn unknown_jurisdiction_is_rejected() {
        let h = harness(tenant()).await;
        let err = h
            .service
            .create(ServiceRequest::new("nowhere", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::JurisdictionNotFound(_)));
    }
}
