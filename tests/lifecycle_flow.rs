//! End-to-end lifecycle through the service layer, with console transports
//! and the builtin templates.

use std::sync::Arc;

use civic_dispatch::channels::console::Echoed;
use civic_dispatch::config::{DispatchConfig, FanOutPolicy};
use civic_dispatch::deps::{AppDeps, Overrides};
use civic_dispatch::error::{DispatchError, RequestError};
use civic_dispatch::inbound::{InboundEmailPayload, extract_service_request_from_inbound_email};
use civic_dispatch::model::{
    Channel, CommunicationType, Department, Jurisdiction, RequestStatus, ServiceRequest,
    ServiceRequestComment, StaffDepartment, StaffUser,
};
use civic_dispatch::requests::IngestOutcome;
use civic_dispatch::store::{Database, LibSqlBackend};

const DOMAIN: &str = "inbound.example.com";

async fn setup(jurisdiction: Jurisdiction, config: DispatchConfig) -> AppDeps {
    let db = LibSqlBackend::new_memory().await.unwrap();
    db.insert_jurisdiction(&jurisdiction).await.unwrap();
    db.insert_department(&Department {
        id: "roads".into(),
        jurisdiction_id: jurisdiction.id.clone(),
        name: "Roads".into(),
    })
    .await
    .unwrap();
    for (id, lead) in [("chief", true), ("clerk", false), ("mayor", false)] {
        db.insert_staff_user(
            &StaffUser::new(id, &jurisdiction.id, format!("{id}@springfield.gov"))
                .with_name(id, "Staff")
                .admin(),
        )
        .await
        .unwrap();
        if lead {
            db.add_staff_department(&StaffDepartment {
                staff_user_id: id.into(),
                department_id: "roads".into(),
                is_lead: true,
            })
            .await
            .unwrap();
        }
    }
    AppDeps::build(config, Arc::new(db), Overrides::default())
}

fn config() -> DispatchConfig {
    DispatchConfig {
        inbound_email_domain: DOMAIN.into(),
        cx_survey_url: Some("https://survey.example.com/s".into()),
        ..DispatchConfig::default()
    }
}

fn springfield() -> Jurisdiction {
    let mut j = Jurisdiction::new("springfield", "Springfield");
    j.workflow_enabled = true;
    j.reply_to_service_request_enabled = true;
    j.broadcast_to_submitter_on_request_closed = true;
    j.cx_survey_enabled = true;
    j
}

fn emails(deps: &AppDeps) -> Vec<civic_dispatch::channels::EmailMessage> {
    deps.console
        .as_ref()
        .unwrap()
        .sent()
        .into_iter()
        .filter_map(|m| match m {
            Echoed::Email(e) => Some(e),
            Echoed::Sms(_) => None,
        })
        .collect()
}

#[tokio::test]
async fn ticket_lifecycle_with_reply_threading() {
    let deps = setup(springfield(), config()).await;

    // Create: submitter + three admins.
    let (sr, sent) = deps
        .requests
        .create(
            ServiceRequest::new("springfield", "Pothole on Evergreen Terrace")
                .with_name("Marge", "Simpson")
                .with_email("marge@example.net"),
        )
        .await
        .unwrap();
    assert_eq!(sent.len(), 4);

    let confirmation = &emails(&deps)[0];
    assert_eq!(confirmation.to, "marge@example.net");
    assert!(confirmation.subject.starts_with(&format!("Request #{}:", sr.public_id)));
    let thread = format!("{}@{DOMAIN}", sr.id.simple());
    assert_eq!(confirmation.reply_to, thread);
    assert!(confirmation.html.contains("Powered by"));
    assert!(!confirmation.text.contains('<'));

    // The submitter replies to the thread address.
    let payload = InboundEmailPayload {
        headers: "Date: Tue, 3 Mar 2026 10:15:00 +0000".into(),
        to: thread.clone(),
        from: "Marge Simpson <marge@example.net>".into(),
        subject: format!("Re: {}", confirmation.subject),
        text: "It is getting bigger.\n\nOn Mon, 2 Mar 2026 Springfield wrote:\n> We received your request".into(),
        ..Default::default()
    };
    let record = extract_service_request_from_inbound_email(deps.db.as_ref(), DOMAIN, &payload)
        .await
        .unwrap();
    let outcome = deps.requests.ingest_inbound(record).await.unwrap();
    assert!(matches!(
        outcome,
        IngestOutcome::Commented { service_request_id, .. } if service_request_id == sr.id
    ));

    // Staff comment broadcast back to the submitter.
    let comment = ServiceRequestComment::new(sr.id, "Crew scheduled for Friday.")
        .with_added_by("chief")
        .with_broadcast(true, false, false);
    let (_, sent) = deps.requests.add_comment(comment).await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].address, "marge@example.net");

    // Close: no assignee notice, submitter + admins closed notice, one survey.
    let (closed, sent) = deps
        .requests
        .change_status(sr.id, RequestStatus::Done)
        .await
        .unwrap();
    assert!(closed.close_date.is_some());
    assert_eq!(sent.len(), 1 + 1 + 3);
    let surveys: Vec<_> = sent
        .iter()
        .filter(|c| c.comm_type == CommunicationType::Cx)
        .collect();
    assert_eq!(surveys.len(), 1);
    assert_eq!(surveys[0].address, "marge@example.net");

    // Once closed, replies no longer thread back to the ticket.
    let closed_notice = emails(&deps)
        .into_iter()
        .rev()
        .find(|e| e.to == "marge@example.net" && e.subject.contains("closed"))
        .unwrap();
    assert_ne!(closed_notice.reply_to, thread);

    let stored = deps.db.list_communications(sr.id).await.unwrap();
    assert_eq!(stored.len(), 4 + 1 + 5);
    assert!(stored.iter().all(|c| c.dispatched && c.accepted && c.delivered));
}

#[tokio::test]
async fn department_filter_limits_staff_fan_out() {
    let mut j = springfield();
    j.filter_broadcasts_by_department = true;
    let deps = setup(j, config()).await;

    let (_, sent) = deps
        .requests
        .create(ServiceRequest::new("springfield", "Crack").with_department("roads"))
        .await
        .unwrap();
    let addresses: Vec<_> = sent.iter().map(|c| c.address.as_str()).collect();
    assert_eq!(addresses, vec!["chief@springfield.gov"]);
}

#[tokio::test]
async fn blocked_submitter_fails_the_create_hook() {
    let deps = setup(springfield(), config()).await;
    deps.db
        .record_channel_event("blocked@example.net", Channel::Email, "bounce", Some(false))
        .await
        .unwrap();

    let err = deps
        .requests
        .create(ServiceRequest::new("springfield", "x").with_email("blocked@example.net"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RequestError::Dispatch(DispatchError::PolicyRejected { .. })
    ));
    assert!(emails(&deps).is_empty());
}

#[tokio::test]
async fn collect_and_continue_notifies_staff_despite_blocked_submitter() {
    let config = DispatchConfig {
        fan_out: FanOutPolicy::CollectAndContinue,
        ..config()
    };
    let deps = setup(springfield(), config).await;
    deps.db
        .record_channel_event("blocked@example.net", Channel::Email, "spamreport", Some(false))
        .await
        .unwrap();

    let (sr, sent) = deps
        .requests
        .create(ServiceRequest::new("springfield", "x").with_email("blocked@example.net"))
        .await
        .unwrap();
    assert_eq!(sent.len(), 3);
    assert_eq!(deps.db.list_communications(sr.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn sms_submitter_gets_sms_confirmation() {
    let deps = setup(springfield(), config()).await;
    let (sr, _) = deps
        .requests
        .create(ServiceRequest::new("springfield", "Streetlight").with_phone("+15550001111"))
        .await
        .unwrap();

    let sms: Vec<_> = deps
        .console
        .as_ref()
        .unwrap()
        .sent()
        .into_iter()
        .filter_map(|m| match m {
            Echoed::Sms(s) => Some(s),
            Echoed::Email(_) => None,
        })
        .collect();
    assert_eq!(sms.len(), 1);
    assert_eq!(sms[0].to, "+15550001111");
    assert!(sms[0].body.starts_with(&format!("Request #{}:", sr.public_id)));
}
