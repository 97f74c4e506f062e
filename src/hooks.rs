//! Lifecycle hook runner.
//!
//! An explicit table from lifecycle event to handler list, owned by one
//! runner. Each handler checks the tenant's flags before calling into the
//! orchestrator. Handlers for an event run in registration order.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::dispatch::Orchestrator;
use crate::error::DispatchError;
use crate::model::{Communication, Jurisdiction, ServiceRequest};

/// Ticket lifecycle events that may trigger notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    ServiceRequestCreate,
    ServiceRequestChangeStatus,
    ServiceRequestChangeAssignedTo,
    ServiceRequestClosed,
    ServiceRequestCommentBroadcast,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 5] = [
        Self::ServiceRequestCreate,
        Self::ServiceRequestChangeStatus,
        Self::ServiceRequestChangeAssignedTo,
        Self::ServiceRequestClosed,
        Self::ServiceRequestCommentBroadcast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceRequestCreate => "serviceRequestCreate",
            Self::ServiceRequestChangeStatus => "serviceRequestChangeStatus",
            Self::ServiceRequestChangeAssignedTo => "serviceRequestChangeAssignedTo",
            Self::ServiceRequestClosed => "serviceRequestClosed",
            Self::ServiceRequestCommentBroadcast => "serviceRequestCommentBroadcast",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| DispatchError::UnknownEvent(s.to_string()))
    }
}

/// Event-specific data passed alongside the ticket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraData {
    #[serde(default)]
    pub service_request_comment_id: Option<Uuid>,
}

/// Borrowed inputs for one handler call.
#[derive(Debug, Clone, Copy)]
pub struct HookArgs<'a> {
    pub jurisdiction: &'a Jurisdiction,
    pub request: &'a ServiceRequest,
    pub extra: Option<&'a ExtraData>,
}

/// A lifecycle handler.
pub type HookHandler = for<'a> fn(
    &'a Orchestrator,
    HookArgs<'a>,
) -> BoxFuture<'a, Result<Vec<Communication>, DispatchError>>;

async fn cx_survey(
    orchestrator: &Orchestrator,
    args: HookArgs<'_>,
) -> Result<Vec<Communication>, DispatchError> {
    if !args.jurisdiction.cx_survey_enabled {
        return Ok(Vec::new());
    }
    Ok(orchestrator
        .dispatch_cx_survey(args.jurisdiction, args.request)
        .await?
        .into_iter()
        .collect())
}

fn on_create<'a>(
    orchestrator: &'a Orchestrator,
    args: HookArgs<'a>,
) -> BoxFuture<'a, Result<Vec<Communication>, DispatchError>> {
    Box::pin(async move {
        let mut sent = Vec::new();
        if args.jurisdiction.workflow_enabled {
            sent.extend(
                orchestrator
                    .dispatch_service_request_create(args.jurisdiction, args.request)
                    .await?,
            );
        }
        sent.extend(cx_survey(orchestrator, args).await?);
        Ok(sent)
    })
}

fn on_change_status<'a>(
    orchestrator: &'a Orchestrator,
    args: HookArgs<'a>,
) -> BoxFuture<'a, Result<Vec<Communication>, DispatchError>> {
    Box::pin(async move {
        let mut sent = Vec::new();
        if args.jurisdiction.workflow_enabled {
            sent.extend(
                orchestrator
                    .dispatch_service_request_change_status(args.jurisdiction, args.request)
                    .await?,
            );
        }
        sent.extend(cx_survey(orchestrator, args).await?);
        Ok(sent)
    })
}

// Assignment changes never trigger a survey.
fn on_change_assigned_to<'a>(
    orchestrator: &'a Orchestrator,
    args: HookArgs<'a>,
) -> BoxFuture<'a, Result<Vec<Communication>, DispatchError>> {
    Box::pin(async move {
        if !args.jurisdiction.workflow_enabled {
            return Ok(Vec::new());
        }
        Ok(orchestrator
            .dispatch_service_request_change_assignee(args.jurisdiction, args.request)
            .await?
            .into_iter()
            .collect())
    })
}

fn on_closed<'a>(
    orchestrator: &'a Orchestrator,
    args: HookArgs<'a>,
) -> BoxFuture<'a, Result<Vec<Communication>, DispatchError>> {
    Box::pin(async move {
        let mut sent = Vec::new();
        if args.jurisdiction.workflow_enabled {
            sent.extend(
                orchestrator
                    .dispatch_service_request_closed(args.jurisdiction, args.request)
                    .await?,
            );
        }
        sent.extend(cx_survey(orchestrator, args).await?);
        Ok(sent)
    })
}

fn on_comment_broadcast<'a>(
    orchestrator: &'a Orchestrator,
    args: HookArgs<'a>,
) -> BoxFuture<'a, Result<Vec<Communication>, DispatchError>> {
    Box::pin(async move {
        let mut sent = Vec::new();
        if args.jurisdiction.workflow_enabled {
            let comment_id = args
                .extra
                .and_then(|e| e.service_request_comment_id)
                .ok_or_else(|| DispatchError::MissingExtraData {
                    event: LifecycleEvent::ServiceRequestCommentBroadcast.to_string(),
                    field: "serviceRequestCommentId".to_string(),
                })?;
            sent.extend(
                orchestrator
                    .dispatch_service_request_comment(args.jurisdiction, args.request, comment_id)
                    .await?,
            );
        }
        sent.extend(cx_survey(orchestrator, args).await?);
        Ok(sent)
    })
}

/// Owns the event table and the orchestrator its handlers call.
pub struct HookRunner {
    orchestrator: Arc<Orchestrator>,
    handlers: HashMap<LifecycleEvent, Vec<HookHandler>>,
}

impl HookRunner {
    /// Runner with the standard handler for every lifecycle event.
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        let mut runner = Self::empty(orchestrator);
        runner.register(LifecycleEvent::ServiceRequestCreate, on_create);
        runner.register(LifecycleEvent::ServiceRequestChangeStatus, on_change_status);
        runner.register(
            LifecycleEvent::ServiceRequestChangeAssignedTo,
            on_change_assigned_to,
        );
        runner.register(LifecycleEvent::ServiceRequestClosed, on_closed);
        runner.register(
            LifecycleEvent::ServiceRequestCommentBroadcast,
            on_comment_broadcast,
        );
        runner
    }

    /// Runner with no handlers registered.
    pub fn empty(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            handlers: HashMap::new(),
        }
    }

    /// Append a handler for `event`.
    pub fn register(&mut self, event: LifecycleEvent, handler: HookHandler) {
        self.handlers.entry(event).or_default().push(handler);
    }

    pub fn handler_count(&self, event: LifecycleEvent) -> usize {
        self.handlers.get(&event).map_or(0, Vec::len)
    }

    /// Run every handler for `event`, in order. The first error stops the run.
    pub async fn run(
        &self,
        event: LifecycleEvent,
        jurisdiction: &Jurisdiction,
        request: &ServiceRequest,
        extra: Option<&ExtraData>,
    ) -> Result<Vec<Communication>, DispatchError> {
        let Some(handlers) = self.handlers.get(&event) else {
            debug!(%event, "No handlers registered");
            return Ok(Vec::new());
        };

        let args = HookArgs {
            jurisdiction,
            request,
            extra,
        };
        let mut sent = Vec::new();
        for handler in handlers {
            sent.extend(handler(self.orchestrator.as_ref(), args).await?);
        }

        info!(
            %event,
            jurisdiction_id = %jurisdiction.id,
            service_request_id = %request.id,
            count = sent.len(),
            "Lifecycle hooks complete"
        );
        Ok(sent)
    }

    /// [`run`](Self::run) with the event given by name.
    pub async fn run_named(
        &self,
        event: &str,
        jurisdiction: &Jurisdiction,
        request: &ServiceRequest,
        extra: Option<&ExtraData>,
    ) -> Result<Vec<Communication>, DispatchError> {
        let event = event.parse()?;
        self.run(event, jurisdiction, request, extra).await
    }
}
