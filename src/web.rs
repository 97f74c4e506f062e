//! HTTP surface: inbound email/SMS webhooks and a health check.

use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::deps::AppDeps;
use crate::error::{DispatchError, InboundError, RequestError};
use crate::inbound::{
    InboundEmailPayload, InboundSmsPayload, extract_service_request_from_inbound_email,
    extract_service_request_from_inbound_sms,
};
use crate::requests::{IngestOutcome, RequestService};
use crate::store::Database;

/// Shared state for the inbound webhook routes.
#[derive(Clone)]
pub struct InboundRouteState {
    pub db: Arc<dyn Database>,
    pub requests: Arc<RequestService>,
    pub inbound_email_domain: String,
}

impl From<&AppDeps> for InboundRouteState {
    fn from(deps: &AppDeps) -> Self {
        Self {
            db: deps.db.clone(),
            requests: deps.requests.clone(),
            inbound_email_domain: deps.config.inbound_email_domain.clone(),
        }
    }
}

/// Failure of a webhook call, mapped onto a status code.
#[derive(Debug)]
pub enum ApiError {
    Inbound(InboundError),
    Request(RequestError),
}

impl From<InboundError> for ApiError {
    fn from(e: InboundError) -> Self {
        Self::Inbound(e)
    }
}

impl From<RequestError> for ApiError {
    fn from(e: RequestError) -> Self {
        Self::Request(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Inbound(InboundError::NoInboundAddress { .. })
            | Self::Inbound(InboundError::UnknownAddress(_))
            | Self::Request(RequestError::NotFound(_))
            | Self::Request(RequestError::JurisdictionNotFound(_))
            | Self::Request(RequestError::StaffNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Inbound(InboundError::InvalidPayload(_)) => StatusCode::BAD_REQUEST,
            Self::Request(RequestError::AssigneeOutsideDepartment { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Request(RequestError::Dispatch(e)) if e.is_policy_rejection() => {
                StatusCode::CONFLICT
            }
            Self::Request(RequestError::Dispatch(DispatchError::Transport(_))) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Inbound(e) => e.to_string(),
            Self::Request(e) => e.to_string(),
        };
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "Inbound webhook failed");
        } else {
            warn!(status = status.as_u16(), error = %message, "Inbound webhook rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// POST /inbound/email
async fn inbound_email(
    State(state): State<InboundRouteState>,
    Form(payload): Form<InboundEmailPayload>,
) -> Result<Json<IngestOutcome>, ApiError> {
    let record = extract_service_request_from_inbound_email(
        state.db.as_ref(),
        &state.inbound_email_domain,
        &payload,
    )
    .await?;
    Ok(Json(state.requests.ingest_inbound(record).await?))
}

/// POST /inbound/sms
async fn inbound_sms(
    State(state): State<InboundRouteState>,
    Form(payload): Form<InboundSmsPayload>,
) -> Result<Json<IngestOutcome>, ApiError> {
    let record = extract_service_request_from_inbound_sms(state.db.as_ref(), &payload).await?;
    Ok(Json(state.requests.ingest_inbound(record).await?))
}

/// Build the inbound webhook routes.
pub fn inbound_routes(state: InboundRouteState) -> Router {
    Router::new()
        .route("/inbound/email", post(inbound_email))
        .route("/inbound/sms", post(inbound_sms))
        .with_state(state)
}

/// The full application router with request tracing.
pub fn app(deps: &AppDeps) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(inbound_routes(InboundRouteState::from(deps)))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Channel;

    #[test]
    fn error_statuses() {
        let unknown = ApiError::from(InboundError::UnknownAddress("x".into()));
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let blocked = ApiError::from(RequestError::Dispatch(DispatchError::PolicyRejected {
            address: "a@x.com".into(),
            channel: Channel::Email.to_string(),
        }));
        assert_eq!(blocked.status(), StatusCode::CONFLICT);

        let outside = ApiError::from(RequestError::AssigneeOutsideDepartment {
            staff_user_id: "s".into(),
            department_id: "d".into(),
        });
        assert_eq!(outside.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
