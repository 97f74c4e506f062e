//! Jurisdiction (tenant) policy record.

use serde::{Deserialize, Serialize};

use super::{Channel, RequestStatus};

/// A tenant with its notification policy flags and sender identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Jurisdiction {
    pub id: String,
    pub name: String,
    /// Master switch for lifecycle notifications.
    pub workflow_enabled: bool,
    /// Master switch for customer-experience surveys.
    pub cx_survey_enabled: bool,
    /// Give open tickets a per-ticket reply-to address.
    pub reply_to_service_request_enabled: bool,
    pub broadcast_to_submitter_on_request_closed: bool,
    /// Narrow staff broadcasts to department leads.
    pub filter_broadcasts_by_department: bool,
    pub enforce_assignment_through_department: bool,
    /// Channel used for submitters who gave both an email and a phone.
    pub preferred_broadcast_channel: Channel,
    /// Delay in hours before workflow messages go out.
    #[serde(default)]
    pub workflow_broadcast_window: Option<u32>,
    /// Delay in hours before survey messages go out.
    #[serde(default)]
    pub cx_survey_broadcast_window: Option<u32>,
    pub cx_survey_trigger_status: RequestStatus,
    #[serde(default)]
    pub send_from_email: Option<String>,
    pub send_from_email_verified: bool,
    #[serde(default)]
    pub send_from_phone: Option<String>,
    #[serde(default)]
    pub reply_to_email: Option<String>,
}

impl Jurisdiction {
    /// Create a tenant with every policy flag off.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            workflow_enabled: false,
            cx_survey_enabled: false,
            reply_to_service_request_enabled: false,
            broadcast_to_submitter_on_request_closed: false,
            filter_broadcasts_by_department: false,
            enforce_assignment_through_department: false,
            preferred_broadcast_channel: Channel::Email,
            workflow_broadcast_window: None,
            cx_survey_broadcast_window: None,
            cx_survey_trigger_status: RequestStatus::Done,
            send_from_email: None,
            send_from_email_verified: false,
            send_from_phone: None,
            reply_to_email: None,
        }
    }
}
