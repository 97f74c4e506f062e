//! Service requests (tickets) and their comments.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::InboundMap;

/// `added_by` value marking a comment written by the submitter.
pub const SUBMITTER_SENTINEL: &str = "__SUBMITTER__";

/// Ticket lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Inbox,
    Todo,
    Doing,
    Blocked,
    Done,
    Invalid,
    Moved,
    Junk,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Blocked => "blocked",
            Self::Done => "done",
            Self::Invalid => "invalid",
            Self::Moved => "moved",
            Self::Junk => "junk",
        }
    }

    /// Whether the status is in the closed set {done, invalid, moved, junk}.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Done | Self::Invalid | Self::Moved | Self::Junk)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbox" => Ok(Self::Inbox),
            "todo" => Ok(Self::Todo),
            "doing" => Ok(Self::Doing),
            "blocked" => Ok(Self::Blocked),
            "done" => Ok(Self::Done),
            "invalid" => Ok(Self::Invalid),
            "moved" => Ok(Self::Moved),
            "junk" => Ok(Self::Junk),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// How the submitter can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestChannel {
    Email,
    Sms,
    Anon,
    Multiple,
}

impl RequestChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Anon => "anon",
            Self::Multiple => "multiple",
        }
    }

    /// Derive the channel from which contact fields are populated.
    pub fn derive(email: Option<&str>, phone: Option<&str>) -> Self {
        let has_email = email.is_some_and(|e| !e.trim().is_empty());
        let has_phone = phone.is_some_and(|p| !p.trim().is_empty());
        match (has_email, has_phone) {
            (true, true) => Self::Multiple,
            (true, false) => Self::Email,
            (false, true) => Self::Sms,
            (false, false) => Self::Anon,
        }
    }
}

impl FromStr for RequestChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            "anon" => Ok(Self::Anon),
            "multiple" => Ok(Self::Multiple),
            other => Err(format!("unknown request channel: {other}")),
        }
    }
}

/// A comment on a ticket, with independent broadcast flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequestComment {
    pub id: Uuid,
    pub service_request_id: Uuid,
    pub comment: String,
    /// Staff user id, [`SUBMITTER_SENTINEL`], or `None` for system comments.
    #[serde(default)]
    pub added_by: Option<String>,
    pub broadcast_to_submitter: bool,
    pub broadcast_to_assignee: bool,
    pub broadcast_to_staff: bool,
    pub created_at: DateTime<Utc>,
}

impl ServiceRequestComment {
    /// Create a comment with every broadcast flag off.
    pub fn new(service_request_id: Uuid, comment: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_request_id,
            comment: comment.into(),
            added_by: None,
            broadcast_to_submitter: false,
            broadcast_to_assignee: false,
            broadcast_to_staff: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_added_by(mut self, added_by: impl Into<String>) -> Self {
        self.added_by = Some(added_by.into());
        self
    }

    pub fn with_broadcast(mut self, submitter: bool, assignee: bool, staff: bool) -> Self {
        self.broadcast_to_submitter = submitter;
        self.broadcast_to_assignee = assignee;
        self.broadcast_to_staff = staff;
        self
    }

    /// True iff any broadcast flag is set.
    pub fn is_broadcast(&self) -> bool {
        self.broadcast_to_submitter || self.broadcast_to_assignee || self.broadcast_to_staff
    }

    pub fn is_from_submitter(&self) -> bool {
        self.added_by.as_deref() == Some(SUBMITTER_SENTINEL)
    }
}

/// A citizen-submitted ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub id: Uuid,
    pub jurisdiction_id: String,
    /// Short human-facing reference, unique per tenant. Zero until assigned.
    pub public_id: u64,
    pub status: RequestStatus,
    /// Explicit channel; derived from contact fields when absent.
    #[serde(default)]
    pub channel: Option<RequestChannel>,
    pub description: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub service_id: Option<String>,
    pub input_channel: String,
    #[serde(default)]
    pub close_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub comments: Vec<ServiceRequestComment>,
    #[serde(default)]
    pub inbound_maps: Vec<InboundMap>,
}

impl ServiceRequest {
    /// Create an open ticket in the `inbox` status.
    pub fn new(jurisdiction_id: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            jurisdiction_id: jurisdiction_id.into(),
            public_id: 0,
            status: RequestStatus::Inbox,
            channel: None,
            description: description.into(),
            first_name: None,
            last_name: None,
            email: None,
            phone: None,
            assigned_to: None,
            department_id: None,
            service_id: None,
            input_channel: "webform".to_string(),
            close_date: None,
            created_at: now,
            updated_at: now,
            comments: Vec::new(),
            inbound_maps: Vec::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    pub fn with_department(mut self, department_id: impl Into<String>) -> Self {
        self.department_id = Some(department_id.into());
        self
    }

    pub fn with_service(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }

    pub fn with_assignee(mut self, staff_user_id: impl Into<String>) -> Self {
        self.assigned_to = Some(staff_user_id.into());
        self
    }

    /// Set the status and keep `close_date` consistent with it.
    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.set_status(status, Utc::now());
        self
    }

    /// Effective channel: the explicit one, or derived from contact fields.
    pub fn effective_channel(&self) -> RequestChannel {
        self.channel
            .unwrap_or_else(|| RequestChannel::derive(self.email.as_deref(), self.phone.as_deref()))
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }

    /// Change status. `close_date` is set on entering the closed set and
    /// cleared on reopening; moving between closed statuses keeps it.
    pub fn set_status(&mut self, status: RequestStatus, now: DateTime<Utc>) {
        if status.is_closed() {
            if self.close_date.is_none() {
                self.close_date = Some(now);
            }
        } else {
            self.close_date = None;
        }
        self.status = status;
        self.updated_at = now;
    }

    /// Submitter's display name, falling back to "Citizen".
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            "Citizen".to_string()
        } else {
            name
        }
    }

    pub fn find_comment(&self, comment_id: Uuid) -> Option<&ServiceRequestComment> {
        self.comments.iter().find(|c| c.id == comment_id)
    }
}
