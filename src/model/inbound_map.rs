//! Address-keyed correlation records.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Channel;

/// Length of generated intake tokens.
const INTAKE_TOKEN_LEN: usize = 12;

/// Links an opaque inbound address to a tenant/department/ticket context.
///
/// `id` is an email local-part token or a raw phone number. Records are
/// immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMap {
    pub id: String,
    pub channel: Channel,
    pub jurisdiction_id: String,
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub staff_user_id: Option<String>,
    #[serde(default)]
    pub service_request_id: Option<Uuid>,
    #[serde(default)]
    pub service_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InboundMap {
    /// Intake map for creating tickets through an email address with a generated token.
    pub fn email_intake(jurisdiction_id: impl Into<String>) -> Self {
        Self::intake(generate_intake_token(), Channel::Email, jurisdiction_id)
    }

    /// Intake map for creating tickets through a phone number.
    pub fn sms_intake(phone: impl Into<String>, jurisdiction_id: impl Into<String>) -> Self {
        Self::intake(phone, Channel::Sms, jurisdiction_id)
    }

    fn intake(id: impl Into<String>, channel: Channel, jurisdiction_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            channel,
            jurisdiction_id: jurisdiction_id.into(),
            department_id: None,
            staff_user_id: None,
            service_request_id: None,
            service_id: None,
            created_at: Utc::now(),
        }
    }

    /// Per-ticket map used for reply threading.
    pub fn for_service_request(jurisdiction_id: impl Into<String>, service_request_id: Uuid) -> Self {
        Self {
            id: ticket_map_id(service_request_id),
            channel: Channel::Email,
            jurisdiction_id: jurisdiction_id.into(),
            department_id: None,
            staff_user_id: None,
            service_request_id: Some(service_request_id),
            service_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_department(mut self, department_id: impl Into<String>) -> Self {
        self.department_id = Some(department_id.into());
        self
    }

    pub fn with_service(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }

    pub fn with_staff_user(mut self, staff_user_id: impl Into<String>) -> Self {
        self.staff_user_id = Some(staff_user_id.into());
        self
    }
}

/// Map id for a ticket: its UUID with separators stripped.
pub fn ticket_map_id(service_request_id: Uuid) -> String {
    service_request_id.to_string().replace('-', "")
}

/// Random lowercase alphanumeric token for intake addresses.
pub fn generate_intake_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(INTAKE_TOKEN_LEN)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_map_id_strips_hyphens() {
        let id = Uuid::new_v4();
        let map_id = ticket_map_id(id);
        assert_eq!(map_id.len(), 32);
        assert!(!map_id.contains('-'));
        assert_eq!(map_id, id.simple().to_string());
    }

    #[test]
    fn per_ticket_map_points_at_ticket() {
        let id = Uuid::new_v4();
        let map = InboundMap::for_service_request("j1", id);
        assert_eq!(map.service_request_id, Some(id));
        assert_eq!(map.channel, Channel::Email);
        assert_eq!(map.id, ticket_map_id(id));
    }

    #[test]
    fn intake_tokens_are_lowercase_and_distinct() {
        let a = generate_intake_token();
        let b = generate_intake_token();
        assert_eq!(a.len(), INTAKE_TOKEN_LEN);
        assert_eq!(a, a.to_lowercase());
        assert_ne!(a, b);
    }

    #[test]
    fn sms_intake_keeps_raw_phone() {
        let map = InboundMap::sms_intake("+15551234567", "j1").with_department("roads");
        assert_eq!(map.id, "+15551234567");
        assert_eq!(map.channel, Channel::Sms);
        assert_eq!(map.department_id.as_deref(), Some("roads"));
        assert!(map.service_request_id.is_none());
    }
}
