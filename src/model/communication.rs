//! Dispatch audit records and per-address channel status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Channel;

/// Category of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationType {
    Workflow,
    Cx,
}

impl CommunicationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workflow => "workflow",
            Self::Cx => "cx",
        }
    }
}

impl fmt::Display for CommunicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommunicationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workflow" => Ok(Self::Workflow),
            "cx" => Ok(Self::Cx),
            other => Err(format!("unknown communication type: {other}")),
        }
    }
}

/// Append-only audit record of one dispatch attempt.
///
/// `accepted` and `delivered` are written optimistically at send time; no
/// provider confirmation feeds back into them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Communication {
    pub id: Uuid,
    pub channel: Channel,
    pub address: String,
    #[serde(rename = "type")]
    pub comm_type: CommunicationType,
    pub dispatched: bool,
    pub dispatch_payload: serde_json::Value,
    pub dispatch_response: serde_json::Value,
    pub accepted: bool,
    pub delivered: bool,
    #[serde(default)]
    pub service_request_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Communication {
    /// Record a send the transport acknowledged.
    pub fn dispatched(
        channel: Channel,
        address: impl Into<String>,
        comm_type: CommunicationType,
        service_request_id: Option<Uuid>,
        payload: serde_json::Value,
        response: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel,
            address: address.into(),
            comm_type,
            dispatched: true,
            dispatch_payload: payload,
            dispatch_response: response,
            accepted: true,
            delivered: true,
            service_request_id,
            created_at: Utc::now(),
        }
    }
}

/// One provider callback event: `(name, allowed)`; `allowed` is `None` when
/// the event says nothing about deliverability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEvent(pub String, pub Option<bool>);

/// Allow/block state for one address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatus {
    /// Email address or phone number.
    pub id: String,
    pub channel: Channel,
    /// `None` when nothing is known yet.
    #[serde(default)]
    pub is_allowed: Option<bool>,
    /// Newest first.
    #[serde(default)]
    pub log: Vec<ChannelEvent>,
}

impl ChannelStatus {
    pub fn new(id: impl Into<String>, channel: Channel) -> Self {
        Self {
            id: id.into(),
            channel,
            is_allowed: None,
            log: Vec::new(),
        }
    }

    /// Explicitly blocked. Unknown status is not a block.
    pub fn is_blocked(&self) -> bool {
        self.is_allowed == Some(false)
    }

    /// Prepend an event; a definite `allowed` value becomes the current state.
    pub fn record(&mut self, event: impl Into<String>, allowed: Option<bool>) {
        self.log.insert(0, ChannelEvent(event.into(), allowed));
        if allowed.is_some() {
            self.is_allowed = allowed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_is_not_blocked() {
        let status = ChannelStatus::new("a@b.c", Channel::Email);
        assert!(!status.is_blocked());
    }

    #[test]
    fn record_prepends_and_updates_state() {
        let mut status = ChannelStatus::new("a@b.c", Channel::Email);
        status.record("delivered", Some(true));
        status.record("open", None);
        status.record("bounce", Some(false));

        assert!(status.is_blocked());
        assert_eq!(status.log[0], ChannelEvent("bounce".into(), Some(false)));
        assert_eq!(status.log[2], ChannelEvent("delivered".into(), Some(true)));
    }

    #[test]
    fn null_event_keeps_previous_state() {
        let mut status = ChannelStatus::new("a@b.c", Channel::Email);
        status.record("delivered", Some(true));
        status.record("open", None);
        assert_eq!(status.is_allowed, Some(true));
    }

    #[test]
    fn communication_serializes_type_field() {
        let c = Communication::dispatched(
            Channel::Email,
            "a@b.c",
            CommunicationType::Cx,
            None,
            serde_json::json!({}),
            serde_json::json!({"ok": true}),
        );
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "cx");
        assert_eq!(json["accepted"], true);
        assert_eq!(json["delivered"], true);
    }
}
