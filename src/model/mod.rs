//! Domain records: tenants, tickets, staff, correlation maps, audit records.
//!
//! Derived values (`display_name`, a ticket's effective channel, a comment's
//! broadcast flag) are computed on read and never stored.

pub mod communication;
pub mod inbound_map;
pub mod jurisdiction;
pub mod service_request;
pub mod staff;
pub mod template;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use communication::{ChannelEvent, ChannelStatus, Communication, CommunicationType};
pub use inbound_map::InboundMap;
pub use jurisdiction::Jurisdiction;
pub use service_request::{
    RequestChannel, RequestStatus, SUBMITTER_SENTINEL, ServiceRequest, ServiceRequestComment,
};
pub use staff::{Department, Service, StaffDepartment, StaffUser};
pub use template::{Template, TemplatePart};

/// A delivery channel for outbound notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_round_trips_through_str() {
        for ch in [Channel::Email, Channel::Sms] {
            assert_eq!(ch.as_str().parse::<Channel>().unwrap(), ch);
        }
        assert!("fax".parse::<Channel>().is_err());
    }

    #[test]
    fn channel_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Channel::Sms).unwrap(), "sms");
    }
}
