//! Inbound correlation: webhook payloads in, tenant/ticket context out.
//!
//! Correlation is address-based only: the address a message was sent to
//! resolves through the directory, and a `Request #N:` prefix carries the
//! ticket's public id.

pub mod directory;
pub mod email;
pub mod sms;

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::model::Channel;

pub use directory::{find_identifiers, register_service_request};
pub use email::{InboundEmailPayload, extract_service_request_from_inbound_email};
pub use sms::{InboundSmsPayload, extract_service_request_from_inbound_sms};

/// Normalized result of parsing one inbound message.
///
/// With `service_request_id` set the message is a reply to that ticket;
/// otherwise it creates a ticket in the map's department/service context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRecord {
    pub jurisdiction_id: String,
    pub department_id: Option<String>,
    /// Staff user from the map.
    pub assigned_to: Option<String>,
    pub service_request_id: Option<Uuid>,
    pub service_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub description: String,
    /// Raw message body, before any quote stripping.
    pub body: String,
    pub input_channel: String,
    pub created_at: DateTime<Utc>,
    pub public_id: Option<u64>,
    pub channel: Channel,
}

static PUBLIC_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Request #(\d+):").expect("valid public id regex"));

/// The digits of a leading `Request #N:` marker.
pub fn extract_public_id(text: &str) -> Option<String> {
    PUBLIC_ID
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// The leading `Request #N:` marker as a number.
///
/// Digits that overflow `u64` cannot name a ticket and are ignored.
pub fn parse_public_id(text: &str) -> Option<u64> {
    let digits = extract_public_id(text)?;
    match digits.parse() {
        Ok(id) => Some(id),
        Err(e) => {
            debug!(public_id = %digits, error = %e, "Ignoring unparsable public id");
            None
        }
    }
}

/// `text` without its leading `Request #N:` marker.
pub fn strip_public_id(text: &str) -> &str {
    match PUBLIC_ID.find(text) {
        Some(m) => text[m.end()..].trim_start(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_id_only_at_start() {
        assert_eq!(extract_public_id("Hello"), None);
        assert_eq!(extract_public_id("Request #12987: Hello").as_deref(), Some("12987"));
        assert_eq!(extract_public_id("Re: Request #12987: Hello"), None);
        assert_eq!(extract_public_id("Request #: Hello"), None);
        assert_eq!(extract_public_id("Request #12 Hello"), None);
    }

    #[test]
    fn overflowing_public_id_is_ignored() {
        assert_eq!(parse_public_id("Request #42: Hi"), Some(42));
        assert_eq!(parse_public_id("Request #99999999999999999999999: Hi"), None);
        assert_eq!(parse_public_id("Hi"), None);
    }

    #[test]
    fn strip_leaves_unmarked_text_alone() {
        assert_eq!(strip_public_id("Request #5: Streetlight out"), "Streetlight out");
        assert_eq!(strip_public_id("Streetlight out"), "Streetlight out");
    }
}
