//! Per-tenant template overrides.

use serde::{Deserialize, Serialize};

use super::{Channel, CommunicationType};

/// Which part of a message a template renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplatePart {
    Subject,
    Body,
}

impl TemplatePart {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Body => "body",
        }
    }
}

/// Tenant override of builtin template content, keyed by
/// `(channel, name, type, jurisdiction_id)`.
///
/// `name` is the full lookup key, e.g. `email.service-request-new-public-user.body`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub jurisdiction_id: String,
    pub channel: Channel,
    pub name: String,
    #[serde(rename = "type")]
    pub comm_type: CommunicationType,
    pub content: String,
}
