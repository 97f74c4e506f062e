//! Template rendering for outbound notifications.
//!
//! Content for a key resolves in order: tenant override in the database,
//! the configured template directory, then the builtin set.

pub mod builtin;
pub mod renderer;

use async_trait::async_trait;

use crate::error::TemplateError;
use crate::model::{Channel, CommunicationType, TemplatePart};

pub use renderer::{TemplateRenderer, interpolate, interpolate_html};

/// Template names used by the dispatch orchestrator.
pub mod names {
    pub const NEW_PUBLIC_USER: &str = "service-request-new-public-user";
    pub const NEW_STAFF_USER: &str = "service-request-new-staff-user";
    pub const CHANGED_STATUS_STAFF_USER: &str = "service-request-changed-status-staff-user";
    pub const CHANGED_ASSIGNEE_STAFF_USER: &str = "service-request-changed-assignee-staff-user";
    pub const CLOSED_PUBLIC_USER: &str = "service-request-closed-public-user";
    pub const CLOSED_STAFF_USER: &str = "service-request-closed-staff-user";
    pub const COMMENT_BROADCAST_PUBLIC_USER: &str = "service-request-comment-broadcast-public-user";
    pub const COMMENT_BROADCAST_STAFF_USER: &str = "service-request-comment-broadcast-staff-user";
    pub const CX_SURVEY_PUBLIC_USER: &str = "cx-survey-public-user";
    pub const POWERED_BY: &str = "powered-by";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
}

/// Full lookup key: `{channel}.{name}.{subject|body}`.
pub fn template_key(channel: Channel, name: &str, part: TemplatePart) -> String {
    format!("{}.{}.{}", channel.as_str(), name, part.as_str())
}

/// One render call.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub jurisdiction_id: &'a str,
    pub channel: Channel,
    pub comm_type: CommunicationType,
    pub name: &'a str,
    pub part: TemplatePart,
    pub context: &'a serde_json::Value,
}

/// Renders a named template against a JSON context.
///
/// Body renders append the channel's powered-by and unsubscribe fragments,
/// each on its own line. Subjects never get boilerplate.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: RenderRequest<'_>) -> Result<String, TemplateError>;
}
