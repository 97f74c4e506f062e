//! Reply-to and sender identity resolution.
//!
//! Open tickets get a per-ticket reply address so replies thread back into
//! the ticket. Closed tickets never do.

use crate::model::{Jurisdiction, ServiceRequest};

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// `{inboundMapId}@{domain}` from the ticket's first inbound map, or `None`
/// when the ticket is closed or has no map.
pub fn get_service_request_comment_reply_to(
    request: &ServiceRequest,
    domain: &str,
) -> Option<String> {
    if request.is_closed() {
        return None;
    }
    request
        .inbound_maps
        .first()
        .map(|map| format!("{}@{}", map.id, domain))
}

/// Reply-to precedence: ticket thread (when the tenant enables it), then the
/// tenant's reply-to, then the system default. Never empty.
pub fn get_reply_to_email(
    request: Option<&ServiceRequest>,
    jurisdiction: &Jurisdiction,
    domain: &str,
    system_default: &str,
) -> String {
    if jurisdiction.reply_to_service_request_enabled
        && let Some(thread) = request.and_then(|r| get_service_request_comment_reply_to(r, domain))
    {
        return thread;
    }
    if let Some(tenant) = non_empty(jurisdiction.reply_to_email.as_deref()) {
        return tenant.to_string();
    }
    match non_empty(Some(system_default)) {
        Some(default) => default.to_string(),
        None => format!("no-reply@{domain}"),
    }
}

/// The tenant's sender address if verified, else the system default.
pub fn get_send_from_email(jurisdiction: &Jurisdiction, system_default: &str) -> String {
    if jurisdiction.send_from_email_verified
        && let Some(from) = non_empty(jurisdiction.send_from_email.as_deref())
    {
        return from.to_string();
    }
    system_default.to_string()
}

/// The tenant's sender phone whenever present, else the system default.
pub fn get_send_from_phone(
    jurisdiction: &Jurisdiction,
    system_default: Option<&str>,
) -> Option<String> {
    non_empty(jurisdiction.send_from_phone.as_deref())
        .or(non_empty(system_default))
        .map(str::to_string)
}
