//! Inbound email parsing: turns a provider webhook payload into an
//! [`InboundRecord`].

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use mail_parser::MessageParser;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::channels::extract_addresses;
use crate::error::InboundError;
use crate::inbound::directory::find_identifiers;
use crate::inbound::{InboundRecord, parse_public_id, strip_public_id};
use crate::model::Channel;
use crate::store::Database;

/// Email webhook payload, as posted by the inbound-parse provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundEmailPayload {
    /// Raw multi-line header block.
    #[serde(default)]
    pub headers: String,
    pub to: String,
    #[serde(default)]
    pub cc: Option<String>,
    #[serde(default)]
    pub bcc: Option<String>,
    pub from: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub text: String,
}

static FORWARDED_FOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^X-Forwarded-For:\s*(.*)$").expect("valid forwarded-for regex")
});

/// Addresses recovered from an `X-Forwarded-For:` header, joined with `", "`.
///
/// Some providers emit space-separated values inside the comma list; those
/// tokens are split again.
pub fn extract_forward_email(headers: &str) -> Option<String> {
    let value = headers.lines().find_map(|line| {
        FORWARDED_FOR
            .captures(line.trim_end_matches('\r'))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    })?;

    let tokens: Vec<&str> = value
        .split(", ")
        .flat_map(|token| token.split(' '))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(", "))
    }
}

fn parse_address_list(pool: &str) -> Vec<String> {
    let raw = format!("To: {pool}\r\n\r\n");
    MessageParser::default()
        .parse(raw.as_bytes())
        .map(|parsed| extract_addresses(parsed.to()))
        .unwrap_or_default()
}

/// First address across to, cc, bcc and forwarded headers whose domain is
/// the inbound domain.
pub fn extract_to_email(
    domain: &str,
    headers: &str,
    to: &str,
    cc: Option<&str>,
    bcc: Option<&str>,
) -> Option<String> {
    let forwarded = extract_forward_email(headers);
    let pool = [Some(to), cc, bcc, forwarded.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    parse_address_list(&pool).into_iter().find(|address| {
        address
            .rsplit_once('@')
            .is_some_and(|(_, d)| d.eq_ignore_ascii_case(domain))
    })
}

/// Subject with any `Request #N:` prefix removed, then a blank line, then the body.
pub fn extract_description(subject: &str, body: &str) -> String {
    format!("{}\n\n{}", strip_public_id(subject), body)
}

/// The `Date:` header, if present and RFC 2822.
pub fn extract_created_at(headers: &str) -> Option<DateTime<Utc>> {
    headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.trim().eq_ignore_ascii_case("date") {
            return None;
        }
        DateTime::parse_from_rfc2822(value.trim())
            .ok()
            .map(|d| d.with_timezone(&Utc))
    })
}

/// Split a `From` value into (first name, last name, address).
pub fn parse_sender(from: &str) -> (Option<String>, Option<String>, Option<String>) {
    let raw = format!("From: {from}\r\n\r\n");
    let parsed = MessageParser::default().parse(raw.as_bytes());
    let sender = parsed.as_ref().and_then(|p| p.from()).and_then(|a| a.first());

    let address = sender
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .or_else(|| Some(from.trim().to_string()).filter(|s| s.contains('@')));

    let (first, last) = match sender.and_then(|a| a.name()).map(str::trim) {
        Some(name) if !name.is_empty() => match name.split_once(' ') {
            Some((first, last)) => (Some(first.to_string()), Some(last.trim().to_string())),
            None => (Some(name.to_string()), None),
        },
        _ => (None, None),
    };
    (first, last, address)
}

/// Resolve an inbound email to its tenant/ticket context.
pub async fn extract_service_request_from_inbound_email(
    db: &dyn Database,
    domain: &str,
    payload: &InboundEmailPayload,
) -> Result<InboundRecord, InboundError> {
    let to = extract_to_email(
        domain,
        &payload.headers,
        &payload.to,
        payload.cc.as_deref(),
        payload.bcc.as_deref(),
    )
    .ok_or_else(|| InboundError::NoInboundAddress {
        domain: domain.to_string(),
    })?;

    let map = find_identifiers(db, Channel::Email, &to)
        .await?
        .ok_or_else(|| InboundError::UnknownAddress(to.clone()))?;

    let (first_name, last_name, email) = parse_sender(&payload.from);
    let public_id = parse_public_id(&payload.subject);

    debug!(
        to = %to,
        jurisdiction_id = %map.jurisdiction_id,
        service_request_id = ?map.service_request_id,
        public_id = ?public_id,
        "Inbound email correlated"
    );

    let record = InboundRecord {
        jurisdiction_id: map.jurisdiction_id,
        department_id: map.department_id,
        assigned_to: map.staff_user_id,
        service_request_id: map.service_request_id,
        service_id: map.service_id,
        first_name,
        last_name,
        email,
        phone: None,
        description: extract_description(&payload.subject, &payload.text),
        body: payload.text.clone(),
        input_channel: "email".to_string(),
        created_at: extract_created_at(&payload.headers).unwrap_or_else(Utc::now),
        public_id,
        channel: Channel::Email,
    };
    info!(to = %to, jurisdiction_id = %record.jurisdiction_id, "Inbound email parsed");
    Ok(record)
}
