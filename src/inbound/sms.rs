//! Inbound SMS parsing.

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::error::InboundError;
use crate::inbound::directory::find_identifiers;
use crate::inbound::{InboundRecord, parse_public_id, strip_public_id};
use crate::model::Channel;
use crate::store::Database;

/// Twilio inbound message webhook (form fields are capitalised).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundSmsPayload {
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
}

/// Resolve an inbound SMS through the number it was sent to.
pub async fn extract_service_request_from_inbound_sms(
    db: &dyn Database,
    payload: &InboundSmsPayload,
) -> Result<InboundRecord, InboundError> {
    let map = find_identifiers(db, Channel::Sms, &payload.to)
        .await?
        .ok_or_else(|| InboundError::UnknownAddress(payload.to.clone()))?;

    let body = payload.body.trim();
    let from = payload.from.trim();

    info!(to = %payload.to, jurisdiction_id = %map.jurisdiction_id, "Inbound SMS parsed");

    Ok(InboundRecord {
        jurisdiction_id: map.jurisdiction_id,
        department_id: map.department_id,
        assigned_to: map.staff_user_id,
        service_request_id: map.service_request_id,
        service_id: map.service_id,
        first_name: None,
        last_name: None,
        email: None,
        phone: Some(from.to_string()).filter(|p| !p.is_empty()),
        description: strip_public_id(body).to_string(),
        body: body.to_string(),
        input_channel: "sms".to_string(),
        created_at: Utc::now(),
        public_id: parse_public_id(body),
        channel: Channel::Sms,
    })
}
