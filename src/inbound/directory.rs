//! Correlation directory: resolves an inbound address to its InboundMap.

use tracing::{debug, warn};

use crate::error::DatabaseError;
use crate::model::{Channel, InboundMap, ServiceRequest};
use crate::store::Database;

/// The lookup key for an address: the local part for email, the raw value
/// for SMS.
pub fn directory_key(channel: Channel, address: &str) -> &str {
    let address = address.trim();
    match channel {
        Channel::Email => address
            .split_once('@')
            .map(|(local, _)| local)
            .unwrap_or(address),
        Channel::Sms => address,
    }
}

/// Exact-match lookup of the correlation record behind `address`.
///
/// A map registered for a different channel is treated as absent.
pub async fn find_identifiers(
    db: &dyn Database,
    channel: Channel,
    address: &str,
) -> Result<Option<InboundMap>, DatabaseError> {
    let key = directory_key(channel, address);
    if key.is_empty() {
        return Ok(None);
    }
    let Some(map) = db.get_inbound_map(key).await? else {
        debug!(key, %channel, "No inbound map");
        return Ok(None);
    };
    if map.channel != channel {
        warn!(key, expected = %channel, found = %map.channel, "Inbound map channel mismatch");
        return Ok(None);
    }
    Ok(Some(map))
}

/// Create and persist the per-ticket map used for reply threading.
pub async fn register_service_request(
    db: &dyn Database,
    request: &ServiceRequest,
) -> Result<InboundMap, DatabaseError> {
    let mut map = InboundMap::for_service_request(&request.jurisdiction_id, request.id);
    if let Some(department_id) = &request.department_id {
        map = map.with_department(department_id);
    }
    if let Some(service_id) = &request.service_id {
        map = map.with_service(service_id);
    }
    db.insert_inbound_map(&map).await?;
    Ok(map)
}
