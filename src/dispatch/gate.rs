//! Channel status gate: allow/block check before any send.

use tracing::warn;

use crate::error::DispatchError;
use crate::model::Channel;
use crate::store::Database;

/// Fail with [`DispatchError::PolicyRejected`] when the address is blocked.
///
/// Only email addresses are gated. Unknown status is allowed.
pub async fn check_channel_status(
    db: &dyn Database,
    channel: Channel,
    address: &str,
) -> Result<(), DispatchError> {
    if channel != Channel::Email {
        return Ok(());
    }

    match db.get_channel_status(address).await? {
        Some(status) if status.is_blocked() => {
            warn!(address, channel = %channel, "Destination blocked by channel status");
            Err(DispatchError::PolicyRejected {
                address: address.to_string(),
                channel: channel.to_string(),
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    #[tokio::test]
    async fn unknown_address_passes() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        check_channel_status(&db, Channel::Email, "new@x.com").await.unwrap();
    }

    #[tokio::test]
    async fn blocked_email_is_rejected() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.record_channel_event("a@x.com", Channel::Email, "bounce", Some(false))
            .await
            .unwrap();
        let err = check_channel_status(&db, Channel::Email, "a@x.com")
            .await
            .unwrap_err();
        assert!(err.is_policy_rejection());
    }

    #[tokio::test]
    async fn reallowed_email_passes() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.record_channel_event("a@x.com", Channel::Email, "bounce", Some(false))
            .await
            .unwrap();
        db.record_channel_event("a@x.com", Channel::Email, "resubscribe", Some(true))
            .await
            .unwrap();
        check_channel_status(&db, Channel::Email, "a@x.com").await.unwrap();
    }

    #[tokio::test]
    async fn sms_is_not_gated() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.record_channel_event("+15550001111", Channel::Sms, "stop", Some(false))
            .await
            .unwrap();
        check_channel_status(&db, Channel::Sms, "+15550001111").await.unwrap();
    }
}
