//! Broadcast window arithmetic.

use chrono::{DateTime, Duration, Utc};

/// Targets closer than this many minutes are sent immediately.
pub const MIN_SCHEDULE_LEAD_MINUTES: i64 = 15;

/// Providers refuse to hold a message longer than this many days.
pub const MAX_SCHEDULE_AHEAD_DAYS: i64 = 7;

/// Compute the scheduled send time for a broadcast window.
///
/// Returns `None` (send now) when there is no window, the window is zero, or
/// `reference + window` is less than [`MIN_SCHEDULE_LEAD_MINUTES`] after `now`.
/// Targets further out than [`MAX_SCHEDULE_AHEAD_DAYS`] are clamped.
pub fn compute_send_at(
    reference: DateTime<Utc>,
    window_hours: Option<u32>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let hours = window_hours.filter(|h| *h > 0)?;
    let latest = now + Duration::days(MAX_SCHEDULE_AHEAD_DAYS);
    // Out of chrono's range is past the clamp anyway.
    let target = Duration::try_hours(i64::from(hours))
        .and_then(|window| reference.checked_add_signed(window))
        .unwrap_or(latest);

    if target - now < Duration::minutes(MIN_SCHEDULE_LEAD_MINUTES) {
        return None;
    }
    Some(target.min(latest))
}
