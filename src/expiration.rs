//! Expiration-date bucketing for inventory batches.

use chrono::{DateTime, Utc};

use crate::types::Severity;

/// Batches expiring within this many days are flagged.
pub const EXPIRING_SOON_DAYS: i64 = 40;

const MS_PER_DAY: i64 = 86_400_000;

/// Whole days from `now` until `expiration`, rounded up.
///
/// A batch that expired one millisecond ago is at day `0`; one that expires in
/// one millisecond is at day `1`.
pub fn days_until(expiration: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    ceil_div(expiration.signed_duration_since(now).num_milliseconds(), MS_PER_DAY)
}

/// Buckets a day count. Total over all of `i64`.
pub fn classify_days(days: i64) -> Severity {
    if days < 0 {
        Severity::Expired
    } else if days <= EXPIRING_SOON_DAYS {
        Severity::ExpiringSoon
    } else {
        Severity::Normal
    }
}

/// Day count and bucket for one expiration timestamp.
pub fn classify(expiration: DateTime<Utc>, now: DateTime<Utc>) -> (i64, Severity) {
    let days = days_until(expiration, now);
    (days, classify_days(days))
}

/// Human label for a day count, as shown next to a batch.
pub fn describe(days: i64) -> String {
    match days {
        d if d < -1 => format!("expired {} days ago", d.unsigned_abs()),
        -1 => "expired 1 day ago".to_string(),
        0 => "expires today".to_string(),
        1 => "expires in 1 day".to_string(),
        d => format!("expires in {d} days"),
    }
}

fn ceil_div(a: i64, b: i64) -> i64 {
    let q = a.div_euclid(b);
    if a.rem_euclid(b) == 0 { q } else { q + 1 }
}
