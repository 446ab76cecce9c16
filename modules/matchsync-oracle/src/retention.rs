use chrono::{DateTime, Duration, Utc};

use matchsync_common::Match;

/// Partition `past` (ascending by date) into `(expired, retained)`.
///
/// Everything before the first match at most `ttl` old is expired; that match
/// and everything after it is retained. A match exactly `ttl` old is retained.
pub fn split_by_age(
    mut past: Vec<Match>,
    ttl: Duration,
    now: DateTime<Utc>,
) -> (Vec<Match>, Vec<Match>) {
    let cut = past
        .iter()
        .position(|m| now - m.date <= ttl)
        .unwrap_or(past.len());
    let retained = past.split_off(cut);
    (past, retained)
}
