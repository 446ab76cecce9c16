use chrono::{DateTime, Duration, Utc};

use matchsync_common::Match;

use crate::retention::split_by_age;

/// Build the list of matches the buffer should hold.
///
/// Concluded matches stay until they are older than `ttl`; upcoming matches
/// follow them. The result never exceeds `capacity`: overflow is cut from the
/// tail, so retained past matches win over the latest future ones. When short
/// of capacity and enough expired matches exist to close the gap, the most
/// recently expired ones are prepended. If they cannot close the gap, none are.
pub fn construct_desired_state(
    past: Vec<Match>,
    future: Vec<Match>,
    ttl: Duration,
    capacity: usize,
    now: DateTime<Utc>,
) -> Vec<Match> {
    let (mut expired, mut desired) = split_by_age(past, ttl, now);
    desired.extend(future);

    if desired.len() > capacity {
        desired.truncate(capacity);
        return desired;
    }

    let shortfall = capacity - desired.len();
    if shortfall == 0 || shortfall > expired.len() {
        return desired;
    }

    let mut backfilled = expired.split_off(expired.len() - shortfall);
    backfilled.extend(desired);
    backfilled
}
