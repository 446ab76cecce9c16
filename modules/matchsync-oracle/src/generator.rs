//! Match data built from a reference snapshot.
//!
//! A reference file is a JSON array of matches in chronological order where
//! every concluded match comes before every undecided one. The helpers here
//! re-anchor that snapshot to a chosen instant and play it forward, which is
//! how the dry-run binary and the integration tests get realistic data.

use std::io::Read;

use chrono::{DateTime, Duration, Utc};

use matchsync_common::{Match, MatchResult, OracleError, OracleResult};

use crate::traits::MatchFeed;

/// Spacing between fabricated future matches.
const GENERATED_MATCH_SPACING_HOURS: i64 = 2;

/// Parse a reference snapshot.
pub fn load_reference<R: Read>(reader: R) -> OracleResult<Vec<Match>> {
    serde_json::from_reader(reader)
        .map_err(|e| OracleError::FetchFailed(format!("invalid reference data: {e}")))
}

/// Shift every date so the most recent concluded match sits at `ref_time`
/// (the first match if none has concluded), then split at the first
/// undecided match.
pub fn split_normalized(reference: &[Match], ref_time: DateTime<Utc>) -> MatchFeed {
    let mut matches = reference.to_vec();
    let first_open = matches
        .iter()
        .position(|m| !m.is_concluded())
        .unwrap_or(matches.len());

    let anchor = first_open
        .checked_sub(1)
        .and_then(|i| matches.get(i))
        .or_else(|| matches.first())
        .map(|m| m.date);

    if let Some(anchor) = anchor {
        let shift = ref_time - anchor;
        for m in &mut matches {
            m.date += shift;
        }
    }

    let future = matches.split_off(first_open);
    MatchFeed::new(matches, future)
}

/// Conclude the next `n` upcoming matches. Team 1 wins each one.
pub fn progress_time(mut feed: MatchFeed, n: usize) -> MatchFeed {
    let n = n.min(feed.future.len());
    for mut m in feed.future.drain(..n) {
        m.result = MatchResult::won_by(&m.team1.name, "16-10");
        m.live = false;
        feed.past.push(m);
    }
    feed
}

/// Fabricate `n` undecided matches scheduled after `after`, with ids
/// continuing from `after.id`.
pub fn generate_future(after: &Match, n: usize) -> Vec<Match> {
    (1..=n as i64)
        .map(|i| {
            let (team1, team2) = if i % 2 == 0 {
                (after.team1.clone(), after.team2.clone())
            } else {
                (after.team2.clone(), after.team1.clone())
            };
            Match {
                id: after.id + i,
                team1,
                team2,
                date: after.date + Duration::hours(GENERATED_MATCH_SPACING_HOURS * i),
                event: after.event.clone(),
                format: after.format.clone(),
                result: MatchResult::undecided(),
                live: false,
            }
        })
        .collect()
}
