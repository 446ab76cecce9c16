use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use matchsync_common::{Match, OracleError, OracleResult};

use crate::generator::{load_reference, split_normalized};
use crate::traits::{MatchFeed, MatchProvider};

/// Split matches into concluded (past) and undecided (future), each sorted
/// ascending by date.
pub fn partition_feed(matches: Vec<Match>) -> MatchFeed {
    let (mut past, mut future): (Vec<Match>, Vec<Match>) =
        matches.into_iter().partition(Match::is_concluded);
    past.sort_by_key(|m| m.date);
    future.sort_by_key(|m| m.date);
    MatchFeed::new(past, future)
}

/// Serves matches from a JSON file on disk, re-read on every fetch so edits
/// show up on the next cycle.
pub struct FileProvider {
    path: PathBuf,
    anchor: Option<DateTime<Utc>>,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            anchor: None,
        }
    }

    /// Treat the file as a reference snapshot and shift it so its latest
    /// concluded match happened at `anchor`.
    pub fn anchored_at(mut self, anchor: DateTime<Utc>) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

#[async_trait]
impl MatchProvider for FileProvider {
    async fn fetch(&self) -> OracleResult<MatchFeed> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| {
            OracleError::FetchFailed(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let matches = load_reference(raw.as_slice())?;

        let feed = match self.anchor {
            Some(anchor) => split_normalized(&matches, anchor),
            None => partition_feed(matches),
        };
        debug!(
            path = %self.path.display(),
            past = feed.past.len(),
            future = feed.future.len(),
            "Loaded matches from file"
        );
        Ok(feed)
    }
}
