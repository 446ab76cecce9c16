use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key/value contents of the remote buffer: match id -> winner.
pub type BufferState = HashMap<String, String>;

// --- Participants ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Display name, e.g. "Astralis".
    pub name: String,
    /// Provider-side team id. Unknown for TBD slots.
    #[serde(default)]
    pub id: Option<i64>,
}

impl Team {
    pub fn new(name: &str, id: i64) -> Self {
        Self {
            name: name.to_string(),
            id: Some(id),
        }
    }
}

/// Tournament or league a match belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventGroup {
    /// E.g. "IEM Fall 2021 Europe".
    pub name: String,
    pub id: i64,
    #[serde(default)]
    pub logo_url: Option<String>,
}

// --- Match ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Winning team's name. Empty while the match is undecided.
    #[serde(default)]
    pub winner: String,
    /// Free-form score, winner's figure first (e.g. "2-1", "16-14").
    #[serde(default)]
    pub score: String,
}

impl MatchResult {
    pub fn undecided() -> Self {
        Self {
            winner: String::new(),
            score: String::new(),
        }
    }

    pub fn won_by(winner: &str, score: &str) -> Self {
        Self {
            winner: winner.to_string(),
            score: score.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: i64,
    pub team1: Team,
    pub team2: Team,
    pub date: DateTime<Utc>,
    pub event: EventGroup,
    /// Series format label, e.g. "bo1", "bo3".
    #[serde(default)]
    pub format: String,
    #[serde(default = "MatchResult::undecided")]
    pub result: MatchResult,
    #[serde(default)]
    pub live: bool,
}

impl Match {
    /// Buffer key for this match.
    pub fn key(&self) -> String {
        self.id.to_string()
    }

    /// Buffer value for this match: the winner, empty if undecided.
    pub fn winner_value(&self) -> String {
        self.result.winner.clone()
    }

    pub fn is_concluded(&self) -> bool {
        !self.result.winner.is_empty()
    }
}

impl std::fmt::Display for Match {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {} vs {} ({})",
            self.id,
            self.team1.name,
            self.team2.name,
            self.date.format("%Y-%m-%dT%H:%M")
        )
    }
}

/// Project matches into buffer form: id -> winner (empty if undecided).
pub fn winner_map(matches: &[Match]) -> BufferState {
    matches
        .iter()
        .map(|m| (m.key(), m.winner_value()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(id: i64, winner: &str) -> Match {
        Match {
            id,
            team1: Team::new("Astralis", 6665),
            team2: Team::new("OG", 10503),
            date: Utc.with_ymd_and_hms(2021, 10, 12, 18, 0, 0).unwrap(),
            event: EventGroup {
                name: "IEM Fall 2021 Europe".to_string(),
                id: 6136,
                logo_url: None,
            },
            format: "bo3".to_string(),
            result: if winner.is_empty() {
                MatchResult::undecided()
            } else {
                MatchResult::won_by(winner, "2-1")
            },
            live: false,
        }
    }

    #[test]
    fn winner_map_keys_by_id() {
        let map = winner_map(&[sample(1, "OG"), sample(2, "")]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["1"], "OG");
        assert_eq!(map["2"], "");
    }

    #[test]
    fn undecided_match_is_not_concluded() {
        assert!(!sample(1, "").is_concluded());
        assert!(sample(1, "Astralis").is_concluded());
    }

    #[test]
    fn missing_result_deserializes_as_undecided() {
        let json = r#"{
            "id": 2351234,
            "team1": {"name": "NAVI", "id": 4608},
            "team2": {"name": "TBD"},
            "date": "2021-10-14T15:00:00Z",
            "event": {"name": "IEM Fall 2021 Europe", "id": 6136}
        }"#;
        let m: Match = serde_json::from_str(json).unwrap();
        assert_eq!(m.result, MatchResult::undecided());
        assert_eq!(m.team2.id, None);
        assert!(!m.live);
    }
}
