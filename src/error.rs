use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Per-match normalization failures. None of these abort a backfill run;
/// the orchestrator records them and moves on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("malformed match feed: {0}")]
    MalformedMatchFeed(String),

    #[error("stat {stat:?} has non-numeric value {value}")]
    MalformedStatValue { stat: String, value: String },

    #[error("substitute {player_id} has no matching substitution event")]
    UnresolvedSubstitution { player_id: String },

    #[error("withdrawn player {player_off_id} for substitute {player_id} is not in the line-up")]
    MissingWithdrawnPlayer {
        player_id: String,
        player_off_id: String,
    },
}

impl NormalizeError {
    pub fn reason(&self) -> SkipReason {
        match self {
            Self::MalformedMatchFeed(_) => SkipReason::MalformedMatchFeed,
            Self::MalformedStatValue { .. } => SkipReason::MalformedStatValue,
            Self::UnresolvedSubstitution { .. } => SkipReason::UnresolvedSubstitution,
            Self::MissingWithdrawnPlayer { .. } => SkipReason::MissingWithdrawnPlayer,
        }
    }
}

pub type NormalizeResult<T> = std::result::Result<T, NormalizeError>;

/// Reason class reported for a skipped (match, aspect) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    FetchFailed,
    MalformedMatchFeed,
    MalformedStatValue,
    UnresolvedSubstitution,
    MissingWithdrawnPlayer,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchFailed => "fetch_failed",
            Self::MalformedMatchFeed => "malformed_match_feed",
            Self::MalformedStatValue => "malformed_stat_value",
            Self::UnresolvedSubstitution => "unresolved_substitution",
            Self::MissingWithdrawnPlayer => "missing_withdrawn_player",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
