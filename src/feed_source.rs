use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::match_feed::{Contestant, MatchInfo};

pub const PLAYED_STATUS: &str = "Played";

/// Read side of the data provider. Implementations must be shareable across
/// the orchestrator's worker threads.
pub trait FeedSource: Sync {
    fn fetch_match_list(&self, tournament_calendar_id: &str) -> Result<MatchListing>;

    fn fetch_match_feed(&self, match_id: &str) -> Result<Value>;
}

#[derive(Debug, Clone)]
pub struct MatchSummary {
    pub id: String,
    pub date: String,
    pub status: Option<String>,
    pub competition_id: String,
    pub tournament_calendar_id: String,
    pub contestants: Vec<Contestant>,
}

impl MatchSummary {
    /// Fixtures without a reported status are treated as played.
    pub fn is_played(&self) -> bool {
        self.status
            .as_deref()
            .is_none_or(|s| s.eq_ignore_ascii_case(PLAYED_STATUS))
    }
}

/// A tournament calendar's matches in provider order, plus the number of
/// listing entries that could not be read.
#[derive(Debug, Clone, Default)]
pub struct MatchListing {
    pub matches: Vec<MatchSummary>,
    pub unreadable: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedMatch {
    match_info: MatchInfo,
    #[serde(default)]
    live_data: Option<ListedLiveData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedLiveData {
    #[serde(default)]
    match_details: Option<ListedMatchDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedMatchDetails {
    #[serde(default)]
    match_status: Option<String>,
}

/// Parses a tournament-calendar match listing (`{"match": [...]}`), keeping the
/// provider's order. Entries that do not carry a usable `matchInfo` are logged
/// and counted as unreadable.
pub fn parse_match_list_json(raw: &str) -> Result<MatchListing> {
    let value = serde_json::from_str::<Value>(raw.trim()).context("invalid match list json")?;
    parse_match_list(&value)
}

pub fn parse_match_list(value: &Value) -> Result<MatchListing> {
    if value.is_null() {
        return Ok(MatchListing::default());
    }
    let matches = value
        .get("match")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("match list is missing the `match` array"))?;

    let mut out = MatchListing {
        matches: Vec::with_capacity(matches.len()),
        unreadable: 0,
    };
    for (idx, item) in matches.iter().enumerate() {
        let listed = match ListedMatch::deserialize(item) {
            Ok(listed) => listed,
            Err(err) => {
                let match_id = item
                    .pointer("/matchInfo/id")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                warn!(index = idx, match_id = %match_id, error = %err, "skipping unreadable match list entry");
                out.unreadable += 1;
                continue;
            }
        };
        let status = listed
            .live_data
            .and_then(|d| d.match_details)
            .and_then(|d| d.match_status);
        let info = listed.match_info;
        out.matches.push(MatchSummary {
            id: info.id,
            date: info.date,
            status,
            competition_id: info.competition.id,
            tournament_calendar_id: info.tournament_calendar.id,
            contestants: info.contestant,
        });
    }
    Ok(out)
}
