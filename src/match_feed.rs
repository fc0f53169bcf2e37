use std::collections::HashMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{NormalizeError, NormalizeResult};

pub const SUBSTITUTE_POSITION: &str = "Substitute";
pub const HOME_POSITION: &str = "home";
pub const AWAY_POSITION: &str = "away";

/// Typed view over a StatsPerform matchstats document. Only the sections the
/// row builders read are modeled; everything else is ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMatchFeed {
    pub match_info: MatchInfo,
    pub live_data: LiveData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub date: String,
    pub competition: NamedRef,
    pub tournament_calendar: NamedRef,
    #[serde(default)]
    pub contestant: Vec<Contestant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedRef {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contestant {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub position: String,
}

impl Contestant {
    pub fn display_name(&self) -> &str {
        self.short_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.name)
    }

    pub fn is_home(&self) -> bool {
        self.position.eq_ignore_ascii_case(HOME_POSITION)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveData {
    #[serde(default)]
    pub line_up: Vec<LineUp>,
    #[serde(default)]
    pub substitute: Vec<RawSubstitution>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineUp {
    #[serde(deserialize_with = "string_or_number")]
    pub contestant_id: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub formation_used: Option<String>,
    #[serde(default)]
    pub player: Vec<RawPlayer>,
    #[serde(default)]
    pub stat: Vec<RawStat>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlayer {
    #[serde(deserialize_with = "string_or_number")]
    pub player_id: String,
    #[serde(default)]
    pub match_name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub position_side: Option<String>,
    #[serde(default)]
    pub stat: Vec<RawStat>,
}

impl RawPlayer {
    pub fn is_substitute(&self) -> bool {
        self.position == SUBSTITUTE_POSITION
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStat {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSubstitution {
    #[serde(deserialize_with = "string_or_number")]
    pub player_on_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub player_off_id: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub contestant_id: Option<String>,
}

impl RawMatchFeed {
    pub fn from_value(value: &Value) -> NormalizeResult<Self> {
        Self::deserialize(value).map_err(|err| NormalizeError::MalformedMatchFeed(err.to_string()))
    }

    pub fn from_json(raw: &str) -> NormalizeResult<Self> {
        serde_json::from_str::<Self>(raw.trim())
            .map_err(|err| NormalizeError::MalformedMatchFeed(err.to_string()))
    }

    pub fn match_id(&self) -> &str {
        &self.match_info.id
    }

    pub fn contestant(&self, id: &str) -> Option<&Contestant> {
        self.match_info.contestant.iter().find(|c| c.id == id)
    }

    /// The provider guarantees two line-ups per match; anything else is
    /// treated as a broken document.
    pub fn line_ups(&self) -> NormalizeResult<&[LineUp]> {
        let line_ups = self.live_data.line_up.as_slice();
        if line_ups.len() != 2 {
            return Err(NormalizeError::MalformedMatchFeed(format!(
                "expected 2 line-ups, found {}",
                line_ups.len()
            )));
        }
        if line_ups[0].contestant_id == line_ups[1].contestant_id {
            return Err(NormalizeError::MalformedMatchFeed(format!(
                "both line-ups belong to contestant {}",
                line_ups[0].contestant_id
            )));
        }
        Ok(line_ups)
    }

    /// Resolves the home designation for each line-up, in line-up order.
    pub fn home_flags(&self) -> NormalizeResult<[bool; 2]> {
        let line_ups = self.line_ups()?;
        let contestants = &self.match_info.contestant;
        if contestants.len() != 2 {
            return Err(NormalizeError::MalformedMatchFeed(format!(
                "expected 2 contestants, found {}",
                contestants.len()
            )));
        }
        let mut flags = [false; 2];
        for (slot, line_up) in line_ups.iter().enumerate() {
            let contestant = self.contestant(&line_up.contestant_id).ok_or_else(|| {
                NormalizeError::MalformedMatchFeed(format!(
                    "line-up contestant {} is not listed in matchInfo",
                    line_up.contestant_id
                ))
            })?;
            let position = contestant.position.to_ascii_lowercase();
            if position != HOME_POSITION && position != AWAY_POSITION {
                return Err(NormalizeError::MalformedMatchFeed(format!(
                    "contestant {} has position {:?}",
                    contestant.id, contestant.position
                )));
            }
            flags[slot] = contestant.is_home();
        }
        if flags[0] == flags[1] {
            return Err(NormalizeError::MalformedMatchFeed(
                "expected exactly one home contestant".to_string(),
            ));
        }
        Ok(flags)
    }
}

pub fn coerce_stat(stat: &RawStat) -> NormalizeResult<f64> {
    let parsed = match &stat.value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(NormalizeError::MalformedStatValue {
            stat: stat.kind.clone(),
            value: stat.value.to_string(),
        }),
    }
}

/// Coerces every raw stat, including ones the schema will later drop.
pub fn flatten_stats(stats: &[RawStat]) -> NormalizeResult<HashMap<String, f64>> {
    let mut out = HashMap::with_capacity(stats.len());
    for stat in stats {
        out.insert(stat.kind.clone(), coerce_stat(stat)?);
    }
    Ok(out)
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, found {other}"
        ))),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn stat(kind: &str, value: Value) -> RawStat {
        RawStat {
            kind: kind.to_string(),
            value,
        }
    }

    #[test]
    fn coerces_strings_and_numbers() {
        assert_eq!(coerce_stat(&stat("goals", json!("2"))), Ok(2.0));
        assert_eq!(coerce_stat(&stat("xg", json!(" 1.25 "))), Ok(1.25));
        assert_eq!(coerce_stat(&stat("touches", json!(47))), Ok(47.0));
    }

    #[test]
    fn rejects_non_numeric_values() {
        for value in [json!("n/a"), json!(true), json!(null), json!("NaN")] {
            let err = coerce_stat(&stat("goals", value)).unwrap_err();
            assert!(matches!(err, NormalizeError::MalformedStatValue { ref stat, .. } if stat == "goals"));
        }
    }

    #[test]
    fn missing_match_info_is_malformed() {
        let err = RawMatchFeed::from_value(&json!({ "liveData": {} })).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedMatchFeed(_)));
    }

    #[test]
    fn numeric_ids_are_accepted() {
        let feed = RawMatchFeed::from_value(&json!({
            "matchInfo": {
                "id": 991,
                "date": "2024-08-16Z",
                "competition": { "id": "c1", "name": "Premier League" },
                "tournamentCalendar": { "id": "t1", "name": "2024/2025" },
                "contestant": []
            },
            "liveData": { "lineUp": [{ "contestantId": 5, "formationUsed": 433 }] }
        }))
        .expect("feed parses");
        assert_eq!(feed.match_id(), "991");
        assert_eq!(feed.live_data.line_up[0].formation_used.as_deref(), Some("433"));
        assert!(feed.live_data.substitute.is_empty());
    }
}
