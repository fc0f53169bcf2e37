use std::collections::{HashMap, HashSet};

use crate::error::{NormalizeError, NormalizeResult};
use crate::match_feed::{RawMatchFeed, RawPlayer, RawSubstitution, flatten_stats};
use crate::records::{PlayerRecord, StatLine};
use crate::stat_schema::StatSchema;

pub const MINUTES_PLAYED: &str = "minsPlayed";
pub const FORMATION_PLACE: &str = "formationPlace";

/// A player who actually appeared, with stats already coerced.
struct Participant<'a> {
    raw: &'a RawPlayer,
    stats: HashMap<String, f64>,
}

/// Tactical slot a substitute inherits from the player they replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot<'a> {
    pub position: &'a str,
    pub position_side: Option<&'a str>,
    pub formation_place: Option<f64>,
}

impl<'a> Slot<'a> {
    fn of(participant: &Participant<'a>) -> Self {
        Self {
            position: &participant.raw.position,
            position_side: participant.raw.position_side.as_deref(),
            formation_place: participant.stats.get(FORMATION_PLACE).copied(),
        }
    }
}

/// Maps substitutes onto the slot vacated by the withdrawn player.
pub struct SubstitutionResolver<'a> {
    events: HashMap<&'a str, &'a RawSubstitution>,
}

impl<'a> SubstitutionResolver<'a> {
    pub fn new(events: &'a [RawSubstitution]) -> Self {
        Self {
            events: events
                .iter()
                .map(|event| (event.player_on_id.as_str(), event))
                .collect(),
        }
    }

    /// Follows the substitution chain until it reaches a starter, so a
    /// substitute who replaced another substitute still lands on the
    /// original slot.
    fn resolve(
        &self,
        player_id: &'a str,
        team: &HashMap<&'a str, Participant<'a>>,
    ) -> NormalizeResult<Slot<'a>> {
        let mut current = player_id;
        for _ in 0..=team.len() {
            let event = self.events.get(current).ok_or_else(|| {
                NormalizeError::UnresolvedSubstitution {
                    player_id: current.to_string(),
                }
            })?;
            let withdrawn = team.get(event.player_off_id.as_str()).ok_or_else(|| {
                NormalizeError::MissingWithdrawnPlayer {
                    player_id: current.to_string(),
                    player_off_id: event.player_off_id.clone(),
                }
            })?;
            if !withdrawn.raw.is_substitute() {
                return Ok(Slot::of(withdrawn));
            }
            current = withdrawn.raw.player_id.as_str();
        }
        // Chain longer than the squad means it loops back on itself.
        Err(NormalizeError::UnresolvedSubstitution {
            player_id: player_id.to_string(),
        })
    }
}

/// One record per participating player, grouped by line-up in feed order and
/// keeping the feed's player order within each line-up.
pub fn build_player_rows(
    schema: &StatSchema,
    feed: &RawMatchFeed,
) -> NormalizeResult<Vec<PlayerRecord>> {
    let line_ups = feed.line_ups()?;
    let home_flags = feed.home_flags()?;
    let resolver = SubstitutionResolver::new(&feed.live_data.substitute);
    let info = &feed.match_info;

    let mut out = Vec::new();
    for (idx, line_up) in line_ups.iter().enumerate() {
        let mut order = Vec::with_capacity(line_up.player.len());
        let mut team = HashMap::with_capacity(line_up.player.len());
        let mut seen = HashSet::with_capacity(line_up.player.len());
        for raw in &line_up.player {
            if !seen.insert(raw.player_id.as_str()) {
                return Err(NormalizeError::MalformedMatchFeed(format!(
                    "player {} listed twice in line-up {}",
                    raw.player_id, line_up.contestant_id
                )));
            }
            let stats = flatten_stats(&raw.stat)?;
            if !stats.contains_key(MINUTES_PLAYED) {
                continue;
            }
            order.push(raw.player_id.as_str());
            team.insert(raw.player_id.as_str(), Participant { raw, stats });
        }

        let mut resolved = HashMap::new();
        for id in &order {
            if team[id].raw.is_substitute() {
                resolved.insert(*id, resolver.resolve(*id, &team)?);
            }
        }

        for id in &order {
            let participant = &team[id];
            let raw = participant.raw;
            let (position, position_side, stats) = match resolved.get(id) {
                Some(inherited) => {
                    let mut stats = participant.stats.clone();
                    match inherited.formation_place {
                        Some(place) => stats.insert(FORMATION_PLACE.to_string(), place),
                        None => stats.remove(FORMATION_PLACE),
                    };
                    (
                        inherited.position.to_string(),
                        inherited.position_side.map(str::to_string),
                        StatLine::project(&schema.player, &stats),
                    )
                }
                None => (
                    raw.position.clone(),
                    raw.position_side.clone(),
                    StatLine::project(&schema.player, &participant.stats),
                ),
            };
            out.push(PlayerRecord {
                match_id: info.id.clone(),
                match_date: info.date.clone(),
                team_id: line_up.contestant_id.clone(),
                home: home_flags[idx],
                player_id: raw.player_id.clone(),
                match_name: raw.match_name.clone(),
                position,
                position_side,
                is_sub: raw.is_substitute(),
                stats,
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn schema() -> StatSchema {
        StatSchema::new(
            "test",
            vec!["goals".to_string()],
            ["minsPlayed", "formationPlace", "goals", "totalPass"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
        .unwrap()
    }

    fn player(id: &str, position: &str, side: Option<&str>, stats: Value) -> Value {
        let mut p = json!({
            "playerId": id,
            "matchName": format!("Player {id}"),
            "position": position,
            "stat": stats
        });
        if let Some(side) = side {
            p["positionSide"] = json!(side);
        }
        p
    }

    fn feed(home_players: Vec<Value>, away_players: Vec<Value>, subs: Value) -> RawMatchFeed {
        RawMatchFeed::from_value(&json!({
            "matchInfo": {
                "id": "m1",
                "date": "2024-08-16Z",
                "competition": { "id": "comp", "name": "Premier League" },
                "tournamentCalendar": { "id": "tmcl", "name": "2024/2025" },
                "contestant": [
                    { "id": "A", "name": "Alpha", "position": "home" },
                    { "id": "B", "name": "Beta", "position": "away" }
                ]
            },
            "liveData": {
                "lineUp": [
                    { "contestantId": "A", "player": home_players, "stat": [] },
                    { "contestantId": "B", "player": away_players, "stat": [] }
                ],
                "substitute": subs
            }
        }))
        .expect("test feed parses")
    }

    fn played(mins: u32, place: Option<u32>) -> Value {
        let mut stats = vec![json!({ "type": "minsPlayed", "value": mins.to_string() })];
        if let Some(place) = place {
            stats.push(json!({ "type": "formationPlace", "value": place.to_string() }));
        }
        Value::Array(stats)
    }

    #[test]
    fn substitute_inherits_withdrawn_slot() {
        let schema = schema();
        let feed = feed(
            vec![
                player("Y", "Midfielder", Some("Right"), played(70, Some(7))),
                player("X", "Substitute", None, played(20, None)),
            ],
            vec![player("Z", "Goalkeeper", Some("Centre"), played(90, Some(1)))],
            json!([{ "playerOnId": "X", "playerOffId": "Y", "contestantId": "A", "timeMin": 70 }]),
        );
        let rows = build_player_rows(&schema, &feed).unwrap();
        assert_eq!(rows.len(), 3);

        let x = rows.iter().find(|r| r.player_id == "X").unwrap();
        let y = rows.iter().find(|r| r.player_id == "Y").unwrap();
        assert!(x.is_sub);
        assert!(!y.is_sub);
        assert_eq!(x.position, "Midfielder");
        assert_eq!(x.position_side.as_deref(), Some("Right"));
        assert_eq!(x.position, y.position);
        assert_eq!(x.stats.get(&schema.player, "formationPlace"), Some(7.0));
        assert_eq!(x.stats.get(&schema.player, "minsPlayed"), Some(20.0));
        assert!(x.home);
    }

    #[test]
    fn non_participants_are_excluded_and_order_is_kept() {
        let feed = feed(
            vec![
                player("A1", "Defender", Some("Left"), played(90, Some(3))),
                player("A2", "Substitute", None, json!([])),
                player("A3", "Forward", Some("Centre"), played(90, Some(9))),
            ],
            vec![player("B1", "Goalkeeper", None, played(90, Some(1)))],
            json!([]),
        );
        let rows = build_player_rows(&schema(), &feed).unwrap();
        let ids = rows.iter().map(|r| r.player_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["A1", "A3", "B1"]);
        assert_eq!(rows[2].team_id, "B");
        assert!(!rows[2].home);
        assert_eq!(rows[2].position_side, None);
    }

    #[test]
    fn substitute_without_event_is_unresolved() {
        let feed = feed(
            vec![
                player("Y", "Midfielder", Some("Right"), played(90, Some(7))),
                player("X", "Substitute", None, played(5, None)),
            ],
            vec![],
            json!([]),
        );
        let err = build_player_rows(&schema(), &feed).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::UnresolvedSubstitution {
                player_id: "X".to_string()
            }
        );
    }

    #[test]
    fn withdrawn_player_missing_from_team() {
        let feed = feed(
            vec![player("X", "Substitute", None, played(5, None))],
            vec![player("Y", "Midfielder", Some("Right"), played(85, Some(7)))],
            json!([{ "playerOnId": "X", "playerOffId": "Y" }]),
        );
        let err = build_player_rows(&schema(), &feed).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::MissingWithdrawnPlayer {
                player_id: "X".to_string(),
                player_off_id: "Y".to_string()
            }
        );
    }

    #[test]
    fn chained_substitution_reaches_starter() {
        let schema = schema();
        let feed = feed(
            vec![
                player("S2", "Substitute", None, played(10, None)),
                player("S1", "Substitute", None, played(20, None)),
                player("ST", "Forward", Some("Left"), played(60, Some(11))),
            ],
            vec![],
            json!([
                { "playerOnId": "S1", "playerOffId": "ST" },
                { "playerOnId": "S2", "playerOffId": "S1" }
            ]),
        );
        let rows = build_player_rows(&schema, &feed).unwrap();
        for row in rows.iter().filter(|r| r.is_sub) {
            assert_eq!(row.position, "Forward");
            assert_eq!(row.position_side.as_deref(), Some("Left"));
            assert_eq!(row.stats.get(&schema.player, "formationPlace"), Some(11.0));
        }
    }

    #[test]
    fn cyclic_substitution_is_unresolved() {
        let feed = feed(
            vec![
                player("S1", "Substitute", None, played(10, None)),
                player("S2", "Substitute", None, played(10, None)),
            ],
            vec![],
            json!([
                { "playerOnId": "S1", "playerOffId": "S2" },
                { "playerOnId": "S2", "playerOffId": "S1" }
            ]),
        );
        let err = build_player_rows(&schema(), &feed).unwrap_err();
        assert!(matches!(err, NormalizeError::UnresolvedSubstitution { .. }));
    }

    #[test]
    fn bad_value_on_bench_player_still_fails() {
        let feed = feed(
            vec![player("A1", "Substitute", None, json!([{ "type": "touches", "value": "?" }]))],
            vec![],
            json!([]),
        );
        let err = build_player_rows(&schema(), &feed).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedStatValue { .. }));
    }

    #[test]
    fn repeated_player_id_in_line_up_is_malformed() {
        let feed = feed(
            vec![
                player("P", "Defender", Some("Left"), played(90, Some(3))),
                player("P", "Forward", Some("Centre"), played(10, Some(9))),
            ],
            vec![],
            json!([]),
        );
        let err = build_player_rows(&schema(), &feed).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedMatchFeed(ref msg) if msg.contains("P")));
    }
}
