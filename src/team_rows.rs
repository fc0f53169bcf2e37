use crate::error::{NormalizeError, NormalizeResult};
use crate::match_feed::{RawMatchFeed, flatten_stats};
use crate::records::{StatLine, TeamRecord};
use crate::stat_schema::StatSchema;

/// One record per line-up, in the feed's line-up order.
pub fn build_team_rows(schema: &StatSchema, feed: &RawMatchFeed) -> NormalizeResult<Vec<TeamRecord>> {
    let line_ups = feed.line_ups()?;
    let home_flags = feed.home_flags()?;
    let info = &feed.match_info;

    let mut out = Vec::with_capacity(line_ups.len());
    for (idx, line_up) in line_ups.iter().enumerate() {
        let competitor = feed.contestant(&line_up.contestant_id).ok_or_else(|| {
            NormalizeError::MalformedMatchFeed(format!(
                "line-up contestant {} is not listed in matchInfo",
                line_up.contestant_id
            ))
        })?;
        let opponent = info
            .contestant
            .iter()
            .find(|c| c.id != competitor.id)
            .ok_or_else(|| {
                NormalizeError::MalformedMatchFeed(format!(
                    "no opponent listed for contestant {}",
                    competitor.id
                ))
            })?;

        let values = flatten_stats(&line_up.stat)?;
        out.push(TeamRecord {
            competition_id: info.competition.id.clone(),
            competition_name: info.competition.name.clone(),
            tournament_calendar_id: info.tournament_calendar.id.clone(),
            tournament_calendar_name: info.tournament_calendar.name.clone(),
            match_id: info.id.clone(),
            match_date: info.date.clone(),
            team_id: competitor.id.clone(),
            team_name: competitor.display_name().to_string(),
            opponent_id: opponent.id.clone(),
            home: home_flags[idx],
            formation_used: line_up.formation_used.clone(),
            stats: StatLine::project(&schema.team, &values),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn schema() -> StatSchema {
        StatSchema::new(
            "test",
            ["goals", "totalPass", "saves", "wonCorners", "fkFoulLost"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            vec!["minsPlayed".to_string()],
        )
        .unwrap()
    }

    fn feed(home_stats: serde_json::Value, away_stats: serde_json::Value) -> RawMatchFeed {
        RawMatchFeed::from_value(&json!({
            "matchInfo": {
                "id": "m1",
                "date": "2024-08-16Z",
                "competition": { "id": "comp", "name": "Premier League" },
                "tournamentCalendar": { "id": "tmcl", "name": "2024/2025" },
                "contestant": [
                    { "id": "A", "name": "Alpha FC", "shortName": "Alpha", "position": "home" },
                    { "id": "B", "name": "Beta United", "position": "away" }
                ]
            },
            "liveData": {
                "lineUp": [
                    { "contestantId": "B", "formationUsed": "4231", "player": [], "stat": away_stats },
                    { "contestantId": "A", "formationUsed": "433", "player": [], "stat": home_stats }
                ]
            }
        }))
        .expect("test feed parses")
    }

    #[test]
    fn home_team_with_two_stats_away_with_none() {
        let schema = schema();
        let feed = feed(
            json!([
                { "type": "goals", "value": "2" },
                { "type": "totalPass", "value": "512" }
            ]),
            json!([]),
        );
        let rows = build_team_rows(&schema, &feed).unwrap();
        assert_eq!(rows.len(), 2);

        let away = &rows[0];
        let home = &rows[1];
        assert_eq!(away.team_id, "B");
        assert!(!away.home);
        assert_eq!(away.stats.values(), &[0.0; 5]);
        assert_eq!(away.team_name, "Beta United");

        assert_eq!(home.team_id, "A");
        assert!(home.home);
        assert_eq!(home.team_name, "Alpha");
        assert_eq!(home.formation_used.as_deref(), Some("433"));
        assert_eq!(home.stats.values(), &[2.0, 512.0, 0.0, 0.0, 0.0]);

        assert_eq!(home.opponent_id, away.team_id);
        assert_eq!(away.opponent_id, home.team_id);
    }

    #[test]
    fn unknown_stats_are_dropped() {
        let schema = schema();
        let feed = feed(json!([{ "type": "fancyNewMetric", "value": "9" }]), json!([]));
        let rows = build_team_rows(&schema, &feed).unwrap();
        assert_eq!(rows[1].stats.len(), schema.team.len());
        assert!(rows[1].stats.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn non_numeric_stat_surfaces() {
        let feed = feed(json!([{ "type": "goals", "value": "two" }]), json!([]));
        let err = build_team_rows(&schema(), &feed).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::MalformedStatValue {
                stat: "goals".to_string(),
                value: "\"two\"".to_string()
            }
        );
    }

    #[test]
    fn single_line_up_is_malformed() {
        let mut feed = feed(json!([]), json!([]));
        feed.live_data.line_up.pop();
        let err = build_team_rows(&schema(), &feed).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedMatchFeed(_)));
    }

    #[test]
    fn two_home_contestants_is_malformed() {
        let mut feed = feed(json!([]), json!([]));
        feed.match_info.contestant[1].position = "home".to_string();
        let err = build_team_rows(&schema(), &feed).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedMatchFeed(_)));
    }

    #[test]
    fn rebuilding_is_identical() {
        let schema = schema();
        let feed = feed(json!([{ "type": "saves", "value": 4 }]), json!([]));
        assert_eq!(
            build_team_rows(&schema, &feed).unwrap(),
            build_team_rows(&schema, &feed).unwrap()
        );
    }
}
