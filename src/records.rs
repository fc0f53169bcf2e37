use std::collections::HashMap;

use crate::stat_schema::FieldSet;

pub const TEAM_IDENTITY_COLUMNS: [&str; 11] = [
    "competition_id",
    "competition_name",
    "tournament_calendar_id",
    "tournament_calendar_name",
    "match_id",
    "match_date",
    "team_id",
    "team_name",
    "opponent_id",
    "home",
    "formation_used",
];

pub const PLAYER_IDENTITY_COLUMNS: [&str; 9] = [
    "match_id",
    "match_date",
    "team_id",
    "home",
    "player_id",
    "match_name",
    "position",
    "position_side",
    "is_sub",
];

/// Stat values laid out in the order of the schema they were projected onto.
#[derive(Debug, Clone, PartialEq)]
pub struct StatLine(Vec<f64>);

impl StatLine {
    /// Present fields keep their value, absent ones become zero and names the
    /// schema does not know are dropped.
    pub fn project(fields: &FieldSet, values: &HashMap<String, f64>) -> Self {
        Self(
            fields
                .names()
                .iter()
                .map(|name| values.get(name).copied().unwrap_or(0.0))
                .collect(),
        )
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn get(&self, fields: &FieldSet, name: &str) -> Option<f64> {
        fields.position(name).and_then(|idx| self.0.get(idx).copied())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamRecord {
    pub competition_id: String,
    pub competition_name: String,
    pub tournament_calendar_id: String,
    pub tournament_calendar_name: String,
    pub match_id: String,
    pub match_date: String,
    pub team_id: String,
    pub team_name: String,
    pub opponent_id: String,
    pub home: bool,
    pub formation_used: Option<String>,
    pub stats: StatLine,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub match_id: String,
    pub match_date: String,
    pub team_id: String,
    pub home: bool,
    pub player_id: String,
    pub match_name: String,
    pub position: String,
    pub position_side: Option<String>,
    pub is_sub: bool,
    pub stats: StatLine,
}

pub fn team_column_names(fields: &FieldSet) -> Vec<String> {
    column_names(&TEAM_IDENTITY_COLUMNS, fields)
}

pub fn player_column_names(fields: &FieldSet) -> Vec<String> {
    column_names(&PLAYER_IDENTITY_COLUMNS, fields)
}

fn column_names(identity: &[&str], fields: &FieldSet) -> Vec<String> {
    identity
        .iter()
        .map(|s| s.to_string())
        .chain(fields.names().iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_fills_missing_and_drops_unknown() {
        let fields = FieldSet::new(vec!["goals".into(), "saves".into(), "touches".into()]).unwrap();
        let values = HashMap::from([
            ("touches".to_string(), 480.0),
            ("brandNewStat".to_string(), 3.0),
        ]);
        let line = StatLine::project(&fields, &values);
        assert_eq!(line.values(), &[0.0, 0.0, 480.0]);
        assert_eq!(line.get(&fields, "touches"), Some(480.0));
        assert_eq!(line.get(&fields, "brandNewStat"), None);
    }
}
